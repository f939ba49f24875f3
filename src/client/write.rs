use super::create::S7Client;
use crate::{errors::Error, s7_protocol::write_area::write_area, tag::Tag};

/// *Methods for writing PLC memory*
impl S7Client {
    /// Write a batch of tags in one or more WriteVar jobs.
    ///
    /// The returned tags are in input order; a failing item sets its tag's
    /// `error` without aborting the batch.
    ///
    /// # Example
    /// ```no_run
    /// # use step7::{ConnectionConfig, S7Client, S7Value, Tag};
    /// # tokio_test::block_on(async {
    /// # let mut client = S7Client::connect(ConnectionConfig::new("192.168.10.72")).await?;
    /// let tags = client
    ///     .write_area(vec![Tag::write("setpoint", "DB2.DBX24.0", S7Value::Real(6.6))?])
    ///     .await?;
    /// assert!(tags[0].is_ok());
    /// # Ok::<(), step7::errors::Error>(())
    /// # });
    /// ```
    /// # Errors
    ///
    /// Will return `Error` if the session is not connected or a transport
    /// or protocol failure occurred.
    pub async fn write_area(&mut self, tags: Vec<Tag>) -> Result<Vec<Tag>, Error> {
        write_area(self, tags).await
    }
}
