use super::create::S7Client;
use crate::{errors::Error, s7_protocol::read_area::read_area, tag::Tag};

/// *Methods for reading PLC memory*
impl S7Client {
    /// Read a batch of tags in one or more ReadVar jobs.
    ///
    /// The returned tags are in input order with `value` filled on success;
    /// a failing item sets its tag's `error` without aborting the batch.
    ///
    /// # Example
    /// ```no_run
    /// # use step7::{ConnectionConfig, DataType, S7Client, Tag};
    /// # tokio_test::block_on(async {
    /// # let mut client = S7Client::connect(ConnectionConfig::new("192.168.10.72")).await?;
    /// let tags = client
    ///     .read_area(vec![
    ///         Tag::read("valve_open", "DB2.DBX0.0", DataType::Bit)?,
    ///         Tag::read("flow", "DB2.DBX24.0", DataType::Real)?,
    ///     ])
    ///     .await?;
    /// # Ok::<(), step7::errors::Error>(())
    /// # });
    /// ```
    /// # Errors
    ///
    /// Will return `Error` if the session is not connected or a transport
    /// or protocol failure occurred.
    pub async fn read_area(&mut self, tags: Vec<Tag>) -> Result<Vec<Tag>, Error> {
        read_area(self, tags).await
    }
}
