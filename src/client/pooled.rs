use async_trait::async_trait;

use super::create::{ConnectionConfig, S7Client};
use crate::errors::Error;
use crate::tag::Tag;

pub(crate) struct S7PoolManager {
    config: ConnectionConfig,
}

#[async_trait]
impl bb8::ManageConnection for S7PoolManager {
    type Connection = S7Client;
    type Error = Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        S7Client::connect(self.config.clone()).await
    }

    async fn is_valid(&self, connection: &mut Self::Connection) -> Result<(), Self::Error> {
        if connection.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    fn has_broken(&self, connection: &mut Self::Connection) -> bool {
        !connection.is_connected()
    }
}

type S7PooledConnection = bb8::Pool<S7PoolManager>;

/// Pooled sessions to one PLC.
///
/// Each operation exclusively checks out one session for its duration, so
/// the single-owner discipline of [`S7Client`] holds while independent
/// tasks share the pool.
#[allow(missing_debug_implementations)]
#[derive(Clone)]
pub struct S7Pool(S7PooledConnection);

impl S7Pool {
    /// Create a new connection pool. Sessions are opened lazily.
    ///
    ///```no_run
    /// use step7::{ConnectionConfig, S7Pool};
    ///
    /// let pool = S7Pool::new(ConnectionConfig::new("192.168.10.72"), 3);
    /// ```
    pub fn new(config: ConnectionConfig, max_size: u32) -> Self {
        let manager = S7PoolManager { config };
        let pool = S7PooledConnection::builder()
            .max_size(max_size)
            .build_unchecked(manager);

        S7Pool(pool)
    }

    /// Read a batch of tags on a pooled session.
    ///
    /// # Errors
    ///
    /// Will return `Error` if no session could be checked out or the read
    /// failed.
    pub async fn read_area(&self, tags: Vec<Tag>) -> Result<Vec<Tag>, Error> {
        let mut connection = self.checkout().await?;
        connection.read_area(tags).await
    }

    /// Write a batch of tags on a pooled session.
    ///
    /// # Errors
    ///
    /// Will return `Error` if no session could be checked out or the write
    /// failed.
    pub async fn write_area(&self, tags: Vec<Tag>) -> Result<Vec<Tag>, Error> {
        let mut connection = self.checkout().await?;
        connection.write_area(tags).await
    }

    async fn checkout(&self) -> Result<bb8::PooledConnection<'_, S7PoolManager>, Error> {
        self.0.get().await.map_err(|e| match e {
            bb8::RunError::User(error) => error,
            bb8::RunError::TimedOut => Error::PoolTimeout,
        })
    }
}
