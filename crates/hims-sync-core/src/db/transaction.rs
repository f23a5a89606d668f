//! Transaction control over the shared connection

use crate::error::Result;
use libsql::Connection;

/// Groups repository writes that must land together (async)
#[allow(async_fn_in_trait)]
pub trait Transactor {
    /// Open a transaction
    async fn begin(&self) -> Result<()>;

    /// Make every write since `begin` durable
    async fn commit(&self) -> Result<()>;

    /// Discard every write since `begin`
    async fn rollback(&self) -> Result<()>;
}

/// libSQL implementation of `Transactor`
pub struct LibSqlTransactor<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlTransactor<'a> {
    /// Create a transactor over the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl Transactor for LibSqlTransactor<'_> {
    async fn begin(&self) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", ()).await?;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.conn.execute("COMMIT", ()).await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.conn.execute("ROLLBACK", ()).await?;
        Ok(())
    }
}
