//! Single-owner executor for the SQLite connection.
//!
//! The `rusqlite::Connection` is not safe to share between threads, so it
//! lives on one background thread owned by tokio-rusqlite. Work reaches it as
//! closures drained from a FIFO channel; callers await the result without
//! blocking their own thread. The raw handle never leaves a unit of work.

use tokio_rusqlite::{Connection, rusqlite};

use super::{Error, fuzzy, migrations};

/// Owner of the word store connection.
#[derive(Clone, Debug)]
pub(crate) struct Executor {
    conn: Connection,
}

impl Executor {
    /// Open an in-memory store, register the scoring functions and create the schema.
    pub(crate) async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;

        conn.call(|conn| -> Result<(), Error> {
            conn.execute_batch(include_str!("../../sql/pragma.sql"))?;
            fuzzy::register(conn)?;
            migrations::run(conn)
        })
        .await
        .map_err(Error::from)?;

        Ok(Self { conn })
    }

    /// Run `unit` on the owner thread and wait for its result.
    ///
    /// Units run strictly in submission order. Once started a unit runs to
    /// completion; only an interrupt on the connection can cut it short.
    pub(crate) async fn submit<F, R>(&self, unit: F) -> Result<R, Error>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, Error> + Send + 'static,
        R: Send + 'static,
    {
        self.conn.call(unit).await.map_err(Error::from)
    }

    /// Grab the connection's interrupt handle from inside a unit.
    pub(crate) async fn interrupt_handle(&self) -> Result<rusqlite::InterruptHandle, Error> {
        self.submit(|conn| Ok(conn.get_interrupt_handle())).await
    }
}
