//! Unified error types for the word cache.

use tokio_rusqlite::rusqlite;

/// Unified error types for the word cache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., a zero result cap passed to a select).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// The caller abandoned a pending select.
    ///
    /// Returned only after the forced interrupt has reached the connection.
    #[error("CANCELLED")]
    Cancelled,

    /// The out-of-band interrupt task failed to run.
    #[error("INTERRUPT_FAILED: {0}")]
    InterruptFailed(String),
}

impl Error {
    /// True for failures SQLite reports while running a statement (interrupt, busy, locked).
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            Error::Database(tokio_rusqlite::Error::Error(rusqlite::Error::SqliteFailure(..)))
        )
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
