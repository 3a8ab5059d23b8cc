use std::error::Error;
use std::io;
use thiserror::Error;
use tracing::warn;

/// Type-erased error used for handler, upgrade, read and write failures.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Errors that cross the boundary of the server core.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server closed")]
    Closed,

    #[error("accept error: {source}")]
    Accept {
        #[source]
        source: io::Error,
    },

    #[error("bind error: {source}")]
    Bind {
        #[source]
        source: io::Error,
    },
}

impl ServerError {
    pub fn accept<E: Into<io::Error>>(e: E) -> Self {
        Self::Accept { source: e.into() }
    }

    pub fn bind<E: Into<io::Error>>(e: E) -> Self {
        Self::Bind { source: e.into() }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Error returned when closing a listener or a multiplexed connection.
#[derive(Debug, Error)]
pub enum CloseError {
    #[error("resource already closed")]
    AlreadyClosed,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl CloseError {
    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Swallows the benign outcome of closing a resource twice.
///
/// Double close is expected whenever a resource's own loop and a server
/// shutdown race each other, so only unexpected failures are reported.
pub fn ignore_already_closed(result: Result<(), CloseError>) {
    match result {
        Ok(()) | Err(CloseError::AlreadyClosed) => {}
        Err(e) => warn!(cause = %e, "failed to close resource"),
    }
}
