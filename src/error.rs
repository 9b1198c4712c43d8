use std::io;

use thiserror::Error as ThisError;

use crate::frame;

/// Every failure the driver can report. Transport and protocol errors abort the running operation
/// and are never retried implicitly; `NeedsReconnect` and `Interrupted` are expected terminal
/// states the caller is supposed to tell apart.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The socket could not be opened, read or written.
    #[error("I/O error: {0}")]
    Transport(#[from] io::Error),
    /// The server sent something that does not follow the expected framing.
    #[error("protocol error; {0}")]
    Protocol(String),
    /// AUTH was rejected. The connection stays open but unauthenticated.
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// A well formed error reply, surfaced as is.
    #[error("{0}")]
    Server(String),
    /// The peer reset or closed the connection while a reply was expected.
    #[error("Needed reconnect.")]
    NeedsReconnect,
    /// Cooperative cancellation of a running operation.
    #[error("Interrupted.")]
    Interrupted,
    #[error("invalid argument: {0}")]
    Argument(String),
    #[error("Not connected")]
    NotConnected,
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_needs_reconnect(&self) -> bool {
        matches!(self, Error::NeedsReconnect)
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Interrupted)
    }

    /// Whether the socket handle must be dropped after this error.
    pub(crate) fn is_fatal_io(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::NeedsReconnect)
    }
}

impl From<frame::Error> for Error {
    fn from(err: frame::Error) -> Self {
        Error::Protocol(err.to_string())
    }
}

impl From<&str> for Error {
    fn from(src: &str) -> Error {
        Error::Protocol(src.to_string())
    }
}

impl From<String> for Error {
    fn from(src: String) -> Error {
        Error::Protocol(src)
    }
}
