mod path;

pub use path::DfsPath;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Well-known port for the naming server's client-facing Service endpoint.
pub const SERVICE_PORT: u16 = 6000;
/// Well-known port for the naming server's Registration endpoint.
pub const REGISTRATION_PORT: u16 = 6001;

/// Error kinds shared by every crate in the workspace.
///
/// The enum is serializable so that an error raised inside a remote method
/// implementation crosses the RMI wire and is re-raised on the caller with
/// its kind and message intact. Transport-level failures use the `Remote`
/// kind; everything else is an application error.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DfsError {
    #[error("null argument: {0}")]
    NullArg(String),
    #[error("illegal argument: {0}")]
    IllegalArg(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("already registered: {0}")]
    AlreadyRegistered(String),
    #[error("illegal state: {0}")]
    IllegalState(String),
    #[error("not a remote interface: {0}")]
    NotRemoteInterface(String),
    #[error("not started: {0}")]
    NotStarted(String),
    #[error("unknown host: {0}")]
    UnknownHost(String),
    #[error("out of range: {0}")]
    OutOfRange(String),
    #[error("remote error: {0}")]
    Remote(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl DfsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DfsError::NotFound(_))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, DfsError::Remote(_))
    }
}

pub type DfsResult<T> = std::result::Result<T, DfsError>;

impl From<std::io::Error> for DfsError {
    fn from(err: std::io::Error) -> Self {
        DfsError::Io(err.to_string())
    }
}
