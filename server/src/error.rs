use std::io;

use kernel::ErrorKind;

use crate::policy::DenyReason;

/// Failure of the medium backing the store. Never retried internally.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("password verifier error: {0}")]
    Verifier(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("authentication required")]
    NotAuthenticated,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("username '{0}' already exists")]
    DuplicateUsername(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid path '{0}'")]
    InvalidPath(String),
    #[error("permission denied: {0}")]
    PermissionDenied(DenyReason),
    #[error("account '{0}' is protected and cannot be deleted")]
    ProtectedAccount(String),
    #[error("malformed request body: {0}")]
    InvalidRequest(String),
    #[error("index {index} is out of range, the log holds {len} records")]
    OutOfRange { index: usize, len: usize },
    #[error("storage failure: {0}")]
    StorageFailure(#[from] StorageError),
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotAuthenticated => ErrorKind::NotAuthenticated,
            Error::InvalidCredentials => ErrorKind::InvalidCredentials,
            Error::DuplicateUsername(_) => ErrorKind::DuplicateUsername,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidPath(_) => ErrorKind::InvalidPath,
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::ProtectedAccount(_) => ErrorKind::ProtectedAccount,
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::OutOfRange { .. } => ErrorKind::OutOfRange,
            Error::StorageFailure(_) => ErrorKind::StorageFailure,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::StorageFailure(StorageError::Io(e))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::StorageFailure(StorageError::Sqlite(e))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
