//! Error types for the data-source layer.

use thiserror::Error;

/// Result type for data-source operations.
pub type DataResult<T> = Result<T, DataError>;

/// Errors that can occur in data-source operations.
#[derive(Debug, Error)]
pub enum DataError {
    /// The id is absent from the collection.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The backend answered with an envelope whose code is not zero.
    #[error("remote rejected request: {0}")]
    RemoteRejected(String),

    /// Transport failure, timeout or an unparseable response.
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// Device store read/write failure.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A payload that cannot be represented as a record.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl DataError {
    /// Returns true if this is a [`DataError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, DataError::NotFound(_))
    }

    /// Returns true if the failure came from the remote half.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            DataError::RemoteRejected(_) | DataError::RemoteUnavailable(_)
        )
    }
}

impl From<reqwest::Error> for DataError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DataError::RemoteUnavailable(format!("request timed out: {err}"))
        } else {
            DataError::RemoteUnavailable(err.to_string())
        }
    }
}

impl From<std::io::Error> for DataError {
    fn from(err: std::io::Error) -> Self {
        DataError::StorageUnavailable(err.to_string())
    }
}

impl From<chatstore_types::Error> for DataError {
    fn from(err: chatstore_types::Error) -> Self {
        DataError::InvalidRecord(err.to_string())
    }
}
