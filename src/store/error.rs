use thiserror::Error;

use super::CursorError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store not configured: {0}")]
    NotConfigured(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid scan cursor: {0}")]
    Cursor(#[from] CursorError),

    /// The backend could not be reached or asked us to slow down.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
