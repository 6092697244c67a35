use wikivault_types::{ApiError, CheckpointError, StorageError};

/// Error unifying the three lower layers an orchestrator calls into
/// directly. `is_transient` delegates to whichever layer produced the
/// error, so callers can feed this straight into the Retry Engine the same
/// way they would an `ApiError` alone.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn is_transient(&self) -> bool {
        match self {
            CoreError::Api(e) => e.is_transient(),
            CoreError::Storage(e) => e.is_transient(),
            CoreError::Checkpoint(_) | CoreError::Io(_) => false,
        }
    }
}
