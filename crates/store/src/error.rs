use cachelift_core::MigrateError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("corrupt record at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid store layout: {0}")]
    InvalidLayout(String),

    #[error("store already released")]
    Released,
}

impl From<StoreError> for MigrateError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) | StoreError::InvalidLayout(_) => {
                MigrateError::Configuration(err.to_string())
            }
            other => MigrateError::SourceRead(other.to_string()),
        }
    }
}
