use thiserror::Error;

use crate::inference::InferenceError;
use crate::sessions::PersistError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum WorkpulseError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage client error: {0}")]
    Storage(#[from] StorageError),

    #[error("Inference client error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Session store error: {0}")]
    Persist(#[from] PersistError),
}
