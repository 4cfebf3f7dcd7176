use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures raised by the durable files under the state directory.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialization(#[from] SerializationError),
    #[error("corrupt record in {file} at line {line}: {details}")]
    CorruptRecord {
        file: String,
        line: usize,
        details: String,
    },
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(SerializationError::from(err))
    }
}
