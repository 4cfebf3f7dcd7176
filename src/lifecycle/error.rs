use super::versions::RuleVersionId;
use crate::util::StorageError;
use thiserror::Error;

/// Failures surfaced by the version store, activation controller, and gray
/// release manager. Every variant leaves previously committed state intact.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("rule version {id} not found")]
    NotFound { id: RuleVersionId },
    /// The active pointer references a version the store cannot resolve.
    #[error("rule store cannot resolve referenced version {id}")]
    StoreUnavailable { id: RuleVersionId },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RuleError {
    pub fn validation(message: impl Into<String>) -> Self {
        RuleError::Validation(message.into())
    }
}
