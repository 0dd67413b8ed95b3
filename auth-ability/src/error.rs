use crate::models::{Action, SubjectType};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AbilityError {
    #[error("No adapter registered for subject type: {0}")]
    NoAdapter(SubjectType),

    #[error("Rule for '{action}' on '{subject_type}' carries a predicate and cannot be compiled to a query filter")]
    UnsupportedRule {
        action: Action,
        subject_type: SubjectType,
    },

    #[error("Record not found: {subject_type}#{id}")]
    NotFound {
        subject_type: SubjectType,
        id: String,
    },

    #[error("Not permitted to {action} {subject_type}#{id}")]
    PermissionDenied {
        action: Action,
        subject_type: SubjectType,
        id: String,
    },

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl AbilityError {
    /// True for errors that mean "the caller may not see this record",
    /// letting callers mask permission failures as absence when they choose to.
    pub fn is_access_failure(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. } | Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, AbilityError>;
