//! Transaction and data store error types

use thiserror::Error;

/// Result type for store and transaction operations
pub type Result<T> = std::result::Result<T, TransactError>;

/// Transaction errors
#[derive(Error, Debug)]
pub enum TransactError {
    /// Core error (readers, schema validation)
    #[error("Core error: {0}")]
    Core(#[from] geostore_core::Error),

    /// Filter error
    #[error("Filter error: {0}")]
    Filter(#[from] geostore_filter::FilterError),

    /// No schema registered under this type name
    #[error("Unknown feature type: {0}")]
    UnknownType(String),

    /// A schema with this type name already exists
    #[error("Duplicate feature type: {0}")]
    DuplicateType(String),

    /// A feature with this id is already visible
    #[error("Duplicate feature: {0}")]
    DuplicateFeature(String),

    /// Write attempted through a committed or rolled-back transaction
    #[error("Transaction {0} is closed")]
    TransactionClosed(u64),

    /// Committed state changed under the transaction's diff
    #[error("Commit conflict on {type_name}: {reason}")]
    CommitConflict { type_name: String, reason: String },

    /// Configuration could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl TransactError {
    /// Create an unknown type error
    pub fn unknown_type(name: impl Into<String>) -> Self {
        Self::UnknownType(name.into())
    }

    /// Create a duplicate feature error
    pub fn duplicate_feature(id: impl Into<String>) -> Self {
        Self::DuplicateFeature(id.into())
    }

    /// Create a commit conflict error
    pub fn commit_conflict(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CommitConflict {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }
}
