//! Error types for filter evaluation and encoding

use thiserror::Error;

/// Result type for filter operations
pub type Result<T> = std::result::Result<T, FilterError>;

/// Filter errors
#[derive(Error, Debug)]
pub enum FilterError {
    /// Property not declared by the feature's type
    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    /// Operand types cannot be combined by the operator
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// LIKE pattern could not be compiled
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Geometry literal could not be parsed or is empty
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Construct cannot be encoded by the target (e.g. spatial filters in SQL)
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Error from geostore-core
    #[error("Core error: {0}")]
    Core(#[from] geostore_core::Error),
}

impl FilterError {
    /// Create a type mismatch error
    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        Self::TypeMismatch(msg.into())
    }

    /// Create an unsupported error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create an invalid pattern error
    pub fn invalid_pattern(msg: impl Into<String>) -> Self {
        Self::InvalidPattern(msg.into())
    }
}

/// Readers report filter failures through the core error type.
impl From<FilterError> for geostore_core::Error {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::Core(inner) => inner,
            other => geostore_core::Error::filter_evaluation(other.to_string()),
        }
    }
}
