//! Error types for geostore-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
///
/// Reader implementations surface every failure through this type so that
/// callers drive a single `has_next`/`next` protocol regardless of where the
/// features come from.
#[derive(Error, Debug)]
pub enum Error {
    /// Failure reading from the underlying feature source
    #[error("Data source error: {0}")]
    DataSource(String),

    /// `next()` called with nothing left to return
    #[error("No such element: reader is exhausted")]
    NoSuchElement,

    /// Reader used after `close()`
    #[error("Reader is closed")]
    ReaderClosed,

    /// Reader used after an earlier fatal error
    #[error("Reader failed earlier and cannot continue")]
    ReaderFailed,

    /// Attribute name not declared by the feature type
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    /// Value or schema does not fit the feature type
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// WKT parsing error
    #[error("WKT parse error: {0}")]
    WktParse(String),

    /// Unknown or malformed CRS identifier
    #[error("Invalid CRS: {0}")]
    InvalidCrs(String),

    /// Malformed qualified name
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Filter evaluation failed against a feature
    #[error("Filter evaluation error: {0}")]
    FilterEvaluation(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a data source error
    pub fn data_source(msg: impl Into<String>) -> Self {
        Error::DataSource(msg.into())
    }

    /// Create an unknown attribute error
    pub fn unknown_attribute(name: impl Into<String>) -> Self {
        Error::UnknownAttribute(name.into())
    }

    /// Create a schema mismatch error
    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Error::SchemaMismatch(msg.into())
    }

    /// Create a WKT parse error
    pub fn wkt_parse(msg: impl Into<String>) -> Self {
        Error::WktParse(msg.into())
    }

    /// Create an invalid CRS error
    pub fn invalid_crs(msg: impl Into<String>) -> Self {
        Error::InvalidCrs(msg.into())
    }

    /// Create an invalid name error
    pub fn invalid_name(msg: impl Into<String>) -> Self {
        Error::InvalidName(msg.into())
    }

    /// Create a filter evaluation error
    pub fn filter_evaluation(msg: impl Into<String>) -> Self {
        Error::FilterEvaluation(msg.into())
    }

    /// True for errors that terminate a reader (as opposed to protocol misuse)
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::NoSuchElement | Error::ReaderClosed)
    }
}
