//! Error types for XML decoding operations

use thiserror::Error;

/// Errors that can occur while decoding device payloads
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The document is not well-formed XML
    #[error("XML parsing failed: {0}")]
    Xml(String),

    /// The payload carries top-level keys besides the expected wrapper
    #[error("Extra fields not permitted: {0:?}")]
    UnexpectedKeys(Vec<String>),

    /// A required element or field is absent
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// The decoded mapping does not have the expected structure
    #[error("Unexpected payload shape: {0}")]
    Shape(String),
}

/// Result type alias for decoding operations
pub type ParseResult<T> = Result<T, ParseError>;
