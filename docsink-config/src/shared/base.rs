use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The sink uri could not be parsed.
    #[error("invalid sink uri `{uri}`: {reason}")]
    InvalidUri { uri: String, reason: String },
    /// The sink uri has no host component.
    #[error("sink uri `{0}` has no host")]
    MissingHost(String),
    /// The namespace is not of the form `database.collection`.
    #[error("malformed namespace `{0}`, expected `database.collection`")]
    MalformedNamespace(String),
    /// A field holds a value outside its allowed range.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}
