//! Error type shared by the object graph and the query builders.
//!
//! Errors fall into a few families:
//! - argument errors (invalid role, unknown field, bad group entry, multiplicity exceeded)
//! - ambiguity errors raised by relation path resolution
//! - authorization failures for write operations (denied reads are filtered, not raised)
//! - resolution failures when a referenced object no longer exists
//!
//! None of them are retried or corrected by this crate.

use std::fmt;

/// Error type for graph and query operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifeError {
    /// Invalid argument (unknown role, exceeded multiplicity, invalid group entry, ...)
    InvalidArgument(String),
    /// A field referenced by an order-by clause or condition cannot be resolved
    UnknownField { field: String, message: String },
    /// The type is not known to the type registry
    UnknownType(String),
    /// More than one relation path connects two types
    Ambiguous(String),
    /// The current context is not allowed to perform the action on the object
    AuthorizationFailed { oid: String, action: String },
    /// A referenced object does not exist in the store
    NotFound(String),
    /// Malformed identifier or condition string
    Parse(String),
    /// Statement execution error reported by the executor
    Query(String),
    /// Configuration or metadata loading error
    Config(String),
    /// Other errors
    Other(String),
}

impl LifeError {
    /// Shorthand for [`LifeError::UnknownField`] with a generated message.
    pub fn unknown_field(field: impl Into<String>) -> Self {
        let field = field.into();
        let message = format!("The field name '{field}' is unknown");
        LifeError::UnknownField { field, message }
    }

    /// Whether this is one of the argument errors raised for invalid caller input.
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            LifeError::InvalidArgument(_) | LifeError::UnknownField { .. } | LifeError::UnknownType(_)
        )
    }
}

impl fmt::Display for LifeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifeError::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            LifeError::UnknownField { field, message } => {
                write!(f, "Unknown field '{field}': {message}")
            }
            LifeError::UnknownType(name) => write!(f, "Unknown type: {name}"),
            LifeError::Ambiguous(msg) => write!(f, "Ambiguous reference: {msg}"),
            LifeError::AuthorizationFailed { oid, action } => {
                write!(f, "Authorization failed for '{action}' on {oid}")
            }
            LifeError::NotFound(oid) => write!(f, "Object not found: {oid}"),
            LifeError::Parse(msg) => write!(f, "Parse error: {msg}"),
            LifeError::Query(msg) => write!(f, "Query error: {msg}"),
            LifeError::Config(msg) => write!(f, "Configuration error: {msg}"),
            LifeError::Other(msg) => write!(f, "Graph error: {msg}"),
        }
    }
}

impl std::error::Error for LifeError {}

impl From<config::ConfigError> for LifeError {
    fn from(err: config::ConfigError) -> Self {
        LifeError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for LifeError {
    fn from(err: serde_json::Error) -> Self {
        LifeError::Config(format!("Invalid metadata: {err}"))
    }
}

impl From<regex::Error> for LifeError {
    fn from(err: regex::Error) -> Self {
        LifeError::InvalidArgument(format!("Invalid regular expression: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_life_error_display() {
        let err = LifeError::InvalidArgument("Maximum number of related objects exceeded: 2".to_string());
        assert!(err.to_string().contains("Invalid argument"));
        assert!(err.to_string().contains("exceeded: 2"));
    }

    #[test]
    fn test_unknown_field_message() {
        let err = LifeError::unknown_field("sortkey");
        assert_eq!(
            err,
            LifeError::UnknownField {
                field: "sortkey".to_string(),
                message: "The field name 'sortkey' is unknown".to_string(),
            }
        );
        assert!(err.is_argument_error());
    }

    #[test]
    fn test_argument_error_classification() {
        assert!(LifeError::UnknownType("Foo".to_string()).is_argument_error());
        assert!(!LifeError::Ambiguous("Page -> Image".to_string()).is_argument_error());
        assert!(!LifeError::NotFound("Page:1".to_string()).is_argument_error());
    }
}
