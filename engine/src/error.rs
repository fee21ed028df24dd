//! Error types for the mbaas engine.

use crate::transport::TransportError;
use crate::ClassName;
use thiserror::Error;

/// All possible errors from the mbaas engine.
///
/// Everything except [`Error::Transport`] is a local contract violation:
/// synchronous, non-retryable, and raised before anything leaves the process.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Record access errors
    #[error("field '{0}' is not available; fetch the record first")]
    FieldUnavailable(String),

    #[error("field '{0}' is reserved and cannot be modified")]
    ReservedField(String),

    #[error("key may not be empty")]
    EmptyKey,

    #[error("object id is already set to '{0}'")]
    ObjectIdAlreadySet(String),

    // Operation algebra errors
    #[error("{next} operation is invalid after previous {previous} operation")]
    InvalidOperationSequence {
        previous: &'static str,
        next: &'static str,
    },

    #[error("object of class '{0}' has no object id")]
    UnassignedReference(ClassName),

    #[error("related object must be of class '{expected}', but '{actual}' was passed in")]
    RelationClassMismatch {
        expected: ClassName,
        actual: ClassName,
    },

    #[error("invalid relation: {0}")]
    InvalidRelation(String),

    // Value errors
    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid ACL: {0}")]
    InvalidAcl(String),

    #[error("latitude must be within range [-90.0, 90.0], got {0}")]
    LatitudeOutOfRange(f64),

    #[error("longitude must be within range [-180.0, 180.0], got {0}")]
    LongitudeOutOfRange(f64),

    #[error("a role's name can only be set before it has been saved")]
    RoleAlreadySaved,

    #[error("expected a '{expected}' record, got '{actual}'")]
    ClassMismatch {
        expected: ClassName,
        actual: ClassName,
    },

    // Query errors
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    // Collaborator errors
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("session storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::FieldUnavailable("score".into());
        assert_eq!(
            err.to_string(),
            "field 'score' is not available; fetch the record first"
        );

        let err = Error::InvalidOperationSequence {
            previous: "Add",
            next: "Remove",
        };
        assert_eq!(
            err.to_string(),
            "Remove operation is invalid after previous Add operation"
        );

        let err = Error::RelationClassMismatch {
            expected: "Post".into(),
            actual: "Comment".into(),
        };
        assert_eq!(
            err.to_string(),
            "related object must be of class 'Post', but 'Comment' was passed in"
        );
    }

    #[test]
    fn transport_error_is_transparent() {
        let err: Error = TransportError::new(Some(404), "not found").into();
        assert_eq!(err.to_string(), "transport error (status 404): not found");
    }
}
