//! Error types for the binding layer.

use thiserror::Error;

use crate::gc::SexpType;

/// Errors raised by views, proxies and conversions.
///
/// Host evaluation failures are not represented here when they come out of
/// [`ProtectedEvaluator`](crate::evaluator::ProtectedEvaluator): that type
/// records them as a result flag instead.  `Evaluation` is only produced by
/// the convenience wrappers that turn a failed protected run into an error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindError {
    #[error("not compatible with {expected}: found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: SexpType,
    },

    #[error("index out of bounds: {index} (length {length})")]
    IndexOutOfBounds { index: usize, length: usize },

    #[error("not a matrix")]
    NotAMatrix,

    #[error("binding is locked: '{0}'")]
    BindingLocked(String),

    #[error("no such binding: '{0}'")]
    NoSuchBinding(String),

    #[error("no such namespace: '{0}'")]
    NoSuchNamespace(String),

    #[error("no environment called: '{0}'")]
    NoSuchEnvironment(String),

    #[error("promise not yet evaluated")]
    UnevaluatedPromise,

    #[error("not a closure")]
    NotAClosure,

    #[error("dimensions too large: {0:?}")]
    DimensionOverflow(Vec<usize>),

    #[error("expecting a single value, got length {0}")]
    LengthMismatch(usize),

    #[error("cannot convert {found} to {target}")]
    InvalidConversion {
        target: &'static str,
        found: SexpType,
    },

    #[error("evaluation error: {0}")]
    Evaluation(String),
}

/// Result type alias
pub type BindResult<T> = Result<T, BindError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_payload() {
        let err = BindError::IndexOutOfBounds {
            index: 7,
            length: 3,
        };
        assert_eq!(err.to_string(), "index out of bounds: 7 (length 3)");

        let err = BindError::TypeMismatch {
            expected: "environment",
            found: SexpType::Integer,
        };
        assert_eq!(err.to_string(), "not compatible with environment: found integer");

        assert_eq!(
            BindError::BindingLocked("x".into()).to_string(),
            "binding is locked: 'x'"
        );
    }
}
