use crate::validation::ValidationState;

/// Core protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid validation transition from {from} to {to}")]
    InvalidStateTransition {
        from: ValidationState,
        to: ValidationState,
    },

    #[error("message validation failed: {0}")]
    ValidationError(String),

    #[error("invalid {what} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid short channel id: {0}")]
    InvalidShortChannelId(String),
}
