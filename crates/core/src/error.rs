//! Domain error model.

use thiserror::Error;

/// Domain-level error.
///
/// Keep this focused on deterministic failures (bad identifiers, malformed
/// messages). Transport and storage concerns belong to the infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An identifier was invalid (e.g. empty).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A job message body could not be decoded.
    #[error("malformed job message: {0}")]
    MalformedMessage(String),
}

impl DomainError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedMessage(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        assert_eq!(
            DomainError::invalid_id("job id must not be empty").to_string(),
            "invalid identifier: job id must not be empty"
        );
        assert_eq!(
            DomainError::malformed("expected value at line 1").to_string(),
            "malformed job message: expected value at line 1"
        );
    }
}
