//! Errors raised while building domain values from untrusted input.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Rejected input: a payload, enum label or identifier that does not parse.
///
/// Storage and delivery failures live in the infra crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_the_rejected_detail() {
        assert_eq!(
            DomainError::validation("senderId is required").to_string(),
            "validation failed: senderId is required"
        );
        assert_eq!(DomainError::invalid_id("JobId: bad").to_string(), "invalid identifier: JobId: bad");
    }
}
