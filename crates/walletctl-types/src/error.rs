//! Error types for walletctl
//!
//! `TypesError` covers parsing of domain values. `ErrorCode` and
//! `ResponseError` are the protocol-level errors returned to callers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for parsing domain values
pub type Result<T> = std::result::Result<T, TypesError>;

/// Domain value parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    #[error("Invalid public key {value}: {reason}")]
    InvalidPublicKey { value: String, reason: String },

    #[error("Unknown method: {method}")]
    UnknownMethod { method: String },

    #[error("Unknown budget renewal: {value}")]
    UnknownBudgetRenewal { value: String },

    #[error("Unknown request state: {value}")]
    UnknownRequestState { value: String },

    #[error("Invalid {kind} id {value}: {reason}")]
    InvalidId {
        kind: &'static str,
        value: String,
        reason: String,
    },
}

/// The caller's deadline passed before the operation completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deadline exceeded")]
pub struct DeadlineExceeded;

/// Protocol error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RateLimited,
    NotImplemented,
    InsufficientBalance,
    QuotaExceeded,
    Restricted,
    Unauthorized,
    Internal,
    Expired,
    Other,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "RATE_LIMITED",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::InsufficientBalance => "INSUFFICIENT_BALANCE",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::Restricted => "RESTRICTED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Internal => "INTERNAL",
            Self::Expired => "EXPIRED",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed error as carried in a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct ResponseError {
    pub code: ErrorCode,
    pub message: String,
}

impl ResponseError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_wire_format() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::QuotaExceeded).unwrap(),
            "\"QUOTA_EXCEEDED\""
        );
        assert_eq!(ErrorCode::Internal.to_string(), "INTERNAL");
    }

    #[test]
    fn test_response_error_display() {
        let err = ResponseError::new(ErrorCode::Restricted, "nope");
        assert_eq!(err.to_string(), "RESTRICTED: nope");
    }
}
