use thiserror::Error;

/// Why an action token was refused. Variants are checked in declaration order.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature does not verify")]
    BadSignature,

    #[error("token was issued by an unknown issuer")]
    WrongIssuer,

    #[error("token is not meant for this audience")]
    WrongAudience,

    #[error("token has expired")]
    Expired,

    #[error("token is not valid yet")]
    NotYetValid,
}

#[derive(Debug, Error)]
#[error("failed to sign action token: {0}")]
pub struct MintError(#[from] pub jsonwebtoken::errors::Error);

/// Failures of the leave store or the replay guard backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store call timed out")]
    Timeout,

    #[error("stored row is invalid: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}
