//! Error types for Moldkeeper
//!
//! Every failure is scoped to the request that produced it. The HTTP layer
//! renders these as `{ error, code, field?, details? }` bodies.

use hyper::StatusCode;

/// Main error type for Moldkeeper operations
#[derive(Debug, thiserror::Error)]
pub enum KeeperError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate identity: {0}")]
    DuplicateIdentity(String),

    #[error("Invalid shot delta: {0}")]
    InvalidDelta(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Checklist incomplete: {} required item(s) unchecked", .missing.len())]
    Incomplete { missing: Vec<String> },

    #[error("Session token is scoped to asset {token_asset}, not {target_asset}")]
    ScopeMismatch {
        token_asset: String,
        target_asset: String,
    },

    #[error("Session token expired")]
    Expired,

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Immutable: {0}")]
    Immutable(String),

    #[error("Has dependents: {0}")]
    HasDependents(String),

    #[error("Invalid state transition: {0}")]
    InvalidState(String),

    /// Optimistic concurrency conflict. Retried internally, only surfaced
    /// when retries are exhausted.
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl KeeperError {
    /// Shorthand for field-level validation failures
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateIdentity(_) => StatusCode::CONFLICT,
            Self::InvalidDelta(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidField { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Incomplete { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ScopeMismatch { .. } => StatusCode::FORBIDDEN,
            Self::Expired => StatusCode::UNAUTHORIZED,
            Self::Malformed(_) => StatusCode::UNAUTHORIZED,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Immutable(_) => StatusCode::CONFLICT,
            Self::HasDependents(_) => StatusCode::CONFLICT,
            Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::DuplicateIdentity(_) => "DUPLICATE_IDENTITY",
            Self::InvalidDelta(_) => "INVALID_DELTA",
            Self::InvalidField { .. } => "INVALID_FIELD",
            Self::Incomplete { .. } => "INCOMPLETE",
            Self::ScopeMismatch { .. } => "SCOPE_MISMATCH",
            Self::Expired => "TOKEN_EXPIRED",
            Self::Malformed(_) => "TOKEN_MALFORMED",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Immutable(_) => "IMMUTABLE",
            Self::HasDependents(_) => "HAS_DEPENDENTS",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::Conflict(_) => "CONFLICT",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Database(_) => "STORAGE_FAULT",
            Self::Config(_) | Self::Internal(_) => "INTERNAL",
        }
    }

    /// Offending field, where the error is field-specific
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::InvalidField { field, .. } => Some(field),
            Self::InvalidDelta(_) => Some("delta"),
            _ => None,
        }
    }

    /// Structured detail payload for clients that render field-level feedback
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Incomplete { missing } => Some(serde_json::json!({ "missing": missing })),
            Self::ScopeMismatch {
                token_asset,
                target_asset,
            } => Some(serde_json::json!({
                "tokenAsset": token_asset,
                "targetAsset": target_asset,
            })),
            Self::InvalidField { reason, .. } => Some(serde_json::json!({ "reason": reason })),
            _ => None,
        }
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for KeeperError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for KeeperError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<mongodb::error::Error> for KeeperError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Result type alias for Moldkeeper operations
pub type Result<T> = std::result::Result<T, KeeperError>;
