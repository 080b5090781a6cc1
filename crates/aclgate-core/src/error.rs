//! Shared error type across aclgate crates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Administrative response codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseCode {
    /// Operation applied.
    Success,
    /// Malformed or semantically invalid request.
    Invalid,
    /// No ACL with the given id for this app.
    AclNotFound,
    /// No installed app with the given id.
    AppNotFound,
    /// Durable write failed; in-memory state was rolled back.
    PersistenceError,
    /// Stored, but the compiled policy could not be activated.
    PolicyCommitError,
    /// Friendly-name metadata could not be applied.
    MetadataError,
    /// Internal server error.
    Internal,
}

impl ResponseCode {
    /// String representation used in JSON responses and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseCode::Success => "SUCCESS",
            ResponseCode::Invalid => "INVALID",
            ResponseCode::AclNotFound => "ACL_NOT_FOUND",
            ResponseCode::AppNotFound => "APP_NOT_FOUND",
            ResponseCode::PersistenceError => "PERSISTENCE_ERROR",
            ResponseCode::PolicyCommitError => "POLICY_COMMIT_ERROR",
            ResponseCode::MetadataError => "METADATA_ERROR",
            ResponseCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("acl not found: {0}")]
    AclNotFound(String),
    #[error("app not found: {0}")]
    AppNotFound(String),
    #[error("persistence failed: {0}")]
    Persistence(String),
    #[error("policy compiled but not active: {0}")]
    PolicyCommit(String),
    #[error("metadata rejected: {0}")]
    Metadata(String),
    #[error("process control failed: {0}")]
    Process(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Map internal error to a stable response code.
    pub fn response_code(&self) -> ResponseCode {
        match self {
            GatewayError::BadRequest(_) => ResponseCode::Invalid,
            GatewayError::AclNotFound(_) => ResponseCode::AclNotFound,
            GatewayError::AppNotFound(_) => ResponseCode::AppNotFound,
            GatewayError::Persistence(_) => ResponseCode::PersistenceError,
            GatewayError::PolicyCommit(_) => ResponseCode::PolicyCommitError,
            GatewayError::Metadata(_) => ResponseCode::MetadataError,
            GatewayError::Process(_) | GatewayError::Internal(_) => ResponseCode::Internal,
        }
    }
}
