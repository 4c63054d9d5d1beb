//! Error taxonomy shared by the codec, the stores and the flow orchestrator.

use std::fmt;

/// Which persisted record a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    PendingChallenge,
    TenantCredential,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::PendingChallenge => write!(f, "pending challenge"),
            RecordKind::TenantCredential => write!(f, "tenant credential"),
        }
    }
}

/// Errors surfaced by the tenant OAuth core.
///
/// None of these are retried internally; they propagate unchanged to
/// whatever boundary invoked the operation.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    // ── Flow errors ─────────────────────────────────────────────────────
    #[error("No {kind} found for tenant '{tenant_id}'")]
    NotFound { kind: RecordKind, tenant_id: String },

    #[error("Invalid callback: {0}")]
    InvalidCallback(String),

    #[error("Token exchange failed: {0}")]
    ExchangeFailure(String),

    #[error("Token refresh failed: {0}")]
    Refresh(String),

    #[error("Provider API call failed: {0}")]
    Provider(String),

    // ── Crypto errors ───────────────────────────────────────────────────
    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    // ── Persistence ─────────────────────────────────────────────────────
    #[error("Storage error: {0}")]
    Storage(String),
}

impl OAuthError {
    pub fn challenge_not_found(tenant_id: &str) -> Self {
        OAuthError::NotFound {
            kind: RecordKind::PendingChallenge,
            tenant_id: tenant_id.to_string(),
        }
    }

    pub fn credential_not_found(tenant_id: &str) -> Self {
        OAuthError::NotFound {
            kind: RecordKind::TenantCredential,
            tenant_id: tenant_id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, OAuthError::NotFound { .. })
    }
}

impl From<rusqlite::Error> for OAuthError {
    fn from(e: rusqlite::Error) -> Self {
        tracing::error!("Database error: {e}");
        OAuthError::Storage(e.to_string())
    }
}

impl From<tokio::task::JoinError> for OAuthError {
    fn from(e: tokio::task::JoinError) -> Self {
        OAuthError::Storage(format!("Blocking database task failed: {e}"))
    }
}

pub type Result<T, E = OAuthError> = std::result::Result<T, E>;
