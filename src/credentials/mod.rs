//! Encrypted per-tenant credential storage.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       TokenStore                         │
//! │  - upsert / find / delete by tenant      │
//! │  - encrypt on save, decrypt on read      │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (encrypt)            (decrypt)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       Encryption Module                  │
//! │  - AES-256-GCM, 16-byte random IV        │
//! │  - hex(ciphertext):hex(iv) envelope      │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       SQLite Database                    │
//! │  - tenant_credentials table              │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Security
//!
//! - Refresh tokens are only ever persisted as ciphertext envelopes
//! - Access tokens are short-lived and stored in plaintext
//! - The key lives in memory only and is never logged

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub mod encryption;
mod storage;

pub use encryption::{decrypt, encrypt, CipherKey, ENVELOPE_SEPARATOR};
pub use storage::TokenStore;

/// Decrypted token triple, as issued by the provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// OAuth access token (used for API requests)
    pub access_token: String,

    /// OAuth refresh token (used to obtain new access tokens)
    pub refresh_token: String,

    /// When the access token expires (UTC)
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    /// True when the access token is expired, or will be within `leeway`.
    pub fn expires_within(&self, leeway: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at <= now + leeway
    }
}

/// A tenant's credential row exactly as persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantCredential {
    pub tenant_id: String,
    pub access_token: String,
    pub encrypted_refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expires_within() {
        let now = Utc::now();
        let tokens = TokenSet {
            access_token: "at".into(),
            refresh_token: "rt".into(),
            expires_at: now + Duration::seconds(30),
        };

        assert!(!tokens.expires_within(Duration::zero(), now));
        assert!(tokens.expires_within(Duration::seconds(60), now));
        assert!(tokens.expires_within(Duration::zero(), now + Duration::minutes(1)));
    }
}
