//! Authenticated handle for one tenant's provider API calls.

use chrono::{Duration, Utc};
use std::sync::Arc;

use super::client::OAuthClient;
use crate::credentials::TokenStore;
use crate::error::Result;

/// Refresh this long before the stored expiry to absorb clock skew.
const REFRESH_LEEWAY_SECONDS: i64 = 60;

/// A tenant-scoped session.
///
/// Holds no tokens itself: every call reads the current credential from the
/// store, refreshing and persisting a new set when the access token is
/// (nearly) expired.
#[derive(Clone)]
pub struct Session {
    tenant_id: String,
    tokens: TokenStore,
    client: Arc<dyn OAuthClient>,
}

impl Session {
    pub(crate) fn new(tenant_id: String, tokens: TokenStore, client: Arc<dyn OAuthClient>) -> Self {
        Self {
            tenant_id,
            tokens,
            client,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Returns a usable access token, refreshing it first if needed.
    pub async fn access_token(&self) -> Result<String> {
        let current = self.tokens.retrieve(&self.tenant_id).await?;

        if !current.expires_within(Duration::seconds(REFRESH_LEEWAY_SECONDS), Utc::now()) {
            return Ok(current.access_token);
        }

        tracing::info!(tenant_id = %self.tenant_id, "Access token expired, refreshing");
        let refreshed = self
            .client
            .refresh_tokens(&self.tenant_id, &current.refresh_token)
            .await?;
        self.tokens.save(&self.tenant_id, &refreshed).await?;

        Ok(refreshed.access_token)
    }

    /// GETs `path` from the provider API as this tenant.
    pub async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        let access_token = self.access_token().await?;
        self.client.get_json(&access_token, path).await
    }
}
