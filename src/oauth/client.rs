//! Boundary to the third-party OAuth provider.

use async_trait::async_trait;

use crate::credentials::TokenSet;
use crate::error::Result;

/// Provider-side operations the flow depends on.
///
/// The production implementation is [`HttpOAuthClient`](super::HttpOAuthClient);
/// tests substitute a stub so the flow can be driven without a network.
///
/// # Errors
/// Implementations report a rejected code/verifier pair as
/// `OAuthError::ExchangeFailure` and a rejected refresh as `OAuthError::Refresh`.
#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// Builds the URL the tenant's browser is redirected to for approval.
    ///
    /// `state` carries the tenant id back to the callback.
    fn authorize_url(
        &self,
        state: &str,
        scopes: &str,
        code_challenge: &str,
        redirect_uri: &str,
    ) -> String;

    /// Exchanges an authorization code and its PKCE verifier for tokens.
    async fn exchange_code(
        &self,
        tenant_id: &str,
        code_verifier: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet>;

    /// Obtains a fresh token set from a refresh token.
    async fn refresh_tokens(&self, tenant_id: &str, refresh_token: &str) -> Result<TokenSet>;

    /// Authenticated GET against the provider API.
    async fn get_json(&self, access_token: &str, path: &str) -> Result<serde_json::Value>;
}
