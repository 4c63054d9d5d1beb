//! Per-tenant authorization-code-with-PKCE flow.
//!
//! ```text
//!  NotStarted ──start_flow──▶ PendingApproval ──complete_flow──▶ Authorized
//!                                  ▲                                 │
//!                                  └───────────start_flow────────────┘
//! ```
//!
//! The state is never stored on its own; it is read off the presence of a
//! pending challenge and a tenant credential (see [`OAuthFlow::flow_state`]).

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::client::OAuthClient;
use super::session::Session;
use crate::credentials::{TokenSet, TokenStore};
use crate::error::{OAuthError, Result};
use crate::pkce::{ChallengeStore, Pkce};


/// Where a tenant stands in the authorization flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    /// No pending challenge and no stored credential.
    NotStarted,
    /// A challenge is waiting for its callback. A tenant re-authorizing
    /// while holding credentials is also in this state.
    PendingApproval,
    /// Credentials are stored and no flow is in flight.
    Authorized { expires_at: DateTime<Utc> },
}

/// Query parameters the provider appends to the redirect target.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Drives the flow for every tenant.
///
/// Per-tenant calls are not serialized: two concurrent `start_flow` calls for
/// one tenant both succeed and the later challenge write wins.
#[derive(Clone)]
pub struct OAuthFlow {
    challenges: ChallengeStore,
    tokens: TokenStore,
    client: Arc<dyn OAuthClient>,
    scopes: String,
    redirect_uri: String,
}

impl OAuthFlow {
    pub fn new(
        challenges: ChallengeStore,
        tokens: TokenStore,
        client: Arc<dyn OAuthClient>,
        scopes: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            challenges,
            tokens,
            client,
            scopes: scopes.into(),
            redirect_uri: redirect_uri.into(),
        }
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Starts (or restarts) a flow and returns the authorize URL.
    ///
    /// Any unfinished challenge for the tenant is replaced.
    pub async fn start_flow(&self, tenant_id: &str) -> Result<String> {
        let pkce = Pkce::generate();
        self.challenges.save(tenant_id, &pkce.verifier).await?;

        info!(tenant_id = %tenant_id, "Authorization flow started");

        Ok(self
            .client
            .authorize_url(tenant_id, &self.scopes, &pkce.challenge, &self.redirect_uri))
    }

    /// Exchanges `code` for tokens and stores them.
    ///
    /// The pending challenge is deleted only once the tokens are persisted.
    /// If the exchange fails it stays in place, so the tenant can retry with a
    /// fresh code until it is swept.
    ///
    /// # Errors
    /// * `NotFound` - no pending challenge for `tenant_id`; nothing is written
    /// * `ExchangeFailure` - the provider rejected the code/verifier pair
    pub async fn complete_flow(&self, tenant_id: &str, code: &str) -> Result<TokenSet> {
        let code_verifier = self.challenges.retrieve(tenant_id).await?;

        let tokens = self
            .client
            .exchange_code(tenant_id, &code_verifier, code, &self.redirect_uri)
            .await
            .map_err(|e| {
                warn!(tenant_id = %tenant_id, error = %e, "Token exchange failed, keeping pending challenge");
                e
            })?;

        self.tokens.save(tenant_id, &tokens).await?;
        self.challenges.remove(tenant_id).await?;

        info!(tenant_id = %tenant_id, expires_at = %tokens.expires_at, "Tenant authorized");
        Ok(tokens)
    }

    /// Validates a raw callback and completes the matching flow.
    ///
    /// Returns the tenant id carried in `state`.
    ///
    /// # Errors
    /// `InvalidCallback` when the provider reported an error, `code` or
    /// `state` is missing, or `state` names no pending flow. Nothing is
    /// written in any of those cases.
    pub async fn handle_callback(&self, params: CallbackParams) -> Result<String> {
        if let Some(error) = params.error {
            let description = params
                .error_description
                .unwrap_or_else(|| "Unknown error".to_string());
            warn!(
                state = ?params.state,
                error = %error,
                description = %description,
                "Authorization denied or failed at provider"
            );
            return Err(OAuthError::InvalidCallback(format!(
                "authorization failed: {error} - {description}"
            )));
        }

        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| OAuthError::InvalidCallback("missing 'code' parameter".into()))?;
        let tenant_id = params
            .state
            .filter(|s| !s.is_empty())
            .ok_or_else(|| OAuthError::InvalidCallback("missing 'state' parameter".into()))?;

        debug!(tenant_id = %tenant_id, "Callback received");

        match self.complete_flow(&tenant_id, &code).await {
            Ok(_) => Ok(tenant_id),
            Err(OAuthError::NotFound { .. }) => {
                warn!(tenant_id = %tenant_id, "Callback state matches no pending flow");
                Err(OAuthError::InvalidCallback(format!(
                    "no pending authorization for state '{tenant_id}'"
                )))
            }
            Err(e) => Err(e),
        }
    }

    /// Builds a session bound to `tenant_id`.
    ///
    /// Succeeds for any tenant with stored credentials, even expired ones;
    /// refreshing is the session's job.
    pub async fn open_session(&self, tenant_id: &str) -> Result<Session> {
        if self.tokens.find(tenant_id).await?.is_none() {
            return Err(OAuthError::credential_not_found(tenant_id));
        }

        Ok(Session::new(
            tenant_id.to_string(),
            self.tokens.clone(),
            Arc::clone(&self.client),
        ))
    }

    /// Derives the tenant's current state from the stores.
    pub async fn flow_state(&self, tenant_id: &str) -> Result<FlowState> {
        if self.challenges.find(tenant_id).await?.is_some() {
            return Ok(FlowState::PendingApproval);
        }

        Ok(match self.tokens.find(tenant_id).await? {
            Some(credential) => FlowState::Authorized {
                expires_at: credential.expires_at,
            },
            None => FlowState::NotStarted,
        })
    }

    /// Administrative removal of a tenant's credential and any pending flow.
    ///
    /// Returns `true` if a credential existed.
    pub async fn revoke(&self, tenant_id: &str) -> Result<bool> {
        self.challenges.remove(tenant_id).await?;
        let removed = self.tokens.delete(tenant_id).await?;

        info!(tenant_id = %tenant_id, removed, "Tenant credentials revoked");
        Ok(removed)
    }
}
