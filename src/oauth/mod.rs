//! OAuth 2.0 authorization code flow with PKCE, per tenant.
//!
//! 1. `GET /start/:tenant_id` → challenge saved, redirect to provider
//! 2. Tenant approves on the provider's site
//! 3. Provider redirects to `/authorize?code=..&state=<tenant_id>`
//! 4. Verifier looked up, code exchanged, tokens stored encrypted
//! 5. Pending challenge deleted; sessions can now be opened for the tenant

mod client;
mod flow;
mod provider;
mod session;

pub use client::OAuthClient;
pub use flow::{CallbackParams, FlowState, OAuthFlow};
pub use provider::HttpOAuthClient;
pub use session::Session;
