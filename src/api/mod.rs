//! HTTP boundary for the tenant OAuth flow.
//!
//! - `GET /start/:tenant_id` → redirect to the provider's approval page
//! - `GET /authorize` → provider callback (`code`, `state`, or `error`)
//! - `GET /profiles/:tenant_id` → sample provider call through a session
//! - `DELETE /tenants/:tenant_id` → administrative credential removal

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Redirect, Response},
    routing::{delete, get},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::OAuthError;
use crate::oauth::{CallbackParams, OAuthFlow};


/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Maps core errors onto HTTP responses
pub struct AppError(OAuthError);

impl From<OAuthError> for AppError {
    fn from(e: OAuthError) -> Self {
        AppError(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OAuthError::NotFound { .. } => StatusCode::NOT_FOUND,
            OAuthError::InvalidCallback(_) => StatusCode::BAD_REQUEST,
            OAuthError::ExchangeFailure(_)
            | OAuthError::Refresh(_)
            | OAuthError::Provider(_) => StatusCode::BAD_GATEWAY,
            OAuthError::InvalidKey(_)
            | OAuthError::Encryption(_)
            | OAuthError::Decryption(_)
            | OAuthError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }

        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });

        (status, body).into_response()
    }
}

/// Response for DELETE /tenants/:tenant_id
#[derive(Serialize)]
pub struct RevokeResponse {
    pub removed: bool,
}

/// Create the tenant OAuth router
pub fn create_router(flow: OAuthFlow) -> Router {
    Router::new()
        .route("/start/:tenant_id", get(start))
        .route("/authorize", get(authorize_callback))
        .route("/profiles/:tenant_id", get(profiles))
        .route("/tenants/:tenant_id", delete(revoke))
        .with_state(Arc::new(flow))
}

/// GET /start/:tenant_id
async fn start(
    State(flow): State<Arc<OAuthFlow>>,
    Path(tenant_id): Path<String>,
) -> Result<Redirect, AppError> {
    let authorize_url = flow.start_flow(&tenant_id).await?;
    Ok(Redirect::temporary(&authorize_url))
}

/// GET /authorize
///
/// The provider redirects here after the tenant approves or denies.
async fn authorize_callback(
    State(flow): State<Arc<OAuthFlow>>,
    Query(params): Query<CallbackParams>,
) -> Result<String, AppError> {
    debug!(state = ?params.state, "OAuth callback received");
    let tenant_id = flow.handle_callback(params).await?;
    Ok(format!("Customer {tenant_id} is registered"))
}

/// GET /profiles/:tenant_id
async fn profiles(
    State(flow): State<Arc<OAuthFlow>>,
    Path(tenant_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = flow.open_session(&tenant_id).await?;
    let profiles = session.get_json("/api/profiles/").await?;
    Ok(Json(profiles))
}

/// DELETE /tenants/:tenant_id
async fn revoke(
    State(flow): State<Arc<OAuthFlow>>,
    Path(tenant_id): Path<String>,
) -> Result<Json<RevokeResponse>, AppError> {
    let removed = flow.revoke(&tenant_id).await?;
    Ok(Json(RevokeResponse { removed }))
}
