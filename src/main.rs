use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use tenant_oauth::api::create_router;
use tenant_oauth::credentials::TokenStore;
use tenant_oauth::db::Database;
use tenant_oauth::oauth::{HttpOAuthClient, OAuthFlow};
use tenant_oauth::pkce::{run_challenge_sweep, ChallengeStore};
use tenant_oauth::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tenant_oauth=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!("tenant-oauth v{}", env!("CARGO_PKG_VERSION"));

    let settings = &config.settings;
    let db = Database::open(&settings.database.path)?;
    info!(path = %settings.database.path, "Database opened");

    let challenges = ChallengeStore::new(db.clone());
    let tokens = TokenStore::new(db, config.key.clone());
    let client = HttpOAuthClient::new(
        settings.provider.clone(),
        config.client_id.clone(),
        config.client_secret.clone(),
    );

    let flow = OAuthFlow::new(
        challenges.clone(),
        tokens,
        Arc::new(client),
        settings.provider.scope_string(),
        config.redirect_uri(),
    );
    info!(redirect_uri = %flow.redirect_uri(), "OAuth flow configured");

    // Reclaim challenges whose callback never arrived
    tokio::spawn(run_challenge_sweep(
        challenges,
        settings.challenges.ttl(),
        settings.challenges.sweep_interval_seconds,
    ));

    let app = create_router(flow);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
