// Configuration (TOML settings + environment secrets)
pub mod config;

// Error taxonomy
pub mod error;

// SQLite persistence
pub mod db;

// Cipher codec and encrypted token store
pub mod credentials;

// PKCE generation and pending challenge store
pub mod pkce;

// Flow orchestration, provider client and sessions
pub mod oauth;

// HTTP routes
pub mod api;

pub use config::Config;
pub use error::{OAuthError, Result};
