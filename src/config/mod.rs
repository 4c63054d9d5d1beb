//! Service configuration.
//!
//! Non-secret settings come from an optional TOML file; every section falls
//! back to defaults. Secrets (client credentials and the encryption key) only
//! ever come from the environment.

use anyhow::{bail, Context, Result};
use chrono::Duration;
use serde::Deserialize;
use std::fmt;

use crate::credentials::CipherKey;

pub const ENV_CONFIG_PATH: &str = "TENANT_OAUTH_CONFIG";
pub const ENV_CLIENT_ID: &str = "TENANT_OAUTH_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "TENANT_OAUTH_CLIENT_SECRET";
pub const ENV_KEY: &str = "TENANT_OAUTH_KEY";
pub const ENV_BASE_URL: &str = "TENANT_OAUTH_BASE_URL";
pub const ENV_PORT: &str = "TENANT_OAUTH_PORT";

/// Longest a pending challenge may live before the sweep reclaims it (30 days).
pub const MAX_CHALLENGE_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;

/// Scopes requested for every tenant.
const DEFAULT_SCOPES: &[&str] = &[
    "accounts:read",
    "campaigns:read",
    "campaigns:write",
    "catalogs:read",
    "catalogs:write",
    "coupon-codes:read",
    "coupon-codes:write",
    "coupons:read",
    "coupons:write",
    "data-privacy:write",
    "events:read",
    "events:write",
    "flows:read",
    "flows:write",
    "images:read",
    "images:write",
    "list:read",
    "list:write",
    "metrics:read",
    "profiles:read",
    "profiles:write",
    "push-tokens:write",
    "segments:read",
    "segments:write",
    "subscriptions:write",
    "tags:read",
    "tags:write",
    "template:write",
    "templates:read",
];

/// File-backed settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub challenges: ChallengeSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Externally reachable URL of this service; the OAuth redirect target
    /// is derived from it.
    pub base_url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "tenant_oauth.db".to_string(),
        }
    }
}

/// Provider endpoints and requested scopes
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub authorize_url: String,
    pub token_url: String,
    pub api_base_url: String,
    /// Sent as the `revision` header on API calls
    pub api_revision: String,
    pub scopes: Vec<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            authorize_url: "https://www.klaviyo.com/oauth/authorize".to_string(),
            token_url: "https://a.klaviyo.com/oauth/token".to_string(),
            api_base_url: "https://a.klaviyo.com".to_string(),
            api_revision: "2024-10-15".to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ProviderSettings {
    /// Scopes as the space-separated string OAuth expects.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Abandoned-flow reclamation
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChallengeSettings {
    /// Age after which a pending challenge is considered abandoned
    pub ttl_seconds: i64,
    /// How often the sweep runs
    pub sweep_interval_seconds: u64,
}

impl Default for ChallengeSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: 3600,
            sweep_interval_seconds: 300,
        }
    }
}

impl ChallengeSettings {
    /// Rejects values the sweep cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_seconds == 0 {
            bail!("challenges.sweep_interval_seconds must be greater than 0");
        }
        if self.ttl_seconds <= 0 || self.ttl_seconds > MAX_CHALLENGE_TTL_SECONDS {
            bail!(
                "challenges.ttl_seconds must be between 1 and {MAX_CHALLENGE_TTL_SECONDS}, got {}",
                self.ttl_seconds
            );
        }
        Ok(())
    }

    /// Challenge lifetime. Only meaningful on validated settings.
    pub fn ttl(&self) -> Duration {
        Duration::seconds(self.ttl_seconds.clamp(1, MAX_CHALLENGE_TTL_SECONDS))
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.challenges
            .validate()
            .context("Invalid [challenges] settings")
    }
}

/// Load settings from a TOML file
pub fn load_settings(path: &str) -> Result<Settings> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {path}"))?;
    let settings: Settings =
        toml::from_str(&contents).with_context(|| format!("Invalid config file {path}"))?;
    settings
        .validate()
        .with_context(|| format!("Invalid config file {path}"))?;
    Ok(settings)
}

/// Everything the service needs at startup.
#[derive(Clone)]
pub struct Config {
    pub settings: Settings,
    pub client_id: String,
    pub client_secret: String,
    pub key: CipherKey,
}

impl Config {
    /// Reads the optional settings file named by `TENANT_OAUTH_CONFIG`, then
    /// the required secrets from the environment.
    pub fn from_env() -> Result<Self> {
        let mut settings = match std::env::var(ENV_CONFIG_PATH) {
            Ok(path) => load_settings(&path)?,
            Err(_) => Settings::default(),
        };

        if let Ok(base_url) = std::env::var(ENV_BASE_URL) {
            settings.server.base_url = base_url;
        }
        if let Ok(port) = std::env::var(ENV_PORT) {
            settings.server.port = port
                .parse()
                .with_context(|| format!("Invalid {ENV_PORT}: {port}"))?;
        }

        settings.validate()?;

        let client_id = std::env::var(ENV_CLIENT_ID)
            .with_context(|| format!("{ENV_CLIENT_ID} is required"))?;
        let client_secret = std::env::var(ENV_CLIENT_SECRET)
            .with_context(|| format!("{ENV_CLIENT_SECRET} is required"))?;
        let key_hex = std::env::var(ENV_KEY)
            .with_context(|| format!("{ENV_KEY} is required (32 bytes, hex)"))?;
        let key = CipherKey::from_hex(&key_hex).with_context(|| format!("Invalid {ENV_KEY}"))?;

        Ok(Self {
            settings,
            client_id,
            client_secret,
            key,
        })
    }

    /// Fixed callback target registered with the provider.
    pub fn redirect_uri(&self) -> String {
        redirect_uri_for(&self.settings.server.base_url)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("settings", &self.settings)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("key", &self.key)
            .finish()
    }
}

pub fn redirect_uri_for(base_url: &str) -> String {
    format!("{}/authorize", base_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.database.path, "tenant_oauth.db");
        assert_eq!(settings.challenges.ttl_seconds, 3600);
        assert_eq!(settings.challenges.sweep_interval_seconds, 300);
        assert!(settings.provider.scopes.contains(&"profiles:read".to_string()));
        assert!(settings.provider.scope_string().starts_with("accounts:read campaigns:read"));
    }

    #[test]
    fn test_settings_deserialization() {
        let toml = r#"
            [server]
            port = 8080
            base_url = "https://oauth.example.com/"

            [provider]
            scopes = ["profiles:read", "lists:read"]

            [challenges]
            ttl_seconds = 600
        "#;

        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.host, "0.0.0.0"); // Default
        assert_eq!(settings.provider.scope_string(), "profiles:read lists:read");
        assert_eq!(settings.provider.token_url, "https://a.klaviyo.com/oauth/token"); // Default
        assert_eq!(settings.challenges.ttl_seconds, 600);
        assert_eq!(settings.challenges.sweep_interval_seconds, 300); // Default
        assert_eq!(
            redirect_uri_for(&settings.server.base_url),
            "https://oauth.example.com/authorize"
        );
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.database.path, "tenant_oauth.db");
    }

    #[test]
    fn test_load_settings_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tenant-oauth.toml");
        std::fs::write(&path, "[database]\npath = \"/tmp/tenants.db\"\n").unwrap();

        let settings = load_settings(path.to_str().unwrap()).unwrap();
        assert_eq!(settings.database.path, "/tmp/tenants.db");

        assert!(load_settings("/nonexistent/tenant-oauth.toml").is_err());
    }

    #[test]
    fn test_challenge_settings_validation() {
        assert!(ChallengeSettings::default().validate().is_ok());

        let rejected = [
            ChallengeSettings { sweep_interval_seconds: 0, ..Default::default() },
            ChallengeSettings { ttl_seconds: 0, ..Default::default() },
            ChallengeSettings { ttl_seconds: -60, ..Default::default() },
            ChallengeSettings { ttl_seconds: i64::MAX, ..Default::default() },
            ChallengeSettings { ttl_seconds: MAX_CHALLENGE_TTL_SECONDS + 1, ..Default::default() },
        ];
        for settings in rejected {
            assert!(settings.validate().is_err(), "{settings:?} should be rejected");
        }

        let longest = ChallengeSettings {
            ttl_seconds: MAX_CHALLENGE_TTL_SECONDS,
            ..Default::default()
        };
        assert!(longest.validate().is_ok());
        assert_eq!(longest.ttl(), Duration::days(30));
    }

    #[test]
    fn test_load_settings_rejects_bad_challenge_values() {
        let dir = tempfile::tempdir().unwrap();

        for body in [
            "[challenges]\nsweep_interval_seconds = 0\n",
            "[challenges]\nttl_seconds = -1\n",
            "[challenges]\nttl_seconds = 9223372036854775807\n",
        ] {
            let path = dir.path().join("tenant-oauth.toml");
            std::fs::write(&path, body).unwrap();

            let err = load_settings(path.to_str().unwrap()).unwrap_err();
            assert!(format!("{err:#}").contains("challenges"), "{err:#}");
        }
    }

    #[test]
    fn test_config_debug_redacts_secrets() {
        let config = Config {
            settings: Settings::default(),
            client_id: "client-id".to_string(),
            client_secret: "super-secret".to_string(),
            key: CipherKey::from_bytes([1u8; 32]),
        };

        let printed = format!("{config:?}");
        assert!(printed.contains("client-id"));
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("<redacted>"));
        assert_eq!(config.redirect_uri(), "http://localhost:3000/authorize");
    }
}
