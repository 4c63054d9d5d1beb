//! reqwest-backed client for the provider's OAuth and REST endpoints.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::client::OAuthClient;
use crate::config::ProviderSettings;
use crate::credentials::TokenSet;
use crate::error::{OAuthError, Result};
use crate::pkce::CHALLENGE_METHOD;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECONDS: i64 = 3600;

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    /// Absolute expiry of the access token.
    ///
    /// Fails when `expires_in` does not fit a timestamp.
    fn expires_at(&self) -> std::result::Result<DateTime<Utc>, String> {
        let expires_in = self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECONDS);
        Duration::try_seconds(expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| format!("token response has out-of-range expires_in: {expires_in}"))
    }
}

/// Talks to the provider over HTTPS using confidential-client credentials.
pub struct HttpOAuthClient {
    http: reqwest::Client,
    settings: ProviderSettings,
    client_id: String,
    client_secret: String,
}

impl HttpOAuthClient {
    pub fn new(
        settings: ProviderSettings,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// POSTs a form to the token endpoint with HTTP Basic client auth.
    ///
    /// Returns the provider's complaint as a string on any failure so callers
    /// can wrap it in the error kind that fits their grant.
    async fn token_request(&self, form: &[(&str, &str)]) -> std::result::Result<TokenResponse, String> {
        let response = self
            .http
            .post(&self.settings.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| format!("failed to reach token endpoint: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(format!("token endpoint returned {status}: {body}"));
        }

        response
            .json()
            .await
            .map_err(|e| format!("failed to parse token response: {e}"))
    }
}

#[async_trait]
impl OAuthClient for HttpOAuthClient {
    fn authorize_url(
        &self,
        state: &str,
        scopes: &str,
        code_challenge: &str,
        redirect_uri: &str,
    ) -> String {
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&code_challenge_method={}&code_challenge={}",
            self.settings.authorize_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(scopes),
            urlencoding::encode(state),
            CHALLENGE_METHOD,
            urlencoding::encode(code_challenge),
        )
    }

    async fn exchange_code(
        &self,
        tenant_id: &str,
        code_verifier: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet> {
        tracing::debug!(tenant_id = %tenant_id, "Exchanging authorization code for tokens");

        let response = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("code_verifier", code_verifier),
                ("redirect_uri", redirect_uri),
            ])
            .await
            .map_err(OAuthError::ExchangeFailure)?;

        let expires_at = response.expires_at().map_err(OAuthError::ExchangeFailure)?;
        let refresh_token = response.refresh_token.ok_or_else(|| {
            OAuthError::ExchangeFailure("token response did not include a refresh token".into())
        })?;

        Ok(TokenSet {
            access_token: response.access_token,
            refresh_token,
            expires_at,
        })
    }

    async fn refresh_tokens(&self, tenant_id: &str, refresh_token: &str) -> Result<TokenSet> {
        tracing::debug!(tenant_id = %tenant_id, "Refreshing access token");

        let response = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await
            .map_err(OAuthError::Refresh)?;

        let expires_at = response.expires_at().map_err(OAuthError::Refresh)?;

        // Providers that don't rotate refresh tokens omit it from the response
        Ok(TokenSet {
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .unwrap_or_else(|| refresh_token.to_string()),
            expires_at,
        })
    }

    async fn get_json(&self, access_token: &str, path: &str) -> Result<serde_json::Value> {
        let url = format!(
            "{}/{}",
            self.settings.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .header("revision", &self.settings.api_revision)
            .header("Accept", "application/vnd.api+json")
            .send()
            .await
            .map_err(|e| OAuthError::Provider(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::Provider(format!("{url} returned {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| OAuthError::Provider(format!("invalid JSON from {url}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use mockito::{Matcher, Server};

    fn settings_for(server_url: &str) -> ProviderSettings {
        ProviderSettings {
            authorize_url: "https://provider.example/oauth/authorize".to_string(),
            token_url: format!("{server_url}/oauth/token"),
            api_base_url: server_url.to_string(),
            ..ProviderSettings::default()
        }
    }

    fn basic_auth_header() -> String {
        format!("Basic {}", BASE64.encode("client-id:client-secret"))
    }

    #[test]
    fn test_authorize_url() {
        let client = HttpOAuthClient::new(settings_for("http://unused"), "client-id", "client-secret");

        let url = client.authorize_url(
            "cust-1",
            "profiles:read lists:read",
            "challenge-abc",
            "http://localhost:3000/authorize",
        );

        assert!(url.starts_with("https://provider.example/oauth/authorize?"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fauthorize"));
        assert!(url.contains("scope=profiles%3Aread%20lists%3Aread"));
        assert!(url.contains("state=cust-1"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("code_challenge=challenge-abc"));
    }

    #[tokio::test]
    async fn test_exchange_code() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/token")
            .match_header("authorization", basic_auth_header().as_str())
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "authcode123".into()),
                Matcher::UrlEncoded("code_verifier".into(), "verifier-xyz".into()),
                Matcher::UrlEncoded("redirect_uri".into(), "http://localhost/authorize".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"AT","refresh_token":"RT","expires_in":3600,"token_type":"Bearer"}"#)
            .create_async()
            .await;

        let client = HttpOAuthClient::new(settings_for(&server.url()), "client-id", "client-secret");
        let before = Utc::now();
        let tokens = client
            .exchange_code("cust-1", "verifier-xyz", "authcode123", "http://localhost/authorize")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(tokens.access_token, "AT");
        assert_eq!(tokens.refresh_token, "RT");
        assert!(tokens.expires_at >= before + Duration::seconds(3600));
    }

    #[tokio::test]
    async fn test_exchange_rejected() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let client = HttpOAuthClient::new(settings_for(&server.url()), "client-id", "client-secret");
        let err = client
            .exchange_code("cust-1", "verifier", "reused-code", "http://localhost/authorize")
            .await
            .unwrap_err();

        match err {
            OAuthError::ExchangeFailure(msg) => assert!(msg.contains("invalid_grant")),
            other => panic!("expected ExchangeFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exchange_without_refresh_token_fails() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"AT"}"#)
            .create_async()
            .await;

        let client = HttpOAuthClient::new(settings_for(&server.url()), "client-id", "client-secret");
        let result = client
            .exchange_code("cust-1", "verifier", "code", "http://localhost/authorize")
            .await;

        assert!(matches!(result, Err(OAuthError::ExchangeFailure(_))));
    }

    #[tokio::test]
    async fn test_out_of_range_expires_in_is_rejected() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"AT","refresh_token":"RT","expires_in":9223372036854775807}"#)
            .expect(2)
            .create_async()
            .await;

        let client = HttpOAuthClient::new(settings_for(&server.url()), "client-id", "client-secret");

        let result = client
            .exchange_code("cust-1", "verifier", "code", "http://localhost/authorize")
            .await;
        match result {
            Err(OAuthError::ExchangeFailure(msg)) => assert!(msg.contains("expires_in")),
            other => panic!("expected ExchangeFailure, got {other:?}"),
        }

        let result = client.refresh_tokens("cust-1", "RT").await;
        assert!(matches!(result, Err(OAuthError::Refresh(_))));
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token_when_not_rotated() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "RT-old".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"AT-new","expires_in":60}"#)
            .create_async()
            .await;

        let client = HttpOAuthClient::new(settings_for(&server.url()), "client-id", "client-secret");
        let tokens = client.refresh_tokens("cust-1", "RT-old").await.unwrap();

        assert_eq!(tokens.access_token, "AT-new");
        assert_eq!(tokens.refresh_token, "RT-old");
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth/token")
            .with_status(401)
            .create_async()
            .await;

        let client = HttpOAuthClient::new(settings_for(&server.url()), "client-id", "client-secret");
        let result = client.refresh_tokens("cust-1", "revoked").await;

        assert!(matches!(result, Err(OAuthError::Refresh(_))));
    }

    #[tokio::test]
    async fn test_get_json_sends_bearer_and_revision() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/profiles/")
            .match_header("authorization", "Bearer AT")
            .match_header("revision", Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":[{"id":"01H"}]}"#)
            .create_async()
            .await;

        let client = HttpOAuthClient::new(settings_for(&server.url()), "client-id", "client-secret");
        let body = client.get_json("AT", "/api/profiles/").await.unwrap();

        mock.assert_async().await;
        assert_eq!(body["data"][0]["id"], "01H");
    }

    #[tokio::test]
    async fn test_get_json_error_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/profiles/")
            .with_status(403)
            .create_async()
            .await;

        let client = HttpOAuthClient::new(settings_for(&server.url()), "client-id", "client-secret");
        let result = client.get_json("AT", "api/profiles/").await;

        assert!(matches!(result, Err(OAuthError::Provider(_))));
    }
}
