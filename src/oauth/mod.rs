//! Client for the OAuth provider.
//!
//! Covers the four outbound calls the service makes:
//! 1. Authorization URL for the browser redirect (no request)
//! 2. Authorization code exchange at the token endpoint
//! 3. Refresh token exchange at the token endpoint
//! 4. Probe / account fetch against the resource API with a bearer token

mod exchange;
mod provider;

pub use provider::ProviderConfig;

use crate::config::ClientCredentials;
use crate::credentials::OAuthTokenSet;
use anyhow::{bail, Context, Result};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;

/// Result of testing an access token against the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Provider accepted the token (2xx)
    Valid,
    /// Provider rejected the token (401): expired or revoked
    Unauthorized,
    /// Anything else: network error, timeout, rate limit, outage
    Transient(String),
}

/// Shared OAuth provider client
#[derive(Clone)]
pub struct OAuthClient {
    http: Client,
    provider: Arc<ProviderConfig>,
    credentials: Arc<ClientCredentials>,
}

impl OAuthClient {
    /// Create a client whose every request is bounded by `timeout`
    pub fn new(provider: ProviderConfig, credentials: ClientCredentials, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            provider: Arc::new(provider),
            credentials: Arc::new(credentials),
        })
    }

    /// Provider authorization URL carrying client id, redirect URI and scope
    pub fn authorize_url(&self) -> String {
        self.provider
            .build_auth_url(&self.credentials.client_id, &self.credentials.redirect_uri)
    }

    /// Exchange an authorization code for tokens
    pub async fn exchange_code(&self, code: &str) -> Result<OAuthTokenSet> {
        exchange::exchange_code_for_token(&self.http, &self.provider.token_url, code, &self.credentials).await
    }

    /// Exchange a refresh token for a new access token
    pub async fn refresh(&self, refresh_token: &str) -> Result<OAuthTokenSet> {
        exchange::refresh_access_token(
            &self.http,
            &self.provider.token_url,
            refresh_token,
            &self.credentials,
        )
        .await
    }

    /// Test whether the provider still accepts `access_token`
    pub async fn probe(&self, access_token: &str) -> ProbeOutcome {
        let response = self
            .http
            .get(&self.provider.probe_url)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => ProbeOutcome::Valid,
            Ok(resp) if resp.status() == StatusCode::UNAUTHORIZED => ProbeOutcome::Unauthorized,
            Ok(resp) => ProbeOutcome::Transient(format!("probe returned status {}", resp.status())),
            Err(e) if e.is_timeout() => ProbeOutcome::Transient("probe timed out".to_string()),
            Err(e) => ProbeOutcome::Transient(format!("probe request failed: {}", e)),
        }
    }

    /// Fetch the provider account document for `access_token`
    pub async fn fetch_account(&self, access_token: &str) -> Result<serde_json::Value> {
        let response = self
            .http
            .get(&self.provider.probe_url)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to send account request")?;

        if !response.status().is_success() {
            bail!("Account request failed with status {}", response.status());
        }

        response.json().await.context("Failed to parse account response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn client_for(probe_url: String) -> OAuthClient {
        let provider = ProviderConfig {
            probe_url,
            ..ProviderConfig::default()
        };
        let credentials = ClientCredentials {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "https://api.example.com/api/auth/callback".to_string(),
        };
        OAuthClient::new(provider, credentials, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_authorize_url_uses_client_registration() {
        let url = client_for("http://unused".to_string()).authorize_url();

        assert!(url.starts_with("https://cloud.digitalocean.com/v1/oauth/authorize?"));
        assert!(url.contains("client_id=cid"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapi.example.com%2Fapi%2Fauth%2Fcallback"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=read"));
        assert!(!url.contains("secret"));
    }

    #[tokio::test]
    async fn test_probe_outcomes_by_status() {
        for (status, expected_valid, expected_unauthorized) in
            [(200, true, false), (204, true, false), (401, false, true), (403, false, false), (429, false, false), (503, false, false)]
        {
            let mut server = Server::new_async().await;
            let mock = server
                .mock("GET", "/v2/account")
                .match_header("authorization", "Bearer live-token")
                .with_status(status)
                .create_async()
                .await;

            let outcome = client_for(format!("{}/v2/account", server.url()))
                .probe("live-token")
                .await;

            mock.assert_async().await;
            assert_eq!(outcome == ProbeOutcome::Valid, expected_valid, "status {}", status);
            assert_eq!(outcome == ProbeOutcome::Unauthorized, expected_unauthorized, "status {}", status);
        }
    }

    #[tokio::test]
    async fn test_probe_network_failure_is_transient() {
        // Nothing listens on port 1
        let outcome = client_for("http://127.0.0.1:1/v2/account".to_string())
            .probe("token")
            .await;

        assert!(matches!(outcome, ProbeOutcome::Transient(_)));
    }

    #[tokio::test]
    async fn test_fetch_account() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/account")
            .match_header("authorization", "Bearer live-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"account": {"email": "dev@example.com", "status": "active"}}"#)
            .create_async()
            .await;

        let account = client_for(format!("{}/v2/account", server.url()))
            .fetch_account("live-token")
            .await
            .unwrap();

        assert_eq!(account["account"]["status"], "active");
    }
}
