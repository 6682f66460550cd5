//! OAuth token endpoint calls.
//!
//! Handles exchanging authorization codes and refresh tokens for access tokens.

use crate::config::ClientCredentials;
use crate::credentials::OAuthTokenSet;
use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use serde::Deserialize;

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_token_set(self) -> Result<OAuthTokenSet> {
        let access_token = self
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow!("Token response did not include an access_token"))?;

        Ok(OAuthTokenSet {
            access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
        })
    }
}

/// Exchange authorization code for access token
pub async fn exchange_code_for_token(
    http: &Client,
    token_url: &str,
    code: &str,
    credentials: &ClientCredentials,
) -> Result<OAuthTokenSet> {
    let form = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", credentials.redirect_uri.as_str()),
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
    ];

    tracing::debug!("Exchanging authorization code for token at {}", token_url);
    post_token_request(http, token_url, &form, "Token exchange").await
}

/// Exchange refresh token for a fresh access token
///
/// The provider may rotate the refresh token; `refresh_token` in the result is
/// `None` when it did not.
pub async fn refresh_access_token(
    http: &Client,
    token_url: &str,
    refresh_token: &str,
    credentials: &ClientCredentials,
) -> Result<OAuthTokenSet> {
    let form = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
    ];

    tracing::debug!("Refreshing access token at {}", token_url);
    post_token_request(http, token_url, &form, "Token refresh").await
}

async fn post_token_request(
    http: &Client,
    token_url: &str,
    form: &[(&str, &str)],
    operation: &str,
) -> Result<OAuthTokenSet> {
    let response = http
        .post(token_url)
        .header("Accept", "application/json")
        .form(form)
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", operation.to_lowercase()))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        bail!("{} failed with status {}: {}", operation, status, body);
    }

    let token_response: TokenResponse = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", operation.to_lowercase()))?;

    tracing::debug!(
        has_refresh_token = token_response.refresh_token.is_some(),
        expires_in = ?token_response.expires_in,
        "{} successful",
        operation
    );

    token_response.into_token_set()
}
