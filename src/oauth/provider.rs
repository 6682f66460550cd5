//! OAuth provider endpoints.
//!
//! Defaults point at DigitalOcean; every URL can be overridden from the
//! settings file (tests point them at a mock server).

use serde::{Deserialize, Serialize};

/// OAuth provider configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// OAuth authorization endpoint URL
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// OAuth token exchange endpoint URL
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Cheap authenticated GET used to test whether an access token is live
    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    /// Requested OAuth scope
    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_auth_url() -> String {
    "https://cloud.digitalocean.com/v1/oauth/authorize".to_string()
}

fn default_token_url() -> String {
    "https://cloud.digitalocean.com/v1/oauth/token".to_string()
}

fn default_probe_url() -> String {
    "https://api.digitalocean.com/v2/account".to_string()
}

fn default_scope() -> String {
    "read".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            probe_url: default_probe_url(),
            scope: default_scope(),
        }
    }
}

impl ProviderConfig {
    /// Build authorization URL for the browser redirect
    pub fn build_auth_url(&self, client_id: &str, redirect_uri: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}",
            self.auth_url,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&self.scope)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::default();
        assert!(config.auth_url.ends_with("/v1/oauth/authorize"));
        assert!(config.token_url.ends_with("/v1/oauth/token"));
        assert!(config.probe_url.ends_with("/v2/account"));
        assert_eq!(config.scope, "read");
    }

    #[test]
    fn test_build_auth_url() {
        let config = ProviderConfig {
            auth_url: "https://example.com/oauth/authorize".to_string(),
            scope: "read write".to_string(),
            ..ProviderConfig::default()
        };

        let url = config.build_auth_url("test_client_id", "http://localhost:5000/api/auth/callback");

        assert!(url.starts_with("https://example.com/oauth/authorize?"));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A5000%2Fapi%2Fauth%2Fcallback"));
        // URL encoding converts spaces to %20
        assert!(url.contains("scope=read%20write"));
        assert!(url.contains("response_type=code"));
    }
}
