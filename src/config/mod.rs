//! Process configuration.
//!
//! Two layers, both fixed for the life of the process:
//! - mandatory values from the environment ([`AppConfig`]), fatal if missing
//! - optional tuning from a TOML file ([`Settings`]), every section defaulted

use crate::credentials::{validate_key, TokenKey};
use crate::oauth::ProviderConfig;
use anyhow::{anyhow, bail, Context, Result};
use reqwest::Url;
use serde::Deserialize;
use std::fmt;

/// Environment variable names
pub const ENV_CLIENT_ID: &str = "DO_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "DO_CLIENT_SECRET";
pub const ENV_REDIRECT_URI: &str = "REDIRECT_URI";
pub const ENV_FRONTEND_URL: &str = "FRONTEND_URL";
pub const ENV_SESSION_STORE_URL: &str = "SESSION_STORE_URL";
pub const ENV_TOKEN_KEY: &str = "TOKEN_ENCRYPTION_KEY";
pub const ENV_PORT: &str = "PORT";
pub const ENV_SETTINGS_PATH: &str = "COST_EXPLORER_CONFIG";

/// Upper bound on session lifetime; keeps expiry arithmetic in range
const MAX_SESSION_AGE_DAYS: i64 = 3650;

/// Optional tuning loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub session: SessionSettings,
}

impl Settings {
    fn validate(&self) -> Result<()> {
        if self.http.timeout_seconds == 0 || self.http.timeout_seconds > 60 {
            bail!(
                "http.timeout_seconds must be between 1 and 60, got {}",
                self.http.timeout_seconds
            );
        }
        if !(1..=MAX_SESSION_AGE_DAYS).contains(&self.session.max_age_days) {
            bail!(
                "session.max_age_days must be between 1 and {}, got {}",
                MAX_SESSION_AGE_DAYS,
                self.session.max_age_days
            );
        }
        if self.session.cookie_name.is_empty() {
            bail!("session.cookie_name cannot be empty");
        }
        Ok(())
    }
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    /// Timeout for every call to the OAuth provider (seconds)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// How often expired sessions are purged from the store (seconds)
    #[serde(default = "default_cleanup_interval")]
    pub session_cleanup_interval_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_cleanup_interval() -> u64 {
    3600
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            session_cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

/// Session cookie configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_cookie_path")]
    pub cookie_path: String,
    /// Derived from the frontend URL host when absent
    #[serde(default)]
    pub cookie_domain: Option<String>,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
}

fn default_cookie_name() -> String {
    "do_cost_explorer_session".to_string()
}

fn default_cookie_path() -> String {
    "/api".to_string()
}

fn default_max_age_days() -> i64 {
    45
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            cookie_path: default_cookie_path(),
            cookie_domain: None,
            max_age_days: default_max_age_days(),
        }
    }
}

impl SessionSettings {
    pub fn max_age_seconds(&self) -> i64 {
        self.max_age_days * 24 * 60 * 60
    }

    /// Session lifetime in the store, matching the cookie max-age
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.max_age_days)
    }
}

/// Load settings from a TOML file
pub fn load_settings(path: &str) -> Result<Settings> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read settings file {}", path))?;
    let settings: Settings = toml::from_str(&contents).context("Failed to parse settings file")?;
    Ok(settings)
}

/// OAuth client registration
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Complete process configuration. Built once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credentials: ClientCredentials,
    /// Frontend origin, without trailing slash
    pub frontend_url: String,
    pub session_store_url: String,
    pub token_key: TokenKey,
    pub port: u16,
    pub settings: Settings,
}

impl AppConfig {
    /// Build from process environment. Any error here is fatal.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| -> Result<String> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow!("Missing required environment variable {}", name))
        };

        let client_id = required(ENV_CLIENT_ID)?;
        let client_secret = required(ENV_CLIENT_SECRET)?;
        let redirect_uri = required(ENV_REDIRECT_URI)?;
        let frontend_url = required(ENV_FRONTEND_URL)?;
        let session_store_url = required(ENV_SESSION_STORE_URL)?;

        // Error text must not echo the key
        let token_key = validate_key(&required(ENV_TOKEN_KEY)?)
            .map_err(|e| anyhow!("Invalid {}: {}", ENV_TOKEN_KEY, e))?;

        Url::parse(&redirect_uri).with_context(|| format!("Invalid {}", ENV_REDIRECT_URI))?;
        let frontend = Url::parse(&frontend_url).with_context(|| format!("Invalid {}", ENV_FRONTEND_URL))?;

        let port = match lookup(ENV_PORT) {
            Some(v) => v
                .trim()
                .parse::<u16>()
                .with_context(|| format!("Invalid {}", ENV_PORT))?,
            None => 5000,
        };

        let mut settings = match lookup(ENV_SETTINGS_PATH) {
            Some(path) => load_settings(&path)?,
            None => Settings::default(),
        };
        settings.validate()?;

        if settings.session.cookie_domain.is_none() {
            settings.session.cookie_domain = frontend.host_str().map(|h| h.to_string());
        }

        Ok(Self {
            credentials: ClientCredentials {
                client_id,
                client_secret,
                redirect_uri,
            },
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            session_store_url,
            token_key,
            port,
            settings,
        })
    }

    /// Log the configuration without secrets.
    pub fn log_summary(&self) {
        tracing::info!(
            port = self.port,
            redirect_uri = %self.credentials.redirect_uri,
            frontend_url = %self.frontend_url,
            client_id_configured = !self.credentials.client_id.is_empty(),
            client_secret_configured = !self.credentials.client_secret.is_empty(),
            session_store = %store_scheme(&self.session_store_url),
            provider_timeout_seconds = self.settings.http.timeout_seconds,
            "Configuration loaded"
        );
    }
}

fn store_scheme(url: &str) -> &str {
    url.split_once("://").map(|(scheme, _)| scheme).unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, String> {
        HashMap::from([
            (ENV_CLIENT_ID, "client-id".to_string()),
            (ENV_CLIENT_SECRET, "client-secret".to_string()),
            (ENV_REDIRECT_URI, "https://api.example.com/api/auth/callback".to_string()),
            (ENV_FRONTEND_URL, "https://costs.example.com/".to_string()),
            (ENV_SESSION_STORE_URL, "memory://".to_string()),
            (ENV_TOKEN_KEY, "ab".repeat(32)),
        ])
    }

    fn from_map(env: &HashMap<&'static str, String>) -> Result<AppConfig> {
        AppConfig::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.http.timeout_seconds, 10);
        assert_eq!(settings.session.cookie_name, "do_cost_explorer_session");
        assert_eq!(settings.session.cookie_path, "/api");
        assert_eq!(settings.session.max_age_days, 45);
        assert_eq!(settings.provider.scope, "read");
    }

    #[test]
    fn test_settings_deserialization() {
        let toml = r#"
            [provider]
            token_url = "http://localhost:9999/token"
            scope = "read write"

            [http]
            timeout_seconds = 5

            [session]
            cookie_name = "sid"
            max_age_days = 7
        "#;

        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.provider.token_url, "http://localhost:9999/token");
        assert_eq!(settings.provider.scope, "read write");
        assert_eq!(settings.http.timeout_seconds, 5);
        assert_eq!(settings.session.cookie_name, "sid");
        assert_eq!(settings.session.max_age_days, 7);
        assert_eq!(settings.session.cookie_path, "/api"); // Default
    }

    #[test]
    fn test_from_lookup_complete() {
        let config = from_map(&base_env()).unwrap();

        assert_eq!(config.credentials.client_id, "client-id");
        assert_eq!(config.frontend_url, "https://costs.example.com");
        assert_eq!(config.port, 5000);
        assert_eq!(
            config.settings.session.cookie_domain.as_deref(),
            Some("costs.example.com")
        );
    }

    #[test]
    fn test_each_required_variable_is_fatal() {
        for name in [
            ENV_CLIENT_ID,
            ENV_CLIENT_SECRET,
            ENV_REDIRECT_URI,
            ENV_FRONTEND_URL,
            ENV_SESSION_STORE_URL,
            ENV_TOKEN_KEY,
        ] {
            let mut env = base_env();
            env.remove(name);
            let err = from_map(&env).unwrap_err();
            assert!(err.to_string().contains(name), "{}", err);

            let mut env = base_env();
            env.insert(name, "   ".to_string());
            assert!(from_map(&env).is_err());
        }
    }

    #[test]
    fn test_bad_key_is_fatal_and_not_echoed() {
        for key in ["ab".repeat(31), format!("{}a", "ab".repeat(31)), "ab".repeat(33), "zz".repeat(32)] {
            let mut env = base_env();
            env.insert(ENV_TOKEN_KEY, key.clone());

            let err = from_map(&env).unwrap_err().to_string();
            assert!(err.contains(ENV_TOKEN_KEY));
            assert!(!err.contains(&key));
        }
    }

    #[test]
    fn test_invalid_port_and_urls() {
        let mut env = base_env();
        env.insert(ENV_PORT, "not-a-port".to_string());
        assert!(from_map(&env).is_err());

        let mut env = base_env();
        env.insert(ENV_FRONTEND_URL, "not a url".to_string());
        assert!(from_map(&env).is_err());
    }

    #[test]
    fn test_settings_file_is_loaded_and_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[http]\ntimeout_seconds = 600\n").unwrap();

        let mut env = base_env();
        env.insert(ENV_SETTINGS_PATH, path.to_string_lossy().to_string());
        assert!(from_map(&env).is_err());

        std::fs::write(&path, "[session]\ncookie_domain = \"example.com\"\n").unwrap();
        let config = from_map(&env).unwrap();
        assert_eq!(config.settings.session.cookie_domain.as_deref(), Some("example.com"));
    }

    #[test]
    fn test_session_age_out_of_range_is_fatal() {
        use crate::session::SessionStore;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut env = base_env();
        env.insert(ENV_SETTINGS_PATH, path.to_string_lossy().to_string());

        for days in ["0", "-1", "3651", "100000000", "9223372036854775807"] {
            std::fs::write(&path, format!("[session]\nmax_age_days = {}\n", days)).unwrap();
            let err = from_map(&env).unwrap_err();
            assert!(err.to_string().contains("max_age_days"), "{}", err);
        }

        std::fs::write(&path, "[session]\nmax_age_days = 3650\n").unwrap();
        let config = from_map(&env).unwrap();
        assert_eq!(config.settings.session.max_age_seconds(), 3650 * 86400);

        // Longest accepted lifetime still yields a usable store
        let store = crate::session::open_store("memory://", config.settings.session.ttl()).unwrap();
        let vault = crate::credentials::TokenVault::new(config.token_key.clone());
        let session = crate::session::Session::new(vault.seal("access").unwrap(), None);
        let id = crate::session::SessionId::generate();
        store.put(&id, &session).unwrap();
        assert!(store.get(&id).unwrap().is_some());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = from_map(&base_env()).unwrap();
        let debug = format!("{:?}", config);

        assert!(!debug.contains("client-secret"));
        assert!(!debug.contains(&"ab".repeat(32)));
    }
}
