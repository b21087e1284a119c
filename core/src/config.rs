//! Client configuration.
//!
//! A `ClientConfig` can be built in code or loaded from a TOML file:
//!
//! ```toml
//! url = "https://erp.example.com"
//! username = "Administrator"
//! password = "secret"
//! timeout_secs = 30.0
//! proxy = "http://proxy.local:3128"
//!
//! [pool]
//! max_idle_connections = 10
//! max_idle_connections_per_host = 3
//! danger_accept_invalid_certs = false
//! ```

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FrappeError, Result};

/// Connection and credential settings for one server session.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the site, e.g. `https://erp.example.com`.
    pub url: String,
    pub username: String,
    pub password: String,
    /// Per-request timeout in seconds. No timeout when unset.
    #[serde(default)]
    pub timeout_secs: Option<f64>,
    /// Proxy URL applied to every request.
    #[serde(default)]
    pub proxy: Option<String>,
    /// Connection pool tuning; see `PoolConfig`.
    #[serde(default)]
    pub pool: Option<PoolConfig>,
}

/// Connection pool tuning forwarded to the HTTP stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub max_idle_connections: Option<usize>,
    #[serde(default)]
    pub max_idle_connections_per_host: Option<usize>,
    /// Skip TLS certificate verification for HTTPS requests.
    ///
    /// Anyone able to intercept traffic can then read the session cookie.
    /// Only meant for self-signed development servers.
    #[serde(default)]
    pub danger_accept_invalid_certs: bool,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            timeout_secs: None,
            proxy: None,
            pool: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Load configuration from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| FrappeError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| FrappeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The timeout as a `Duration`, if set.
    pub fn timeout(&self) -> Result<Option<Duration>> {
        self.timeout_secs
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .map_err(|e| FrappeError::Config(format!("invalid timeout {secs}: {e}")))
            })
            .transpose()
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(FrappeError::Config("url must not be empty".to_string()));
        }
        self.timeout()?;
        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("proxy", &self.proxy)
            .field("pool", &self.pool)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = ClientConfig::from_toml_str(
            r#"
            url = "https://erp.example.com"
            username = "Administrator"
            password = "admin"
            "#,
        )
        .unwrap();
        assert_eq!(config.url, "https://erp.example.com");
        assert!(config.timeout().unwrap().is_none());
        assert!(config.proxy.is_none());
        assert!(config.pool.is_none());
    }

    #[test]
    fn full_toml_parses_pool_and_timeout() {
        let config = ClientConfig::from_toml_str(
            r#"
            url = "https://erp.example.com"
            username = "Administrator"
            password = "admin"
            timeout_secs = 2.5
            proxy = "http://proxy.local:3128"

            [pool]
            max_idle_connections = 4
            danger_accept_invalid_certs = true
            "#,
        )
        .unwrap();
        assert_eq!(config.timeout().unwrap(), Some(Duration::from_millis(2500)));
        assert_eq!(config.proxy.as_deref(), Some("http://proxy.local:3128"));
        let pool = config.pool.unwrap();
        assert_eq!(pool.max_idle_connections, Some(4));
        assert_eq!(pool.max_idle_connections_per_host, None);
        assert!(pool.danger_accept_invalid_certs);
    }

    #[test]
    fn pool_never_disables_verification_by_default() {
        assert!(!PoolConfig::default().danger_accept_invalid_certs);
    }

    #[test]
    fn negative_timeout_is_rejected() {
        let err = ClientConfig::from_toml_str(
            r#"
            url = "https://erp.example.com"
            username = "u"
            password = "p"
            timeout_secs = -1.0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, FrappeError::Config(_)));
    }

    #[test]
    fn empty_url_is_rejected() {
        let config = ClientConfig::new("  ", "u", "p");
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_output_hides_password() {
        let config = ClientConfig::new("https://erp.example.com", "Administrator", "hunter2");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn builder_sets_optional_fields() {
        let config = ClientConfig::new("http://localhost:8000", "u", "p")
            .with_timeout(Duration::from_secs(5))
            .with_proxy("http://proxy:8080")
            .with_pool(PoolConfig::default());
        assert_eq!(config.timeout_secs, Some(5.0));
        assert!(config.pool.is_some());
    }
}
