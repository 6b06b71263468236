//! Client configuration.

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};
use crate::retry::RetryPolicy;
use crate::security::SecurityConfig;

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_read_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("declarest/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Everything needed to build a [`crate::Client`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL every relative request path is joined to.
    pub base_url: String,

    /// Security scheme applied to every request.
    #[serde(default)]
    pub security: SecurityConfig,

    /// TLS settings.
    #[serde(default)]
    pub tls: TlsConfig,

    /// Share a cookie jar across all requests on this client.
    #[serde(default)]
    pub cookie_enabled: bool,

    /// Retry policy; absent means every request is sent exactly once.
    #[serde(default)]
    pub retry: Option<RetryPolicy>,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Whole-request timeout in seconds; zero disables it.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// TLS verification settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Skip server certificate verification. Test rigs only.
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// PEM-encoded root certificates added to the trust store.
    #[serde(default)]
    pub ca_cert_pem: Option<String>,
}

impl ClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            security: SecurityConfig::default(),
            tls: TlsConfig::default(),
            cookie_enabled: false,
            retry: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }

    #[must_use]
    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }

    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    #[must_use]
    pub fn with_cookies(mut self, enabled: bool) -> Self {
        self.cookie_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    #[must_use]
    pub fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn with_read_timeout_secs(mut self, secs: u64) -> Self {
        self.read_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Checks the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.base_url).map_err(|e| {
            ClientError::InvalidConfig(format!("invalid base_url {:?}: {e}", self.base_url))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ClientError::InvalidConfig(format!(
                "base_url must be http or https, got {:?}",
                base.scheme()
            )));
        }
        self.security.validate()?;
        Ok(())
    }

    /// Joins a request path onto the base URL. Paths that are already
    /// absolute URLs pass through untouched.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// A copy safe to serialize into diagnostics.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.security = self.security.redacted();
        copy
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_fills_defaults() {
        let config = ClientConfig::new("https://api.example.com/v1");
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.read_timeout_secs, 30);
        assert!(config.user_agent.starts_with("declarest/"));
        assert!(config.retry.is_none());
        assert!(!config.cookie_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_base_urls() {
        assert!(ClientConfig::new("not a url").validate().is_err());
        assert!(ClientConfig::new("ftp://example.com").validate().is_err());
        assert!(ClientConfig::new("https://example.com").validate().is_ok());
    }

    #[test]
    fn url_joins_without_doubling_slashes() {
        let config = ClientConfig::new("https://api.example.com/v1/");
        assert_eq!(config.url("/things/42"), "https://api.example.com/v1/things/42");
        assert_eq!(config.url("things/42"), "https://api.example.com/v1/things/42");
    }

    #[test]
    fn url_passes_absolute_urls_through() {
        let config = ClientConfig::new("https://api.example.com/v1");
        assert_eq!(
            config.url("https://other.example.com/op/9"),
            "https://other.example.com/op/9"
        );
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"base_url": "https://api.example.com"}"#).unwrap();
        assert_eq!(config.base_url, "https://api.example.com");
        assert!(matches!(config.security, SecurityConfig::None));
        assert!(!config.tls.insecure_skip_verify);
    }

    #[test]
    fn redacted_masks_security() {
        let config = ClientConfig::new("https://api.example.com").with_security(
            SecurityConfig::Bearer {
                token: "supersecret".to_string(),
            },
        );
        let rendered = serde_json::to_string(&config.redacted()).unwrap();
        assert!(!rendered.contains("supersecret"), "{rendered}");
    }
}
