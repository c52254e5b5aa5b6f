//! Client configuration. Everything the remote services own (token endpoint,
//! page sizes, timeouts) is a setting here rather than a constant in the code.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the optional Planetary Computer API key.
pub const SUBSCRIPTION_KEY_ENV: &str = "PC_SDK_SUBSCRIPTION_KEY";

pub const DEFAULT_SAS_URL: &str = "https://planetarycomputer.microsoft.com/api/sas/v1";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Base of the token-issuing API; tokens are requested from
    /// `{sas_url}/token/{account}/{container}`.
    pub sas_url: String,

    /// Sent as `Ocp-Apim-Subscription-Key`. Anonymous callers get shorter
    /// lived tokens and lower rate limits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    /// `limit` sent with searches that do not set one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,

    /// Upper bound on materialized search results. Unbounded when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,

    /// `host:port` of a local blob storage emulator. Hrefs on it are read as
    /// `/{account}/{container}/{path}` and signed like real blob hrefs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_emulator: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_region: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_profile: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            sas_url: DEFAULT_SAS_URL.to_string(),
            subscription_key: None,
            request_timeout_secs: None,
            page_size: None,
            max_items: None,
            blob_emulator: None,
            s3_region: None,
            s3_profile: None,
        }
    }
}

impl ClientConfig {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Fills the subscription key from the environment unless one is already set.
    pub fn with_env(self) -> Self {
        let key = std::env::var(SUBSCRIPTION_KEY_ENV).ok();
        self.with_subscription_key_fallback(key)
    }

    fn with_subscription_key_fallback(mut self, key: Option<String>) -> Self {
        if self.subscription_key.is_none() {
            self.subscription_key = key.filter(|k| !k.trim().is_empty());
        }
        self
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.request_timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.sas_url, DEFAULT_SAS_URL);
        assert!(config.max_items.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let config: ClientConfig = toml::from_str(
            r#"
            page_size = 100
            max_items = 500
            request_timeout_secs = 30
            blob_emulator = "127.0.0.1:10000"
            "#,
        )
        .unwrap();
        assert_eq!(config.blob_emulator.as_deref(), Some("127.0.0.1:10000"));
        assert_eq!(config.page_size, Some(100));
        assert_eq!(config.max_items, Some(500));
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.sas_url, DEFAULT_SAS_URL);
    }

    #[test]
    fn test_subscription_key_fallback() {
        let config = ClientConfig::default().with_subscription_key_fallback(Some("abc".into()));
        assert_eq!(config.subscription_key.as_deref(), Some("abc"));

        let explicit = ClientConfig {
            subscription_key: Some("mine".into()),
            ..ClientConfig::default()
        }
        .with_subscription_key_fallback(Some("abc".into()));
        assert_eq!(explicit.subscription_key.as_deref(), Some("mine"));

        let blank = ClientConfig::default().with_subscription_key_fallback(Some("  ".into()));
        assert!(blank.subscription_key.is_none());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        let config = ClientConfig {
            page_size: Some(25),
            s3_region: Some("us-west-2".into()),
            ..ClientConfig::default()
        };
        config.write(&path).unwrap();
        assert_eq!(ClientConfig::read(&path).unwrap(), config);
    }
}
