//! Client configuration and HTTP client construction

use crate::concurrency::config::TransferSpec;
use crate::error::{LibraryError, Result};
use reqwest::Client;
use reqwest::redirect::Policy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const DEFAULT_LIBRARY_URL: &str = "https://library.sylabs.io";
pub const DEFAULT_USER_AGENT: &str = concat!("sif-library-client/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Largest chunk sent in a single PATCH of a blob upload session
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 5 * 1024 * 1024;
/// Bytes read from the start of an image to build its config
pub const DEFAULT_HEADER_READ_SIZE: usize = 64 * 1024;
/// Legacy uploads above this size use the multipart API
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Concurrency and part size for ranged downloads
    pub download: TransferSpec,
    pub max_chunk_size: usize,
    pub header_read_size: usize,
    pub multipart_threshold: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download: TransferSpec::default(),
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            header_read_size: DEFAULT_HEADER_READ_SIZE,
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the library service, without trailing slash
    pub base_url: String,
    pub auth_token: Option<String>,
    pub user_agent: String,
    /// Per-request timeout in seconds
    pub timeout: u64,
    pub skip_tls: bool,
    pub transfer: TransferConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LIBRARY_URL.to_string(),
            auth_token: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT_SECS,
            skip_tls: false,
            transfer: TransferConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Build a configuration from `LIBRARY_*` environment variables over the defaults
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Same as [`ClientConfig::from_env`], reading variables through `lookup`
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("LIBRARY_URL") {
            Some(url) => Self::new(url),
            None => Self::default(),
        };

        config.auth_token = lookup("LIBRARY_TOKEN").filter(|t| !t.is_empty());
        if let Some(concurrency) = parse_var::<usize>(&lookup, "LIBRARY_CONCURRENCY")? {
            config.transfer.download.concurrency = concurrency;
        }
        if let Some(part_size) = parse_var::<i64>(&lookup, "LIBRARY_PART_SIZE")? {
            config.transfer.download.part_size = part_size;
        }
        if let Some(timeout) = parse_var::<u64>(&lookup, "LIBRARY_TIMEOUT")? {
            config.timeout = timeout;
        }
        config.skip_tls = lookup("SKIP_TLS").is_some_and(|v| v == "true" || v == "1");

        config.validate()?;
        Ok(config)
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    pub fn with_download(mut self, spec: TransferSpec) -> Self {
        self.transfer.download = spec;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn with_skip_tls(mut self, skip_tls: bool) -> Self {
        self.skip_tls = skip_tls;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(LibraryError::Config("library URL cannot be empty".into()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(LibraryError::Config(format!(
                "library URL must start with http:// or https://: {}",
                self.base_url
            )));
        }
        if self.timeout == 0 {
            return Err(LibraryError::Config("timeout must be greater than 0".into()));
        }
        if self.transfer.download.part_size <= 0 {
            return Err(LibraryError::InvalidPartSize(self.transfer.download.part_size));
        }
        if self.transfer.max_chunk_size == 0 {
            return Err(LibraryError::Config("max chunk size must be greater than 0".into()));
        }
        Ok(())
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Client for registry traffic; follows redirects to blob storage
    pub fn registry_http_client(&self) -> Result<Client> {
        self.http_client(Policy::default())
    }

    /// Client for the library protocol; redirects are walked by hand so credentials can be
    /// dropped when the target host changes
    pub fn library_http_client(&self) -> Result<Client> {
        self.http_client(Policy::none())
    }

    fn http_client(&self, redirect: Policy) -> Result<Client> {
        let mut builder = Client::builder()
            .timeout(self.timeout_duration())
            .connect_timeout(Duration::from_secs(60))
            .pool_idle_timeout(Duration::from_secs(300))
            .user_agent(self.user_agent.clone())
            .redirect(redirect);
        if self.skip_tls {
            builder = builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }
        Ok(builder.build()?)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>> {
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| LibraryError::Config(format!("invalid value for {}: {:?}", name, value))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.transfer.max_chunk_size, 5 * 1024 * 1024);
        assert_eq!(config.transfer.header_read_size, 64 * 1024);
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: std::collections::HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_from_vars_overrides_defaults() {
        let config = ClientConfig::from_vars(vars(&[
            ("LIBRARY_URL", "https://library.example/"),
            ("LIBRARY_TOKEN", "secret"),
            ("LIBRARY_CONCURRENCY", "8"),
            ("LIBRARY_PART_SIZE", " 1024 "),
            ("LIBRARY_TIMEOUT", "30"),
            ("SKIP_TLS", "1"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "https://library.example");
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.transfer.download.concurrency, 8);
        assert_eq!(config.transfer.download.part_size, 1024);
        assert_eq!(config.timeout, 30);
        assert!(config.skip_tls);
    }

    #[test]
    fn test_from_vars_empty_environment() {
        let config = ClientConfig::from_vars(vars(&[("LIBRARY_TOKEN", "")])).unwrap();
        assert_eq!(config.base_url, DEFAULT_LIBRARY_URL);
        assert_eq!(config.auth_token, None);
        assert!(!config.skip_tls);
    }

    #[test]
    fn test_from_vars_rejects_bad_values() {
        assert!(matches!(
            ClientConfig::from_vars(vars(&[("LIBRARY_TIMEOUT", "soon")])),
            Err(LibraryError::Config(_))
        ));
        assert!(matches!(
            ClientConfig::from_vars(vars(&[("LIBRARY_PART_SIZE", "0")])),
            Err(LibraryError::InvalidPartSize(0))
        ));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        assert_eq!(ClientConfig::new("http://lib/").base_url, "http://lib");
    }

    #[test]
    fn test_validation_failures() {
        assert!(ClientConfig::new("").validate().is_err());
        assert!(ClientConfig::new("ftp://x").validate().is_err());
        assert!(ClientConfig::new("http://x").with_timeout(0).validate().is_err());

        let config = ClientConfig::new("http://x").with_download(TransferSpec::new(2, 0));
        assert!(matches!(config.validate(), Err(LibraryError::InvalidPartSize(0))));
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = ClientConfig::new("http://x").with_auth_token(Some("t".into()));
        let json = serde_json::to_string(&config).unwrap();
        let back: ClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
