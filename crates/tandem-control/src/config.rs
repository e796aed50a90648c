//! Connection settings for the control plane.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{ControlError, ControlResult};
use crate::retry::RetryPolicy;

/// Default control-plane address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Default inference gateway address (hotload and warmup traffic).
pub const DEFAULT_INFERENCE_URL: &str = "http://localhost:8081";

pub const ENV_API_KEY: &str = "TANDEM_API_KEY";
pub const ENV_ACCOUNT_ID: &str = "TANDEM_ACCOUNT_ID";
pub const ENV_BASE_URL: &str = "TANDEM_BASE_URL";
pub const ENV_INFERENCE_URL: &str = "TANDEM_INFERENCE_URL";
pub const ENV_EXTRA_HEADERS: &str = "TANDEM_EXTRA_HEADERS";

/// Everything `HttpControlPlane` needs to talk to the control plane.
#[derive(Clone, PartialEq)]
pub struct ControlPlaneConfig {
    pub base_url: String,
    pub inference_url: String,
    pub account_id: String,
    pub api_key: String,
    /// Sent on every request, e.g. for gateway authentication.
    pub extra_headers: BTreeMap<String, String>,
    pub request_timeout: Duration,
    /// Timeout for the unauthenticated liveness probe.
    pub probe_timeout: Duration,
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for ControlPlaneConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlaneConfig")
            .field("base_url", &self.base_url)
            .field("inference_url", &self.inference_url)
            .field("account_id", &self.account_id)
            .field("api_key", &"<redacted>")
            .field("extra_headers", &self.extra_headers.keys().collect::<Vec<_>>())
            .field("request_timeout", &self.request_timeout)
            .field("probe_timeout", &self.probe_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ControlPlaneConfig {
    #[must_use]
    pub fn new(account_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            inference_url: DEFAULT_INFERENCE_URL.to_string(),
            account_id: account_id.into(),
            api_key: api_key.into(),
            extra_headers: BTreeMap::new(),
            request_timeout: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_inference_url(mut self, url: impl Into<String>) -> Self {
        self.inference_url = url.into();
        self
    }

    #[must_use]
    pub fn with_extra_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Loads the configuration from `TANDEM_*` environment variables.
    ///
    /// # Errors
    /// Returns `ControlError::Config` if the API key or account id is missing,
    /// or the extra headers cannot be parsed.
    #[allow(clippy::disallowed_methods)] // env::var is needed for credential loading
    pub fn from_env() -> ControlResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ControlResult<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ControlError::Config(format!("{key} environment variable not set")))
        };

        let mut config = Self::new(required(ENV_ACCOUNT_ID)?, required(ENV_API_KEY)?);
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            config.base_url = url;
        }
        if let Some(url) = lookup(ENV_INFERENCE_URL).filter(|v| !v.trim().is_empty()) {
            config.inference_url = url;
        }
        if let Some(raw) = lookup(ENV_EXTRA_HEADERS) {
            config.extra_headers = parse_extra_headers(&raw)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks the fields a request cannot be built without.
    pub fn validate(&self) -> ControlResult<()> {
        if self.account_id.trim().is_empty() {
            return Err(ControlError::Config("account id must not be empty".to_string()));
        }
        if self.api_key.trim().is_empty() {
            return Err(ControlError::Config("API key must not be empty".to_string()));
        }
        for (name, url) in [("base URL", &self.base_url), ("inference URL", &self.inference_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ControlError::Config(format!("{name} must start with http:// or https://: {url}")));
            }
        }
        Ok(())
    }

    /// Control-plane address without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    #[must_use]
    pub fn inference_url(&self) -> &str {
        self.inference_url.trim_end_matches('/')
    }
}

/// Parses `name=value,name=value` into a header map.
///
/// # Errors
/// Returns `ControlError::Config` for an entry without `=` or with an empty name.
pub fn parse_extra_headers(raw: &str) -> ControlResult<BTreeMap<String, String>> {
    let mut headers = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, value) = entry
            .split_once('=')
            .ok_or_else(|| ControlError::Config(format!("invalid header entry (expected name=value): {entry}")))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ControlError::Config(format!("invalid header entry (empty name): {entry}")));
        }
        headers.insert(name.to_string(), value.trim().to_string());
    }
    Ok(headers)
}
