//! Client secret and consent-flow configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{GoogleError, GoogleResult};

/// OAuth client id and secret, as issued by the Google Cloud Console.
#[derive(Debug, Clone)]
pub struct ClientSecret {
    /// The OAuth 2.0 client ID.
    pub client_id: String,
    /// The OAuth 2.0 client secret.
    pub client_secret: String,
}

/// On-disk layout of a client secret file.
///
/// The Console download nests the values under `installed` (desktop apps)
/// or `web`; some tools write them flat at the root.
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<NestedClientSecret>,
    web: Option<NestedClientSecret>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedClientSecret {
    client_id: String,
    client_secret: String,
}

impl ClientSecret {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Reads a client secret JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> GoogleResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GoogleError::configuration(format!(
                "failed to read client secret file {}",
                path.display()
            ))
            .with_source(e)
        })?;
        Self::from_json(&content)
    }

    /// Parses client secret JSON in either the nested or the flat layout.
    pub fn from_json(json: &str) -> GoogleResult<Self> {
        let file: ClientSecretFile = serde_json::from_str(json).map_err(|e| {
            GoogleError::configuration(format!("failed to parse client secret JSON: {}", e))
        })?;

        if let Some(nested) = file.installed.or(file.web) {
            return Ok(Self::new(nested.client_id, nested.client_secret));
        }

        if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret) {
            return Ok(Self::new(client_id, client_secret));
        }

        Err(GoogleError::configuration(
            "client secret file must contain an 'installed'/'web' section or root-level 'client_id'/'client_secret'",
        ))
    }

    /// Checks that both values are present and the id looks like a Google client id.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.is_empty() {
            return Err("client_id is required");
        }
        if !self.client_id.ends_with(".apps.googleusercontent.com") {
            return Err("client_id should end with .apps.googleusercontent.com");
        }
        if self.client_secret.is_empty() {
            return Err("client_secret is required");
        }
        Ok(())
    }
}

/// Settings for the interactive consent flow.
///
/// Passed explicitly to [`crate::CredentialCache::load_or_obtain`]; there is
/// no process-wide flag state.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Host the loopback redirect server binds to.
    pub auth_host_name: String,

    /// Inclusive port range tried in order for the loopback server.
    pub auth_host_port_range: (u16, u16),

    /// Open the consent page in a browser. When false the URL is only
    /// printed to stderr.
    pub open_browser: bool,

    /// Timeout for token endpoint and Drive requests, in seconds.
    pub request_timeout_secs: u64,

    /// How long to wait for the browser redirect, in seconds.
    pub callback_timeout_secs: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            auth_host_name: "localhost".to_string(),
            auth_host_port_range: (8080, 8090),
            open_browser: true,
            request_timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
            callback_timeout_secs: Self::DEFAULT_CALLBACK_TIMEOUT_SECS,
        }
    }
}

impl FlowConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;

    /// Parses a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> GoogleResult<Self> {
        toml::from_str(content)
            .map_err(|e| GoogleError::configuration(format!("failed to parse flow config: {}", e)))
    }

    /// Loads a TOML file.
    pub fn load_from(path: impl AsRef<Path>) -> GoogleResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GoogleError::configuration(format!("failed to read flow config {}", path.display()))
                .with_source(e)
        })?;
        Self::from_toml_str(&content)
    }

    pub fn with_auth_host_name(mut self, host: impl Into<String>) -> Self {
        self.auth_host_name = host.into();
        self
    }

    pub fn with_auth_host_port_range(mut self, start: u16, end: u16) -> Self {
        self.auth_host_port_range = (start, end);
        self
    }

    pub fn with_open_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout_secs = timeout.as_secs();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.auth_host_name.is_empty() {
            return Err("auth_host_name must not be empty".to_string());
        }
        if self.auth_host_port_range.0 > self.auth_host_port_range.1 {
            return Err("invalid auth host port range".to_string());
        }
        if self.request_timeout_secs == 0 || self.callback_timeout_secs == 0 {
            return Err("timeouts must be greater than zero".to_string());
        }
        Ok(())
    }
}
