//! Configuration for the Hyperchat client.
//!
//! Two documents are involved:
//! - [`EngineConfig`]: tuning of the sync engine itself (backoff, recovery,
//!   page size), loaded from a TOML file.
//! - [`BootstrapConfig`]: what the embedding application hands over at
//!   startup. The engine only carries it through; `auth` reaches
//!   [`Transport::connect`](crate::Transport::connect).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hyperchat_core::BackoffPolicy;
use hyperchat_types::EntityId;

/// Root configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// User id of the signed-in viewer, if known.
    ///
    /// Needed for optimistic reaction changes and for recognising the
    /// viewer's own membership departures.
    #[serde(default)]
    pub viewer_id: Option<EntityId>,
    /// Reconnect backoff.
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Subscription recovery.
    #[serde(default)]
    pub subscriptions: SubscriptionConfig,
    /// Stream pagination.
    #[serde(default)]
    pub streams: StreamConfig,
}

/// Reconnect backoff configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BackoffConfig {
    /// Base delay in milliseconds (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Cap on the exponential delay in milliseconds (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Cap on the random jitter in milliseconds (default: 5000).
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

/// Subscription recovery configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubscriptionConfig {
    /// Attempts at the post-reconnect message fetch before a topic is
    /// reported lost (default: 3).
    #[serde(default = "default_reconcile_retry_budget")]
    pub reconcile_retry_budget: u32,
    /// Reconnect attempts before every subscription is lost
    /// (default: 0, retry forever).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
}

/// Stream pagination configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamConfig {
    /// Items requested per page (default: 50).
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

// Default value functions
fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_jitter_ms() -> u64 {
    5000
}

fn default_reconcile_retry_budget() -> u32 {
    3
}

fn default_page_size() -> u32 {
    50
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            reconcile_retry_budget: default_reconcile_retry_budget(),
            max_reconnect_attempts: 0,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            viewer_id: None,
            backoff: BackoffConfig::default(),
            subscriptions: SubscriptionConfig::default(),
            streams: StreamConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backoff.max_delay_ms < self.backoff.base_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "backoff.max_delay_ms ({}) is below backoff.base_delay_ms ({})",
                self.backoff.max_delay_ms, self.backoff.base_delay_ms
            )));
        }
        if self.streams.page_size == 0 {
            return Err(ConfigError::Invalid(
                "streams.page_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Set the viewer id.
    pub fn with_viewer(mut self, viewer_id: EntityId) -> Self {
        self.viewer_id = Some(viewer_id);
        self
    }

    /// The reconnect policy described by this configuration.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        let max_attempts = match self.subscriptions.max_reconnect_attempts {
            0 => None,
            n => Some(n),
        };
        BackoffPolicy {
            base: Duration::from_millis(self.backoff.base_delay_ms),
            max: Duration::from_millis(self.backoff.max_delay_ms),
            max_jitter: Duration::from_millis(self.backoff.max_jitter_ms),
            max_attempts,
        }
    }
}

/// How the transport authenticates. Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "params", rename_all = "camelCase")]
pub enum AuthStrategy {
    /// No credentials.
    #[default]
    Unsecured,
    /// Credentials passed as named parameters (token, signature, ...).
    Parameterized(BTreeMap<String, String>),
}

/// Startup configuration handed over by the embedding application.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapConfig {
    /// Signed-in user's name.
    #[serde(default)]
    pub username: Option<String>,
    /// Deployment environment name.
    #[serde(default)]
    pub environment: Option<String>,
    /// UI locale.
    #[serde(default)]
    pub locale: Option<String>,
    /// UI theme.
    #[serde(default)]
    pub theme: Option<String>,
    /// Authentication strategy for the transport.
    #[serde(default)]
    pub auth: AuthStrategy,
    /// Route to open first.
    #[serde(default)]
    pub initial_route: Option<String>,
    /// Anything else the host passes along.
    #[serde(default)]
    pub extensions: Map<String, Value>,
}

impl BootstrapConfig {
    /// Parse a bootstrap document from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Parsed, but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
