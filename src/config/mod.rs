//! Configuration management for the module container
//!
//! Handles configuration loading and validation. Every field has a default,
//! so an empty TOML document is a valid configuration.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::module::model::SERVICE_NAMESPACE;

/// Container configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Resolver configuration
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Event delivery configuration
    #[serde(default)]
    pub events: EventConfig,

    /// Lifecycle behaviour
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Per-namespace wiring policies
    #[serde(default = "default_namespaces")]
    pub namespaces: BTreeMap<String, NamespacePolicy>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            events: EventConfig::default(),
            lifecycle: LifecycleConfig::default(),
            namespaces: default_namespaces(),
            logging: None,
        }
    }
}

/// Resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Attempts for a resolution that keeps hitting a stale graph
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between stale-graph attempts (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Candidate exclusions tried when resolving uses conflicts
    #[serde(default = "default_max_permutations")]
    pub max_permutations: usize,
}

fn default_max_attempts() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    10
}

fn default_max_permutations() -> usize {
    16
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            retry_delay_ms: 10,
            max_permutations: 16,
        }
    }
}

/// Event delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Capacity of each listener's channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// How long a publish waits on a full listener channel (milliseconds)
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,

    /// Default deadline for collectors waiting on events (milliseconds)
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_publish_timeout_ms() -> u64 {
    5000
}

fn default_wait_timeout_ms() -> u64 {
    5000
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            publish_timeout_ms: 5000,
            wait_timeout_ms: 5000,
        }
    }
}

impl EventConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

/// Lifecycle behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Refresh an updated module and its dependents immediately, so resolved
    /// consumers rewire to the new revision
    #[serde(default = "default_refresh_on_update")]
    pub refresh_on_update: bool,

    /// Start level given to modules installed without one
    #[serde(default = "default_start_level")]
    pub default_start_level: u32,

    /// Upper bound on a single activator start/stop call (milliseconds)
    #[serde(default)]
    pub activator_timeout_ms: Option<u64>,
}

fn default_refresh_on_update() -> bool {
    true
}

fn default_start_level() -> u32 {
    1
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            refresh_on_update: true,
            default_start_level: 1,
            activator_timeout_ms: None,
        }
    }
}

impl LifecycleConfig {
    pub fn activator_timeout(&self) -> Option<Duration> {
        self.activator_timeout_ms.map(Duration::from_millis)
    }
}

/// Wiring policy of one namespace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespacePolicy {
    /// Requirements may declare `cardinality:=multiple`
    #[serde(default)]
    pub multiple: bool,

    /// Mandatory requirements are satisfied without any provider
    #[serde(default)]
    pub allow_zero_wires: bool,
}

fn default_namespaces() -> BTreeMap<String, NamespacePolicy> {
    let mut namespaces = BTreeMap::new();
    namespaces.insert(
        SERVICE_NAMESPACE.to_string(),
        NamespacePolicy {
            multiple: true,
            allow_zero_wires: true,
        },
    );
    namespaces
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive (e.g. "info", "modwire::module=debug")
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

impl ContainerConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let config: ContainerConfig = toml::from_str(text).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    /// Wiring policy for `namespace`; unknown namespaces get the strict default
    pub fn policy(&self, namespace: &str) -> NamespacePolicy {
        self.namespaces.get(namespace).copied().unwrap_or_default()
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.resolver.max_attempts == 0 {
            return Err(anyhow::anyhow!("resolver.max_attempts must be greater than 0"));
        }

        if self.events.channel_capacity == 0 {
            return Err(anyhow::anyhow!("events.channel_capacity must be greater than 0"));
        }

        if self.events.publish_timeout_ms == 0 {
            return Err(anyhow::anyhow!("events.publish_timeout_ms must be greater than 0"));
        }

        Ok(())
    }
}
