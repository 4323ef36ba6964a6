//! Harness configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//! Command-line flags are layered on top by the binary.

use crate::case::TestGroup;
use crate::error::ConfigError;
use esc_client::ClientGeneration;
use esc_negotiation::ServerEpoch;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default index name prefix
pub const DEFAULT_INDEX_PREFIX: &str = "compat-test";

/// Timing knobs for probing, writing and verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Ceiling for each case phase
    pub case_timeout_secs: u64,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
    /// Interval between health probes
    pub probe_interval_ms: u64,
    /// Health probes per endpoint before giving up
    pub probe_attempts: u32,
    /// Wait after writing before the first count
    pub settle_delay_ms: u64,
    /// Interval between count polls
    pub verify_poll_interval_ms: u64,
    /// Count polls before the observed value is final
    pub verify_attempts: u32,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            case_timeout_secs: 30,
            request_timeout_secs: 10,
            probe_interval_ms: 1_000,
            probe_attempts: 60,
            settle_delay_ms: 2_000,
            verify_poll_interval_ms: 1_000,
            verify_attempts: 5,
        }
    }
}

impl Timings {
    /// Case phase ceiling
    #[inline]
    #[must_use]
    pub fn case_timeout(&self) -> Duration {
        Duration::from_secs(self.case_timeout_secs)
    }

    /// HTTP request timeout
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Health probe interval
    #[inline]
    #[must_use]
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    /// Settle delay
    #[inline]
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Count poll interval
    #[inline]
    #[must_use]
    pub fn verify_poll_interval(&self) -> Duration {
        Duration::from_millis(self.verify_poll_interval_ms)
    }
}

/// Base URL per server epoch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Epoch E1
    pub v7: Option<String>,
    /// Epoch E2
    pub v8: Option<String>,
    /// Epoch E3
    pub v9: Option<String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            v7: Some("http://localhost:9207".to_string()),
            v8: Some("http://localhost:9208".to_string()),
            v9: Some("http://localhost:9209".to_string()),
        }
    }
}

impl Endpoints {
    /// No endpoints at all
    #[must_use]
    pub fn none() -> Self {
        Self {
            v7: None,
            v8: None,
            v9: None,
        }
    }

    /// Endpoint for an epoch
    #[must_use]
    pub fn get(&self, epoch: ServerEpoch) -> Option<&str> {
        match epoch {
            ServerEpoch::V7 => self.v7.as_deref(),
            ServerEpoch::V8 => self.v8.as_deref(),
            ServerEpoch::V9 => self.v9.as_deref(),
        }
    }

    /// Replace the endpoint for an epoch
    pub fn set(&mut self, epoch: ServerEpoch, url: impl Into<String>) {
        let slot = match epoch {
            ServerEpoch::V7 => &mut self.v7,
            ServerEpoch::V8 => &mut self.v8,
            ServerEpoch::V9 => &mut self.v9,
        };
        *slot = Some(url.into());
    }
}

/// Shell commands that bring the fleet up and down
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterCommands {
    /// Run before probing
    pub start: Option<String>,
    /// Run after the report, even on failure
    pub teardown: Option<String>,
}

/// Top-level harness configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Base URL per server epoch
    pub endpoints: Endpoints,
    /// Generation the client emulates unless a case overrides it
    pub client_generation: ClientGeneration,
    /// Prefix for every index the harness creates
    pub index_prefix: String,
    /// Delete this run's indices afterwards
    pub cleanup: bool,
    /// Run lanes one after another instead of concurrently
    pub sequential: bool,
    /// Restrict the matrix to these groups; empty means all
    pub groups: Vec<TestGroup>,
    /// Restrict the matrix to these epochs; empty means all
    pub epochs: Vec<ServerEpoch>,
    /// Timing knobs
    pub timings: Timings,
    /// Fleet lifecycle commands
    pub cluster: ClusterCommands,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            client_generation: ClientGeneration::default(),
            index_prefix: DEFAULT_INDEX_PREFIX.to_string(),
            cleanup: true,
            sequential: false,
            groups: Vec::new(),
            epochs: Vec::new(),
            timings: Timings::default(),
            cluster: ClusterCommands::default(),
        }
    }
}

impl HarnessConfig {
    /// Defaults
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// `ConfigError::Parse` on malformed input.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// `ConfigError::Io` or `ConfigError::Parse`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// With an endpoint for one epoch
    #[must_use]
    pub fn with_endpoint(mut self, epoch: ServerEpoch, url: impl Into<String>) -> Self {
        self.endpoints.set(epoch, url);
        self
    }

    /// With client generation
    #[inline]
    #[must_use]
    pub fn with_client_generation(mut self, generation: ClientGeneration) -> Self {
        self.client_generation = generation;
        self
    }

    /// With index prefix
    #[must_use]
    pub fn with_index_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.index_prefix = prefix.into();
        self
    }

    /// With cleanup enabled or disabled
    #[inline]
    #[must_use]
    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// With sequential lanes
    #[inline]
    #[must_use]
    pub fn with_sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    /// With timings
    #[must_use]
    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Endpoint for an epoch
    #[must_use]
    pub fn endpoint(&self, epoch: ServerEpoch) -> Option<&str> {
        self.endpoints.get(epoch)
    }

    /// Check internal consistency
    ///
    /// # Errors
    /// `ConfigError::Invalid` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = &self.index_prefix;
        if prefix.is_empty() {
            return Err(ConfigError::Invalid("index_prefix must not be empty".to_string()));
        }
        if prefix.chars().any(|c| c.is_ascii_uppercase() || matches!(c, '*' | ',' | ' ' | '/')) {
            return Err(ConfigError::Invalid(format!(
                "index_prefix `{prefix}` must be lowercase without wildcards, commas, spaces or slashes"
            )));
        }
        for epoch in self.selected_epochs() {
            match self.endpoint(epoch) {
                Some(url) if !url.trim().is_empty() => {}
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "no endpoint configured for {} ({epoch})",
                        epoch.label()
                    )))
                }
            }
        }
        if self.timings.probe_attempts == 0 || self.timings.verify_attempts == 0 {
            return Err(ConfigError::Invalid("attempt counts must be at least 1".to_string()));
        }
        if self.timings.case_timeout_secs == 0 {
            return Err(ConfigError::Invalid("case_timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// Epochs selected by the filter
    #[must_use]
    pub fn selected_epochs(&self) -> Vec<ServerEpoch> {
        if self.epochs.is_empty() {
            ServerEpoch::ALL.to_vec()
        } else {
            let mut epochs = self.epochs.clone();
            epochs.sort_unstable();
            epochs.dedup();
            epochs
        }
    }
}
