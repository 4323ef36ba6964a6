//! Error types for the compatibility harness
//!
//! Only infrastructure, cluster-control and configuration problems are
//! errors. Write and verification failures travel as
//! [`TestResult`](crate::TestResult) data and never abort a run.

use esc_client::ClientError;
use esc_negotiation::ServerEpoch;
use std::path::PathBuf;

/// Exit code when every check passed
pub const EXIT_PASSED: i32 = 0;
/// Exit code when at least one check failed
pub const EXIT_TEST_FAILURE: i32 = 1;
/// Exit code when the infrastructure precondition was not met
pub const EXIT_INFRASTRUCTURE: i32 = 2;
/// Exit code for configuration and usage errors
pub const EXIT_CONFIG: i32 = 3;

/// Main harness error type
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// One or more endpoints never reported healthy
    #[error("infrastructure failure: {} never became healthy after {attempts} probes", format_epochs(.unhealthy))]
    Infrastructure {
        /// Epochs whose endpoint stayed unhealthy
        unhealthy: Vec<ServerEpoch>,
        /// Probe ceiling per endpoint
        attempts: u32,
    },

    /// Starting or tearing down the cluster failed
    #[error("cluster control failed: {0}")]
    Cluster(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Client could not be constructed
    #[error("client error: {0}")]
    Client(#[from] ClientError),
}

impl HarnessError {
    /// Process exit code for this error
    #[inline]
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Infrastructure { .. } | Self::Cluster(_) | Self::Client(_) => EXIT_INFRASTRUCTURE,
            Self::Config(_) => EXIT_CONFIG,
        }
    }

    /// Whether the run was aborted by unmet infrastructure preconditions
    #[inline]
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Infrastructure { .. })
    }
}

fn format_epochs(epochs: &[ServerEpoch]) -> String {
    epochs
        .iter()
        .map(|e| format!("{} ({e})", e.label()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for the config schema
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values are inconsistent
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infrastructure_error_display() {
        let err = HarnessError::Infrastructure {
            unhealthy: vec![ServerEpoch::V9],
            attempts: 60,
        };
        let text = err.to_string();
        assert!(text.contains("E3 (v9)"));
        assert!(text.contains("60"));
        assert!(err.is_infrastructure());
        assert_eq!(err.exit_code(), EXIT_INFRASTRUCTURE);
    }

    #[test]
    fn config_error_exit_code() {
        let err = HarnessError::from(ConfigError::Invalid("no endpoints".to_string()));
        assert_eq!(err.exit_code(), EXIT_CONFIG);
        assert!(!err.is_infrastructure());
    }
}
