//! ESC Harness
//!
//! Drives the client write path against one server per epoch and reports
//! which negotiation configurations work where.
//!
//! # Example
//!
//! ```rust,ignore
//! use esc_harness::{Harness, HarnessConfig, TestMatrix};
//!
//! let report = Harness::new(HarnessConfig::default(), TestMatrix::reference()).run().await?;
//! println!("{}", report.render_text());
//! std::process::exit(report.exit_code());
//! ```

#![warn(unreachable_pub)]

mod case;
mod cluster;
mod config;
mod error;
mod logging;
mod matrix;
mod orchestrator;
mod report;
mod runner;

pub use case::{FailureKind, Outcome, Phase, TestCase, TestGroup, TestResult};
pub use cluster::{ClusterControl, CommandCluster, ExternalCluster};
pub use config::{ClusterCommands, Endpoints, HarnessConfig, Timings, DEFAULT_INDEX_PREFIX};
pub use error::{ConfigError, HarnessError, EXIT_CONFIG, EXIT_INFRASTRUCTURE, EXIT_PASSED, EXIT_TEST_FAILURE};
pub use logging::{init_tracing, LogFormat};
pub use matrix::{TestMatrix, BULK_WRITE_COUNT};
pub use orchestrator::{Harness, HttpTransportFactory, TransportFactory};
pub use report::{AggregationContext, Advisory, CompatibilityReport, EpochStatus, EpochSummary};
pub use runner::TestRunner;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
