//! Runs the matrix against the fleet
//!
//! Lifecycle: start the fleet, wait for every endpoint to report healthy,
//! run one lane per epoch, aggregate, clean up, tear down. Teardown runs on
//! every path once the fleet was started.

use crate::case::TestResult;
use crate::cluster::{self, ClusterControl};
use crate::config::HarnessConfig;
use crate::error::{ConfigError, HarnessError};
use crate::matrix::TestMatrix;
use crate::report::{AggregationContext, CompatibilityReport};
use crate::runner::TestRunner;
use esc_client::{ClientError, EsClient, HttpTransport, Transport};
use esc_negotiation::ServerEpoch;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Builds the transport for each epoch's endpoint
pub trait TransportFactory: Send + Sync {
    /// Transport for one endpoint
    ///
    /// # Errors
    /// `ClientError` if the transport cannot be constructed.
    fn transport(&self, epoch: ServerEpoch, endpoint: &str) -> Result<Arc<dyn Transport>, ClientError>;
}

/// reqwest-backed transports with a per-request timeout
#[derive(Debug, Clone)]
pub struct HttpTransportFactory {
    timeout: Duration,
}

impl HttpTransportFactory {
    /// Factory with the given request timeout
    #[inline]
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl TransportFactory for HttpTransportFactory {
    fn transport(&self, _epoch: ServerEpoch, endpoint: &str) -> Result<Arc<dyn Transport>, ClientError> {
        Ok(Arc::new(HttpTransport::new(endpoint, self.timeout)?))
    }
}

type Transports = BTreeMap<ServerEpoch, Arc<dyn Transport>>;

/// The compatibility harness
pub struct Harness {
    config: HarnessConfig,
    matrix: TestMatrix,
    runner: TestRunner,
    factory: Box<dyn TransportFactory>,
    cluster: Box<dyn ClusterControl>,
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("config", &self.config)
            .field("cases", &self.matrix.len())
            .finish_non_exhaustive()
    }
}

impl Harness {
    /// Harness over HTTP with cluster control taken from the config
    #[must_use]
    pub fn new(config: HarnessConfig, matrix: TestMatrix) -> Self {
        let factory = Box::new(HttpTransportFactory::new(config.timings.request_timeout()));
        let cluster = cluster::from_commands(&config.cluster);
        let runner = TestRunner::new(&config);
        Self {
            config,
            matrix,
            runner,
            factory,
            cluster,
        }
    }

    /// With a transport factory
    #[must_use]
    pub fn with_transport_factory(mut self, factory: impl TransportFactory + 'static) -> Self {
        self.factory = Box::new(factory);
        self
    }

    /// With cluster control
    #[must_use]
    pub fn with_cluster_control(mut self, cluster: impl ClusterControl + 'static) -> Self {
        self.cluster = Box::new(cluster);
        self
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run the whole matrix
    ///
    /// # Errors
    /// `HarnessError::Config` before anything starts, `HarnessError::Cluster`
    /// if the fleet cannot start, `HarnessError::Infrastructure` if an
    /// endpoint never becomes healthy. Case failures are report data.
    pub async fn run(&self) -> Result<CompatibilityReport, HarnessError> {
        self.config.validate()?;
        if self.matrix.is_empty() {
            return Err(ConfigError::Invalid("test matrix is empty after filtering".to_string()).into());
        }
        let colliding = self.matrix.colliding_cases();
        if !colliding.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "cases would share an index with an earlier case: {}",
                colliding.join(", ")
            ))
            .into());
        }

        let run_id = new_run_id();
        let transports = self.connect_all()?;
        info!(%run_id, cases = self.matrix.len(), epochs = ?self.matrix.epochs(), "starting compatibility run");

        self.cluster.start().await?;

        let outcome = match self.await_healthy(&transports).await {
            Ok(()) => {
                let results = self.run_lanes(&transports, &run_id).await;
                if self.config.cleanup {
                    self.cleanup(&transports, &run_id).await;
                }
                Ok(results)
            }
            Err(err) => Err(err),
        };

        if let Err(err) = self.cluster.teardown().await {
            warn!(error = %err, "cluster teardown failed");
        }

        let results = outcome?;
        let context = AggregationContext {
            run_id,
            client_generation: self.config.client_generation,
            epochs: self.matrix.epochs(),
            generated_at: chrono::Utc::now(),
        };
        let report = CompatibilityReport::aggregate(&context, results);
        info!(passed = report.passed(), "compatibility run finished");
        Ok(report)
    }

    fn connect_all(&self) -> Result<Transports, HarnessError> {
        let mut transports = Transports::new();
        for epoch in self.matrix.epochs() {
            let endpoint = self.config.endpoint(epoch).ok_or_else(|| {
                ConfigError::Invalid(format!("no endpoint configured for {} ({epoch})", epoch.label()))
            })?;
            transports.insert(epoch, self.factory.transport(epoch, endpoint)?);
        }
        Ok(transports)
    }

    /// Probe every endpoint concurrently until healthy or out of attempts
    async fn await_healthy(&self, transports: &Transports) -> Result<(), HarnessError> {
        let attempts = self.config.timings.probe_attempts.max(1);
        let interval = self.config.timings.probe_interval();

        let probes = transports.iter().map(|(epoch, transport)| {
            let client = EsClient::new(Arc::clone(transport), self.runner.base_settings());
            async move {
                for attempt in 1..=attempts {
                    match client.ping().await {
                        Ok(true) => {
                            info!(%epoch, attempt, "endpoint healthy");
                            return None;
                        }
                        Ok(false) => debug!(%epoch, attempt, "endpoint not ready"),
                        Err(err) => debug!(%epoch, attempt, error = %err, "endpoint unreachable"),
                    }
                    if attempt < attempts {
                        sleep(interval).await;
                    }
                }
                Some(*epoch)
            }
        });

        let unhealthy: Vec<ServerEpoch> = join_all(probes).await.into_iter().flatten().collect();
        if unhealthy.is_empty() {
            Ok(())
        } else {
            error!(?unhealthy, attempts, "endpoints never became healthy");
            Err(HarnessError::Infrastructure { unhealthy, attempts })
        }
    }

    /// One lane per epoch; results come back in canonical order
    async fn run_lanes(&self, transports: &Transports, run_id: &str) -> Vec<TestResult> {
        let prefix = self.config.index_prefix.as_str();

        if self.config.sequential {
            let mut results = Vec::with_capacity(self.matrix.len() * 2);
            for case in self.matrix.cases() {
                if let Some(transport) = transports.get(&case.epoch) {
                    let index = case.index_name(prefix, run_id);
                    results.extend(self.runner.run(Arc::clone(case), Arc::clone(transport), &index).await);
                }
            }
            return results;
        }

        let lanes = self.matrix.lanes().into_iter().filter_map(|(epoch, cases)| {
            let transport = Arc::clone(transports.get(&epoch)?);
            Some(async move {
                let mut lane = Vec::with_capacity(cases.len() * 2);
                for case in cases {
                    let index = case.index_name(prefix, run_id);
                    lane.extend(self.runner.run(case, Arc::clone(&transport), &index).await);
                }
                lane
            })
        });

        let mut results: Vec<TestResult> = join_all(lanes).await.into_iter().flatten().collect();
        results.sort_by_key(|r| (r.case.group, r.case.epoch));
        results
    }

    /// Delete this run's indices by exact name; servers may refuse wildcard deletes
    async fn cleanup(&self, transports: &Transports, run_id: &str) {
        let prefix = self.config.index_prefix.as_str();
        let deletions = self.matrix.lanes().into_iter().filter_map(|(epoch, cases)| {
            let client = EsClient::new(Arc::clone(transports.get(&epoch)?), self.runner.base_settings());
            Some(async move {
                for case in cases {
                    let index = case.index_name(prefix, run_id);
                    if let Err(err) = client.delete_indices(&index).await {
                        warn!(%epoch, %index, error = %err, "cleanup failed");
                    }
                }
            })
        });
        join_all(deletions).await;
    }
}

fn new_run_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}
