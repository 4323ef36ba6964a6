//! Runs one case: a bounded write phase followed by a polled read-back
//!
//! The verify phase always runs, even after a failed write, so the report
//! shows both what was attempted and what actually landed.

use crate::case::{FailureKind, Phase, TestCase, TestResult};
use crate::config::HarnessConfig;
use esc_client::{ClientError, ClientSettings, EsClient, Transport};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, instrument, warn};

/// Per-case timing and client defaults
#[derive(Debug, Clone)]
pub struct TestRunner {
    base: ClientSettings,
    case_timeout: Duration,
    settle_delay: Duration,
    poll_interval: Duration,
    verify_attempts: u32,
}

impl TestRunner {
    /// Runner using the harness timings and client generation
    #[must_use]
    pub fn new(config: &HarnessConfig) -> Self {
        let timings = &config.timings;
        Self {
            base: ClientSettings::new().with_generation(config.client_generation),
            case_timeout: timings.case_timeout(),
            settle_delay: timings.settle_delay(),
            poll_interval: timings.verify_poll_interval(),
            verify_attempts: timings.verify_attempts.max(1),
        }
    }

    /// Base client settings before case options
    #[inline]
    #[must_use]
    pub fn base_settings(&self) -> ClientSettings {
        self.base
    }

    /// Run both phases; always yields a write result then a verify result
    #[instrument(skip_all, fields(case = %case.name, epoch = %case.epoch))]
    pub async fn run(&self, case: Arc<TestCase>, transport: Arc<dyn Transport>, index: &str) -> Vec<TestResult> {
        let write = self.write_phase(&case, Arc::clone(&transport), index).await;
        let verify = self.verify_phase(&case, transport, index).await;
        info!(
            write = ?write.outcome,
            verify = ?verify.outcome,
            observed = ?verify.observed_count,
            "case finished"
        );
        vec![write, verify]
    }

    async fn write_phase(&self, case: &Arc<TestCase>, transport: Arc<dyn Transport>, index: &str) -> TestResult {
        let started = Instant::now();
        let settings = match self.base.apply_options(&case.extra_config) {
            Ok(settings) => settings,
            Err(err) => {
                return TestResult::fail(
                    Arc::clone(case),
                    Phase::Write,
                    FailureKind::Configuration,
                    format!("invalid case options: {err}"),
                )
            }
        };

        let documents = documents_for(case);
        let attempt = async {
            let client = EsClient::connect(transport, settings).await;
            debug!(detected = ?client.detected(), settings = ?client.settings(), "client ready");
            client.write(index, &documents).await
        };

        let result = match timeout(self.case_timeout, attempt).await {
            Ok(Ok(written)) => TestResult::pass(
                Arc::clone(case),
                Phase::Write,
                format!("wrote {written} document(s) to {index}"),
            ),
            Ok(Err(err)) => {
                warn!(error = %err, "write failed");
                TestResult::fail(Arc::clone(case), Phase::Write, FailureKind::Write, write_failure(&err))
            }
            Err(_) => TestResult::fail(
                Arc::clone(case),
                Phase::Write,
                FailureKind::Timeout,
                format!("write phase exceeded {}s", self.case_timeout.as_secs()),
            ),
        };
        result.with_elapsed_ms(elapsed_ms(started))
    }

    async fn verify_phase(&self, case: &Arc<TestCase>, transport: Arc<dyn Transport>, index: &str) -> TestResult {
        let started = Instant::now();
        let client = EsClient::new(transport, self.base);
        let expected = case.expected_min_docs;

        let result = match timeout(self.case_timeout, self.poll_count(&client, index, expected)).await {
            Ok(Ok(count)) if count >= expected => TestResult::pass(
                Arc::clone(case),
                Phase::Verify,
                format!("observed {count} document(s), expected at least {expected}"),
            )
            .with_observed(count),
            Ok(Ok(count)) => TestResult::fail(
                Arc::clone(case),
                Phase::Verify,
                FailureKind::Verification,
                format!("observed {count} document(s), expected at least {expected}"),
            )
            .with_observed(count),
            Ok(Err(err)) => TestResult::fail(
                Arc::clone(case),
                Phase::Verify,
                FailureKind::Verification,
                format!("read-back failed: {err}"),
            ),
            Err(_) => TestResult::fail(
                Arc::clone(case),
                Phase::Verify,
                FailureKind::Timeout,
                format!("verify phase exceeded {}s", self.case_timeout.as_secs()),
            ),
        };
        result.with_elapsed_ms(elapsed_ms(started))
    }

    /// Poll until the count reaches `expected` or attempts run out
    async fn poll_count(&self, client: &EsClient, index: &str, expected: u64) -> Result<u64, ClientError> {
        sleep(self.settle_delay).await;

        let mut last = Err(ClientError::UnexpectedResponse("no count observed".to_string()));
        for attempt in 1..=self.verify_attempts {
            last = client.count(index).await;
            match &last {
                Ok(count) if *count >= expected => break,
                Ok(count) => debug!(attempt, count, expected, "count below expectation"),
                Err(err) => debug!(attempt, error = %err, "count failed"),
            }
            if attempt < self.verify_attempts {
                sleep(self.poll_interval).await;
            }
        }
        last
    }
}

fn documents_for(case: &TestCase) -> Vec<Value> {
    let timestamp = chrono::Utc::now().to_rfc3339();
    (0..case.write_count)
        .map(|seq| {
            json!({
                "@timestamp": timestamp,
                "message": format!("compatibility probe {seq} for {}", case.name),
                "test_case": case.name,
                "group": case.group,
                "epoch": case.epoch,
                "seq": seq,
            })
        })
        .collect()
}

fn write_failure(err: &ClientError) -> String {
    match err.status() {
        Some(status) => format!("server rejected write ({status}): {err}"),
        None => format!("write failed: {err}"),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
