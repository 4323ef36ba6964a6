//! Compatibility report: a fold over test results
//!
//! Aggregation is pure given the results and the [`AggregationContext`];
//! nothing here talks to a server.

use crate::case::{Outcome, TestResult};
use crate::error::{EXIT_PASSED, EXIT_TEST_FAILURE};
use chrono::{DateTime, Utc};
use esc_client::ClientGeneration;
use esc_negotiation::{OverrideMediaType, ServerEpoch, CONTENT_TYPE_OPTION, FALLBACK_OPTION};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Per-epoch verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpochStatus {
    /// Every phase passed
    Compatible,
    /// At least one phase failed
    Incompatible,
    /// No results for this epoch
    Untested,
}

impl EpochStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Compatible => "COMPATIBLE",
            Self::Incompatible => "INCOMPATIBLE",
            Self::Untested => "UNTESTED",
        }
    }
}

/// Pass/fail tally for one epoch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// Epoch
    pub epoch: ServerEpoch,
    /// Passing phases
    pub pass: usize,
    /// Failing phases
    pub fail: usize,
    /// Verdict
    pub status: EpochStatus,
}

impl EpochSummary {
    fn empty(epoch: ServerEpoch) -> Self {
        Self {
            epoch,
            pass: 0,
            fail: 0,
            status: EpochStatus::Untested,
        }
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Pass => self.pass += 1,
            Outcome::Fail => self.fail += 1,
        }
        self.status = if self.fail > 0 {
            EpochStatus::Incompatible
        } else {
            EpochStatus::Compatible
        };
    }
}

/// Remediation hint derived from failure signatures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Advisory {
    /// Newest-generation client failing against older epochs without an override
    SetContentTypeOverride {
        /// Affected epochs
        epochs: Vec<ServerEpoch>,
        /// Affected case names
        cases: Vec<String>,
        /// Whether any affected case writes through the bulk API
        bulk: bool,
    },
    /// Older-epoch failures that the fallback flag would have downgraded
    EnableFallback {
        /// Affected epochs
        epochs: Vec<ServerEpoch>,
        /// Affected case names
        cases: Vec<String>,
    },
}

impl Advisory {
    /// One-line remediation text
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::SetContentTypeOverride { epochs, bulk, .. } => {
                let value = if *bulk {
                    format!(
                        "{} (or {} for bulk writes)",
                        OverrideMediaType::Json,
                        OverrideMediaType::NdJson
                    )
                } else {
                    OverrideMediaType::Json.to_string()
                };
                format!(
                    "{} failed with no explicit content type while the client speaks the newest \
                     generation; set `{CONTENT_TYPE_OPTION} {value}` so requests stop carrying a \
                     compatible-with marker",
                    join_epochs(epochs)
                )
            }
            Self::EnableFallback { epochs, .. } => format!(
                "{} failed with `{FALLBACK_OPTION}` disabled; enable it to downgrade to plain \
                 media types when the server version cannot be detected",
                join_epochs(epochs)
            ),
        }
    }
}

fn join_epochs(epochs: &[ServerEpoch]) -> String {
    epochs
        .iter()
        .map(|e| format!("{} ({e})", e.label()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Inputs to aggregation besides the results
#[derive(Debug, Clone)]
pub struct AggregationContext {
    /// Run identifier
    pub run_id: String,
    /// Generation the client emulated by default
    pub client_generation: ClientGeneration,
    /// Epochs the matrix targeted
    pub epochs: Vec<ServerEpoch>,
    /// Report timestamp
    pub generated_at: DateTime<Utc>,
}

/// Final report of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityReport {
    /// Run identifier
    pub run_id: String,
    /// When the report was produced
    pub generated_at: DateTime<Utc>,
    /// Generation the client emulated by default
    pub client_generation: ClientGeneration,
    /// One summary per targeted epoch, oldest first
    pub epochs: Vec<EpochSummary>,
    /// Every phase result in canonical order
    pub results: Vec<TestResult>,
    /// Remediation hints
    pub advisories: Vec<Advisory>,
}

impl CompatibilityReport {
    /// Fold results into a report
    #[must_use]
    pub fn aggregate(context: &AggregationContext, results: Vec<TestResult>) -> Self {
        let mut summaries: BTreeMap<ServerEpoch, EpochSummary> = context
            .epochs
            .iter()
            .map(|epoch| (*epoch, EpochSummary::empty(*epoch)))
            .collect();
        for result in &results {
            summaries
                .entry(result.case.epoch)
                .or_insert_with(|| EpochSummary::empty(result.case.epoch))
                .record(result.outcome);
        }

        let advisories = advise(context.client_generation, &results);

        Self {
            run_id: context.run_id.clone(),
            generated_at: context.generated_at,
            client_generation: context.client_generation,
            epochs: summaries.into_values().collect(),
            results,
            advisories,
        }
    }

    /// True iff there is at least one result and all of them passed
    #[must_use]
    pub fn passed(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(TestResult::is_pass)
    }

    /// (passing, failing) phase counts
    #[must_use]
    pub fn totals(&self) -> (usize, usize) {
        let pass = self.results.iter().filter(|r| r.is_pass()).count();
        (pass, self.results.len() - pass)
    }

    /// Summary for one epoch
    #[must_use]
    pub fn epoch(&self, epoch: ServerEpoch) -> Option<&EpochSummary> {
        self.epochs.iter().find(|s| s.epoch == epoch)
    }

    /// Process exit code for this report
    #[inline]
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            EXIT_PASSED
        } else {
            EXIT_TEST_FAILURE
        }
    }

    /// Pretty JSON
    ///
    /// # Errors
    /// Serialization failure.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable table
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let title = format!(
            "Compatibility report (run {}, client {})",
            self.run_id, self.client_generation
        );
        let _ = writeln!(out, "{title}");
        let _ = writeln!(out, "{}", "=".repeat(title.len()));
        let _ = writeln!(out, "Generated: {}", self.generated_at.to_rfc3339());
        let _ = writeln!(out);

        let _ = writeln!(out, "{:<6} {:<7} {:>5} {:>5}  STATUS", "EPOCH", "SERVER", "PASS", "FAIL");
        for summary in &self.epochs {
            let _ = writeln!(
                out,
                "{:<6} {:<7} {:>5} {:>5}  {}",
                summary.epoch.label(),
                summary.epoch.to_string(),
                summary.pass,
                summary.fail,
                summary.status.as_str()
            );
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Results:");
        for result in &self.results {
            let mark = if result.is_pass() { "PASS" } else { "FAIL" };
            let _ = write!(out, "  [{mark}] {:<18} {:<6}", result.case.name, result.phase.to_string());
            if let Some(kind) = result.failure {
                let _ = write!(out, " ({kind})");
            }
            let _ = writeln!(out, " {}", result.message);
        }

        if !self.advisories.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Advisories:");
            for advisory in &self.advisories {
                let _ = writeln!(out, "  ! {}", advisory.message());
            }
        }

        let (pass, fail) = self.totals();
        let verdict = if self.passed() { "PASSED" } else { "FAILED" };
        let _ = writeln!(out);
        let _ = writeln!(out, "Overall: {verdict} ({pass} passed, {fail} failed)");
        out
    }
}

/// Derive advisories from failures on older epochs in cases without an override
fn advise(generation: ClientGeneration, results: &[TestResult]) -> Vec<Advisory> {
    let suspects: Vec<&TestResult> = results
        .iter()
        .filter(|r| r.outcome == Outcome::Fail && r.case.epoch.is_legacy() && !r.case.has_override())
        .collect();
    if suspects.is_empty() {
        return Vec::new();
    }

    let mut advisories = Vec::new();
    let newest: Vec<&TestResult> = suspects
        .iter()
        .copied()
        .filter(|r| r.case.client_generation(generation).is_newest())
        .collect();
    if !newest.is_empty() {
        let (epochs, cases) = affected(newest.iter().copied());
        advisories.push(Advisory::SetContentTypeOverride {
            epochs,
            cases,
            bulk: newest.iter().any(|r| r.case.is_bulk()),
        });
    }

    let without_fallback: Vec<&TestResult> = suspects
        .iter()
        .copied()
        .filter(|r| !r.case.fallback_enabled())
        .collect();
    if !without_fallback.is_empty() {
        let (epochs, cases) = affected(without_fallback.into_iter());
        advisories.push(Advisory::EnableFallback { epochs, cases });
    }
    advisories
}

fn affected<'a>(results: impl Iterator<Item = &'a TestResult>) -> (Vec<ServerEpoch>, Vec<String>) {
    let mut epochs = Vec::new();
    let mut cases: Vec<String> = Vec::new();
    for result in results {
        if !epochs.contains(&result.case.epoch) {
            epochs.push(result.case.epoch);
        }
        if !cases.contains(&result.case.name) {
            cases.push(result.case.name.clone());
        }
    }
    epochs.sort_unstable();
    (epochs, cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{FailureKind, Phase, TestCase, TestGroup};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn context(generation: ClientGeneration) -> AggregationContext {
        AggregationContext {
            run_id: "r1".to_string(),
            client_generation: generation,
            epochs: ServerEpoch::ALL.to_vec(),
            generated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn case(group: TestGroup, epoch: ServerEpoch) -> Arc<TestCase> {
        Arc::new(TestCase::new(format!("{group}-{epoch}"), group, epoch))
    }

    fn passing(case: &Arc<TestCase>) -> Vec<TestResult> {
        vec![
            TestResult::pass(Arc::clone(case), Phase::Write, "ok"),
            TestResult::pass(Arc::clone(case), Phase::Verify, "ok").with_observed(1),
        ]
    }

    fn failing(case: &Arc<TestCase>) -> Vec<TestResult> {
        vec![
            TestResult::fail(Arc::clone(case), Phase::Write, FailureKind::Write, "406"),
            TestResult::fail(Arc::clone(case), Phase::Verify, FailureKind::Verification, "0 < 1").with_observed(0),
        ]
    }

    #[test]
    fn all_passing_is_compatible() {
        let results: Vec<TestResult> = ServerEpoch::ALL
            .iter()
            .flat_map(|e| passing(&case(TestGroup::Baseline, *e)))
            .collect();
        let report = CompatibilityReport::aggregate(&context(ClientGeneration::V9), results);

        assert!(report.passed());
        assert_eq!(report.exit_code(), EXIT_PASSED);
        assert_eq!(report.totals(), (6, 0));
        assert!(report.advisories.is_empty());
        for summary in &report.epochs {
            assert_eq!(summary.status, EpochStatus::Compatible);
            assert_eq!(summary.pass, 2);
        }
    }

    #[test]
    fn empty_results_do_not_pass() {
        let report = CompatibilityReport::aggregate(&context(ClientGeneration::V9), Vec::new());
        assert!(!report.passed());
        assert_eq!(report.exit_code(), EXIT_TEST_FAILURE);
        assert!(report.epochs.iter().all(|s| s.status == EpochStatus::Untested));
    }

    #[test]
    fn legacy_failures_without_override_raise_advisories() {
        let mut results = failing(&case(TestGroup::Baseline, ServerEpoch::V7));
        results.extend(failing(&case(TestGroup::Baseline, ServerEpoch::V8)));
        results.extend(passing(&case(TestGroup::Baseline, ServerEpoch::V9)));

        let report = CompatibilityReport::aggregate(&context(ClientGeneration::V9), results);
        assert!(!report.passed());
        assert_eq!(report.epoch(ServerEpoch::V7).unwrap().status, EpochStatus::Incompatible);
        assert_eq!(report.epoch(ServerEpoch::V9).unwrap().status, EpochStatus::Compatible);

        assert_eq!(report.advisories.len(), 2);
        match &report.advisories[0] {
            Advisory::SetContentTypeOverride { epochs, cases, bulk } => {
                assert_eq!(epochs, &vec![ServerEpoch::V7, ServerEpoch::V8]);
                assert_eq!(cases, &vec!["baseline-v7".to_string(), "baseline-v8".to_string()]);
                assert!(bulk);
            }
            other => panic!("unexpected advisory {other:?}"),
        }
        assert!(report.advisories[0].message().contains("content_type application/json"));
        assert!(report.advisories[0].message().contains("application/x-ndjson for bulk writes"));
        assert!(matches!(report.advisories[1], Advisory::EnableFallback { .. }));
    }

    #[test]
    fn failures_with_override_raise_no_advisory() {
        let pinned = Arc::new(
            TestCase::new("bulk-v7", TestGroup::Bulk, ServerEpoch::V7)
                .with_option("content_type", "application/x-ndjson"),
        );
        let report = CompatibilityReport::aggregate(&context(ClientGeneration::V9), failing(&pinned));
        assert!(report.advisories.is_empty());
    }

    #[test]
    fn older_generation_only_gets_fallback_advice() {
        let report = CompatibilityReport::aggregate(
            &context(ClientGeneration::V8),
            failing(&case(TestGroup::Baseline, ServerEpoch::V7)),
        );
        assert_eq!(report.advisories.len(), 1);
        assert!(matches!(report.advisories[0], Advisory::EnableFallback { .. }));
    }

    #[test]
    fn case_pinned_to_older_generation_gets_no_override_advice() {
        let legacy = Arc::new(
            TestCase::new("legacy-client-v7", TestGroup::Baseline, ServerEpoch::V7)
                .with_option("client_generation", "7"),
        );
        let mut results = failing(&legacy);
        results.extend(failing(&case(TestGroup::Baseline, ServerEpoch::V8)));

        let report = CompatibilityReport::aggregate(&context(ClientGeneration::V9), results);
        match &report.advisories[0] {
            Advisory::SetContentTypeOverride { epochs, cases, .. } => {
                assert_eq!(epochs, &vec![ServerEpoch::V8]);
                assert_eq!(cases, &vec!["baseline-v8".to_string()]);
            }
            other => panic!("unexpected advisory {other:?}"),
        }

        let alone = CompatibilityReport::aggregate(&context(ClientGeneration::V9), failing(&legacy));
        assert_eq!(alone.advisories.len(), 1);
        assert!(matches!(alone.advisories[0], Advisory::EnableFallback { .. }));
    }

    #[test]
    fn renders_text_and_json() {
        let mut results = failing(&case(TestGroup::Baseline, ServerEpoch::V7));
        results.extend(passing(&case(TestGroup::Baseline, ServerEpoch::V9)));
        let report = CompatibilityReport::aggregate(&context(ClientGeneration::V9), results);

        let text = report.render_text();
        assert!(text.contains("run r1, client v9"));
        assert!(text.contains("INCOMPATIBLE"));
        assert!(text.contains("[FAIL] baseline-v7"));
        assert!(text.contains("Advisories:"));
        assert!(text.contains("Overall: FAILED (2 passed, 2 failed)"));

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["run_id"], "r1");
        assert_eq!(json["epochs"][0]["epoch"], "v7");
        assert_eq!(json["epochs"][0]["status"], "incompatible");
        assert_eq!(json["advisories"][0]["kind"], "set-content-type-override");
        assert_eq!(json["results"].as_array().unwrap().len(), 4);
    }
}
