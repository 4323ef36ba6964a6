//! Test cases and their results

use esc_client::{ClientGeneration, WriteMode, GENERATION_OPTION, WRITE_MODE_OPTION};
use esc_negotiation::{ContentTypePolicy, ServerEpoch, CONTENT_TYPE_OPTION};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Logical group; the matrix runs each group against every epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestGroup {
    /// Default configuration, single write
    Baseline,
    /// Document API with an explicit JSON override
    DirectIndex,
    /// Bulk API with an explicit ndjson override
    Bulk,
}

impl TestGroup {
    /// All groups in canonical order
    pub const ALL: [Self; 3] = [Self::Baseline, Self::DirectIndex, Self::Bulk];

    /// Kebab-case name used in index names and reports
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::DirectIndex => "direct-index",
            Self::Bulk => "bulk",
        }
    }
}

impl fmt::Display for TestGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "baseline" => Ok(Self::Baseline),
            "direct-index" | "direct_index" | "index" => Ok(Self::DirectIndex),
            "bulk" => Ok(Self::Bulk),
            other => Err(format!("unknown test group `{other}`")),
        }
    }
}

/// One configuration exercised against one epoch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Unique name, e.g. `bulk-v8`
    pub name: String,
    /// Logical group
    pub group: TestGroup,
    /// Target epoch
    pub epoch: ServerEpoch,
    /// Client options layered over the harness defaults
    pub extra_config: IndexMap<String, String>,
    /// Documents written in the write phase
    pub write_count: usize,
    /// Minimum documents the read-back must observe
    pub expected_min_docs: u64,
}

impl TestCase {
    /// Single-write case with no extra options
    #[must_use]
    pub fn new(name: impl Into<String>, group: TestGroup, epoch: ServerEpoch) -> Self {
        Self {
            name: name.into(),
            group,
            epoch,
            extra_config: IndexMap::new(),
            write_count: 1,
            expected_min_docs: 1,
        }
    }

    /// With a client option
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_config.insert(key.into(), value.into());
        self
    }

    /// Write `count` documents and expect at least as many back
    #[inline]
    #[must_use]
    pub fn with_writes(mut self, count: usize) -> Self {
        self.write_count = count;
        self.expected_min_docs = count as u64;
        self
    }

    /// Override the minimum observed count
    #[inline]
    #[must_use]
    pub fn expecting(mut self, min_docs: u64) -> Self {
        self.expected_min_docs = min_docs;
        self
    }

    /// Whether the case pins an explicit content type
    #[inline]
    #[must_use]
    pub fn has_override(&self) -> bool {
        self.extra_config.contains_key(CONTENT_TYPE_OPTION)
    }

    /// Whether the case enables the fallback flag
    #[must_use]
    pub fn fallback_enabled(&self) -> bool {
        ContentTypePolicy::from_options(&self.extra_config).is_ok_and(|policy| policy.fallback_enabled)
    }

    /// Whether the case writes through the bulk API
    #[must_use]
    pub fn is_bulk(&self) -> bool {
        match self.extra_config.get(WRITE_MODE_OPTION) {
            Some(raw) => raw.parse::<WriteMode>().is_ok_and(|m| m == WriteMode::Bulk),
            None => WriteMode::default() == WriteMode::Bulk,
        }
    }

    /// Generation the case's client speaks; `default` unless the case pins one
    #[must_use]
    pub fn client_generation(&self, default: ClientGeneration) -> ClientGeneration {
        self.extra_config
            .get(GENERATION_OPTION)
            .and_then(|raw| raw.parse::<ClientGeneration>().ok())
            .unwrap_or(default)
    }

    /// Case name folded into the characters an index name allows
    #[must_use]
    pub fn index_stem(&self) -> String {
        self.name
            .chars()
            .map(|c| match c.to_ascii_lowercase() {
                c @ ('a'..='z' | '0'..='9' | '-' | '_') => c,
                _ => '-',
            })
            .collect()
    }

    /// Index name unique to this case and run
    #[must_use]
    pub fn index_name(&self, prefix: &str, run_id: &str) -> String {
        format!("{prefix}-{}-{run_id}", self.index_stem())
    }
}

/// Phase of a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Writing documents
    Write,
    /// Reading the count back
    Verify,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Write => "write",
            Self::Verify => "verify",
        })
    }
}

/// Pass or fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Phase succeeded
    Pass,
    /// Phase failed
    Fail,
}

/// Why a phase failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// Case options could not be applied
    Configuration,
    /// Write rejected or errored
    Write,
    /// Read-back below the expected minimum, or the read failed
    Verification,
    /// Phase exceeded the case ceiling
    Timeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Configuration => "configuration",
            Self::Write => "write",
            Self::Verification => "verification",
            Self::Timeout => "timeout",
        })
    }
}

/// Record of one phase of one case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    /// The case
    pub case: Arc<TestCase>,
    /// Which phase
    pub phase: Phase,
    /// Pass or fail
    pub outcome: Outcome,
    /// Failure classification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Documents counted in the verify phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_count: Option<u64>,
    /// Human-readable detail
    pub message: String,
    /// Wall time of the phase
    pub elapsed_ms: u64,
}

impl TestResult {
    /// Passing phase
    #[must_use]
    pub fn pass(case: Arc<TestCase>, phase: Phase, message: impl Into<String>) -> Self {
        Self {
            case,
            phase,
            outcome: Outcome::Pass,
            failure: None,
            observed_count: None,
            message: message.into(),
            elapsed_ms: 0,
        }
    }

    /// Failing phase
    #[must_use]
    pub fn fail(case: Arc<TestCase>, phase: Phase, failure: FailureKind, message: impl Into<String>) -> Self {
        Self {
            case,
            phase,
            outcome: Outcome::Fail,
            failure: Some(failure),
            observed_count: None,
            message: message.into(),
            elapsed_ms: 0,
        }
    }

    /// With the observed count
    #[inline]
    #[must_use]
    pub fn with_observed(mut self, count: u64) -> Self {
        self.observed_count = Some(count);
        self
    }

    /// With elapsed time
    #[inline]
    #[must_use]
    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    /// Whether the phase passed
    #[inline]
    #[must_use]
    pub fn is_pass(&self) -> bool {
        self.outcome == Outcome::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn index_names_are_scoped() {
        let case = TestCase::new("bulk-v8", TestGroup::Bulk, ServerEpoch::V8);
        assert_eq!(case.index_name("compat-test", "1a2b3c4d"), "compat-test-bulk-v8-1a2b3c4d");

        let direct = TestCase::new("direct-index-v7", TestGroup::DirectIndex, ServerEpoch::V7);
        assert_eq!(direct.index_name("ci", "r1"), "ci-direct-index-v7-r1");
    }

    #[test]
    fn index_names_follow_the_case_not_the_cell() {
        let first = TestCase::new("first", TestGroup::Baseline, ServerEpoch::V7);
        let second = TestCase::new("second", TestGroup::Baseline, ServerEpoch::V7);
        assert_ne!(first.index_name("ci", "r1"), second.index_name("ci", "r1"));

        let odd = TestCase::new("Bulk V8/large batch", TestGroup::Bulk, ServerEpoch::V8);
        assert_eq!(odd.index_stem(), "bulk-v8-large-batch");
    }

    #[test]
    fn fallback_flag_uses_policy_parsing() {
        let off = TestCase::new("x", TestGroup::Baseline, ServerEpoch::V7).with_option("content_type_fallback", "off");
        assert!(!off.fallback_enabled());
        let garbled =
            TestCase::new("y", TestGroup::Baseline, ServerEpoch::V7).with_option("content_type_fallback", "sometimes");
        assert!(!garbled.fallback_enabled());
        let on = TestCase::new("z", TestGroup::Baseline, ServerEpoch::V7).with_option("content_type_fallback", "On");
        assert!(on.fallback_enabled());
    }

    #[test]
    fn effective_client_generation() {
        let pinned = TestCase::new("x", TestGroup::Baseline, ServerEpoch::V7).with_option("client_generation", "7");
        assert_eq!(pinned.client_generation(ClientGeneration::V9), ClientGeneration::V7);
        let plain = TestCase::new("y", TestGroup::Baseline, ServerEpoch::V7);
        assert_eq!(plain.client_generation(ClientGeneration::V9), ClientGeneration::V9);
    }

    #[test]
    fn case_flags() {
        let case = TestCase::new("x", TestGroup::Baseline, ServerEpoch::V7)
            .with_option("content_type_fallback", "yes")
            .with_writes(10);
        assert!(!case.has_override());
        assert!(case.fallback_enabled());
        assert!(case.is_bulk());
        assert_eq!(case.expected_min_docs, 10);

        let bulk = TestCase::new("y", TestGroup::Bulk, ServerEpoch::V9)
            .with_option("content_type", "application/x-ndjson");
        assert!(bulk.has_override());
        assert!(bulk.is_bulk());

        let direct = TestCase::new("z", TestGroup::DirectIndex, ServerEpoch::V9).with_option("write_mode", "index");
        assert!(!direct.is_bulk());
    }

    #[test]
    fn groups_parse_and_order() {
        assert_eq!("direct-index".parse::<TestGroup>(), Ok(TestGroup::DirectIndex));
        assert!("stream".parse::<TestGroup>().is_err());
        assert!(TestGroup::Baseline < TestGroup::DirectIndex);
        assert!(TestGroup::DirectIndex < TestGroup::Bulk);
    }

    #[test]
    fn result_serializes_flat_fields() {
        let case = Arc::new(TestCase::new("baseline-v9", TestGroup::Baseline, ServerEpoch::V9));
        let result = TestResult::fail(case, Phase::Verify, FailureKind::Verification, "observed 0 < 1")
            .with_observed(0);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["phase"], "verify");
        assert_eq!(json["outcome"], "fail");
        assert_eq!(json["failure"], "verification");
        assert_eq!(json["observed_count"], 0);
        assert_eq!(json["case"]["name"], "baseline-v9");
    }
}
