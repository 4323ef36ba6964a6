//! The test matrix: logical groups crossed with server epochs

use crate::case::{TestCase, TestGroup};
use esc_client::WRITE_MODE_OPTION;
use esc_negotiation::{OverrideMediaType, ServerEpoch, CONTENT_TYPE_OPTION};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Documents written by each bulk case
pub const BULK_WRITE_COUNT: usize = 10;

/// Ordered set of cases
///
/// Cases are kept in canonical order: by group, then epoch, then insertion.
#[derive(Debug, Clone, Default)]
pub struct TestMatrix {
    cases: Vec<Arc<TestCase>>,
}

impl TestMatrix {
    /// Empty matrix
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The three reference groups against every epoch
    #[must_use]
    pub fn reference() -> Self {
        let mut matrix = Self::new();
        for epoch in ServerEpoch::ALL {
            matrix.push(TestCase::new(
                format!("{}-{epoch}", TestGroup::Baseline),
                TestGroup::Baseline,
                epoch,
            ));
            matrix.push(
                TestCase::new(format!("{}-{epoch}", TestGroup::DirectIndex), TestGroup::DirectIndex, epoch)
                    .with_option(WRITE_MODE_OPTION, "index")
                    .with_option(CONTENT_TYPE_OPTION, OverrideMediaType::Json.as_str()),
            );
            matrix.push(
                TestCase::new(format!("{}-{epoch}", TestGroup::Bulk), TestGroup::Bulk, epoch)
                    .with_option(WRITE_MODE_OPTION, "bulk")
                    .with_option(CONTENT_TYPE_OPTION, OverrideMediaType::NdJson.as_str())
                    .with_writes(BULK_WRITE_COUNT),
            );
        }
        matrix
    }

    /// Add a case in canonical position
    pub fn push(&mut self, case: TestCase) {
        let at = self
            .cases
            .partition_point(|c| (c.group, c.epoch) <= (case.group, case.epoch));
        self.cases.insert(at, Arc::new(case));
    }

    /// Keep only the selected groups and epochs; an empty slice selects all
    #[must_use]
    pub fn filter(self, groups: &[TestGroup], epochs: &[ServerEpoch]) -> Self {
        let cases = self
            .cases
            .into_iter()
            .filter(|c| groups.is_empty() || groups.contains(&c.group))
            .filter(|c| epochs.is_empty() || epochs.contains(&c.epoch))
            .collect();
        Self { cases }
    }

    /// Cases in canonical order
    #[inline]
    #[must_use]
    pub fn cases(&self) -> &[Arc<TestCase>] {
        &self.cases
    }

    /// Per-epoch lanes, each in canonical order
    #[must_use]
    pub fn lanes(&self) -> BTreeMap<ServerEpoch, Vec<Arc<TestCase>>> {
        let mut lanes: BTreeMap<ServerEpoch, Vec<Arc<TestCase>>> = BTreeMap::new();
        for case in &self.cases {
            lanes.entry(case.epoch).or_default().push(Arc::clone(case));
        }
        lanes
    }

    /// Names of cases whose index stem repeats an earlier case's
    #[must_use]
    pub fn colliding_cases(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.cases
            .iter()
            .filter(|c| !seen.insert(c.index_stem()))
            .map(|c| c.name.clone())
            .collect()
    }

    /// Epochs with at least one case
    #[must_use]
    pub fn epochs(&self) -> Vec<ServerEpoch> {
        self.lanes().into_keys().collect()
    }

    /// Number of cases
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Whether the matrix has no cases
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reference_matrix_shape() {
        let matrix = TestMatrix::reference();
        assert_eq!(matrix.len(), 9);

        let names: Vec<&str> = matrix.cases().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "baseline-v7",
                "baseline-v8",
                "baseline-v9",
                "direct-index-v7",
                "direct-index-v8",
                "direct-index-v9",
                "bulk-v7",
                "bulk-v8",
                "bulk-v9",
            ]
        );

        let bulk = &matrix.cases()[6];
        assert_eq!(bulk.write_count, 10);
        assert_eq!(bulk.expected_min_docs, 10);
        assert_eq!(bulk.extra_config["content_type"], "application/x-ndjson");

        let baseline = &matrix.cases()[0];
        assert!(baseline.extra_config.is_empty());
        assert_eq!(baseline.expected_min_docs, 1);
    }

    #[test]
    fn push_keeps_canonical_order() {
        let mut matrix = TestMatrix::new();
        matrix.push(TestCase::new("b9", TestGroup::Bulk, ServerEpoch::V9));
        matrix.push(TestCase::new("a7", TestGroup::Baseline, ServerEpoch::V7));
        matrix.push(TestCase::new("b7", TestGroup::Bulk, ServerEpoch::V7));
        matrix.push(TestCase::new("b7-second", TestGroup::Bulk, ServerEpoch::V7));

        let names: Vec<&str> = matrix.cases().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a7", "b7", "b7-second", "b9"]);
    }

    #[test]
    fn colliding_index_stems() {
        assert!(TestMatrix::reference().colliding_cases().is_empty());

        let mut matrix = TestMatrix::new();
        matrix.push(TestCase::new("b7", TestGroup::Bulk, ServerEpoch::V7));
        matrix.push(TestCase::new("b7-second", TestGroup::Bulk, ServerEpoch::V7));
        assert!(matrix.colliding_cases().is_empty());
        matrix.push(TestCase::new("B7", TestGroup::Baseline, ServerEpoch::V9));
        assert_eq!(matrix.colliding_cases(), vec!["b7".to_string()]);
    }

    #[test]
    fn filter_and_lanes() {
        let matrix = TestMatrix::reference().filter(&[TestGroup::Bulk, TestGroup::Baseline], &[ServerEpoch::V8]);
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix.epochs(), vec![ServerEpoch::V8]);

        let lanes = TestMatrix::reference().lanes();
        assert_eq!(lanes.len(), 3);
        let v7: Vec<TestGroup> = lanes[&ServerEpoch::V7].iter().map(|c| c.group).collect();
        assert_eq!(v7, TestGroup::ALL.to_vec());
    }
}
