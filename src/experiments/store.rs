use std::collections::HashMap;

use dashmap::DashMap;

use super::apply::apply_variant;
use super::assignment::{self, AssignmentTable};
use super::config::{Test, TestDefinition, TestStatus};
use super::metrics::{self, MetricsEvent};
use super::report::{self, ExportedResults};
use super::snapshot::Snapshot;
use super::stats::{self, Comparison};
use crate::config::EngineConfig;
use crate::error::{ExperimentError, Result};
use crate::types::FormDocument;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Shared experimentation service: the test registry plus the sticky
/// assignment table. Every method takes `&self`; wrap in an `Arc` to share
/// across request handlers.
///
/// Lock order is always test entry first, assignment entry second, and a
/// test entry is never held while another test's entry is taken.
pub struct ExperimentStore {
    tests: DashMap<String, Test>,
    assignments: AssignmentTable,
    config: EngineConfig,
}

impl Default for ExperimentStore {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl ExperimentStore {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            tests: DashMap::new(),
            assignments: AssignmentTable::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Registry ────────────────────────────────────────────────────

    pub fn create_test(&self, definition: TestDefinition) -> Result<Test> {
        definition.validate()?;
        let test = Test {
            id: uuid::Uuid::new_v4().to_string(),
            name: definition.name.clone(),
            description: definition.description.clone(),
            status: TestStatus::Draft,
            variants: definition.build_variants(),
            traffic_split: definition.traffic_split.clone(),
            created_at: now_ms(),
            start_date: None,
            end_date: None,
            targeting: definition.targeting.clone(),
            goals: definition.goals.clone(),
            results: None,
            winner: None,
            confidence: 0.0,
        };
        if self.tests.contains_key(&test.id) {
            return Err(ExperimentError::AlreadyExists(test.id));
        }
        self.tests.insert(test.id.clone(), test.clone());
        tracing::info!(
            test_id = %test.id,
            name = %test.name,
            variants = test.variants.len(),
            "created test"
        );
        Ok(test)
    }

    /// Replaces the definition of a draft test, keeping its id and creation
    /// time. Results, winner and confidence are reset since they describe
    /// the replaced variants.
    pub fn update_test(&self, id: &str, definition: TestDefinition) -> Result<Test> {
        definition.validate()?;
        let mut entry = self
            .tests
            .get_mut(id)
            .ok_or_else(|| ExperimentError::NotFound(id.to_string()))?;
        if entry.status != TestStatus::Draft {
            return Err(ExperimentError::InvalidStatus(entry.status.to_string()));
        }
        entry.name = definition.name.clone();
        entry.description = definition.description.clone();
        entry.variants = definition.build_variants();
        entry.traffic_split = definition.traffic_split.clone();
        entry.targeting = definition.targeting.clone();
        entry.goals = definition.goals.clone();
        entry.results = None;
        entry.winner = None;
        entry.confidence = 0.0;
        tracing::info!(test_id = %id, "updated draft test");
        Ok(entry.clone())
    }

    /// Edits the split of a test that has not completed. Users already
    /// assigned keep their variant.
    pub fn set_traffic_split(&self, id: &str, split: Vec<u32>) -> Result<Test> {
        let mut entry = self
            .tests
            .get_mut(id)
            .ok_or_else(|| ExperimentError::NotFound(id.to_string()))?;
        if entry.status == TestStatus::Completed {
            return Err(ExperimentError::InvalidStatus(entry.status.to_string()));
        }
        entry.set_traffic_split(split)?;
        tracing::info!(test_id = %id, split = ?entry.traffic_split, "traffic split changed");
        Ok(entry.clone())
    }

    pub fn start_test(&self, id: &str) -> bool {
        let Some(mut test) = self.tests.get_mut(id) else {
            return false;
        };
        match test.status {
            TestStatus::Draft | TestStatus::Paused => {
                if test.status == TestStatus::Draft && test.start_date.is_none() {
                    test.start_date = Some(now_ms());
                }
                test.status = TestStatus::Running;
                tracing::info!(test_id = %id, "test running");
                true
            }
            _ => false,
        }
    }

    pub fn pause_test(&self, id: &str) -> bool {
        let Some(mut test) = self.tests.get_mut(id) else {
            return false;
        };
        if test.status != TestStatus::Running {
            return false;
        }
        test.status = TestStatus::Paused;
        tracing::info!(test_id = %id, "test paused");
        true
    }

    /// Completes the test from any other status.
    pub fn stop_test(&self, id: &str) -> bool {
        let Some(mut test) = self.tests.get_mut(id) else {
            return false;
        };
        if test.status == TestStatus::Completed {
            return false;
        }
        test.status = TestStatus::Completed;
        test.end_date = Some(now_ms());
        tracing::info!(test_id = %id, "test stopped");
        true
    }

    /// Removes the test and every user's assignment to it.
    pub fn delete_test(&self, id: &str) -> bool {
        if self.tests.remove(id).is_none() {
            return false;
        }
        let purged = self.assignments.purge_test(id);
        tracing::info!(test_id = %id, purged_assignments = purged, "test deleted");
        true
    }

    pub fn list_tests(&self) -> Vec<Test> {
        let mut tests: Vec<Test> = self.tests.iter().map(|e| e.value().clone()).collect();
        tests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tests
    }

    pub fn list_tests_by_status(&self, status: TestStatus) -> Vec<Test> {
        self.list_tests()
            .into_iter()
            .filter(|t| t.status == status)
            .collect()
    }

    pub fn get_test_results(&self, id: &str) -> Option<Test> {
        self.tests.get(id).map(|t| t.clone())
    }

    // ── Assignment ──────────────────────────────────────────────────

    /// Variant the user sees in a running test. The first answer for a pair
    /// is stored and returned forever after.
    pub fn get_variant_for_user(&self, test_id: &str, user_id: &str) -> Option<String> {
        // Held across the assignment so a concurrent delete cannot purge
        // before this pair is recorded.
        let test = self.tests.get(test_id)?;
        if test.status != TestStatus::Running || test.variants.is_empty() {
            return None;
        }
        let (variant_id, created) = self.assignments.get_or_assign(test_id, user_id, || {
            let r = assignment::draw(
                self.config.assignment,
                test_id,
                user_id,
                self.config.hash_seed,
            );
            let index = assignment::pick_variant(&test.traffic_split, r);
            test.variants[index].id.clone()
        });
        if created {
            tracing::debug!(
                test_id = %test_id,
                user_id = %user_id,
                variant_id = %variant_id,
                "assigned variant"
            );
        }
        Some(variant_id)
    }

    pub fn assignments_for_user(&self, user_id: &str) -> HashMap<String, String> {
        self.assignments.for_user(user_id)
    }

    /// Assigns the user and renders their variant of `base`. Returns `None`
    /// when the test is not running.
    pub fn render_for_user(
        &self,
        test_id: &str,
        user_id: &str,
        base: &FormDocument,
    ) -> Option<FormDocument> {
        let variant_id = self.get_variant_for_user(test_id, user_id)?;
        let test = self.tests.get(test_id)?;
        let variant = test.variant(&variant_id)?;
        Some(apply_variant(base, variant))
    }

    // ── Metrics & significance ──────────────────────────────────────

    /// Folds `event` into the variant's results and re-evaluates
    /// significance. Returns `false` for an unknown test or variant.
    pub fn record_event(&self, test_id: &str, variant_id: &str, event: &MetricsEvent) -> bool {
        let Some(mut test) = self.tests.get_mut(test_id) else {
            return false;
        };
        if !metrics::record(&mut test, variant_id, event) {
            tracing::debug!(
                test_id = %test_id,
                variant_id = %variant_id,
                "event for unknown variant ignored"
            );
            return false;
        }
        self.recompute_significance(&mut test);
        true
    }

    fn recompute_significance(&self, test: &mut Test) {
        let Some(comparison) = stats::compare_leading_variants(test, self.config.min_submissions)
        else {
            return;
        };
        test.confidence = comparison.z_test.confidence;
        if test.confidence > self.config.confidence_threshold {
            test.winner = Some(comparison.leader.clone());
            if test.status == TestStatus::Running {
                test.status = TestStatus::Completed;
                test.end_date = Some(now_ms());
                tracing::info!(
                    test_id = %test.id,
                    winner = %comparison.leader,
                    confidence = test.confidence,
                    z_score = comparison.z_test.z_score,
                    "significance reached, test completed"
                );
            }
        }
    }

    /// Current comparison of the first two variants with results, without
    /// touching the stored test.
    pub fn analyze(&self, id: &str) -> Option<Comparison> {
        let test = self.tests.get(id)?;
        stats::compare_leading_variants(&test, self.config.min_submissions)
    }

    // ── Reporting ───────────────────────────────────────────────────

    pub fn export_results(&self, id: &str) -> Option<ExportedResults> {
        let test = self.tests.get(id)?;
        let analysis = stats::compare_leading_variants(&test, self.config.min_submissions);
        Some(report::export(&test, analysis))
    }

    pub fn generate_report(&self, id: &str) -> String {
        match self.tests.get(id) {
            Some(test) => report::render(&test),
            None => report::NO_RESULTS.to_string(),
        }
    }

    // ── Snapshots ───────────────────────────────────────────────────

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tests: self.list_tests(),
            assignments: self.assignments.export(),
        }
    }

    /// Rebuilds a store from a snapshot. Every test is re-validated; an
    /// invalid one fails the whole restore. Assignments to unknown tests are
    /// dropped.
    pub fn from_snapshot(config: EngineConfig, snapshot: Snapshot) -> Result<Self> {
        let store = Self::new(config);
        for test in snapshot.tests {
            test.validate()?;
            if store.tests.contains_key(&test.id) {
                return Err(ExperimentError::AlreadyExists(test.id));
            }
            store.tests.insert(test.id.clone(), test);
        }
        let mut dropped = 0usize;
        let assignments = snapshot
            .assignments
            .into_iter()
            .map(|(user, tests)| {
                let before = tests.len();
                let kept: HashMap<String, String> = tests
                    .into_iter()
                    .filter(|(test_id, _)| store.tests.contains_key(test_id))
                    .collect();
                dropped += before - kept.len();
                (user, kept)
            })
            .collect();
        if dropped > 0 {
            tracing::warn!(dropped, "snapshot assignments referenced unknown tests");
        }
        store.assignments.import(assignments);
        Ok(store)
    }
}
