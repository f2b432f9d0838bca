//! Per-variant result accumulation.
//!
//! Callers observe conversions themselves and report partial metrics; this
//! module only folds them into the variant's running [`VariantResult`].
//!
//! **Smoothing rule:** `averageTime` and `dropOffRate` move halfway towards
//! each new sample (`(old + incoming) / 2`). This is a pairwise smoothing,
//! not an arithmetic mean over all samples, and existing dashboards depend on
//! exactly these values.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::config::Test;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VariantResult {
    pub variant_id: String,
    pub submissions: u64,
    pub conversions: u64,
    /// conversions / submissions × 100.
    pub completion_rate: f64,
    /// Seconds.
    pub average_time: f64,
    /// Percentage.
    pub drop_off_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_metrics: Option<HashMap<String, serde_json::Value>>,
}

impl VariantResult {
    pub fn empty(variant_id: &str) -> Self {
        Self {
            variant_id: variant_id.to_string(),
            ..Default::default()
        }
    }

    pub fn fold(&mut self, event: &MetricsEvent) {
        self.submissions = self.submissions.saturating_add(event.submissions);
        self.conversions = self.conversions.saturating_add(event.conversions);
        if let Some(t) = event.average_time {
            self.average_time = (self.average_time + t) / 2.0;
        }
        if let Some(d) = event.drop_off_rate {
            self.drop_off_rate = (self.drop_off_rate + d) / 2.0;
        }
        if let Some(custom) = &event.custom_metrics {
            let metrics = self.custom_metrics.get_or_insert_with(HashMap::new);
            for (k, v) in custom {
                metrics.insert(k.clone(), v.clone());
            }
        }
        if self.submissions > 0 {
            self.completion_rate = self.conversions as f64 / self.submissions as f64 * 100.0;
        }
    }
}

/// Partial metrics reported for one variant. Absent samples leave the
/// corresponding smoothed value untouched.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MetricsEvent {
    #[serde(default)]
    pub submissions: u64,
    #[serde(default)]
    pub conversions: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_off_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_metrics: Option<HashMap<String, serde_json::Value>>,
}

impl MetricsEvent {
    pub fn counts(submissions: u64, conversions: u64) -> Self {
        Self {
            submissions,
            conversions,
            ..Default::default()
        }
    }

    pub fn with_average_time(mut self, seconds: f64) -> Self {
        self.average_time = Some(seconds);
        self
    }

    pub fn with_drop_off_rate(mut self, pct: f64) -> Self {
        self.drop_off_rate = Some(pct);
        self
    }
}

/// Folds `event` into the result for `variant_id`, materialising a zeroed
/// result on first contact. Results stay ordered like the test's variants so
/// that `results[0]` is always the earliest-declared variant with data.
///
/// Returns `false` when the variant is not part of the test.
pub fn record(test: &mut Test, variant_id: &str, event: &MetricsEvent) -> bool {
    let Some(order) = test.variant_index(variant_id) else {
        return false;
    };
    let variant_order: HashMap<&str, usize> = test
        .variants
        .iter()
        .enumerate()
        .map(|(i, v)| (v.id.as_str(), i))
        .collect();

    let results = test.results.get_or_insert_with(Vec::new);
    let slot = match results.iter().position(|r| r.variant_id == variant_id) {
        Some(i) => i,
        None => {
            let insert_at = results
                .iter()
                .position(|r| {
                    variant_order
                        .get(r.variant_id.as_str())
                        .is_some_and(|&o| o > order)
                })
                .unwrap_or(results.len());
            results.insert(insert_at, VariantResult::empty(variant_id));
            insert_at
        }
    };
    results[slot].fold(event);
    true
}
