use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::metrics::VariantResult;
use super::modification::Modification;
use crate::error::ExperimentError;
use crate::types::FormId;

/// Traffic split weights must add up to exactly this many percentage points.
pub const TOTAL_TRAFFIC: u32 = 100;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TestStatus,
    pub variants: Vec<Variant>,
    /// One weight per variant, in percentage points.
    pub traffic_split: Vec<u32>,
    pub created_at: i64,
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targeting: Option<Targeting>,
    #[serde(default)]
    pub goals: Vec<Goal>,
    /// Per-variant accumulators, ordered like `variants`. Variants that have
    /// never received an event have no entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<VariantResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    /// 0–100.
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Draft,
    Running,
    Paused,
    Completed,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Draft => "draft",
            TestStatus::Running => "running",
            TestStatus::Paused => "paused",
            TestStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: String,
    pub name: String,
    pub form_id: FormId,
    #[serde(default)]
    pub modifications: Vec<Modification>,
    /// Display copy of this variant's traffic split entry.
    pub weight: u32,
}

/// Audience targeting. Carried for the host to evaluate; the engine does
/// not filter users with it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Targeting {
    #[serde(default)]
    pub criteria: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_percentage: Option<f64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    #[serde(rename = "type")]
    pub kind: GoalKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GoalKind {
    Conversion,
    CompletionRate,
    TimeOnForm,
    DropOffRate,
    CustomEvent,
}

/// Caller-supplied shape of a new test. Ids, status, dates and results are
/// owned by the engine.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TestDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub variants: Vec<VariantDefinition>,
    pub traffic_split: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targeting: Option<Targeting>,
    #[serde(default)]
    pub goals: Vec<Goal>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VariantDefinition {
    /// Generated when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub form_id: FormId,
    #[serde(default)]
    pub modifications: Vec<Modification>,
}

impl VariantDefinition {
    pub fn new(id: &str, name: &str, form_id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            name: name.to_string(),
            form_id: form_id.to_string(),
            modifications: Vec::new(),
        }
    }

    pub fn with_modifications(mut self, modifications: Vec<Modification>) -> Self {
        self.modifications = modifications;
        self
    }
}

/// Checks that there is one weight per variant and that they sum to exactly
/// [`TOTAL_TRAFFIC`].
pub fn validate_traffic_split(split: &[u32], variant_count: usize) -> Result<(), ExperimentError> {
    if split.len() != variant_count {
        return Err(ExperimentError::Validation(format!(
            "trafficSplit has {} entries but there are {} variants",
            split.len(),
            variant_count
        )));
    }
    let total: u64 = split.iter().map(|&w| u64::from(w)).sum();
    if total != u64::from(TOTAL_TRAFFIC) {
        return Err(ExperimentError::Validation(format!(
            "trafficSplit must sum to {}, got {}",
            TOTAL_TRAFFIC, total
        )));
    }
    Ok(())
}

impl TestDefinition {
    pub fn validate(&self) -> Result<(), ExperimentError> {
        validate_traffic_split(&self.traffic_split, self.variants.len())?;
        let mut seen = HashSet::new();
        for variant in &self.variants {
            if let Some(id) = &variant.id {
                if id.is_empty() {
                    return Err(ExperimentError::Validation(
                        "variant id must not be empty".to_string(),
                    ));
                }
                if !seen.insert(id.as_str()) {
                    return Err(ExperimentError::Validation(format!(
                        "duplicate variant id: {}",
                        id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Materialises the variants, generating missing ids and copying each
    /// weight from the split. Call after [`TestDefinition::validate`].
    pub(crate) fn build_variants(&self) -> Vec<Variant> {
        self.variants
            .iter()
            .zip(&self.traffic_split)
            .map(|(def, &weight)| Variant {
                id: def
                    .id
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                name: def.name.clone(),
                form_id: def.form_id.clone(),
                modifications: def.modifications.clone(),
                weight,
            })
            .collect()
    }
}

impl Test {
    pub fn validate(&self) -> Result<(), ExperimentError> {
        validate_traffic_split(&self.traffic_split, self.variants.len())?;
        let mut seen = HashSet::new();
        for variant in &self.variants {
            if !seen.insert(variant.id.as_str()) {
                return Err(ExperimentError::Validation(format!(
                    "duplicate variant id: {}",
                    variant.id
                )));
            }
        }
        if !(0.0..=100.0).contains(&self.confidence) {
            return Err(ExperimentError::Validation(format!(
                "confidence must be within 0..=100, got {}",
                self.confidence
            )));
        }
        Ok(())
    }

    pub fn variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    pub fn variant_index(&self, variant_id: &str) -> Option<usize> {
        self.variants.iter().position(|v| v.id == variant_id)
    }

    pub fn result(&self, variant_id: &str) -> Option<&VariantResult> {
        self.results
            .as_ref()?
            .iter()
            .find(|r| r.variant_id == variant_id)
    }

    /// Replaces the split and refreshes each variant's display weight.
    pub(crate) fn set_traffic_split(&mut self, split: Vec<u32>) -> Result<(), ExperimentError> {
        validate_traffic_split(&split, self.variants.len())?;
        for (variant, &weight) in self.variants.iter_mut().zip(&split) {
            variant.weight = weight;
        }
        self.traffic_split = split;
        Ok(())
    }
}
