use serde::Serialize;
use std::fmt;

use super::config::{Test, TestStatus};
use super::metrics::VariantResult;
use super::modification::Modification;
use super::stats::Comparison;

pub const NO_RESULTS: &str = "No results available";

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportedResults {
    pub test: TestSummary,
    pub variants: Vec<VariantSummary>,
    pub results: Vec<VariantResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Comparison>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestSummary {
    pub id: String,
    pub name: String,
    pub status: TestStatus,
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
    pub confidence: f64,
    pub winner: Option<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VariantSummary {
    pub id: String,
    pub name: String,
    pub weight: u32,
    pub modifications: Vec<Modification>,
}

pub fn export(test: &Test, analysis: Option<Comparison>) -> ExportedResults {
    ExportedResults {
        test: TestSummary {
            id: test.id.clone(),
            name: test.name.clone(),
            status: test.status,
            start_date: test.start_date,
            end_date: test.end_date,
            confidence: test.confidence,
            winner: test.winner.clone(),
        },
        variants: test
            .variants
            .iter()
            .map(|v| VariantSummary {
                id: v.id.clone(),
                name: v.name.clone(),
                weight: v.weight,
                modifications: v.modifications.clone(),
            })
            .collect(),
        results: test.results.clone().unwrap_or_default(),
        analysis,
    }
}

/// Plain-text summary. Same test state always renders the same text.
pub fn render(test: &Test) -> String {
    match test.results.as_deref() {
        Some(results) if !results.is_empty() => TextReport { test, results }.to_string(),
        _ => NO_RESULTS.to_string(),
    }
}

struct TextReport<'a> {
    test: &'a Test,
    results: &'a [VariantResult],
}

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let test = self.test;
        writeln!(f, "A/B Test Report: {}", test.name)?;
        writeln!(f, "Status: {}", test.status)?;
        writeln!(f, "Confidence: {:.2}%", test.confidence)?;
        match test.winner.as_deref() {
            Some(id) => writeln!(f, "Winner: {}", variant_label(test, id))?,
            None => writeln!(f, "Winner: none")?,
        }

        for result in self.results {
            writeln!(f)?;
            writeln!(f, "Variant: {}", variant_label(test, &result.variant_id))?;
            writeln!(f, "  Submissions: {}", result.submissions)?;
            writeln!(f, "  Conversions: {}", result.conversions)?;
            writeln!(f, "  Completion rate: {:.2}%", result.completion_rate)?;
            writeln!(f, "  Average time: {:.1}s", result.average_time)?;
            writeln!(f, "  Drop-off rate: {:.2}%", result.drop_off_rate)?;
        }

        if let [control, treatment, ..] = self.results {
            writeln!(f)?;
            write!(
                f,
                "Improvement of {} over {}: ",
                variant_label(test, &treatment.variant_id),
                variant_label(test, &control.variant_id),
            )?;
            match relative_improvement(control, treatment) {
                Some(pct) => writeln!(f, "{:+.2}%", pct)?,
                None => writeln!(f, "n/a")?,
            }
        }
        Ok(())
    }
}

/// Percent change of the treatment's completion rate over the control's.
/// Undefined when the control rate is zero.
fn relative_improvement(control: &VariantResult, treatment: &VariantResult) -> Option<f64> {
    if control.completion_rate == 0.0 {
        return None;
    }
    Some((treatment.completion_rate - control.completion_rate) / control.completion_rate * 100.0)
}

fn variant_label(test: &Test, variant_id: &str) -> String {
    match test.variant(variant_id) {
        Some(v) if v.name != v.id => format!("{} ({})", v.name, v.id),
        _ => variant_id.to_string(),
    }
}
