use serde::{Deserialize, Serialize};

use super::config::Test;
use super::metrics::VariantResult;

// ── Result Structs ──────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ZTestResult {
    pub z_score: f64,
    pub p_value: f64,
    /// (1 − p) × 100, clamped to 0–100.
    pub confidence: f64,
    pub control_rate: f64,
    pub treatment_rate: f64,
    /// (treatment − control) / control; 0 when control converts nothing.
    pub relative_improvement: f64,
}

/// Control-vs-treatment comparison of the first two variants with results.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub control_variant_id: String,
    pub treatment_variant_id: String,
    #[serde(flatten)]
    pub z_test: ZTestResult,
    /// Variant with the higher completion rate; control on ties.
    pub leader: String,
    pub sample_ratio_mismatch: bool,
}

// ── Normal Survival Function (A&S 26.2.17 with Horner's method) ─────

/// Computes P(Z > z) for the standard normal distribution.
/// Uses the Zelen & Severo rational approximation (Abramowitz & Stegun
/// 26.2.17), absolute error below 7.5e-8.
/// Caller must pass z >= 0 (use z.abs() before calling).
pub fn normal_sf(z: f64) -> f64 {
    debug_assert!(z >= 0.0, "normal_sf requires z >= 0, got {}", z);

    let t = 1.0 / (1.0 + 0.2316419 * z);
    let d = 0.3989422804014327; // 1/sqrt(2*pi)
    let p = d * (-z * z / 2.0).exp();

    // Horner's method for the polynomial
    let poly = t
        * (0.319381530
            + t * (-0.356563782 + t * (1.781477937 + t * (-1.821255978 + t * 1.330274429))));

    p * poly
}

/// Standard normal CDF Φ(z), defined for any sign of z.
pub fn normal_cdf(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 - normal_sf(z)
    } else {
        normal_sf(-z)
    }
}

// ── Two-Proportion Z-Test ───────────────────────────────────────────

/// Pooled two-proportion z-test on conversion counts.
///
/// Returns `None` when either arm is empty or the pooled standard error is
/// zero (both arms convert at 0% or 100%), since no z-score exists then.
pub fn two_proportion_z_test(
    control_conversions: u64,
    control_n: u64,
    treatment_conversions: u64,
    treatment_n: u64,
) -> Option<ZTestResult> {
    if control_n == 0 || treatment_n == 0 {
        return None;
    }
    let n_c = control_n as f64;
    let n_t = treatment_n as f64;
    let rate_c = control_conversions as f64 / n_c;
    let rate_t = treatment_conversions as f64 / n_t;

    let pooled = (control_conversions + treatment_conversions) as f64 / (n_c + n_t);
    let se = (pooled * (1.0 - pooled) * (1.0 / n_c + 1.0 / n_t)).sqrt();
    if se == 0.0 || !se.is_finite() {
        return None;
    }

    let z = (rate_t - rate_c).abs() / se;
    let p_value = (2.0 * (1.0 - normal_cdf(z))).clamp(0.0, 1.0);
    let confidence = ((1.0 - p_value) * 100.0).clamp(0.0, 100.0);

    let relative_improvement = if rate_c != 0.0 {
        (rate_t - rate_c) / rate_c
    } else {
        0.0
    };

    Some(ZTestResult {
        z_score: z,
        p_value,
        confidence,
        control_rate: rate_c,
        treatment_rate: rate_t,
        relative_improvement,
    })
}

// ── SRM Detection ───────────────────────────────────────────────────

/// Chi-squared test for sample ratio mismatch.
/// Returns true if chi2 > 6.635 (p=0.01 threshold).
pub fn check_sample_ratio_mismatch(
    control_n: u64,
    variant_n: u64,
    expected_variant_fraction: f64,
) -> bool {
    let total = control_n + variant_n;
    if total == 0 {
        return false;
    }
    let expected_control = total as f64 * (1.0 - expected_variant_fraction);
    let expected_variant = total as f64 * expected_variant_fraction;

    if expected_control == 0.0 || expected_variant == 0.0 {
        return false;
    }

    let chi2 = (control_n as f64 - expected_control).powi(2) / expected_control
        + (variant_n as f64 - expected_variant).powi(2) / expected_variant;

    chi2 > 6.635
}

// ── Leading-Pair Comparison ─────────────────────────────────────────

/// Compares `results[0]` (control) against `results[1]` (treatment).
/// Further variants are not compared.
///
/// Returns `None` until both arms have strictly more than `min_submissions`
/// submissions, or when the z-test is undefined.
pub fn compare_leading_variants(test: &Test, min_submissions: u64) -> Option<Comparison> {
    let results = test.results.as_ref()?;
    let (control, treatment) = match results.as_slice() {
        [control, treatment, ..] => (control, treatment),
        _ => return None,
    };
    if control.submissions <= min_submissions || treatment.submissions <= min_submissions {
        return None;
    }

    let z_test = two_proportion_z_test(
        control.conversions,
        control.submissions,
        treatment.conversions,
        treatment.submissions,
    )?;

    Some(Comparison {
        control_variant_id: control.variant_id.clone(),
        treatment_variant_id: treatment.variant_id.clone(),
        z_test,
        leader: leader(control, treatment).to_string(),
        sample_ratio_mismatch: split_mismatch(test, control, treatment),
    })
}

fn leader<'a>(control: &'a VariantResult, treatment: &'a VariantResult) -> &'a str {
    if treatment.completion_rate > control.completion_rate {
        &treatment.variant_id
    } else {
        &control.variant_id
    }
}

/// SRM between the two compared arms, judged against their share of the
/// configured split.
fn split_mismatch(test: &Test, control: &VariantResult, treatment: &VariantResult) -> bool {
    let weight = |id: &str| {
        test.variant_index(id)
            .and_then(|i| test.traffic_split.get(i))
            .copied()
            .unwrap_or(0) as f64
    };
    let (w_c, w_t) = (weight(&control.variant_id), weight(&treatment.variant_id));
    if w_c + w_t == 0.0 {
        return false;
    }
    check_sample_ratio_mismatch(control.submissions, treatment.submissions, w_t / (w_c + w_t))
}
