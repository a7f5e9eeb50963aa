//! Safety, no-hallucination and privacy guardrails.
//!
//! 1. Safety: HRV below the threshold preempts all reasoning.
//! 2. No hallucination: a source that returned no data can never be blamed.
//! 3. Privacy: outbound messages carry qualitative labels only.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::agent::HypothesisKind;
use crate::evidence::{Evidence, EvidenceResult};

/// HRV below this value (ms) is unsafe.
pub const HRV_SAFETY_THRESHOLD_MS: f64 = 20.0;

/// Maximum outbound SMS length, in characters.
pub const SMS_MAX_CHARS: usize = 320;

const ESCALATION_REASON: &str =
    "Critically low heart rate variability detected. Immediate rest intervention recommended.";

/// Result of the HRV safety check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyCheckResult {
    /// `true` lets reasoning continue; `false` demands a bypass.
    pub is_safe: bool,
    /// HRV the decision was based on, if any.
    pub hrv_value: Option<f64>,
    /// Why the check failed.
    pub escalation_reason: Option<String>,
}

impl SafetyCheckResult {
    fn safe(hrv_value: Option<f64>) -> Self {
        Self {
            is_safe: true,
            hrv_value,
            escalation_reason: None,
        }
    }
}

/// Check HRV against [`HRV_SAFETY_THRESHOLD_MS`].
#[must_use]
pub fn check_hrv_safety(pulse: &Evidence) -> SafetyCheckResult {
    check_hrv_safety_with_threshold(pulse, HRV_SAFETY_THRESHOLD_MS)
}

/// Check HRV against a configured threshold.
///
/// Missing pulse data or a missing HRV field is safe: absence of data cannot
/// assert danger.
#[must_use]
pub fn check_hrv_safety_with_threshold(pulse: &Evidence, threshold_ms: f64) -> SafetyCheckResult {
    let Some(hrv_ms) = pulse.as_pulse().and_then(|p| p.hrv_ms) else {
        return SafetyCheckResult::safe(None);
    };

    if hrv_ms < threshold_ms {
        return SafetyCheckResult {
            is_safe: false,
            hrv_value: Some(hrv_ms),
            escalation_reason: Some(ESCALATION_REASON.to_string()),
        };
    }

    SafetyCheckResult::safe(Some(hrv_ms))
}

/// Names of the sources that returned no data.
///
/// Inference must not score or blame anything in this set.
pub fn apply_hallucination_guard<'a, I>(results: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a EvidenceResult>,
{
    results
        .into_iter()
        .filter(|r| !r.has_data())
        .map(|r| r.source.clone())
        .collect()
}

fn numeric_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Any whitespace-delimited token containing a digit: values, units
    // glued to numbers, clock times, dates and device serials.
    RE.get_or_init(|| Regex::new(r"\S*\d\S*").expect("numeric token pattern is valid"))
}

/// Strip numeric tokens from a free-text label and collapse whitespace.
#[must_use]
pub fn scrub_label(text: &str) -> String {
    let scrubbed = numeric_token().replace_all(text, " ");
    scrubbed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Qualitative label for a conclusion.
#[must_use]
pub const fn conclusion_label(conclusion: HypothesisKind) -> &'static str {
    match conclusion {
        HypothesisKind::Metabolic => "dietary pattern",
        HypothesisKind::Digital => "screen behavior pattern",
    }
}

fn percent(confidence: f64) -> u32 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let pct = (confidence.clamp(0.0, 1.0) * 100.0).round() as u32;
    pct
}

/// Build a privacy-safe SMS body of at most [`SMS_MAX_CHARS`] characters.
///
/// The signature admits no raw values: only the symptom text (scrubbed of
/// numeric tokens), a mapped conclusion label and a rounded percentage.
#[must_use]
pub fn sanitize_for_sms(symptom: &str, conclusion: Option<HypothesisKind>, confidence: f64) -> String {
    let mut symptom = scrub_label(symptom);
    if symptom.is_empty() {
        symptom = "symptom reported".to_string();
    }

    let mut lines = vec!["VITA Health Alert".to_string(), format!("Detected: {symptom}")];
    if let Some(kind) = conclusion {
        lines.push(format!("Likely cause: {}", conclusion_label(kind)));
    }
    lines.push(format!("Confidence: {}%", percent(confidence)));
    lines.push("Open VITA for full details and recommendations.".to_string());

    let body = lines.join("\n");
    if body.chars().count() <= SMS_MAX_CHARS {
        return body;
    }

    // Too long: the symptom text is the only unbounded part, so shrink it.
    let fixed = body.chars().count() - symptom.chars().count();
    let room = SMS_MAX_CHARS.saturating_sub(fixed + 3);
    let shortened: String = symptom.chars().take(room).collect();
    let body = body.replacen(&format!("Detected: {symptom}"), &format!("Detected: {shortened}..."), 1);
    body.chars().take(SMS_MAX_CHARS).collect()
}
