//! Final inference over gathered evidence.

use std::collections::BTreeSet;

use crate::agent::types::{ChainLink, Hypothesis, HypothesisKind, Observation};
use crate::counterfactual;
use crate::dag::{EdgeType, NodeType};
use crate::debt::{compute_digital_debt, compute_metabolic_debt, round_score, GlucoseCrash, MealDebtInput};
use crate::evidence::{Evidence, MealRecord, PulseWindow};
use crate::glucose::GlucoseSnapshot;

const SUPPORT_WEIGHT: f64 = 0.3;
const PRIOR_WEIGHT: f64 = 0.2;
const DEFAULT_MEAL_HOUR: u32 = 12;

/// Output of the inference phase.
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    /// Winning branch, if any hypothesis was scored.
    pub conclusion: Option<HypothesisKind>,
    /// Winning score over the sum of all scores.
    pub confidence: f64,
    /// Template chain for the conclusion.
    pub causal_chain: Vec<ChainLink>,
    /// Human-readable account.
    pub narrative: String,
    /// Metabolic debt, `None` without usable cooking data.
    pub metabolic_debt: Option<f64>,
    /// Digital debt, `None` without usable screen data.
    pub digital_debt: Option<f64>,
    /// Rule-based suggestions.
    pub counterfactuals: Vec<String>,
}

/// Observations that carry data from a source the guard did not exclude.
fn usable<'a>(
    observations: &'a [Observation],
    excluded: &'a BTreeSet<String>,
) -> impl Iterator<Item = &'a Observation> + 'a {
    observations
        .iter()
        .filter(move |o| o.has_data() && !excluded.contains(o.source()))
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Score hypotheses and pick a conclusion.
///
/// Each hypothesis scores `prior * 0.2 + 0.3` per usable supporting
/// observation, so the priors decide when no probe supports anything. The
/// first hypothesis in generation order wins ties. Confidence is the winning
/// score over the sum of all scores; with no hypotheses there is no
/// conclusion.
#[must_use]
pub fn score(
    hypotheses: &[Hypothesis],
    observations: &[Observation],
    excluded: &BTreeSet<String>,
) -> (Option<HypothesisKind>, f64) {
    let scores: Vec<(HypothesisKind, f64)> = hypotheses
        .iter()
        .map(|h| {
            let support = usable(observations, excluded)
                .filter(|o| o.supports == Some(h.kind))
                .count();
            #[allow(clippy::cast_precision_loss)]
            let s = h.prior_probability * PRIOR_WEIGHT + SUPPORT_WEIGHT * support as f64;
            (h.kind, s)
        })
        .collect();

    let mut best: Option<(HypothesisKind, f64)> = None;
    for &(kind, s) in &scores {
        if best.map_or(true, |(_, b)| s > b) {
            best = Some((kind, s));
        }
    }
    let total: f64 = scores.iter().map(|(_, s)| s).sum();
    match best {
        Some((kind, s)) if total > 0.0 => (Some(kind), round3(s / total)),
        _ => (None, 0.0),
    }
}

/// Illustrative chain for a conclusion.
#[must_use]
pub fn chain_for(conclusion: Option<HypothesisKind>) -> Vec<ChainLink> {
    match conclusion {
        Some(HypothesisKind::Metabolic) => vec![
            ChainLink::new(NodeType::Meal, NodeType::Glucose, EdgeType::MealToGlucose),
            ChainLink::new(NodeType::Glucose, NodeType::Physiological, EdgeType::GlucoseToHrv),
        ],
        Some(HypothesisKind::Digital) => vec![ChainLink::new(
            NodeType::Behavioral,
            NodeType::Physiological,
            EdgeType::BehaviorToHrv,
        )],
        None => Vec::new(),
    }
}

/// Human-readable account of the reasoning.
#[must_use]
pub fn narrative(
    symptom: &str,
    conclusion: Option<HypothesisKind>,
    confidence: f64,
    observations: &[Observation],
    excluded: &BTreeSet<String>,
) -> String {
    let mut parts = vec![format!("Investigating symptom: \"{symptom}\".")];

    let contributing: Vec<&str> = usable(observations, excluded).map(Observation::source).collect();
    if !contributing.is_empty() {
        parts.push(format!("Data from: {}.", contributing.join(", ")));
    }
    if !excluded.is_empty() {
        let names: Vec<&str> = excluded.iter().map(String::as_str).collect();
        parts.push(format!("No data from: {} (excluded from reasoning).", names.join(", ")));
    }

    parts.push(
        match conclusion {
            Some(HypothesisKind::Metabolic) => {
                "Evidence points to a metabolic pathway: meal composition affecting glucose \
                 response, which in turn impacts physiological markers."
            }
            Some(HypothesisKind::Digital) => {
                "Evidence points to a digital pathway: screen behavior patterns affecting HRV \
                 and autonomic regulation."
            }
            None => "Insufficient evidence to determine a clear causal pathway.",
        }
        .to_string(),
    );
    parts.push(format!("Confidence: {:.0}%.", confidence * 100.0));
    parts.join(" ")
}

fn usable_evidence<'a>(
    observations: &'a [Observation],
    excluded: &'a BTreeSet<String>,
) -> impl Iterator<Item = &'a Evidence> + 'a {
    usable(observations, excluded).map(Observation::evidence)
}

fn meal_input(
    meal: &MealRecord,
    glucose: Option<&GlucoseSnapshot>,
    pulse: Option<&PulseWindow>,
) -> MealDebtInput {
    let (peak, nadir) = glucose.map_or((0.0, 0.0), |g| {
        (
            g.window_peak_mg_dl.unwrap_or(g.value_mg_dl),
            g.window_nadir_mg_dl.unwrap_or(g.value_mg_dl),
        )
    });
    // Without both ends of the HRV comparison there is no measurable drop.
    let (post, baseline) = pulse
        .and_then(|p| p.hrv_ms.zip(p.baseline_hrv_ms))
        .unwrap_or((0.0, 0.0));

    MealDebtInput {
        glycemic_load: meal.glycemic_load.unwrap_or(0.0),
        peak_glucose: peak,
        nadir_glucose: nadir,
        post_meal_hrv_avg: post,
        baseline_hrv_avg: baseline,
        bioavailability_modifier: meal.bioavailability_modifier,
        meal_hour: meal.meal_hour.unwrap_or(DEFAULT_MEAL_HOUR),
    }
}

/// Metabolic and digital debt from usable evidence.
///
/// A score is `None` when its driving source (cooking log, screen activity)
/// is absent or excluded.
#[must_use]
pub fn debt_scores(observations: &[Observation], excluded: &BTreeSet<String>) -> (Option<f64>, Option<f64>) {
    let glucose = usable_evidence(observations, excluded).find_map(Evidence::as_glucose);
    let pulse = usable_evidence(observations, excluded).find_map(Evidence::as_pulse);

    let meals: Option<Vec<MealDebtInput>> = {
        let mut logs = usable_evidence(observations, excluded)
            .filter_map(Evidence::as_cooking)
            .peekable();
        logs.peek().is_some().then(|| {
            logs.flat_map(|log| log.meals.iter())
                .map(|m| meal_input(m, glucose, pulse))
                .collect()
        })
    };
    let metabolic = meals.map(|m| round_score(compute_metabolic_debt(&m)));

    let digital = usable_evidence(observations, excluded)
        .find_map(Evidence::as_screen)
        .map(|screen| {
            let mut crashes = screen.crashes.clone();
            if let Some(g) = glucose.filter(|g| g.energy_state.is_some_and(|e| e.is_crash())) {
                crashes.push(GlucoseCrash { timestamp: g.timestamp });
            }
            round_score(compute_digital_debt(&screen.events, &crashes))
        });

    (metabolic, digital)
}

/// Run inference.
#[must_use]
pub fn infer(
    symptom: &str,
    hypotheses: &[Hypothesis],
    observations: &[Observation],
    excluded: &BTreeSet<String>,
) -> Inference {
    let (conclusion, confidence) = score(hypotheses, observations, excluded);
    let (metabolic_debt, digital_debt) = debt_scores(observations, excluded);
    Inference {
        conclusion,
        confidence,
        causal_chain: chain_for(conclusion),
        narrative: narrative(symptom, conclusion, confidence, observations, excluded),
        metabolic_debt,
        digital_debt,
        counterfactuals: counterfactual::for_conclusion(conclusion, observations),
    }
}
