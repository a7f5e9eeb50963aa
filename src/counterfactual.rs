//! Rule-based counterfactual suggestions.
//!
//! Suggestions are short hypothetical actions keyed on the concluded branch
//! (and, for the metabolic branch, on the most recent cooking session), or
//! on a DAG node's type prefix.

use crate::agent::{HypothesisKind, Observation};
use crate::dag::NodeType;
use crate::evidence::MealRecord;

/// At most this many suggestions are produced per conclusion.
pub const MAX_COUNTERFACTUALS: usize = 3;

const LARGE_PORTION_COUNT: u32 = 3;

const MULTIGRAIN: &str = "Switching from white to multigrain flour could reduce glycemic load by ~35%";
const SMALLER_PORTION: &str = "Reducing portion by 1 roti could lower the glucose spike";
const EARLIER_MEAL: &str =
    "Eating earlier in the evening (before 8 PM) would remove the late-meal timing penalty";
const SCREEN_BREAK: &str = "A 30-minute screen break could allow HRV recovery";
const FOCUS_MODE: &str = "Enabling focus mode would reduce app-switching frequency";

fn latest_meal(observations: &[Observation]) -> Option<&MealRecord> {
    observations
        .iter()
        .filter_map(|o| o.evidence().as_cooking())
        .find_map(|log| log.meals.first())
}

/// Suggestions for a concluded branch.
///
/// Only observations that carry data are consulted, so excluded sources
/// never shape a suggestion.
#[must_use]
pub fn for_conclusion(conclusion: Option<HypothesisKind>, observations: &[Observation]) -> Vec<String> {
    let mut out = Vec::new();
    match conclusion {
        Some(HypothesisKind::Metabolic) => {
            if let Some(meal) = latest_meal(observations) {
                if meal
                    .flour_type
                    .as_deref()
                    .is_some_and(|f| f.eq_ignore_ascii_case("white"))
                {
                    out.push(MULTIGRAIN.to_string());
                }
                if meal.portion_count.is_some_and(|n| n > LARGE_PORTION_COUNT) {
                    out.push(SMALLER_PORTION.to_string());
                }
            }
            out.push(EARLIER_MEAL.to_string());
        }
        Some(HypothesisKind::Digital) => {
            out.push(SCREEN_BREAK.to_string());
            out.push(FOCUS_MODE.to_string());
        }
        None => {}
    }
    out.truncate(MAX_COUNTERFACTUALS);
    out
}

/// Suggestions for a DAG node, chosen by its ID prefix.
#[must_use]
pub fn for_node(node_id: &str) -> Vec<String> {
    let suggestions: &[&str] = match NodeType::from_node_id(node_id) {
        Some(NodeType::Meal) => &[
            "Switching to multigrain flour could reduce glycemic load by ~35%",
            "Reducing portion size by 1 serving could lower the glucose spike",
            "Eating before 8 PM removes the late-meal timing penalty",
        ],
        Some(NodeType::Behavioral) => &[
            SCREEN_BREAK,
            FOCUS_MODE,
            "Replacing passive scrolling with active engagement reduces dopamine debt",
        ],
        Some(NodeType::Glucose) => &[
            "A 10-minute walk post-meal could reduce the glucose spike by 20-30%",
            "Adding fiber-rich foods could flatten the glucose curve",
        ],
        _ => &["No counterfactuals available for this node type"],
    };
    suggestions.iter().map(|s| (*s).to_string()).collect()
}
