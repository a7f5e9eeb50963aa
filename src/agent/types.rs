use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dag::{EdgeType, NodeType};
use crate::evidence::{Evidence, EvidenceResult};
use crate::trace::TraceId;

/// Candidate causal branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisKind {
    /// Meal composition acting through the glucose response.
    Metabolic,
    /// Screen behavior acting through HRV suppression.
    Digital,
}

impl HypothesisKind {
    /// Generation order. Hypotheses are generated in this order and inference
    /// breaks score ties by it.
    pub const ALL: [HypothesisKind; 2] = [HypothesisKind::Metabolic, HypothesisKind::Digital];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Metabolic => "metabolic",
            Self::Digital => "digital",
        }
    }
}

impl fmt::Display for HypothesisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate explanation with its prior, created per query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Branch this hypothesis argues for.
    pub kind: HypothesisKind,
    /// Plain-language statement of the hypothesis.
    pub description: String,
    /// Prior probability in `[0, 1]`.
    pub prior_probability: f64,
}

impl Hypothesis {
    /// Create a hypothesis; the prior is clamped to `[0, 1]`.
    #[must_use]
    pub fn new(kind: HypothesisKind, description: impl Into<String>, prior_probability: f64) -> Self {
        Self {
            kind,
            description: description.into(),
            prior_probability: prior_probability.clamp(0.0, 1.0),
        }
    }
}

/// Evidence gathered during a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// What the source returned.
    pub result: EvidenceResult,
    /// Hypothesis this observation bears on, if any.
    pub supports: Option<HypothesisKind>,
}

impl Observation {
    /// Wrap a fetched result.
    #[must_use]
    pub const fn new(result: EvidenceResult, supports: Option<HypothesisKind>) -> Self {
        Self { result, supports }
    }

    /// Source name.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.result.source
    }

    /// Payload, possibly [`Evidence::Unknown`].
    #[must_use]
    pub const fn evidence(&self) -> &Evidence {
        &self.result.evidence
    }

    /// False when the source returned no data.
    #[must_use]
    pub const fn has_data(&self) -> bool {
        self.result.has_data()
    }

    /// Value-free view used in persisted traces.
    #[must_use]
    pub fn record(&self) -> ObservationRecord {
        ObservationRecord {
            source: self.result.source.clone(),
            has_data: self.has_data(),
            supports: self.supports,
        }
    }
}

/// Persisted form of an [`Observation`]. Carries no sensor values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationRecord {
    /// Source name.
    pub source: String,
    /// Whether the source returned data.
    pub has_data: bool,
    /// Hypothesis the observation bears on, if any.
    pub supports: Option<HypothesisKind>,
}

/// One step of an explanation chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    /// Cause.
    pub from: NodeType,
    /// Effect.
    pub to: NodeType,
    /// Relationship between them.
    pub edge: EdgeType,
}

impl ChainLink {
    /// Create a link.
    #[must_use]
    pub const fn new(from: NodeType, to: NodeType, edge: EdgeType) -> Self {
        Self { from, to, edge }
    }
}

/// Final answer to a symptom query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalExplanation {
    /// The symptom as queried, trimmed.
    pub symptom: String,
    /// Winning branch, `None` on a safety bypass.
    pub conclusion: Option<HypothesisKind>,
    /// Confidence in `[0, 1]`, rounded to three decimals.
    pub confidence: f64,
    /// Template chain for the conclusion, cause first.
    pub causal_chain: Vec<ChainLink>,
    /// Human-readable account naming contributing and excluded sources.
    pub narrative: String,
    /// Metabolic debt 0-100, `None` when its sources were silent.
    pub metabolic_debt: Option<f64>,
    /// Digital debt 0-100, `None` when its sources were silent.
    pub digital_debt: Option<f64>,
    /// At most three rule-based suggestions.
    pub counterfactuals: Vec<String>,
    /// HRV was below the safety threshold and reasoning was skipped.
    pub safety_bypass: bool,
    /// An escalation alert was accepted by the notifier.
    pub escalation_triggered: bool,
    /// ID of the persisted reasoning trace. `None` only when a safety-bypass
    /// trace could not be stored.
    pub trace_id: Option<TraceId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_snake_case() {
        assert_eq!(serde_json::to_value(HypothesisKind::Metabolic).unwrap(), "metabolic");
        assert_eq!(HypothesisKind::Digital.to_string(), "digital");
    }

    #[test]
    fn prior_is_clamped() {
        assert_eq!(Hypothesis::new(HypothesisKind::Digital, "d", 1.4).prior_probability, 1.0);
    }

    #[test]
    fn record_drops_payload() {
        let obs = Observation::new(
            EvidenceResult::new("apple_health", Evidence::Pulse(Default::default())),
            None,
        );
        let json = serde_json::to_string(&obs.record()).unwrap();
        assert_eq!(json, r#"{"source":"apple_health","has_data":true,"supports":null}"#);
    }

    #[test]
    fn chain_link_json() {
        let link = ChainLink::new(NodeType::Meal, NodeType::Glucose, EdgeType::MealToGlucose);
        let json = serde_json::to_value(link).unwrap();
        assert_eq!(json, serde_json::json!({"from": "meal", "to": "glucose", "edge": "meal_to_glucose"}));
    }
}
