//! Constrained causal DAG.
//!
//! Node categories follow a fixed topological order:
//!
//! ```text
//! meal < environmental < behavioral < glucose < physiological < symptom
//! ```
//!
//! Edges may only flow forward or stay level in that order, and three
//! category pairs are forbidden outright:
//! `behavioral → glucose`, `symptom → meal`, `environmental → behavioral`.
//! The graph is a validation gate: a bad edge is rejected with `false`,
//! never with an error.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default depth bound for [`CausalDag::trace_paths`].
pub const DEFAULT_MAX_DEPTH: usize = 6;

/// Causal node categories, declared in topological order.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Meal,
    Environmental,
    Behavioral,
    Glucose,
    Physiological,
    Symptom,
}

impl NodeType {
    /// All node types in topological order.
    pub const ORDER: [NodeType; 6] = [
        NodeType::Meal,
        NodeType::Environmental,
        NodeType::Behavioral,
        NodeType::Glucose,
        NodeType::Physiological,
        NodeType::Symptom,
    ];

    /// Position in the topological order.
    #[must_use]
    pub const fn topological_index(self) -> usize {
        match self {
            Self::Meal => 0,
            Self::Environmental => 1,
            Self::Behavioral => 2,
            Self::Glucose => 3,
            Self::Physiological => 4,
            Self::Symptom => 5,
        }
    }

    /// Node ID prefix that encodes this type.
    #[must_use]
    pub const fn id_prefix(self) -> &'static str {
        match self {
            Self::Meal => "meal_",
            Self::Environmental => "environment_",
            Self::Behavioral => "behavioral_",
            Self::Glucose => "glucose_",
            Self::Physiological => "physio_",
            Self::Symptom => "symptom_",
        }
    }

    /// Infer the node type from a node ID prefix.
    #[must_use]
    pub fn from_node_id(node_id: &str) -> Option<Self> {
        Self::ORDER
            .into_iter()
            .find(|t| node_id.starts_with(t.id_prefix()))
    }

    /// Returns true if the pair is in the forbidden set.
    #[must_use]
    pub const fn is_forbidden_pair(source: Self, target: Self) -> bool {
        matches!(
            (source, target),
            (Self::Behavioral, Self::Glucose)
                | (Self::Symptom, Self::Meal)
                | (Self::Environmental, Self::Behavioral)
        )
    }

    /// Checks whether `source → target` is a valid causal direction.
    #[must_use]
    pub const fn is_valid_direction(source: Self, target: Self) -> bool {
        !Self::is_forbidden_pair(source, target)
            && source.topological_index() <= target.topological_index()
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Meal => write!(f, "meal"),
            Self::Environmental => write!(f, "environmental"),
            Self::Behavioral => write!(f, "behavioral"),
            Self::Glucose => write!(f, "glucose"),
            Self::Physiological => write!(f, "physiological"),
            Self::Symptom => write!(f, "symptom"),
        }
    }
}

/// Edge type labels.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    MealToGlucose,
    GlucoseToHrv,
    GlucoseToEnergy,
    BehaviorToHrv,
    MealToSleep,
    BehaviorToSleep,
    EnvironmentToHrv,
    EnvironmentToSleep,
    EnvironmentToDigestion,
    BehaviorToMeal,
    Temporal,
    Causal,
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MealToGlucose => "meal_to_glucose",
            Self::GlucoseToHrv => "glucose_to_hrv",
            Self::GlucoseToEnergy => "glucose_to_energy",
            Self::BehaviorToHrv => "behavior_to_hrv",
            Self::MealToSleep => "meal_to_sleep",
            Self::BehaviorToSleep => "behavior_to_sleep",
            Self::EnvironmentToHrv => "environment_to_hrv",
            Self::EnvironmentToSleep => "environment_to_sleep",
            Self::EnvironmentToDigestion => "environment_to_digestion",
            Self::BehaviorToMeal => "behavior_to_meal",
            Self::Temporal => "temporal",
            Self::Causal => "causal",
        };
        f.write_str(s)
    }
}

/// A directed edge between two node IDs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagEdge {
    /// Cause node ID.
    pub source: String,
    /// Effect node ID.
    pub target: String,
    /// Relationship kind.
    pub edge_type: EdgeType,
    /// Causal strength in `[0, 1]`.
    pub weight: f64,
}

impl DagEdge {
    /// Weight used when none is given.
    pub const DEFAULT_WEIGHT: f64 = 0.5;

    /// Creates an edge with the default weight.
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>, edge_type: EdgeType) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            edge_type,
            weight: Self::DEFAULT_WEIGHT,
        }
    }

    /// Sets the causal strength.
    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// Why an edge was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeRejection {
    /// An endpoint ID has no recognized type prefix.
    UnknownNodeType,
    /// The type pair is in the forbidden set.
    Forbidden { source: NodeType, target: NodeType },
    /// The edge points backward in the topological order.
    Backward { source: NodeType, target: NodeType },
    /// Weight is NaN or outside `[0, 1]`.
    InvalidWeight,
}

impl fmt::Display for EdgeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNodeType => write!(f, "unrecognized node type"),
            Self::Forbidden { source, target } => write!(f, "forbidden edge {source} → {target}"),
            Self::Backward { source, target } => {
                write!(f, "{source} → {target} violates topological order")
            }
            Self::InvalidWeight => write!(f, "weight outside [0, 1]"),
        }
    }
}

/// A path through the graph, as an ordered list of edges.
pub type DagPath = Vec<DagEdge>;

/// Constrained causal DAG with adjacency-list storage.
///
/// Duplicate edges between the same node pair are kept; the graph is a
/// multigraph over validated edges.
#[derive(Debug, Clone, Default)]
pub struct CausalDag {
    adjacency: HashMap<String, Vec<DagEdge>>,
    edge_count: usize,
}

impl CausalDag {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate an edge without inserting it.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn check_edge(edge: &DagEdge) -> Result<(), EdgeRejection> {
        let (Some(source), Some(target)) = (
            NodeType::from_node_id(&edge.source),
            NodeType::from_node_id(&edge.target),
        ) else {
            return Err(EdgeRejection::UnknownNodeType);
        };

        if NodeType::is_forbidden_pair(source, target) {
            return Err(EdgeRejection::Forbidden { source, target });
        }
        if source.topological_index() > target.topological_index() {
            return Err(EdgeRejection::Backward { source, target });
        }
        if !(0.0..=1.0).contains(&edge.weight) {
            return Err(EdgeRejection::InvalidWeight);
        }
        Ok(())
    }

    /// Add an edge if it respects the hard constraints.
    ///
    /// Returns `false` and leaves the graph untouched otherwise.
    pub fn add_edge(&mut self, edge: DagEdge) -> bool {
        if let Err(reason) = Self::check_edge(&edge) {
            debug!(source = %edge.source, target = %edge.target, %reason, "rejected causal edge");
            return false;
        }
        self.adjacency.entry(edge.source.clone()).or_default().push(edge);
        self.edge_count += 1;
        true
    }

    /// Outgoing edges of a node.
    #[must_use]
    pub fn neighbors(&self, node_id: &str) -> &[DagEdge] {
        self.adjacency.get(node_id).map_or(&[], Vec::as_slice)
    }

    /// Iterates over every stored edge.
    pub fn edges(&self) -> impl Iterator<Item = &DagEdge> {
        self.adjacency.values().flatten()
    }

    /// Number of stored edges.
    #[must_use]
    pub const fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Returns true if no edge has been stored.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.edge_count == 0
    }

    /// All simple paths from `source` to `target` of at most `max_depth`
    /// edges, found by depth-first search.
    #[must_use]
    pub fn trace_paths(&self, source: &str, target: &str, max_depth: usize) -> Vec<DagPath> {
        let mut results = Vec::new();
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        self.dfs(source, target, max_depth, &mut path, &mut visited, &mut results);
        results
    }

    fn dfs<'a>(
        &'a self,
        current: &'a str,
        target: &str,
        max_depth: usize,
        path: &mut Vec<&'a DagEdge>,
        visited: &mut HashSet<&'a str>,
        results: &mut Vec<DagPath>,
    ) {
        if current == target {
            if !path.is_empty() {
                results.push(path.iter().map(|e| (*e).clone()).collect());
            }
            return;
        }
        if path.len() >= max_depth {
            return;
        }

        visited.insert(current);
        for edge in self.neighbors(current) {
            if visited.contains(edge.target.as_str()) {
                continue;
            }
            path.push(edge);
            self.dfs(&edge.target, target, max_depth, path, visited, results);
            path.pop();
        }
        visited.remove(current);
    }

    /// Strength of a path: the product of its edge weights.
    #[must_use]
    pub fn path_strength(path: &[DagEdge]) -> f64 {
        path.iter().map(|e| e.weight).product()
    }
}
