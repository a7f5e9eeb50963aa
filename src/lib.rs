//! # VITA Causal - why do I feel this way?
//!
//! A causal reasoning engine that answers symptom queries by fusing glucose,
//! heart-rate-variability and behavioral evidence into an auditable
//! explanation with a confidence score, narrative and counterfactuals.
//!
//! ## Core Concepts
//!
//! - **Evidence**: A typed payload per source; `Evidence::Unknown` means "no data", never "ruled out"
//! - **Causal DAG**: Directed edges constrained by a fixed topological order and a forbidden set
//! - **Guardrails**: HRV safety interrupt, hallucination guard, privacy-safe SMS rendering
//! - **Causal Agent**: The bounded `PULSE -> HYPOTHESIS -> PROBE -> INFERENCE` loop
//! - **Reasoning Trace**: One append-only, digest-sealed audit record per query
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vita_causal::{sources, CausalAgent, Evidence, HypothesisKind, InMemoryTraceStore, StaticEvidenceSource};
//!
//! let agent = CausalAgent::builder()
//!     .pulse_source(Arc::new(StaticEvidenceSource::new(sources::APPLE_HEALTH, pulse)))
//!     .glucose_source(Arc::new(StaticEvidenceSource::new(sources::CGM_STELO, glucose)))
//!     .probe_source(Arc::new(rotimatic), HypothesisKind::Metabolic)
//!     .trace_store(Arc::new(InMemoryTraceStore::new()))
//!     .build()?;
//!
//! let explanation = agent.query("tired after dinner")?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Leaf components
pub mod dag;
pub mod debt;
pub mod error;
pub mod evidence;
pub mod glucose;
pub mod guardrails;

// Collaborator contracts
pub mod notify;
pub mod storage;
pub mod trace;

// Orchestration
pub mod agent;
pub mod config;
pub mod counterfactual;

pub use agent::{
    CausalAgent, CausalAgentBuilder, CausalExplanation, ChainLink, Hypothesis, HypothesisKind,
    Observation,
};
pub use config::AgentConfig;
pub use dag::{CausalDag, DagEdge, DagPath, EdgeRejection, EdgeType, NodeType};
pub use debt::{compute_digital_debt, compute_metabolic_debt, estimate_window_debt, DebtScores};
pub use error::{CausalError, CausalResult, TransportError, ValidationError};
pub use evidence::{sources, Evidence, EvidenceResult, EvidenceSource, StaticEvidenceSource};
pub use glucose::{classify_energy_state, classify_trend, EnergyState, GlucoseSnapshot, GlucoseTrend};
pub use guardrails::{apply_hallucination_guard, check_hrv_safety, sanitize_for_sms, SafetyCheckResult};
pub use notify::{DispatchReceipt, DispatchStatus, DisabledNotifier, EscalationAlert, EscalationNotifier};
pub use storage::{InMemoryTraceStore, StorageError, TraceStore};
pub use trace::{ReasoningTrace, TraceId, TracePhase};
