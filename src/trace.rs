//! Reasoning traces.
//!
//! One append-only trace is written per query. Hypotheses, observations and
//! the causal chain are stored as opaque JSON blobs; observation blobs hold
//! source names and flags only, never sensor values. Each trace carries a
//! blake3 digest over its content so later tampering is detectable.

use std::fmt;

use blake3::Hasher;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::HypothesisKind;
use crate::storage::StorageError;

/// Unique reasoning-trace identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(uuid::Uuid);

impl TraceId {
    /// Creates a new random trace ID.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Phase in which the query terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracePhase {
    /// Terminated by the safety bypass.
    Pulse,
    /// Ran to inference.
    Inference,
}

impl fmt::Display for TracePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pulse => write!(f, "pulse"),
            Self::Inference => write!(f, "inference"),
        }
    }
}

/// Persisted record of one query's reasoning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningTrace {
    /// Trace ID.
    pub id: TraceId,
    /// When the trace was created.
    pub created_at: DateTime<Utc>,
    /// Queried symptom.
    pub symptom: String,
    /// Phase the query ended in.
    pub phase: TracePhase,
    /// Serialized hypotheses.
    pub hypotheses_json: String,
    /// Serialized value-free observation records.
    pub observations_json: String,
    /// Concluded branch, if any.
    pub conclusion: Option<HypothesisKind>,
    /// Confidence of the conclusion.
    pub confidence: f64,
    /// Wall-clock duration of the query.
    pub duration_ms: u64,
    /// Probe iterations run.
    pub probe_iterations: usize,
    /// Serialized causal chain.
    pub causal_chain_json: String,
    /// Narrative returned to the caller.
    pub narrative: String,

    /// Hex blake3 digest over every other field.
    pub digest: String,
}

fn to_blob<T: Serialize + ?Sized>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|e| StorageError::SerializationError(e.to_string()))
}

impl ReasoningTrace {
    /// Starts an empty, unsealed trace.
    #[must_use]
    pub fn new(symptom: impl Into<String>, phase: TracePhase) -> Self {
        Self {
            id: TraceId::new(),
            created_at: Utc::now(),
            symptom: symptom.into(),
            phase,
            hypotheses_json: "[]".to_string(),
            observations_json: "[]".to_string(),
            conclusion: None,
            confidence: 0.0,
            duration_ms: 0,
            probe_iterations: 0,
            causal_chain_json: "[]".to_string(),
            narrative: String::new(),
            digest: String::new(),
        }
    }

    /// Serializes the hypothesis records.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::SerializationError` if serialization fails.
    pub fn with_hypotheses<T: Serialize + ?Sized>(mut self, hypotheses: &T) -> Result<Self, StorageError> {
        self.hypotheses_json = to_blob(hypotheses)?;
        Ok(self)
    }

    /// Serializes the observation records.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::SerializationError` if serialization fails.
    pub fn with_observations<T: Serialize + ?Sized>(mut self, observations: &T) -> Result<Self, StorageError> {
        self.observations_json = to_blob(observations)?;
        Ok(self)
    }

    /// Serializes the causal chain.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::SerializationError` if serialization fails.
    pub fn with_chain<T: Serialize + ?Sized>(mut self, chain: &T) -> Result<Self, StorageError> {
        self.causal_chain_json = to_blob(chain)?;
        Ok(self)
    }

    /// Record conclusion, confidence and narrative.
    #[must_use]
    pub fn with_outcome(
        mut self,
        conclusion: Option<HypothesisKind>,
        confidence: f64,
        narrative: impl Into<String>,
    ) -> Self {
        self.conclusion = conclusion;
        self.confidence = confidence;
        self.narrative = narrative.into();
        self
    }

    /// Record duration and probe iteration count.
    #[must_use]
    pub fn with_timing(mut self, duration_ms: u64, probe_iterations: usize) -> Self {
        self.duration_ms = duration_ms;
        self.probe_iterations = probe_iterations;
        self
    }

    /// Computes and stores the content digest.
    #[must_use]
    pub fn seal(mut self) -> Self {
        self.digest = self.compute_digest();
        self
    }

    /// Returns true if the stored digest matches the content.
    #[must_use]
    pub fn verify_digest(&self) -> bool {
        !self.digest.is_empty() && self.digest == self.compute_digest()
    }

    fn compute_digest(&self) -> String {
        fn field(h: &mut Hasher, bytes: &[u8]) {
            h.update(&(bytes.len() as u64).to_le_bytes());
            h.update(bytes);
        }

        let mut h = Hasher::new();
        field(&mut h, self.id.to_string().as_bytes());
        field(&mut h, self.created_at.to_rfc3339().as_bytes());
        field(&mut h, self.symptom.as_bytes());
        field(&mut h, self.phase.to_string().as_bytes());
        field(&mut h, self.hypotheses_json.as_bytes());
        field(&mut h, self.observations_json.as_bytes());
        let conclusion = self.conclusion.map_or("", HypothesisKind::as_str);
        field(&mut h, conclusion.as_bytes());
        field(&mut h, &self.confidence.to_bits().to_le_bytes());
        field(&mut h, &self.duration_ms.to_le_bytes());
        field(&mut h, &(self.probe_iterations as u64).to_le_bytes());
        field(&mut h, self.causal_chain_json.as_bytes());
        field(&mut h, self.narrative.as_bytes());
        h.finalize().to_hex().to_string()
    }
}
