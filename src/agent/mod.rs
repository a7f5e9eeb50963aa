//! The causal agent.
//!
//! A query runs `PULSE -> HYPOTHESIS -> PROBE -> INFERENCE`, or terminates at
//! `PULSE` with a safety bypass when HRV is critically low. Each query owns its
//! hypotheses and observations; the agent itself holds only shared,
//! read-only collaborators, so one agent can serve concurrent queries.
//!
//! Every completed query persists exactly one [`ReasoningTrace`]. After
//! inference the explanation is returned only once the trace is written. A
//! safety bypass escalates first and still returns its rest intervention when
//! the trace store is down.

mod inference;
mod phases;
mod types;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

pub use inference::{chain_for, Inference};
pub use phases::{
    coverage_confidence, HypothesisStage, ProbeOutcome, ProbeSource, PulseOutcome, PulseReadings,
    SafetyBypass,
};
pub use types::{
    CausalExplanation, ChainLink, Hypothesis, HypothesisKind, Observation, ObservationRecord,
};

use crate::config::AgentConfig;
use crate::error::{CausalError, CausalResult, ValidationError};
use crate::evidence::{sources, EvidenceSource, StaticEvidenceSource};
use crate::guardrails::apply_hallucination_guard;
use crate::notify::{DisabledNotifier, EscalationAlert, EscalationNotifier};
use crate::storage::{InMemoryTraceStore, StorageError, TraceStore};
use crate::trace::{ReasoningTrace, TraceId, TracePhase};

/// Maximum symptom length, in characters.
pub const MAX_SYMPTOM_CHARS: usize = 500;

const BYPASS_NARRATIVE: &str = "Safety bypass activated: critically low heart rate variability \
     detected. All reasoning paused. Immediate rest intervention recommended.";

fn validate_symptom(symptom: &str) -> Result<&str, ValidationError> {
    let symptom = symptom.trim();
    if symptom.is_empty() {
        return Err(ValidationError::EmptySymptom);
    }
    if symptom.chars().count() > MAX_SYMPTOM_CHARS {
        return Err(ValidationError::FieldTooLong {
            field: "symptom".to_string(),
            max_length: MAX_SYMPTOM_CHARS,
        });
    }
    Ok(symptom)
}

fn check_source_name(field: &str, source: &dyn EvidenceSource) -> Result<(), ValidationError> {
    if source.name().trim().is_empty() {
        return Err(ValidationError::InvalidField {
            field: field.to_string(),
            reason: "source name cannot be empty".to_string(),
        });
    }
    Ok(())
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Neuro-symbolic causal reasoning agent.
#[derive(Clone)]
pub struct CausalAgent {
    pulse: Arc<dyn EvidenceSource>,
    glucose: Arc<dyn EvidenceSource>,
    probes: Vec<ProbeSource>,
    traces: Arc<dyn TraceStore>,
    notifier: Arc<dyn EscalationNotifier>,
    config: AgentConfig,
}

impl std::fmt::Debug for CausalAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CausalAgent")
            .field("pulse", &self.pulse.name())
            .field("glucose", &self.glucose.name())
            .field("probes", &self.probes)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CausalAgent {
    /// Start building an agent.
    #[must_use]
    pub fn builder() -> CausalAgentBuilder {
        CausalAgentBuilder::default()
    }

    /// Configuration the agent was built with.
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Fetch a persisted reasoning trace.
    ///
    /// # Errors
    ///
    /// Returns `CausalError::Storage(StorageError::TraceNotFound)` for an
    /// unknown ID, or the store's own error.
    pub fn trace(&self, id: TraceId) -> CausalResult<ReasoningTrace> {
        self.traces
            .get(id)?
            .ok_or_else(|| CausalError::from(StorageError::TraceNotFound(id)))
    }

    /// Most recent traces, newest first, optionally for one symptom.
    ///
    /// # Errors
    ///
    /// Returns `CausalError::Storage` if the store cannot be read.
    pub fn recent_traces(&self, symptom: Option<&str>, limit: usize) -> CausalResult<Vec<ReasoningTrace>> {
        Ok(self.traces.list_recent(symptom, limit)?)
    }

    /// Answer "why do I feel `symptom`".
    ///
    /// Missing or failing evidence never fails a query; it only lowers
    /// confidence and widens the excluded set.
    ///
    /// # Errors
    ///
    /// Returns `CausalError::Validation` for an empty or oversized symptom and
    /// `CausalError::Storage` if the inference trace cannot be persisted.
    pub fn query(&self, symptom: &str) -> CausalResult<CausalExplanation> {
        let symptom = validate_symptom(symptom)?;
        let started = Instant::now();
        info!(symptom_chars = symptom.chars().count(), "causal query started");

        match phases::pulse(&*self.pulse, &*self.glucose, self.config.hrv_safety_threshold_ms) {
            PulseOutcome::Bypass(bypass) => Ok(self.safety_bypass(symptom, &bypass, started)),
            PulseOutcome::Proceed(readings) => {
                debug!("phase transition: pulse -> hypothesis");
                let hypotheses = readings.hypothesize(&self.config);
                debug!("phase transition: hypothesis -> probe");
                let probed = hypotheses.probe(&self.probes, &self.config);
                debug!(iterations = probed.iterations, "phase transition: probe -> inference");
                self.conclude(symptom, probed, started)
            }
        }
    }

    /// Escalate, then record the bypass. A store outage is logged, never
    /// surfaced: the rest intervention is returned regardless.
    fn safety_bypass(&self, symptom: &str, bypass: &SafetyBypass, started: Instant) -> CausalExplanation {
        warn!(source = %bypass.readings.pulse.source, "HRV safety bypass triggered");

        let escalation_triggered = self.escalate(&EscalationAlert::rest_intervention());

        let pulse_record = Observation::new(bypass.readings.pulse.clone(), None).record();
        let narrative = bypass
            .safety
            .escalation_reason
            .clone()
            .unwrap_or_else(|| BYPASS_NARRATIVE.to_string());
        let saved = ReasoningTrace::new(symptom, TracePhase::Pulse)
            .with_observations(&[pulse_record])
            .map(|t| {
                t.with_outcome(None, 1.0, narrative)
                    .with_timing(elapsed_ms(started), 0)
                    .seal()
            })
            .and_then(|t| self.traces.save_trace(t));
        let trace_id = match saved {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(error = %err, "bypass trace not persisted");
                None
            }
        };

        CausalExplanation {
            symptom: symptom.to_string(),
            conclusion: None,
            confidence: 1.0,
            causal_chain: Vec::new(),
            narrative: BYPASS_NARRATIVE.to_string(),
            metabolic_debt: None,
            digital_debt: None,
            counterfactuals: Vec::new(),
            safety_bypass: true,
            escalation_triggered,
            trace_id,
        }
    }

    /// Best-effort dispatch. Never fails the query.
    fn escalate(&self, alert: &EscalationAlert) -> bool {
        if !self.notifier.is_configured() {
            debug!("escalation channel not configured");
            return false;
        }
        let alert_reason = alert.sanitized_reason();
        match self.notifier.send(alert) {
            Ok(receipt) if receipt.is_sent() => {
                info!(id = receipt.id.as_deref().unwrap_or(""), alert = %alert_reason, "escalation sent");
                true
            }
            Ok(receipt) => {
                warn!(
                    reason = receipt.reason.as_deref().unwrap_or(""),
                    alert = %alert_reason,
                    "escalation rejected"
                );
                false
            }
            Err(err) => {
                warn!(error = %err, alert = %alert_reason, "escalation dispatch failed");
                false
            }
        }
    }

    fn conclude(
        &self,
        symptom: &str,
        probed: ProbeOutcome,
        started: Instant,
    ) -> CausalResult<CausalExplanation> {
        let excluded = apply_hallucination_guard(probed.observations.iter().map(|o| &o.result));
        let inference = inference::infer(symptom, &probed.hypotheses, &probed.observations, &excluded);

        let records: Vec<ObservationRecord> = probed.observations.iter().map(Observation::record).collect();
        let duration_ms = elapsed_ms(started);
        let trace = ReasoningTrace::new(symptom, TracePhase::Inference)
            .with_hypotheses(&probed.hypotheses)?
            .with_observations(&records)?
            .with_chain(&inference.causal_chain)?
            .with_outcome(inference.conclusion, inference.confidence, inference.narrative.clone())
            .with_timing(duration_ms, probed.iterations)
            .seal();
        let trace_id = self.traces.save_trace(trace)?;

        info!(
            conclusion = inference.conclusion.map_or("none", HypothesisKind::as_str),
            confidence = inference.confidence,
            excluded = excluded.len(),
            duration_ms,
            "causal query finished"
        );

        Ok(CausalExplanation {
            symptom: symptom.to_string(),
            conclusion: inference.conclusion,
            confidence: inference.confidence,
            causal_chain: inference.causal_chain,
            narrative: inference.narrative,
            metabolic_debt: inference.metabolic_debt,
            digital_debt: inference.digital_debt,
            counterfactuals: inference.counterfactuals,
            safety_bypass: false,
            escalation_triggered: false,
            trace_id: Some(trace_id),
        })
    }
}

/// Builder for [`CausalAgent`].
///
/// Unset pulse and glucose sources default to sources that never have data,
/// the trace store to an in-memory store and the notifier to
/// [`DisabledNotifier`].
#[derive(Default)]
pub struct CausalAgentBuilder {
    pulse: Option<Arc<dyn EvidenceSource>>,
    glucose: Option<Arc<dyn EvidenceSource>>,
    probes: Vec<ProbeSource>,
    traces: Option<Arc<dyn TraceStore>>,
    notifier: Option<Arc<dyn EscalationNotifier>>,
    config: Option<AgentConfig>,
}

impl CausalAgentBuilder {
    /// HRV / heart-rate source.
    #[must_use]
    pub fn pulse_source(mut self, source: Arc<dyn EvidenceSource>) -> Self {
        self.pulse = Some(source);
        self
    }

    /// CGM source.
    #[must_use]
    pub fn glucose_source(mut self, source: Arc<dyn EvidenceSource>) -> Self {
        self.glucose = Some(source);
        self
    }

    /// Add a probe source. Sources supporting the same hypothesis are
    /// queried in registration order.
    #[must_use]
    pub fn probe_source(mut self, source: Arc<dyn EvidenceSource>, supports: HypothesisKind) -> Self {
        self.probes.push(ProbeSource::new(source, supports));
        self
    }

    /// Where reasoning traces are persisted.
    #[must_use]
    pub fn trace_store(mut self, store: Arc<dyn TraceStore>) -> Self {
        self.traces = Some(store);
        self
    }

    /// Escalation channel used by the safety bypass.
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn EscalationNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Agent tunables. Defaults to [`AgentConfig::default`].
    #[must_use]
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the agent.
    ///
    /// # Errors
    ///
    /// Returns `CausalError::Validation` if the configuration is out of range,
    /// a source has an empty name or two probe sources share a name.
    pub fn build(self) -> CausalResult<CausalAgent> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        if let Some(pulse) = &self.pulse {
            check_source_name("pulse_source", pulse.as_ref())?;
        }
        if let Some(glucose) = &self.glucose {
            check_source_name("glucose_source", glucose.as_ref())?;
        }
        let mut seen = std::collections::HashSet::new();
        for probe in &self.probes {
            check_source_name("probe_sources", probe.source.as_ref())?;
            if !seen.insert(probe.name().to_string()) {
                return Err(ValidationError::InvalidConfig {
                    field: "probe_sources".to_string(),
                    reason: format!("duplicate source '{}'", probe.name()),
                }
                .into());
            }
        }

        Ok(CausalAgent {
            pulse: self
                .pulse
                .unwrap_or_else(|| Arc::new(StaticEvidenceSource::empty(sources::APPLE_HEALTH))),
            glucose: self
                .glucose
                .unwrap_or_else(|| Arc::new(StaticEvidenceSource::empty(sources::CGM_STELO))),
            probes: self.probes,
            traces: self
                .traces
                .unwrap_or_else(|| Arc::new(InMemoryTraceStore::new())),
            notifier: self.notifier.unwrap_or_else(|| Arc::new(DisabledNotifier)),
            config,
        })
    }
}
