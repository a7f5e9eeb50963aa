//! Query phases as explicit stages.
//!
//! `PULSE` yields a [`PulseOutcome`]; only its `Proceed` arm can be turned
//! into hypotheses, and only hypotheses can be probed. The safety bypass is a
//! terminal variant, so no later phase is reachable from it.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;
use tracing::{debug, warn};

use crate::agent::types::{Hypothesis, HypothesisKind, Observation};
use crate::config::AgentConfig;
use crate::evidence::{EvidenceResult, EvidenceSource};
use crate::guardrails::{check_hrv_safety_with_threshold, SafetyCheckResult};

const GLUCOSE_BOOST: f64 = 0.2;

/// An evidence source queried during the probe phase, tagged with the
/// hypothesis its data supports.
#[derive(Clone)]
pub struct ProbeSource {
    /// Adapter to fetch from.
    pub source: Arc<dyn EvidenceSource>,
    /// Hypothesis this source's data supports.
    pub supports: HypothesisKind,
}

impl ProbeSource {
    /// Tag a source with the hypothesis it supports.
    #[must_use]
    pub fn new(source: Arc<dyn EvidenceSource>, supports: HypothesisKind) -> Self {
        Self { source, supports }
    }

    /// Source name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.source.name()
    }
}

impl std::fmt::Debug for ProbeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeSource")
            .field("source", &self.name())
            .field("supports", &self.supports)
            .finish()
    }
}

/// Readings taken in the pulse phase.
#[derive(Debug, Clone)]
pub struct PulseReadings {
    /// HRV / heart-rate window.
    pub pulse: EvidenceResult,
    /// Latest CGM snapshot.
    pub glucose: EvidenceResult,
}

impl PulseReadings {
    /// Current glucose, if the glucose source returned data.
    #[must_use]
    pub fn glucose_mg_dl(&self) -> Option<f64> {
        self.glucose.evidence.as_glucose().map(|g| g.value_mg_dl)
    }
}

/// Terminal state reached when HRV is below the safety threshold.
#[derive(Debug, Clone)]
pub struct SafetyBypass {
    /// Readings that tripped the gate.
    pub readings: PulseReadings,
    /// Failed safety check.
    pub safety: SafetyCheckResult,
}

/// Result of the pulse phase.
#[derive(Debug, Clone)]
pub enum PulseOutcome {
    /// Stop. No hypothesis, probe or inference runs.
    Bypass(SafetyBypass),
    /// Safe to reason.
    Proceed(PulseReadings),
}

fn or_unknown(joined: thread::Result<EvidenceResult>, source: &dyn EvidenceSource) -> EvidenceResult {
    joined.unwrap_or_else(|_| {
        warn!(source = source.name(), "evidence source panicked; treating as no data");
        EvidenceResult::unknown(source.name())
    })
}

/// Fetch pulse and glucose concurrently and run the safety gate.
///
/// A panicking adapter counts as a source with no data.
pub fn pulse(
    pulse_source: &dyn EvidenceSource,
    glucose_source: &dyn EvidenceSource,
    hrv_threshold_ms: f64,
) -> PulseOutcome {
    let (pulse, glucose) = thread::scope(|s| {
        let pulse = s.spawn(|| pulse_source.fetch_result());
        let glucose = s.spawn(|| glucose_source.fetch_result());
        (
            or_unknown(pulse.join(), pulse_source),
            or_unknown(glucose.join(), glucose_source),
        )
    });

    let safety = check_hrv_safety_with_threshold(&pulse.evidence, hrv_threshold_ms);
    let readings = PulseReadings { pulse, glucose };
    if safety.is_safe {
        debug!(pulse = %readings.pulse, glucose = %readings.glucose, "pulse phase passed safety gate");
        PulseOutcome::Proceed(readings)
    } else {
        PulseOutcome::Bypass(SafetyBypass { readings, safety })
    }
}

/// Hypotheses generated from the pulse readings.
#[derive(Debug, Clone)]
pub struct HypothesisStage {
    /// Readings the hypotheses were generated from.
    pub readings: PulseReadings,
    /// Candidates, in generation order.
    pub hypotheses: Vec<Hypothesis>,
}

impl PulseReadings {
    /// Generate the metabolic and digital candidates.
    ///
    /// Elevated glucose skews the priors toward the metabolic branch.
    #[must_use]
    pub fn hypothesize(self, config: &AgentConfig) -> HypothesisStage {
        let elevated = self
            .glucose_mg_dl()
            .is_some_and(|g| g > config.elevated_glucose_mg_dl);

        let hypotheses = HypothesisKind::ALL
            .into_iter()
            .map(|kind| {
                let (description, prior) = match (kind, elevated) {
                    (HypothesisKind::Metabolic, true) => (
                        "Elevated glucose suggests recent meal is driving symptoms via metabolic pathway",
                        0.6,
                    ),
                    (HypothesisKind::Digital, true) => (
                        "Digital behavior may be contributing to symptoms via HRV suppression",
                        0.3,
                    ),
                    (HypothesisKind::Metabolic, false) => {
                        ("Meal composition may be driving symptoms via glucose response", 0.4)
                    }
                    (HypothesisKind::Digital, false) => {
                        ("Screen behavior may be driving symptoms via dopamine/HRV pathway", 0.4)
                    }
                };
                Hypothesis::new(kind, description, prior)
            })
            .collect();
        debug!(elevated, "hypotheses generated");

        HypothesisStage {
            readings: self,
            hypotheses,
        }
    }
}

/// Evidence gathered by the probe loop.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    /// Hypotheses carried through from generation.
    pub hypotheses: Vec<Hypothesis>,
    /// Pulse and glucose first, then probes in query order.
    pub observations: Vec<Observation>,
    /// Probe iterations run.
    pub iterations: usize,
    /// Coverage confidence after the last iteration.
    pub confidence: f64,
}

/// Evidence-coverage confidence.
///
/// `coverage * 0.6 + 0.3`, plus a boost when glucose is outside the normal
/// band, clamped to `[0, 1]`. No observations means zero.
#[must_use]
pub fn coverage_confidence(observations: &[Observation], glucose_mg_dl: Option<f64>, config: &AgentConfig) -> f64 {
    if observations.is_empty() {
        return 0.0;
    }
    let with_data = observations.iter().filter(|o| o.has_data()).count();
    #[allow(clippy::cast_precision_loss)]
    let coverage = with_data as f64 / observations.len() as f64;

    let boost = match glucose_mg_dl {
        Some(g) if g > config.glucose_boost_high_mg_dl || g < config.glucose_boost_low_mg_dl => GLUCOSE_BOOST,
        _ => 0.0,
    };
    (coverage * 0.6 + 0.3 + boost).clamp(0.0, 1.0)
}

fn fetch_batch(batch: &[&ProbeSource], parallel: bool) -> Vec<EvidenceResult> {
    if !parallel || batch.len() < 2 {
        return batch.iter().map(|p| p.source.fetch_result()).collect();
    }

    let (tx, rx) = bounded::<(usize, EvidenceResult)>(batch.len());
    thread::scope(|s| {
        let handles: Vec<_> = batch
            .iter()
            .enumerate()
            .map(|(idx, probe)| {
                let tx = tx.clone();
                s.spawn(move || {
                    // The receiver outlives the scope, so send cannot fail.
                    let _ = tx.send((idx, probe.source.fetch_result()));
                })
            })
            .collect();
        for handle in handles {
            // A panicking adapter leaves its slot empty.
            let _ = handle.join();
        }
    });
    drop(tx);

    let mut slots: Vec<Option<EvidenceResult>> = vec![None; batch.len()];
    for (idx, result) in rx.try_iter() {
        slots[idx] = Some(result);
    }
    slots
        .into_iter()
        .zip(batch)
        .map(|(slot, probe)| {
            slot.unwrap_or_else(|| {
                warn!(source = probe.name(), "evidence source panicked; treating as no data");
                EvidenceResult::unknown(probe.name())
            })
        })
        .collect()
}

impl HypothesisStage {
    /// Run the bounded probe loop.
    ///
    /// Each iteration visits hypotheses by prior, highest first, and queries
    /// the next unqueried source supporting each one, then recomputes
    /// confidence. The loop stops once confidence reaches the threshold, when
    /// no unqueried source remains, or at the iteration cap. At least one
    /// iteration is attempted.
    #[must_use]
    pub fn probe(self, probes: &[ProbeSource], config: &AgentConfig) -> ProbeOutcome {
        let glucose_mg_dl = self.readings.glucose_mg_dl();

        let mut queried: HashSet<String> = HashSet::new();
        queried.insert(self.readings.pulse.source.clone());
        queried.insert(self.readings.glucose.source.clone());

        let mut observations = vec![
            Observation::new(self.readings.pulse, None),
            Observation::new(self.readings.glucose, None),
        ];

        // Stable sort keeps generation order between equal priors.
        let mut order: Vec<HypothesisKind> = {
            let mut ranked: Vec<&Hypothesis> = self.hypotheses.iter().collect();
            ranked.sort_by(|a, b| b.prior_probability.total_cmp(&a.prior_probability));
            ranked.into_iter().map(|h| h.kind).collect()
        };
        order.dedup();

        let mut confidence = coverage_confidence(&observations, glucose_mg_dl, config);
        let mut iterations = 0;

        while iterations < config.max_iterations {
            let batch: Vec<&ProbeSource> = order
                .iter()
                .filter_map(|kind| {
                    probes
                        .iter()
                        .find(|p| p.supports == *kind && !queried.contains(p.name()))
                })
                .collect();
            if batch.is_empty() {
                debug!(iterations, "no unqueried probe sources remain");
                break;
            }
            for probe in &batch {
                queried.insert(probe.name().to_string());
            }

            let results = fetch_batch(&batch, config.parallel_probes);
            observations.extend(
                results
                    .into_iter()
                    .zip(&batch)
                    .map(|(result, probe)| Observation::new(result, Some(probe.supports))),
            );

            iterations += 1;
            confidence = coverage_confidence(&observations, glucose_mg_dl, config);
            debug!(iteration = iterations, sources = batch.len(), confidence, "probe iteration complete");
            if confidence >= config.confidence_threshold {
                break;
            }
        }

        ProbeOutcome {
            hypotheses: self.hypotheses,
            observations,
            iterations,
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{sources, CookingLog, Evidence, PulseWindow, StaticEvidenceSource};
    use crate::glucose::GlucoseSnapshot;
    use chrono::Utc;

    fn pulse_src(hrv: f64) -> StaticEvidenceSource {
        StaticEvidenceSource::new(
            sources::APPLE_HEALTH,
            Evidence::Pulse(PulseWindow {
                hrv_ms: Some(hrv),
                ..PulseWindow::default()
            }),
        )
    }

    fn glucose_src(value: f64) -> StaticEvidenceSource {
        StaticEvidenceSource::new(sources::CGM_STELO, Evidence::Glucose(GlucoseSnapshot::new(value, Utc::now())))
    }

    fn readings(glucose: f64) -> PulseReadings {
        match pulse(&pulse_src(50.0), &glucose_src(glucose), 20.0) {
            PulseOutcome::Proceed(r) => r,
            PulseOutcome::Bypass(_) => panic!("expected proceed"),
        }
    }

    fn probe(name: &str, data: bool, supports: HypothesisKind) -> ProbeSource {
        let evidence = if data {
            Evidence::Cooking(CookingLog::default())
        } else {
            Evidence::Unknown
        };
        ProbeSource::new(Arc::new(StaticEvidenceSource::new(name, evidence)), supports)
    }

    #[test]
    fn low_hrv_bypasses() {
        match pulse(&pulse_src(15.0), &glucose_src(100.0), 20.0) {
            PulseOutcome::Bypass(b) => assert_eq!(b.safety.hrv_value, Some(15.0)),
            PulseOutcome::Proceed(_) => panic!("expected bypass"),
        }
    }

    struct PanickingSource(&'static str);

    impl EvidenceSource for PanickingSource {
        fn name(&self) -> &str {
            self.0
        }

        fn fetch(&self) -> Result<Evidence, crate::error::TransportError> {
            panic!("adapter bug")
        }
    }

    #[test]
    fn panicking_pulse_or_glucose_adapter_counts_as_no_data() {
        let r = match pulse(&PanickingSource(sources::APPLE_HEALTH), &glucose_src(150.0), 20.0) {
            PulseOutcome::Proceed(r) => r,
            PulseOutcome::Bypass(_) => panic!("expected proceed"),
        };
        assert!(!r.pulse.has_data());
        assert_eq!(r.pulse.source, sources::APPLE_HEALTH);
        assert_eq!(r.glucose_mg_dl(), Some(150.0));

        let r = match pulse(&pulse_src(15.0), &PanickingSource(sources::CGM_STELO), 20.0) {
            PulseOutcome::Bypass(b) => b.readings,
            PulseOutcome::Proceed(_) => panic!("expected bypass"),
        };
        assert!(!r.glucose.has_data());
    }

    #[test]
    fn hypotheses_follow_generation_order() {
        let cfg = AgentConfig::default();
        for glucose in [100.0, 180.0] {
            let kinds: Vec<HypothesisKind> = readings(glucose)
                .hypothesize(&cfg)
                .hypotheses
                .iter()
                .map(|h| h.kind)
                .collect();
            assert_eq!(kinds, HypothesisKind::ALL);
        }
    }

    #[test]
    fn priors_follow_glucose() {
        let cfg = AgentConfig::default();
        let high = readings(150.0).hypothesize(&cfg);
        assert_eq!(high.hypotheses[0].prior_probability, 0.6);
        assert_eq!(high.hypotheses[1].prior_probability, 0.3);

        let normal = readings(140.0).hypothesize(&cfg);
        assert_eq!(normal.hypotheses[0].prior_probability, 0.4);
        assert_eq!(normal.hypotheses[1].kind, HypothesisKind::Digital);
    }

    #[test]
    fn confidence_formula() {
        let cfg = AgentConfig::default();
        let obs = vec![
            Observation::new(EvidenceResult::new("a", Evidence::Cooking(CookingLog::default())), None),
            Observation::new(EvidenceResult::unknown("b"), None),
        ];
        assert!((coverage_confidence(&obs, Some(100.0), &cfg) - 0.6).abs() < 1e-9);
        assert!((coverage_confidence(&obs, Some(165.0), &cfg) - 0.8).abs() < 1e-9);
        assert!((coverage_confidence(&obs, Some(65.0), &cfg) - 0.8).abs() < 1e-9);
        assert_eq!(coverage_confidence(&[], None, &cfg), 0.0);
    }

    #[test]
    fn stops_after_first_confident_iteration() {
        let probes = vec![
            probe("rotimatic_server", true, HypothesisKind::Metabolic),
            probe("instacart_server", true, HypothesisKind::Metabolic),
        ];
        let out = readings(100.0)
            .hypothesize(&AgentConfig::default())
            .probe(&probes, &AgentConfig::default());
        assert_eq!(out.iterations, 1);
        assert_eq!(out.observations.len(), 3);
        assert!(out.confidence >= 0.7);
    }

    #[test]
    fn no_probe_sources_ends_loop() {
        let cfg = AgentConfig::default();
        let out = readings(100.0).hypothesize(&cfg).probe(&[], &cfg);
        assert_eq!(out.iterations, 0);
        assert!((out.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn loop_is_bounded_and_never_requeries() {
        let cfg = AgentConfig {
            confidence_threshold: 1.0,
            ..AgentConfig::default()
        };
        let probes: Vec<ProbeSource> = (0..6)
            .map(|i| probe(&format!("silent_{i}"), false, HypothesisKind::Metabolic))
            .collect();
        let out = readings(100.0).hypothesize(&cfg).probe(&probes, &cfg);
        assert_eq!(out.iterations, 3);
        assert_eq!(out.observations.len(), 2 + 3);

        let mut names: Vec<&str> = out.observations.iter().map(Observation::source).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), out.observations.len());
    }

    #[test]
    fn highest_prior_is_probed_first() {
        let cfg = AgentConfig {
            confidence_threshold: 1.0,
            parallel_probes: true,
            ..AgentConfig::default()
        };
        let probes = vec![
            probe("screen_time", true, HypothesisKind::Digital),
            probe("rotimatic_server", true, HypothesisKind::Metabolic),
        ];
        let out = readings(150.0).hypothesize(&cfg).probe(&probes, &cfg);
        assert_eq!(out.iterations, 1);
        assert_eq!(out.observations[2].source(), "rotimatic_server");
        assert_eq!(out.observations[3].source(), "screen_time");
        assert_eq!(out.observations[3].supports, Some(HypothesisKind::Digital));
    }
}
