use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};

use vita_causal::agent::ObservationRecord;
use vita_causal::debt::ScreenEvent;
use vita_causal::evidence::{CookingLog, MealRecord, PulseWindow, ScreenActivity};
use vita_causal::{
    sources, AgentConfig, CausalAgent, CausalError, DispatchReceipt, EscalationAlert,
    EscalationNotifier, Evidence, EvidenceSource, GlucoseSnapshot, HypothesisKind,
    InMemoryTraceStore, ReasoningTrace, StaticEvidenceSource, StorageError, TraceId, TracePhase,
    TraceStore, TransportError,
};

fn pulse(hrv: f64) -> Arc<StaticEvidenceSource> {
    Arc::new(StaticEvidenceSource::new(
        sources::APPLE_HEALTH,
        Evidence::Pulse(PulseWindow {
            hrv_ms: Some(hrv),
            heart_rate_bpm: Some(70.0),
            baseline_hrv_ms: Some(55.0),
        }),
    ))
}

fn glucose(value: f64) -> Arc<StaticEvidenceSource> {
    Arc::new(StaticEvidenceSource::new(
        sources::CGM_STELO,
        Evidence::Glucose(GlucoseSnapshot::new(value, Utc::now())),
    ))
}

fn rotimatic(flour: &str, portions: u32) -> Arc<StaticEvidenceSource> {
    Arc::new(StaticEvidenceSource::new(
        sources::ROTIMATIC,
        Evidence::Cooking(CookingLog {
            meals: vec![MealRecord {
                glycemic_load: Some(40.0),
                flour_type: Some(flour.to_string()),
                portion_count: Some(portions),
                meal_hour: Some(21),
                ..MealRecord::default()
            }],
        }),
    ))
}

/// Counts calls so tests can prove a phase never ran.
struct CountingSource {
    name: &'static str,
    evidence: Evidence,
    calls: AtomicUsize,
}

impl CountingSource {
    fn new(name: &'static str, evidence: Evidence) -> Arc<Self> {
        Arc::new(Self {
            name,
            evidence,
            calls: AtomicUsize::new(0),
        })
    }
}

impl EvidenceSource for CountingSource {
    fn name(&self) -> &str {
        self.name
    }

    fn fetch(&self) -> Result<Evidence, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.evidence.clone())
    }
}

struct OfflineSource(&'static str);

impl EvidenceSource for OfflineSource {
    fn name(&self) -> &str {
        self.0
    }

    fn fetch(&self) -> Result<Evidence, TransportError> {
        Err(TransportError::Timeout {
            source_name: self.0.to_string(),
            duration_ms: 5_000,
        })
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    fail: bool,
}

impl EscalationNotifier for RecordingNotifier {
    fn is_configured(&self) -> bool {
        true
    }

    fn send(&self, alert: &EscalationAlert) -> Result<DispatchReceipt, TransportError> {
        if self.fail {
            return Err(TransportError::NotificationFailed {
                message: "provider down".to_string(),
            });
        }
        self.sent.lock().unwrap().push(alert.render());
        Ok(DispatchReceipt::sent("SM1"))
    }
}

struct FailingStore;

impl TraceStore for FailingStore {
    fn save_trace(&self, _trace: ReasoningTrace) -> Result<TraceId, StorageError> {
        Err(StorageError::BackendError("disk full".to_string()))
    }

    fn get(&self, _id: TraceId) -> Result<Option<ReasoningTrace>, StorageError> {
        Ok(None)
    }

    fn list_recent(&self, _symptom: Option<&str>, _limit: usize) -> Result<Vec<ReasoningTrace>, StorageError> {
        Ok(Vec::new())
    }
}

#[test]
fn low_hrv_bypasses_all_reasoning() {
    let probe = CountingSource::new(sources::ROTIMATIC, Evidence::Cooking(CookingLog::default()));
    let notifier = Arc::new(RecordingNotifier::default());
    let store = Arc::new(InMemoryTraceStore::new());
    let agent = CausalAgent::builder()
        .pulse_source(pulse(15.0))
        .glucose_source(glucose(190.0))
        .probe_source(probe.clone(), HypothesisKind::Metabolic)
        .trace_store(store.clone())
        .notifier(notifier.clone())
        .build()
        .unwrap();

    let out = agent.query("exhausted and shaky").unwrap();

    assert!(out.safety_bypass);
    assert_eq!(out.confidence, 1.0);
    assert_eq!(out.conclusion, None);
    assert!(out.narrative.contains("rest intervention"));
    assert!(out.causal_chain.is_empty());
    assert!(out.escalation_triggered);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 0);

    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("Low heart rate variability"));
    assert!(!sent[0].contains("15"));

    let traces = store.list_recent(None, 10).unwrap();
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0].phase, TracePhase::Pulse);
}

#[test]
fn escalation_failure_never_blocks_bypass() {
    let agent = CausalAgent::builder()
        .pulse_source(pulse(10.0))
        .notifier(Arc::new(RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        }))
        .build()
        .unwrap();

    let out = agent.query("faint").unwrap();
    assert!(out.safety_bypass);
    assert!(!out.escalation_triggered);
}

#[test]
fn disabled_notifier_reports_no_escalation() {
    let agent = CausalAgent::builder().pulse_source(pulse(10.0)).build().unwrap();
    let out = agent.query("faint").unwrap();
    assert!(out.safety_bypass);
    assert!(!out.escalation_triggered);
}

#[test]
fn no_data_anywhere_still_explains() {
    let agent = CausalAgent::builder()
        .pulse_source(Arc::new(StaticEvidenceSource::empty(sources::APPLE_HEALTH)))
        .glucose_source(Arc::new(StaticEvidenceSource::empty(sources::CGM_STELO)))
        .probe_source(Arc::new(StaticEvidenceSource::empty(sources::ROTIMATIC)), HypothesisKind::Metabolic)
        .probe_source(Arc::new(StaticEvidenceSource::empty(sources::INSTACART)), HypothesisKind::Metabolic)
        .probe_source(Arc::new(StaticEvidenceSource::empty(sources::SCREEN_TIME)), HypothesisKind::Digital)
        .build()
        .unwrap();

    let out = agent.query("tired").unwrap();
    assert!(!out.safety_bypass);
    // Equal priors, nothing supports either branch: generation order decides.
    assert_eq!(out.conclusion, Some(HypothesisKind::Metabolic));
    assert_eq!(out.confidence, 0.5);
    assert!(!out.narrative.is_empty());
    assert!(!out.narrative.contains("Data from:"));
    assert!(out.narrative.contains("excluded from reasoning"));
    assert_eq!(out.metabolic_debt, None);
    assert_eq!(out.digital_debt, None);
}

#[test]
fn elevated_glucose_with_cooking_data_concludes_metabolic() {
    let store = Arc::new(InMemoryTraceStore::new());
    let agent = CausalAgent::builder()
        .pulse_source(pulse(45.0))
        .glucose_source(glucose(175.0))
        .probe_source(rotimatic("white", 5), HypothesisKind::Metabolic)
        .probe_source(Arc::new(StaticEvidenceSource::empty(sources::INSTACART)), HypothesisKind::Metabolic)
        .trace_store(store.clone())
        .build()
        .unwrap();

    let out = agent.query("foggy after dinner").unwrap();

    assert_eq!(out.conclusion, Some(HypothesisKind::Metabolic));
    assert!(out.confidence > 0.5 && out.confidence <= 1.0);
    assert_eq!(out.causal_chain.len(), 2);
    assert_eq!(out.counterfactuals.len(), 3);
    assert!(out.counterfactuals[0].contains("multigrain"));
    assert!(out.narrative.contains("metabolic pathway"));
    assert!(out.metabolic_debt.is_some_and(|d| (0.0..=100.0).contains(&d)));
    assert_eq!(out.digital_debt, None);

    let trace = store.get(out.trace_id.unwrap()).unwrap().expect("trace persisted");
    assert_eq!(trace.phase, TracePhase::Inference);
    assert_eq!(trace.conclusion, Some(HypothesisKind::Metabolic));
    assert_eq!(trace.confidence, out.confidence);
    assert_eq!(trace.narrative, out.narrative);
    assert!(trace.probe_iterations >= 1);
    assert!(trace.verify_digest());

    let records: Vec<ObservationRecord> = serde_json::from_str(&trace.observations_json).unwrap();
    assert_eq!(records[0].source, sources::APPLE_HEALTH);
    assert!(records.iter().any(|r| r.source == sources::ROTIMATIC && r.has_data));
    assert!(!trace.observations_json.contains("175"));
}

#[test]
fn screen_evidence_concludes_digital() {
    let now = Utc::now();
    let screen = Arc::new(StaticEvidenceSource::new(
        sources::SCREEN_TIME,
        Evidence::Screen(ScreenActivity {
            events: vec![ScreenEvent {
                start: now - Duration::hours(1),
                duration_seconds: 3600.0,
                dopamine_debt_score: 80.0,
            }],
            crashes: vec![],
        }),
    ));
    let agent = CausalAgent::builder()
        .pulse_source(pulse(40.0))
        .glucose_source(glucose(100.0))
        .probe_source(Arc::new(StaticEvidenceSource::empty(sources::ROTIMATIC)), HypothesisKind::Metabolic)
        .probe_source(screen, HypothesisKind::Digital)
        .build()
        .unwrap();

    let out = agent.query("restless").unwrap();
    assert_eq!(out.conclusion, Some(HypothesisKind::Digital));
    assert_eq!(out.digital_debt, Some(92.0));
    assert_eq!(out.metabolic_debt, None);
    assert!(out.counterfactuals.iter().any(|c| c.contains("screen break")));
    assert!(out.narrative.contains("No data from: rotimatic_server"));
}

#[test]
fn failing_source_degrades_to_excluded() {
    let agent = CausalAgent::builder()
        .pulse_source(pulse(45.0))
        .glucose_source(Arc::new(OfflineSource(sources::CGM_STELO)))
        .probe_source(rotimatic("multigrain", 2), HypothesisKind::Metabolic)
        .build()
        .unwrap();

    let out = agent.query("tired").unwrap();
    assert_eq!(out.conclusion, Some(HypothesisKind::Metabolic));
    assert!(out.narrative.contains("No data from: cgm_stelo (excluded from reasoning)."));
    assert!(out.narrative.contains("Data from: apple_health, rotimatic_server."));
}

#[test]
fn excluded_sources_are_never_blamed() {
    let agent = CausalAgent::builder()
        .pulse_source(pulse(45.0))
        .glucose_source(glucose(100.0))
        .probe_source(Arc::new(StaticEvidenceSource::empty(sources::ROTIMATIC)), HypothesisKind::Metabolic)
        .probe_source(Arc::new(StaticEvidenceSource::empty(sources::SCREEN_TIME)), HypothesisKind::Digital)
        .build()
        .unwrap();

    let out = agent.query("tired").unwrap();
    assert_eq!(out.conclusion, Some(HypothesisKind::Metabolic));
    assert_eq!(out.confidence, 0.5);
    assert!(out.narrative.contains("Data from: apple_health, cgm_stelo."));
    assert!(out.narrative.contains("No data from: rotimatic_server, screen_time"));
    assert_eq!(out.metabolic_debt, None);
    assert_eq!(out.digital_debt, None);
}

#[test]
fn elevated_glucose_priors_decide_without_probe_support() {
    let agent = CausalAgent::builder()
        .pulse_source(pulse(45.0))
        .glucose_source(glucose(150.0))
        .build()
        .unwrap();

    let out = agent.query("sluggish").unwrap();
    // 0.6 * 0.2 / (0.6 * 0.2 + 0.3 * 0.2)
    assert_eq!(out.conclusion, Some(HypothesisKind::Metabolic));
    assert_eq!(out.confidence, 0.667);
    assert_eq!(out.causal_chain.len(), 2);
    assert!(out.narrative.contains("metabolic pathway"));
}

#[test]
fn probe_loop_respects_iteration_cap() {
    let probes: Vec<Arc<CountingSource>> = ["p0", "p1", "p2", "p3", "p4"]
        .into_iter()
        .map(|n| CountingSource::new(n, Evidence::Unknown))
        .collect();
    let mut builder = CausalAgent::builder()
        .pulse_source(pulse(45.0))
        .glucose_source(glucose(100.0))
        .config(AgentConfig {
            confidence_threshold: 1.0,
            ..AgentConfig::default()
        });
    for p in &probes {
        builder = builder.probe_source(p.clone(), HypothesisKind::Metabolic);
    }
    let agent = builder.build().unwrap();

    agent.query("tired").unwrap();
    let total: usize = probes.iter().map(|p| p.calls.load(Ordering::SeqCst)).sum();
    assert_eq!(total, 3);
    assert!(probes.iter().all(|p| p.calls.load(Ordering::SeqCst) <= 1));
}

#[test]
fn failed_trace_write_fails_the_query() {
    let agent = CausalAgent::builder()
        .pulse_source(pulse(45.0))
        .trace_store(Arc::new(FailingStore))
        .build()
        .unwrap();

    let err = agent.query("tired").unwrap_err();
    assert!(err.is_storage());
    assert!(matches!(err, CausalError::Storage(StorageError::BackendError(_))));
}

#[test]
fn bypass_survives_trace_store_outage() {
    let notifier = Arc::new(RecordingNotifier::default());
    let agent = CausalAgent::builder()
        .pulse_source(pulse(15.0))
        .trace_store(Arc::new(FailingStore))
        .notifier(notifier.clone())
        .build()
        .unwrap();

    let out = agent.query("dizzy").unwrap();
    assert!(out.safety_bypass);
    assert_eq!(out.confidence, 1.0);
    assert!(out.narrative.contains("rest intervention"));
    assert!(out.escalation_triggered);
    assert_eq!(out.trace_id, None);
    assert_eq!(notifier.sent.lock().unwrap().len(), 1);
}

#[test]
fn empty_symptom_is_rejected() {
    let agent = CausalAgent::builder().build().unwrap();
    assert!(agent.query("   ").unwrap_err().is_validation());
}

#[test]
fn concurrent_queries_each_persist_a_trace() {
    let store = Arc::new(InMemoryTraceStore::new());
    let agent = Arc::new(
        CausalAgent::builder()
            .pulse_source(pulse(45.0))
            .glucose_source(glucose(150.0))
            .probe_source(rotimatic("white", 2), HypothesisKind::Metabolic)
            .trace_store(store.clone())
            .build()
            .unwrap(),
    );

    std::thread::scope(|s| {
        for i in 0..8 {
            let agent = Arc::clone(&agent);
            s.spawn(move || {
                let out = agent.query(&format!("symptom {i}")).unwrap();
                assert_eq!(out.conclusion, Some(HypothesisKind::Metabolic));
            });
        }
    });

    assert_eq!(store.len().unwrap(), 8);
}
