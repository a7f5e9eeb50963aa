//! VITA causal query CLI
//!
//! Runs one symptom query against a JSON evidence snapshot and prints the
//! explanation as JSON.
//!
//! Snapshot format:
//!
//! ```json
//! {
//!   "pulse":   { "kind": "pulse", "hrv_ms": 42.0 },
//!   "glucose": { "kind": "glucose", "value_mg_dl": 152.0, "timestamp": "2026-01-05T19:30:00Z" },
//!   "probes": [
//!     { "source": "rotimatic_server", "supports": "metabolic",
//!       "evidence": { "kind": "cooking", "meals": [{ "flour_type": "white", "portion_count": 4 }] } }
//!   ]
//! }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vita_causal::{
    sources, AgentConfig, CausalAgent, DisabledNotifier, DispatchReceipt, EscalationAlert,
    EscalationNotifier, Evidence, HypothesisKind, InMemoryTraceStore, StaticEvidenceSource,
    TransportError, ValidationError,
};

/// CLI configuration
struct Config {
    /// Evidence snapshot path
    evidence: Option<PathBuf>,
    /// Symptom text
    symptom: Option<String>,
    /// Log escalations instead of discarding them
    log_escalations: bool,
    /// Pretty-print output
    pretty: bool,
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config {
        evidence: None,
        symptom: None,
        log_escalations: false,
        pretty: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--evidence" | "-e" => {
                if i + 1 < args.len() {
                    config.evidence = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    eprintln!("error: --evidence requires a value");
                    std::process::exit(1);
                }
            }
            "--symptom" | "-s" => {
                if i + 1 < args.len() {
                    config.symptom = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    eprintln!("error: --symptom requires a value");
                    std::process::exit(1);
                }
            }
            "--log-escalations" => {
                config.log_escalations = true;
                i += 1;
            }
            "--pretty" => {
                config.pretty = true;
                i += 1;
            }
            "--help" | "-h" => {
                println!("vita-query - explain a symptom from an evidence snapshot");
                println!();
                println!("USAGE:");
                println!("    vita-query --evidence <FILE> --symptom <TEXT> [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -e, --evidence <FILE>     JSON evidence snapshot");
                println!("    -s, --symptom <TEXT>      Symptom to explain");
                println!("        --log-escalations     Log safety escalations instead of dropping them");
                println!("        --pretty              Pretty-print the explanation");
                println!("    -h, --help                Print help information");
                println!();
                println!("Agent tunables are read from VITA_* environment variables.");
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {}", arg);
                std::process::exit(1);
            }
        }
    }

    config
}

#[derive(Debug, Default, Deserialize)]
struct Snapshot {
    #[serde(default)]
    pulse: Evidence,
    #[serde(default)]
    glucose: Evidence,
    #[serde(default)]
    probes: Vec<ProbeEntry>,
}

#[derive(Debug, Deserialize)]
struct ProbeEntry {
    source: String,
    supports: HypothesisKind,
    #[serde(default)]
    evidence: Evidence,
}

fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidField {
        field: field.into(),
        reason: reason.into(),
    }
}

impl Snapshot {
    /// Reject payloads filed under the wrong slot and unnamed probes.
    fn validate(&self) -> Result<(), ValidationError> {
        if !matches!(self.pulse, Evidence::Pulse(_) | Evidence::Unknown) {
            return Err(invalid_field(
                "pulse",
                format!("expected pulse evidence, got {}", self.pulse.kind()),
            ));
        }
        if !matches!(self.glucose, Evidence::Glucose(_) | Evidence::Unknown) {
            return Err(invalid_field(
                "glucose",
                format!("expected glucose evidence, got {}", self.glucose.kind()),
            ));
        }
        for (i, probe) in self.probes.iter().enumerate() {
            if probe.source.trim().is_empty() {
                return Err(invalid_field(format!("probes[{i}].source"), "cannot be empty"));
            }
        }
        Ok(())
    }
}

/// Notifier that writes the sanitized alert body to the log.
struct LogNotifier;

impl EscalationNotifier for LogNotifier {
    fn is_configured(&self) -> bool {
        true
    }

    fn send(&self, alert: &EscalationAlert) -> Result<DispatchReceipt, TransportError> {
        info!(body = %alert.render(), reason = %alert.sanitized_reason(), "escalation");
        Ok(DispatchReceipt::sent(format!("log-{}", uuid::Uuid::new_v4())))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();
    let Some(symptom) = args.symptom else {
        eprintln!("error: --symptom is required");
        std::process::exit(1);
    };

    let snapshot: Snapshot = match &args.evidence {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => Snapshot::default(),
    };
    snapshot.validate()?;

    let notifier: Arc<dyn EscalationNotifier> = if args.log_escalations {
        Arc::new(LogNotifier)
    } else {
        Arc::new(DisabledNotifier)
    };

    let mut builder = CausalAgent::builder()
        .config(AgentConfig::from_env()?)
        .pulse_source(Arc::new(StaticEvidenceSource::new(sources::APPLE_HEALTH, snapshot.pulse)))
        .glucose_source(Arc::new(StaticEvidenceSource::new(sources::CGM_STELO, snapshot.glucose)))
        .trace_store(Arc::new(InMemoryTraceStore::new()))
        .notifier(notifier);
    for probe in snapshot.probes {
        builder = builder.probe_source(
            Arc::new(StaticEvidenceSource::new(probe.source, probe.evidence)),
            probe.supports,
        );
    }
    let agent = builder.build()?;

    let explanation = agent.query(&symptom)?;
    let out = if args.pretty {
        serde_json::to_string_pretty(&explanation)?
    } else {
        serde_json::to_string(&explanation)?
    };
    println!("{out}");
    Ok(())
}
