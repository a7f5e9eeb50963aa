//! Evidence payloads and the evidence-source contract.
//!
//! Every source returns an [`Evidence`] value. [`Evidence::Unknown`] is a
//! first-class "no data" signal: it means the source told us nothing, never
//! that its factor was ruled out.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::debt::{GlucoseCrash, ScreenEvent};
use crate::error::TransportError;
use crate::glucose::GlucoseSnapshot;

/// Well-known source names.
pub mod sources {
    /// HRV and heart-rate window.
    pub const APPLE_HEALTH: &str = "apple_health";
    /// Continuous glucose monitor.
    pub const CGM_STELO: &str = "cgm_stelo";
    /// Smart flatbread appliance sessions.
    pub const ROTIMATIC: &str = "rotimatic_server";
    /// Grocery receipts.
    pub const INSTACART: &str = "instacart_server";
    /// Screen-time and app-usage events.
    pub const SCREEN_TIME: &str = "screen_time";
}

/// Latest HRV / heart-rate window.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PulseWindow {
    /// Latest heart-rate variability, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hrv_ms: Option<f64>,

    /// Latest heart rate, in beats per minute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate_bpm: Option<f64>,

    /// Seven-day HRV average, if the source can compute one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_hrv_ms: Option<f64>,
}

/// A logged or appliance-detected meal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MealRecord {
    /// Estimated glycemic load of the meal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glycemic_load: Option<f64>,

    /// Cooking-method bioavailability; above 1.0 means more absorbable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bioavailability_modifier: Option<f64>,

    /// Local hour the meal started, 0-23.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_hour: Option<u32>,

    /// Flour used, e.g. "white" or "multigrain".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flour_type: Option<String>,

    /// Number of portions (e.g. rotis) produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portion_count: Option<u32>,
}

/// Recent cooking sessions, most recent first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CookingLog {
    /// Sessions, most recent first.
    pub meals: Vec<MealRecord>,
}

/// A grocery line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroceryItem {
    /// Item name as printed on the receipt.
    pub name: String,

    /// Item category, e.g. "grain".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Glycemic index, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glycemic_index: Option<f64>,
}

/// A grocery or delivery receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    /// Provider order ID.
    pub order_id: String,

    /// When the order was placed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordered_at: Option<DateTime<Utc>>,

    /// Line items.
    #[serde(default)]
    pub items: Vec<GroceryItem>,
}

/// Recent purchases.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroceryBasket {
    /// Receipts, most recent first.
    pub receipts: Vec<Receipt>,
}

/// Screen-time events plus known crash timestamps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenActivity {
    /// Screen sessions in the window.
    pub events: Vec<ScreenEvent>,

    /// Glucose crashes in the window.
    #[serde(default)]
    pub crashes: Vec<GlucoseCrash>,
}

/// Typed evidence payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    /// No data. Never interpreted as "ruled out".
    #[default]
    Unknown,
    /// HRV / heart-rate window.
    Pulse(PulseWindow),
    /// CGM snapshot.
    Glucose(GlucoseSnapshot),
    /// Appliance cooking sessions.
    Cooking(CookingLog),
    /// Grocery receipts.
    Groceries(GroceryBasket),
    /// Screen-time activity.
    Screen(ScreenActivity),
}

impl Evidence {
    /// Returns true unless this is [`Evidence::Unknown`].
    #[must_use]
    pub const fn has_data(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Pulse payload, if this is one.
    #[must_use]
    pub const fn as_pulse(&self) -> Option<&PulseWindow> {
        match self {
            Self::Pulse(p) => Some(p),
            _ => None,
        }
    }

    /// Glucose payload, if this is one.
    #[must_use]
    pub const fn as_glucose(&self) -> Option<&GlucoseSnapshot> {
        match self {
            Self::Glucose(g) => Some(g),
            _ => None,
        }
    }

    /// Cooking payload, if this is one.
    #[must_use]
    pub const fn as_cooking(&self) -> Option<&CookingLog> {
        match self {
            Self::Cooking(c) => Some(c),
            _ => None,
        }
    }

    /// Screen payload, if this is one.
    #[must_use]
    pub const fn as_screen(&self) -> Option<&ScreenActivity> {
        match self {
            Self::Screen(s) => Some(s),
            _ => None,
        }
    }

    /// Short label for logging; never includes payload values.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Pulse(_) => "pulse",
            Self::Glucose(_) => "glucose",
            Self::Cooking(_) => "cooking",
            Self::Groceries(_) => "groceries",
            Self::Screen(_) => "screen",
        }
    }
}

/// Uniform result of fetching from any evidence source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceResult {
    /// Source name.
    pub source: String,
    /// Payload, [`Evidence::Unknown`] when the source had nothing.
    pub evidence: Evidence,
}

impl EvidenceResult {
    /// Result carrying `evidence` from `source`.
    #[must_use]
    pub fn new(source: impl Into<String>, evidence: Evidence) -> Self {
        Self {
            source: source.into(),
            evidence,
        }
    }

    /// A result carrying no data.
    #[must_use]
    pub fn unknown(source: impl Into<String>) -> Self {
        Self::new(source, Evidence::Unknown)
    }

    /// False when the source returned no data.
    #[must_use]
    pub const fn has_data(&self) -> bool {
        self.evidence.has_data()
    }
}

impl fmt::Display for EvidenceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.source, self.evidence.kind())
    }
}

/// An evidence adapter.
///
/// "No data" must be reported as `Ok(Evidence::Unknown)`. `Err` is reserved
/// for transport failures, which [`EvidenceSource::fetch_result`] degrades to
/// `Unknown` before the agent ever sees them. Callers are responsible for
/// source-level timeouts and should report them as [`TransportError::Timeout`].
pub trait EvidenceSource: Send + Sync {
    /// Stable source name.
    fn name(&self) -> &str;

    /// Fetch the latest evidence.
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` on hard transport failures only.
    fn fetch(&self) -> Result<Evidence, TransportError>;

    /// Fetch, degrading any transport failure to `Evidence::Unknown`.
    fn fetch_result(&self) -> EvidenceResult {
        match self.fetch() {
            Ok(evidence) => EvidenceResult::new(self.name(), evidence),
            Err(err) => {
                warn!(source = self.name(), error = %err, "evidence source failed; treating as no data");
                EvidenceResult::unknown(self.name())
            }
        }
    }
}

/// Evidence source that always returns a fixed payload.
#[derive(Debug, Clone)]
pub struct StaticEvidenceSource {
    name: String,
    evidence: Evidence,
}

impl StaticEvidenceSource {
    /// Source that always returns `evidence`.
    #[must_use]
    pub fn new(name: impl Into<String>, evidence: Evidence) -> Self {
        Self {
            name: name.into(),
            evidence,
        }
    }

    /// A source that never has data.
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Evidence::Unknown)
    }
}

impl EvidenceSource for StaticEvidenceSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<Evidence, TransportError> {
        Ok(self.evidence.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Offline;

    impl EvidenceSource for Offline {
        fn name(&self) -> &str {
            sources::ROTIMATIC
        }

        fn fetch(&self) -> Result<Evidence, TransportError> {
            Err(TransportError::SourceUnavailable {
                source_name: self.name().to_string(),
                message: "connection refused".to_string(),
            })
        }
    }

    #[test]
    fn unknown_has_no_data() {
        assert!(!Evidence::Unknown.has_data());
        assert!(Evidence::Pulse(PulseWindow::default()).has_data());
        assert!(!EvidenceResult::unknown(sources::CGM_STELO).has_data());
    }

    #[test]
    fn transport_failure_degrades_to_unknown() {
        let result = Offline.fetch_result();
        assert_eq!(result.source, sources::ROTIMATIC);
        assert_eq!(result.evidence, Evidence::Unknown);
    }

    #[test]
    fn static_source_returns_payload() {
        let pulse = Evidence::Pulse(PulseWindow {
            hrv_ms: Some(42.0),
            ..PulseWindow::default()
        });
        let source = StaticEvidenceSource::new(sources::APPLE_HEALTH, pulse.clone());
        let result = source.fetch_result();
        assert!(result.has_data());
        assert_eq!(result.evidence, pulse);
        assert_eq!(result.to_string(), "apple_health(pulse)");
    }

    #[test]
    fn evidence_json_is_tagged() {
        let json = serde_json::to_value(Evidence::Unknown).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "unknown"}));

        let parsed: Evidence =
            serde_json::from_value(serde_json::json!({"kind": "pulse", "hrv_ms": 15.0})).unwrap();
        assert_eq!(parsed.as_pulse().and_then(|p| p.hrv_ms), Some(15.0));
    }
}
