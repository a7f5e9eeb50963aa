//! Glucose trend and energy-state classification.
//!
//! Stateless functions over CGM readings. Rates are in mg/dL per minute,
//! glucose values in mg/dL.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default fasting baseline used by [`classify_energy_state`].
pub const DEFAULT_BASELINE_MG_DL: f64 = 90.0;

/// Rate-of-change classification for CGM readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GlucoseTrend {
    /// Above +3 mg/dL/min.
    RapidlyRising,
    /// +1 to +3 mg/dL/min.
    Rising,
    /// Between -1 and +1 mg/dL/min (exclusive).
    Stable,
    /// -3 to -1 mg/dL/min.
    Falling,
    /// Below -3 mg/dL/min.
    RapidlyFalling,
}

impl fmt::Display for GlucoseTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RapidlyRising => write!(f, "rapidlyRising"),
            Self::Rising => write!(f, "rising"),
            Self::Stable => write!(f, "stable"),
            Self::Falling => write!(f, "falling"),
            Self::RapidlyFalling => write!(f, "rapidlyFalling"),
        }
    }
}

/// Metabolic energy state derived from the glucose trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnergyState {
    /// Flat curve in the normal range.
    Stable,
    /// Post-meal spike in progress.
    Rising,
    /// Decline of more than 30 mg/dL from the recent peak.
    Crashing,
    /// Below baseline after a spike.
    ReactiveLow,
}

impl EnergyState {
    /// Returns true for the states that count as a glucose crash.
    #[must_use]
    pub const fn is_crash(self) -> bool {
        matches!(self, Self::Crashing | Self::ReactiveLow)
    }
}

impl fmt::Display for EnergyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stable => write!(f, "stable"),
            Self::Rising => write!(f, "rising"),
            Self::Crashing => write!(f, "crashing"),
            Self::ReactiveLow => write!(f, "reactiveLow"),
        }
    }
}

/// Classify a rate of change into a trend bucket.
///
/// Exactly `1.0` is [`GlucoseTrend::Rising`], exactly `-1.0` is
/// [`GlucoseTrend::Falling`], and `±3.0` stay in the non-rapid buckets.
#[must_use]
pub fn classify_trend(rate_mg_per_min: f64) -> GlucoseTrend {
    if rate_mg_per_min > 3.0 {
        GlucoseTrend::RapidlyRising
    } else if rate_mg_per_min >= 1.0 {
        GlucoseTrend::Rising
    } else if rate_mg_per_min > -1.0 {
        GlucoseTrend::Stable
    } else if rate_mg_per_min >= -3.0 {
        GlucoseTrend::Falling
    } else {
        GlucoseTrend::RapidlyFalling
    }
}

/// Classify the energy state from the current value and its distance from the
/// recent peak. Checks run in order and every boundary is exclusive.
#[must_use]
pub fn classify_energy_state(current_mg_dl: f64, delta_from_peak: f64, baseline_mg_dl: f64) -> EnergyState {
    if current_mg_dl < baseline_mg_dl - 10.0 && delta_from_peak < -30.0 {
        EnergyState::ReactiveLow
    } else if delta_from_peak < -30.0 {
        EnergyState::Crashing
    } else if current_mg_dl > 140.0 || delta_from_peak > 20.0 {
        EnergyState::Rising
    } else {
        EnergyState::Stable
    }
}

/// A single CGM reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlucoseReading {
    /// Glucose value in mg/dL.
    pub value_mg_dl: f64,
    /// When the reading was taken.
    pub timestamp: DateTime<Utc>,
}

/// Latest glucose state, as delivered by a CGM evidence source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlucoseSnapshot {
    /// Latest value in mg/dL.
    pub value_mg_dl: f64,

    /// Timestamp of the latest value.
    pub timestamp: DateTime<Utc>,

    /// Rate of change, mg/dL per minute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_mg_per_min: Option<f64>,

    /// Trend bucket for the rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<GlucoseTrend>,

    /// Energy state relative to the window peak.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_state: Option<EnergyState>,

    /// Highest value in the post-meal window, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_peak_mg_dl: Option<f64>,

    /// Lowest value after the peak, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_nadir_mg_dl: Option<f64>,
}

impl GlucoseSnapshot {
    /// Creates a bare snapshot with no derived fields.
    #[must_use]
    pub fn new(value_mg_dl: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            value_mg_dl,
            timestamp,
            rate_mg_per_min: None,
            trend: None,
            energy_state: None,
            window_peak_mg_dl: None,
            window_nadir_mg_dl: None,
        }
    }

    /// Derive a snapshot from the latest reading, the one before it and the
    /// recent window peak.
    ///
    /// The rate is only computed when the readings are strictly ordered in
    /// time. `delta_from_peak` is zero when no peak is known.
    #[must_use]
    pub fn from_readings(
        latest: GlucoseReading,
        previous: Option<GlucoseReading>,
        window_peak_mg_dl: Option<f64>,
    ) -> Self {
        let mut snapshot = Self::new(latest.value_mg_dl, latest.timestamp);

        if let Some(prev) = previous {
            #[allow(clippy::cast_precision_loss)]
            let delta_min = (latest.timestamp - prev.timestamp).num_milliseconds() as f64 / 60_000.0;
            if delta_min > 0.0 {
                let rate = (latest.value_mg_dl - prev.value_mg_dl) / delta_min;
                snapshot.trend = Some(classify_trend(rate));
                snapshot.rate_mg_per_min = Some((rate * 100.0).round() / 100.0);
            }
        }

        let delta_from_peak = window_peak_mg_dl.map_or(0.0, |peak| latest.value_mg_dl - peak);
        snapshot.energy_state = Some(classify_energy_state(
            latest.value_mg_dl,
            delta_from_peak,
            DEFAULT_BASELINE_MG_DL,
        ));
        snapshot.window_peak_mg_dl = window_peak_mg_dl;
        snapshot
    }
}
