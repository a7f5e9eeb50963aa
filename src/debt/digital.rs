//! Digital debt scoring.
//!
//! ```text
//! digitalDebt      = clamp(screenTimeFactor + dopamineFactor, 0, 100)
//! screenTimeFactor = min(genuineMinutes / 60, 1) * 60
//! dopamineFactor   = max(event dopamine debt) * 0.4
//! ```
//!
//! Screen time that starts within 30 minutes after a glucose crash is
//! reactive scrolling and does not count toward genuine minutes. It still
//! counts toward the dopamine maximum.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Window after a crash during which scrolling is considered reactive.
pub const REACTIVE_WINDOW_MINUTES: i64 = 30;

/// A passive screen consumption event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenEvent {
    /// When the session started.
    pub start: DateTime<Utc>,
    /// Session length in seconds.
    pub duration_seconds: f64,
    /// Pre-computed dopamine debt for the event, 0-100.
    #[serde(default)]
    pub dopamine_debt_score: f64,
}

/// A glucose crash (crashing or reactive-low state) used for reactive
/// scrolling detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlucoseCrash {
    /// When the crash was detected.
    pub timestamp: DateTime<Utc>,
}

/// Behavioral inputs for [`compute_dopamine_debt`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DopamineInputs {
    /// Passive consumption minutes in the last three hours.
    pub passive_minutes_last_3h: f64,
    /// App-switch frequency expressed as a z-score.
    pub app_switch_z_score: f64,
    /// Fraction of screen time spent in focus mode.
    pub focus_mode_ratio: f64,
    /// Late-night usage penalty, 0-1.
    pub late_night_penalty: f64,
}

fn unit(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Dopamine debt for a single behavioral event, clamped to `[0, 100]`.
#[must_use]
pub fn compute_dopamine_debt(inputs: &DopamineInputs) -> f64 {
    let passive_norm = unit(inputs.passive_minutes_last_3h / 60.0);
    let switch_norm = unit(inputs.app_switch_z_score);
    let focus_norm = unit(inputs.focus_mode_ratio);
    let late_norm = unit(inputs.late_night_penalty);

    let score = (0.4 * passive_norm + 0.3 * switch_norm + 0.2 * (1.0 - focus_norm) + 0.1 * late_norm)
        * 100.0;
    score.clamp(0.0, 100.0)
}

fn is_reactive(event: &ScreenEvent, crashes: &[GlucoseCrash]) -> bool {
    let window = Duration::minutes(REACTIVE_WINDOW_MINUTES);
    crashes.iter().any(|crash| {
        let since = event.start - crash.timestamp;
        since >= Duration::zero() && since <= window
    })
}

/// Aggregate digital debt, clamped to `[0, 100]`. No events scores zero.
#[must_use]
pub fn compute_digital_debt(events: &[ScreenEvent], crashes: &[GlucoseCrash]) -> f64 {
    if events.is_empty() {
        return 0.0;
    }

    let mut genuine_minutes = 0.0;
    let mut max_dopamine = 0.0_f64;
    for event in events {
        if !is_reactive(event, crashes) {
            genuine_minutes += event.duration_seconds.max(0.0) / 60.0;
        }
        max_dopamine = max_dopamine.max(event.dopamine_debt_score);
    }

    let screen_time_factor = (genuine_minutes / 60.0).min(1.0) * 60.0;
    let dopamine_factor = max_dopamine * 0.4;
    (screen_time_factor + dopamine_factor).clamp(0.0, 100.0)
}
