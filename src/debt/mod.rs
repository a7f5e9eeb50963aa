//! Debt scorers.
//!
//! Pure formulas that turn evidence into 0-100 strain scores.

mod digital;
mod metabolic;

pub use digital::{
    compute_digital_debt, compute_dopamine_debt, DopamineInputs, GlucoseCrash, ScreenEvent,
    REACTIVE_WINDOW_MINUTES,
};
pub use metabolic::{compute_meal_debt, compute_metabolic_debt, MealDebtInput, LATE_MEAL_HOUR};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const DEFAULT_BASELINE_HRV_MS: f64 = 60.0;
const DEFAULT_POST_MEAL_HRV_MS: f64 = 50.0;

/// Metabolic and digital debt for a time window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DebtScores {
    /// Metabolic debt, 0-100.
    pub metabolic: f64,
    /// Digital debt, 0-100.
    pub digital: f64,
}

/// Screen time recorded as a block of minutes starting at a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenMinutes {
    /// Start of the block.
    pub start: DateTime<Utc>,
    /// Minutes of screen time.
    pub minutes: f64,
}

/// Rounds a score to one decimal place.
#[must_use]
pub fn round_score(score: f64) -> f64 {
    (score * 10.0).round() / 10.0
}

/// Estimate current debt for a window when no meal log is available.
///
/// The window's glucose readings stand in for one synthetic meal: glycemic
/// load approximated as `mean * 0.3`, swing from the window's max and min.
/// HRV falls back to a 60/50 ms baseline/post pair unless an average is
/// known, in which case the baseline is taken as 110% of it. Screen blocks
/// carry no dopamine score. Both results are rounded to one decimal.
#[must_use]
pub fn estimate_window_debt(
    glucose_values: &[f64],
    hrv_avg_ms: Option<f64>,
    screen: &[ScreenMinutes],
) -> DebtScores {
    let metabolic = if glucose_values.is_empty() {
        0.0
    } else {
        let peak = glucose_values.iter().copied().fold(f64::MIN, f64::max);
        let nadir = glucose_values.iter().copied().fold(f64::MAX, f64::min);
        #[allow(clippy::cast_precision_loss)]
        let mean = glucose_values.iter().sum::<f64>() / glucose_values.len() as f64;

        let (post, baseline) = match hrv_avg_ms {
            Some(avg) if avg > 0.0 => (avg, avg * 1.1),
            _ => (DEFAULT_POST_MEAL_HRV_MS, DEFAULT_BASELINE_HRV_MS),
        };

        compute_metabolic_debt(&[MealDebtInput {
            glycemic_load: mean * 0.3,
            peak_glucose: peak,
            nadir_glucose: nadir,
            post_meal_hrv_avg: post,
            baseline_hrv_avg: baseline,
            bioavailability_modifier: None,
            meal_hour: 12,
        }])
    };

    let events: Vec<ScreenEvent> = screen
        .iter()
        .map(|block| ScreenEvent {
            start: block.start,
            duration_seconds: block.minutes * 60.0,
            dopamine_debt_score: 0.0,
        })
        .collect();
    let digital = compute_digital_debt(&events, &[]);

    DebtScores {
        metabolic: round_score(metabolic),
        digital: round_score(digital),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_is_zero() {
        assert_eq!(estimate_window_debt(&[], None, &[]), DebtScores::default());
    }

    #[test]
    fn window_with_glucose_only() {
        // mean 120 -> GL 36 -> 0.72*0.3 = 0.216; swing 80 -> 0.3;
        // default HRV 50/60 -> drop 1/6 -> 0.041667; unknown cooking 0.03.
        let scores = estimate_window_debt(&[80.0, 120.0, 160.0], None, &[]);
        assert_eq!(scores.metabolic, 58.8);
        assert_eq!(scores.digital, 0.0);
    }

    #[test]
    fn window_screen_minutes() {
        let now = Utc::now();
        let scores = estimate_window_debt(
            &[],
            None,
            &[
                ScreenMinutes { start: now, minutes: 20.0 },
                ScreenMinutes { start: now, minutes: 25.0 },
            ],
        );
        assert_eq!(scores.digital, 45.0);
    }

    #[test]
    fn round_score_one_decimal() {
        assert_eq!(round_score(33.333), 33.3);
        assert_eq!(round_score(0.04), 0.0);
    }
}
