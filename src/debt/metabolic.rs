//! Metabolic debt scoring.
//!
//! ```text
//! mealDebt  = (glFactor*0.3 + spike*0.3 + hrvDrop*0.25 + (cookingMod-0.8)*0.15) * timingPenalty
//! totalDebt = clamp(mean(mealDebt) * 100, 0, 100)
//! ```

use serde::{Deserialize, Serialize};

/// Meals starting at or after this hour carry the late-meal penalty.
pub const LATE_MEAL_HOUR: u32 = 20;

const LATE_MEAL_PENALTY: f64 = 1.3;

/// Input data for a single meal's debt calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealDebtInput {
    /// Glycemic load of the meal.
    pub glycemic_load: f64,
    /// Max glucose 0-150 min post-meal (mg/dL).
    pub peak_glucose: f64,
    /// Min glucose after the peak (mg/dL).
    pub nadir_glucose: f64,
    /// Mean HRV 60-180 min post-meal (ms).
    pub post_meal_hrv_avg: f64,
    /// Mean HRV over the 7-day lookback (ms).
    pub baseline_hrv_avg: f64,
    /// Bioavailability modifier from the cooking method, if known.
    pub bioavailability_modifier: Option<f64>,
    /// Local hour of the meal, 0-23.
    pub meal_hour: u32,
}

fn cooking_modifier(bioavailability: Option<f64>) -> f64 {
    match bioavailability {
        Some(bio) if bio > 1.0 => 0.8,
        Some(_) => 1.2,
        None => 1.0,
    }
}

/// Raw debt contribution of a single meal (not yet scaled to 0-100).
#[must_use]
pub fn compute_meal_debt(meal: &MealDebtInput) -> f64 {
    let gl_factor = (meal.glycemic_load / 50.0).min(1.0);

    let spike = (meal.peak_glucose - meal.nadir_glucose).max(0.0);
    let spike_magnitude = (spike / 80.0).min(1.0);

    let hrv_drop = if meal.baseline_hrv_avg > 0.0 {
        ((meal.baseline_hrv_avg - meal.post_meal_hrv_avg) / meal.baseline_hrv_avg).max(0.0)
    } else {
        0.0
    };

    let timing_penalty = if meal.meal_hour >= LATE_MEAL_HOUR {
        LATE_MEAL_PENALTY
    } else {
        1.0
    };

    (gl_factor * 0.3
        + spike_magnitude * 0.3
        + hrv_drop * 0.25
        + (cooking_modifier(meal.bioavailability_modifier) - 0.8) * 0.15)
        * timing_penalty
}

/// Aggregate metabolic debt over a window of meals, clamped to `[0, 100]`.
///
/// An empty window scores zero.
#[must_use]
pub fn compute_metabolic_debt(meals: &[MealDebtInput]) -> f64 {
    if meals.is_empty() {
        return 0.0;
    }

    let total: f64 = meals.iter().map(compute_meal_debt).sum();
    #[allow(clippy::cast_precision_loss)]
    let mean = total / meals.len() as f64;
    (mean * 100.0).clamp(0.0, 100.0)
}
