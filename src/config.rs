//! Agent configuration.
//!
//! Defaults reproduce the engine's documented constants. Any field can be
//! overridden from `VITA_`-prefixed environment variables, e.g.
//! `VITA_CONFIDENCE_THRESHOLD=0.8`.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::guardrails::HRV_SAFETY_THRESHOLD_MS;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "VITA_";

/// Tunables for [`crate::agent::CausalAgent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Upper bound on probe iterations.
    pub max_iterations: usize,
    /// Probe loop stops once confidence reaches this value.
    pub confidence_threshold: f64,
    /// HRV below this value triggers the safety bypass.
    pub hrv_safety_threshold_ms: f64,
    /// Current glucose above this skews priors toward the metabolic branch.
    pub elevated_glucose_mg_dl: f64,
    /// Glucose above this boosts probe confidence.
    pub glucose_boost_high_mg_dl: f64,
    /// Glucose below this boosts probe confidence.
    pub glucose_boost_low_mg_dl: f64,
    /// Run within-iteration probes on scoped threads.
    pub parallel_probes: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            confidence_threshold: 0.7,
            hrv_safety_threshold_ms: HRV_SAFETY_THRESHOLD_MS,
            elevated_glucose_mg_dl: 140.0,
            glucose_boost_high_mg_dl: 160.0,
            glucose_boost_low_mg_dl: 70.0,
            parallel_probes: true,
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidConfig {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn parse_var<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T, ValidationError> {
    raw.trim()
        .parse()
        .map_err(|_| invalid(field, format!("cannot parse '{raw}'")))
}

impl AgentConfig {
    /// Defaults overlaid with `VITA_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for unparsable or out-of-range values.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_vars(std::env::vars())
    }

    /// Defaults overlaid with the given `(name, value)` pairs. Names without
    /// the `VITA_` prefix and unknown names are ignored.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for unparsable or out-of-range values.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut cfg = Self::default();
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let field = name.to_ascii_lowercase();
            let raw = value.as_ref();
            match field.as_str() {
                "max_iterations" => cfg.max_iterations = parse_var(&field, raw)?,
                "confidence_threshold" => cfg.confidence_threshold = parse_var(&field, raw)?,
                "hrv_safety_threshold_ms" => cfg.hrv_safety_threshold_ms = parse_var(&field, raw)?,
                "elevated_glucose_mg_dl" => cfg.elevated_glucose_mg_dl = parse_var(&field, raw)?,
                "glucose_boost_high_mg_dl" => cfg.glucose_boost_high_mg_dl = parse_var(&field, raw)?,
                "glucose_boost_low_mg_dl" => cfg.glucose_boost_low_mg_dl = parse_var(&field, raw)?,
                "parallel_probes" => cfg.parallel_probes = parse_var(&field, raw)?,
                _ => {}
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` naming the first bad field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(invalid("confidence_threshold", "must be within [0, 1]"));
        }
        if !self.hrv_safety_threshold_ms.is_finite() || self.hrv_safety_threshold_ms <= 0.0 {
            return Err(invalid("hrv_safety_threshold_ms", "must be a positive number"));
        }
        if !self.elevated_glucose_mg_dl.is_finite() || self.elevated_glucose_mg_dl <= 0.0 {
            return Err(invalid("elevated_glucose_mg_dl", "must be a positive number"));
        }
        if !(self.glucose_boost_low_mg_dl < self.glucose_boost_high_mg_dl) {
            return Err(invalid(
                "glucose_boost_low_mg_dl",
                "must be below glucose_boost_high_mg_dl",
            ));
        }
        Ok(())
    }
}
