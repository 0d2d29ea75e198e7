use serde::Deserialize;
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Hard ceiling for exact Shapley enumeration (2^20 coalition evaluations).
pub const MAX_EXACT_THRESHOLD: usize = 20;

/// Root engine configuration. Loaded from environment variables with the
/// prefix `ATTRIBUTION_ENGINE__` and an optional TOML/JSON/YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub attribution: AttributionConfig,
    #[serde(default)]
    pub shapley: ShapleyConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttributionConfig {
    /// Half-life used by time-decay when the model has no active windows.
    #[serde(default = "default_half_life_days")]
    pub default_half_life_days: f64,
    /// Window half-life as a fraction of the window's duration.
    #[serde(default = "default_half_life_ratio")]
    pub half_life_ratio: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShapleyConfig {
    /// Coalitions up to this size are enumerated exactly.
    #[serde(default = "default_exact_threshold")]
    pub exact_threshold: usize,
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Target standard error per player. `None` always draws `max_samples`.
    #[serde(default)]
    pub tolerance: Option<f64>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastConfig {
    #[serde(default = "default_trend_window_weeks")]
    pub trend_window_weeks: usize,
    #[serde(default = "default_min_history_weeks")]
    pub min_history_weeks: usize,
    #[serde(default = "default_z_score")]
    pub z_score: f64,
    #[serde(default = "default_max_factors")]
    pub max_factors: usize,
    #[serde(default)]
    pub season_length_weeks: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BudgetConfig {
    /// Number of discrete increments the total budget is split into.
    #[serde(default = "default_increments")]
    pub increments: usize,
    #[serde(default = "default_base_confidence")]
    pub base_confidence: f64,
    /// Relative change (percent) under which a campaign is reported as "maintain".
    #[serde(default = "default_maintain_band_pct")]
    pub maintain_band_pct: f64,
}

// Default functions
fn default_half_life_days() -> f64 {
    7.0
}
fn default_half_life_ratio() -> f64 {
    0.5
}
fn default_exact_threshold() -> usize {
    12
}
fn default_max_samples() -> usize {
    10_000
}
fn default_min_samples() -> usize {
    1_000
}
fn default_batch_size() -> usize {
    500
}
fn default_seed() -> u64 {
    42
}
fn default_workers() -> usize {
    1
}
fn default_trend_window_weeks() -> usize {
    8
}
fn default_min_history_weeks() -> usize {
    3
}
fn default_z_score() -> f64 {
    1.96
}
fn default_max_factors() -> usize {
    4
}
fn default_increments() -> usize {
    200
}
fn default_base_confidence() -> f64 {
    0.9
}
fn default_maintain_band_pct() -> f64 {
    5.0
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            default_half_life_days: default_half_life_days(),
            half_life_ratio: default_half_life_ratio(),
        }
    }
}

impl Default for ShapleyConfig {
    fn default() -> Self {
        Self {
            exact_threshold: default_exact_threshold(),
            max_samples: default_max_samples(),
            min_samples: default_min_samples(),
            batch_size: default_batch_size(),
            tolerance: None,
            seed: default_seed(),
            workers: default_workers(),
        }
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            trend_window_weeks: default_trend_window_weeks(),
            min_history_weeks: default_min_history_weeks(),
            z_score: default_z_score(),
            max_factors: default_max_factors(),
            season_length_weeks: None,
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            increments: default_increments(),
            base_confidence: default_base_confidence(),
            maintain_band_pct: default_maintain_band_pct(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            attribution: AttributionConfig::default(),
            shapley: ShapleyConfig::default(),
            forecast: ForecastConfig::default(),
            budget: BudgetConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables only.
    pub fn load() -> EngineResult<Self> {
        Self::build(None)
    }

    /// Load configuration from an optional file, overridden by environment variables.
    pub fn load_from(path: &str) -> EngineResult<Self> {
        Self::build(Some(path))
    }

    fn build(path: Option<&str>) -> EngineResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("ATTRIBUTION_ENGINE")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        debug!(
            file = path.unwrap_or("-"),
            exact_threshold = config.shapley.exact_threshold,
            workers = config.shapley.workers,
            increments = config.budget.increments,
            "engine configuration loaded"
        );
        Ok(config)
    }

    /// Reject settings no run could honour.
    pub fn validate(&self) -> EngineResult<()> {
        self.attribution.validate()?;
        self.shapley.validate()?;
        self.forecast.validate()?;
        self.budget.validate()
    }
}

impl AttributionConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !(self.default_half_life_days.is_finite() && self.default_half_life_days > 0.0) {
            return Err(EngineError::validation(
                "attribution.default_half_life_days must be positive",
            ));
        }
        if !(self.half_life_ratio.is_finite() && self.half_life_ratio > 0.0) {
            return Err(EngineError::validation(
                "attribution.half_life_ratio must be positive",
            ));
        }
        Ok(())
    }
}

impl ShapleyConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.exact_threshold > MAX_EXACT_THRESHOLD {
            return Err(EngineError::validation(format!(
                "shapley.exact_threshold {} exceeds ceiling {}",
                self.exact_threshold, MAX_EXACT_THRESHOLD
            )));
        }
        if self.max_samples == 0 || self.batch_size == 0 || self.workers == 0 {
            return Err(EngineError::validation(
                "shapley.max_samples, batch_size and workers must be at least 1",
            ));
        }
        if self.min_samples > self.max_samples {
            return Err(EngineError::validation(
                "shapley.min_samples must not exceed max_samples",
            ));
        }
        if let Some(tol) = self.tolerance {
            if !(tol.is_finite() && tol > 0.0) {
                return Err(EngineError::validation("shapley.tolerance must be positive"));
            }
        }
        Ok(())
    }
}

impl ForecastConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.min_history_weeks < 3 || self.trend_window_weeks < self.min_history_weeks {
            return Err(EngineError::validation(
                "forecast.min_history_weeks must be >= 3 and <= trend_window_weeks",
            ));
        }
        if !(self.z_score.is_finite() && self.z_score > 0.0) {
            return Err(EngineError::validation("forecast.z_score must be positive"));
        }
        if matches!(self.season_length_weeks, Some(0 | 1)) {
            return Err(EngineError::validation(
                "forecast.season_length_weeks must be at least 2",
            ));
        }
        Ok(())
    }
}

impl BudgetConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.increments == 0 {
            return Err(EngineError::validation("budget.increments must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.base_confidence) {
            return Err(EngineError::validation(
                "budget.base_confidence must be within [0, 1]",
            ));
        }
        if !(self.maintain_band_pct.is_finite() && self.maintain_band_pct >= 0.0) {
            return Err(EngineError::validation(
                "budget.maintain_band_pct must be non-negative",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.shapley.exact_threshold, 12);
        assert_eq!(config.shapley.max_samples, 10_000);
        assert_eq!(config.forecast.trend_window_weeks, 8);
        assert_eq!(config.budget.increments, 200);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"shapley": {"exact_threshold": 10}}"#).unwrap();
        assert_eq!(config.shapley.exact_threshold, 10);
        assert_eq!(config.shapley.max_samples, 10_000);
        assert!((config.forecast.z_score - 1.96).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_exact_threshold_above_ceiling() {
        let mut config = EngineConfig::default();
        config.shapley.exact_threshold = 30;
        assert!(matches!(
            config.validate(),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn rejects_min_samples_above_max() {
        let mut config = EngineConfig::default();
        config.shapley.min_samples = 20_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn sections_validate_on_their_own() {
        let shapley = ShapleyConfig {
            batch_size: 0,
            ..ShapleyConfig::default()
        };
        assert!(matches!(shapley.validate(), Err(EngineError::Validation(_))));

        let forecast = ForecastConfig {
            trend_window_weeks: 0,
            ..ForecastConfig::default()
        };
        assert!(matches!(forecast.validate(), Err(EngineError::Validation(_))));

        assert!(AttributionConfig::default().validate().is_ok());
        assert!(BudgetConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_short_minimum_history() {
        let mut config = EngineConfig::default();
        config.forecast.min_history_weeks = 2;
        assert!(config.validate().is_err());
    }
}
