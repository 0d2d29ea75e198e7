//! CAC forecaster: projects weekly customer acquisition cost up to four weeks out.

use std::collections::{BTreeMap, BTreeSet};

use attribution_core::config::ForecastConfig;
use attribution_core::{EngineError, EngineResult};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::trend::TrendFit;

pub const MAX_HORIZON_WEEKS: u32 = 4;

/// One historical data point, typically daily.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacObservation {
    pub date: NaiveDate,
    pub cac: f64,
    pub spend: f64,
    pub conversions: u64,
    #[serde(default)]
    pub channel_spend: BTreeMap<String, f64>,
}

/// Observations rolled up to a Monday-starting week.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyAggregate {
    pub week_start: NaiveDate,
    pub cac: f64,
    pub spend: f64,
    pub conversions: u64,
    pub channel_spend: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorDirection {
    /// Pulls CAC down.
    Positive,
    /// Pushes CAC up.
    Negative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacFactor {
    pub name: String,
    /// Share of the latest week-over-week CAC change, in percent of prior CAC.
    pub impact_pct: f64,
    pub direction: FactorDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyCacPrediction {
    pub week_offset: u32,
    pub predicted_cac: f64,
    pub confidence_low: f64,
    pub confidence_high: f64,
    pub factors: Vec<CacFactor>,
}

/// Output of one forecast run. Never mutated; the next run supersedes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacForecast {
    pub run_id: Uuid,
    pub campaign_id: String,
    pub current_cac: f64,
    pub predictions: Vec<WeeklyCacPrediction>,
    /// `100 * (1 - MAPE)` of the in-sample fit.
    pub model_accuracy: f64,
    pub weekly_trend: f64,
    pub weeks_used: usize,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct CacForecaster {
    config: ForecastConfig,
}

impl CacForecaster {
    pub fn new(config: ForecastConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Forecast `horizon_weeks` (1..=4) of weekly CAC.
    ///
    /// `channel_weights` are per-channel attribution shares used to rank the
    /// drivers of the latest week-over-week change; channels without a weight
    /// are ignored.
    pub fn forecast(
        &self,
        campaign_id: &str,
        history: &[CacObservation],
        horizon_weeks: u32,
        channel_weights: &BTreeMap<String, f64>,
    ) -> EngineResult<CacForecast> {
        if !(1..=MAX_HORIZON_WEEKS).contains(&horizon_weeks) {
            return Err(EngineError::validation(format!(
                "horizon of {horizon_weeks} weeks outside 1..={MAX_HORIZON_WEEKS}"
            )));
        }
        validate_history(history)?;

        let weeks = weekly_aggregates(history);
        if weeks.len() < self.config.min_history_weeks {
            return Err(EngineError::InsufficientHistory {
                available: weeks.len(),
                required: self.config.min_history_weeks,
            });
        }

        let window = &weeks[weeks.len().saturating_sub(self.config.trend_window_weeks)..];
        let ys: Vec<f64> = window.iter().map(|w| w.cac).collect();
        let fit = TrendFit::fit(&ys, self.config.season_length_weeks);
        debug!(
            campaign_id,
            weeks = ys.len(),
            slope = fit.slope,
            sigma = fit.sigma,
            "cac trend fitted"
        );

        let factors = self.rank_factors(window, channel_weights);
        let last_x = (ys.len() - 1) as f64;
        let predictions = (1..=horizon_weeks)
            .map(|h| {
                let predicted = fit.predict(last_x + h as f64).max(0.0);
                let half_width = self.config.z_score * fit.sigma * (h as f64).sqrt();
                WeeklyCacPrediction {
                    week_offset: h,
                    predicted_cac: predicted,
                    confidence_low: (predicted - half_width).max(0.0),
                    confidence_high: predicted + half_width,
                    factors: factors.clone(),
                }
            })
            .collect();

        let forecast = CacForecast {
            run_id: Uuid::new_v4(),
            campaign_id: campaign_id.to_string(),
            current_cac: ys[ys.len() - 1],
            predictions,
            model_accuracy: ((1.0 - fit.mape) * 100.0).clamp(0.0, 100.0),
            weekly_trend: fit.slope,
            weeks_used: ys.len(),
            computed_at: Utc::now(),
        };

        info!(
            campaign_id,
            horizon_weeks,
            current_cac = forecast.current_cac,
            accuracy = forecast.model_accuracy,
            "cac forecast complete"
        );
        Ok(forecast)
    }

    /// Rank channels by `weight * spend change` between the last two weeks.
    fn rank_factors(
        &self,
        weeks: &[WeeklyAggregate],
        channel_weights: &BTreeMap<String, f64>,
    ) -> Vec<CacFactor> {
        let [.., prev, last] = weeks else {
            return Vec::new();
        };

        let cac_delta = last.cac - prev.cac;
        let cac_delta_pct = if prev.cac > 0.0 {
            cac_delta / prev.cac * 100.0
        } else {
            0.0
        };

        let channels: BTreeSet<&String> = prev
            .channel_spend
            .keys()
            .chain(last.channel_spend.keys())
            .collect();
        let mut drivers: Vec<(String, f64)> = channels
            .into_iter()
            .filter_map(|channel| {
                let weight = channel_weights.get(channel).copied()?;
                let before = prev.channel_spend.get(channel).copied().unwrap_or(0.0);
                let after = last.channel_spend.get(channel).copied().unwrap_or(0.0);
                let driver = weight * (after - before);
                (driver != 0.0).then(|| (channel.clone(), driver))
            })
            .collect();

        let total: f64 = drivers.iter().map(|(_, d)| d.abs()).sum();
        if total == 0.0 {
            return Vec::new();
        }
        drivers.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()).then_with(|| a.0.cmp(&b.0)));
        drivers
            .into_iter()
            .take(self.config.max_factors)
            .map(|(name, driver)| CacFactor {
                name,
                impact_pct: driver.abs() / total * cac_delta_pct.abs(),
                direction: if (driver > 0.0) != (cac_delta > 0.0) {
                    FactorDirection::Positive
                } else {
                    FactorDirection::Negative
                },
            })
            .collect()
    }
}

fn validate_history(history: &[CacObservation]) -> EngineResult<()> {
    for obs in history {
        let valid = obs.cac.is_finite()
            && obs.cac >= 0.0
            && obs.spend.is_finite()
            && obs.spend >= 0.0
            && obs.channel_spend.values().all(|s| s.is_finite() && *s >= 0.0);
        if !valid {
            return Err(EngineError::validation(format!(
                "invalid CAC observation on {}",
                obs.date
            )));
        }
    }
    Ok(())
}

/// Roll observations up to weeks, oldest first. Weekly CAC is spend over
/// conversions when the week converted, otherwise the mean observed CAC.
pub fn weekly_aggregates(history: &[CacObservation]) -> Vec<WeeklyAggregate> {
    let mut sorted: Vec<&CacObservation> = history.iter().collect();
    sorted.sort_by_key(|o| o.date);

    let mut weeks: BTreeMap<NaiveDate, (WeeklyAggregate, f64, usize)> = BTreeMap::new();
    for obs in sorted {
        let week_start =
            obs.date - Duration::days(obs.date.weekday().num_days_from_monday() as i64);
        let (agg, cac_sum, count) = weeks.entry(week_start).or_insert_with(|| {
            (
                WeeklyAggregate {
                    week_start,
                    cac: 0.0,
                    spend: 0.0,
                    conversions: 0,
                    channel_spend: BTreeMap::new(),
                },
                0.0,
                0,
            )
        });
        agg.spend += obs.spend;
        agg.conversions += obs.conversions;
        for (channel, spend) in &obs.channel_spend {
            *agg.channel_spend.entry(channel.clone()).or_insert(0.0) += spend;
        }
        *cac_sum += obs.cac;
        *count += 1;
    }

    weeks
        .into_values()
        .map(|(mut agg, cac_sum, count)| {
            agg.cac = if agg.conversions > 0 {
                agg.spend / agg.conversions as f64
            } else {
                cac_sum / count as f64
            };
            agg
        })
        .collect()
}
