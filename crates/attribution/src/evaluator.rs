//! Attribution model evaluator: turns a normalized journey into per-touchpoint weights.

use attribution_core::config::{AttributionConfig, ShapleyConfig};
use attribution_core::{
    AttributionModel, AttributionResult, AttributionWindow, EngineError, EngineResult, ModelType,
    NormalizedJourney,
};
use attribution_shapley::{characteristic_fn, CharacteristicFunction, ShapleyCalculator};
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

/// A touchpoint that survived window filtering.
struct Qualified<'a> {
    index: usize,
    window: Option<&'a AttributionWindow>,
}

#[derive(Debug, Clone, Default)]
pub struct AttributionEvaluator {
    config: AttributionConfig,
    shapley: ShapleyCalculator,
}

impl AttributionEvaluator {
    pub fn new(config: AttributionConfig, shapley: ShapleyConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            shapley: ShapleyCalculator::new(shapley)?,
        })
    }

    /// Weight the journey's touchpoints under `model`.
    ///
    /// Data-driven models need a channel value function; use
    /// [`evaluate_data_driven`](Self::evaluate_data_driven) for those.
    pub fn evaluate(
        &self,
        journey: &NormalizedJourney,
        model: &AttributionModel,
    ) -> EngineResult<AttributionResult> {
        self.evaluate_inner(journey, model, None)
    }

    /// Weight the journey with the channels of its qualifying touchpoints
    /// treated as players of `channel_value`.
    pub fn evaluate_data_driven<V>(
        &self,
        journey: &NormalizedJourney,
        model: &AttributionModel,
        channel_value: &V,
    ) -> EngineResult<AttributionResult>
    where
        V: CharacteristicFunction,
    {
        self.evaluate_inner(journey, model, Some(channel_value))
    }

    fn evaluate_inner(
        &self,
        journey: &NormalizedJourney,
        model: &AttributionModel,
        channel_value: Option<&dyn CharacteristicFunction>,
    ) -> EngineResult<AttributionResult> {
        model.validate()?;
        if journey.is_empty() {
            return Err(EngineError::validation(format!(
                "conversion {} has no touchpoints",
                journey.conversion_id
            )));
        }

        let qualified = qualify(journey, model);
        if qualified.is_empty() {
            return Err(no_qualifying(journey));
        }

        let mut weights = vec![0.0; journey.len()];
        match model.model_type {
            ModelType::FirstTouch => weights[qualified[0].index] = 1.0,
            ModelType::LastTouch => weights[qualified[qualified.len() - 1].index] = 1.0,
            ModelType::Linear => {
                let share = 1.0 / qualified.len() as f64;
                for q in &qualified {
                    weights[q.index] = share;
                }
            }
            ModelType::TimeDecay => {
                for q in &qualified {
                    weights[q.index] = self.decay_weight(journey, q);
                }
                normalize_in_place(&mut weights).ok_or_else(|| no_qualifying(journey))?;
            }
            ModelType::DataDriven => {
                let value = channel_value.ok_or_else(|| {
                    EngineError::validation(format!(
                        "model {} is data-driven and needs a channel value function",
                        model.id
                    ))
                })?;
                self.data_driven_weights(journey, &qualified, value, &mut weights)?;
                normalize_in_place(&mut weights).ok_or_else(|| no_qualifying(journey))?;
            }
        }

        debug!(
            conversion_id = %journey.conversion_id,
            model = %model.model_type,
            qualifying = qualified.len(),
            touchpoints = journey.len(),
            "attribution evaluated"
        );

        Ok(AttributionResult {
            run_id: Uuid::new_v4(),
            conversion_id: journey.conversion_id.clone(),
            campaign_id: journey.campaign_id.clone(),
            model_id: model.id.clone(),
            model_type: model.model_type,
            weights,
            qualifying: qualified.len(),
            computed_at: Utc::now(),
        })
    }

    /// `multiplier * 2^(-recency / half_life)`.
    fn decay_weight(&self, journey: &NormalizedJourney, q: &Qualified<'_>) -> f64 {
        let recency = journey.touchpoints[q.index].recency_days.max(0.0);
        let (multiplier, half_life) = match q.window {
            Some(w) => (w.weight / 100.0, w.duration_days * self.config.half_life_ratio),
            None => (1.0, self.config.default_half_life_days),
        };
        multiplier * (-recency / half_life).exp2()
    }

    fn data_driven_weights(
        &self,
        journey: &NormalizedJourney,
        qualified: &[Qualified<'_>],
        value: &dyn CharacteristicFunction,
        weights: &mut [f64],
    ) -> EngineResult<()> {
        let mut channels: Vec<String> = Vec::new();
        for q in qualified {
            let channel = journey.touchpoints[q.index].channel();
            if !channels.iter().any(|c| c == channel) {
                channels.push(channel.to_string());
            }
        }

        let allocation = self
            .shapley
            .shapley(&journey.campaign_id, &channels, value)?;

        for share in &allocation.shares {
            let members: Vec<usize> = qualified
                .iter()
                .map(|q| q.index)
                .filter(|&i| journey.touchpoints[i].channel() == share.player_id)
                .collect();
            let per_touchpoint = share.shapley_value.max(0.0) / members.len() as f64;
            for i in members {
                weights[i] = per_touchpoint;
            }
        }
        Ok(())
    }
}

/// Qualifying touchpoints in time order. Without active windows every touchpoint qualifies.
fn qualify<'a>(journey: &NormalizedJourney, model: &'a AttributionModel) -> Vec<Qualified<'a>> {
    if !model.is_windowed() {
        return (0..journey.len())
            .map(|index| Qualified {
                index,
                window: None,
            })
            .collect();
    }
    journey
        .touchpoints
        .iter()
        .enumerate()
        .filter_map(|(index, tp)| {
            model.matching_window(tp).map(|w| Qualified {
                index,
                window: Some(w),
            })
        })
        .collect()
}

/// Scale to sum 1. `None` when nothing carries weight.
fn normalize_in_place(weights: &mut [f64]) -> Option<()> {
    let total: f64 = weights.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return None;
    }
    for w in weights.iter_mut() {
        *w /= total;
    }
    Some(())
}

fn no_qualifying(journey: &NormalizedJourney) -> EngineError {
    EngineError::NoQualifyingTouchpoints {
        conversion_id: journey.conversion_id.clone(),
    }
}

/// Channel value function that credits each channel with its own touchpoints'
/// weight under another model. Useful as an additive baseline for data-driven runs.
pub fn additive_channel_value<'a>(
    journey: &'a NormalizedJourney,
    baseline: &AttributionResult,
) -> impl CharacteristicFunction + 'a {
    let weights = baseline.weights.clone();
    characteristic_fn(move |c| {
        Ok(journey
            .touchpoints
            .iter()
            .zip(&weights)
            .filter(|(tp, _)| c.contains(tp.channel()))
            .map(|(_, w)| *w)
            .sum())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::normalize;
    use attribution_core::{ConversionEvent, EngagementKind, Touchpoint, WindowKind};
    use attribution_shapley::PathValueTable;
    use chrono::{DateTime, Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    fn journey(
        touchpoints: Vec<(&str, i64, EngagementKind)>,
        converted_day: i64,
    ) -> NormalizedJourney {
        let conversion = ConversionEvent {
            conversion_id: "conv-1".into(),
            campaign_id: "cmp-1".into(),
            buyer_id: "buyer-1".into(),
            total_value: 200.0,
            converted_at: t0() + Duration::days(converted_day),
            touchpoints: touchpoints
                .into_iter()
                .map(|(ch, d, k)| Touchpoint::new(ch, t0() + Duration::days(d), k))
                .collect(),
        };
        normalize(&conversion).unwrap()
    }

    fn three_touch() -> NormalizedJourney {
        journey(
            vec![
                ("display", 0, EngagementKind::Impression),
                ("search", 5, EngagementKind::Click),
                ("social", 10, EngagementKind::View),
            ],
            12,
        )
    }

    fn assert_sums_to_one(result: &AttributionResult) {
        assert!((result.weight_sum() - 1.0).abs() < 1e-9, "sum = {}", result.weight_sum());
    }

    #[test]
    fn linear_splits_evenly() {
        let model = AttributionModel::unwindowed("lin", ModelType::Linear);
        let result = AttributionEvaluator::default().evaluate(&three_touch(), &model).unwrap();
        for w in &result.weights {
            assert!((w - 1.0 / 3.0).abs() < 1e-12);
        }
        assert_sums_to_one(&result);
    }

    #[test]
    fn first_and_last_touch() {
        let eval = AttributionEvaluator::default();
        let first = eval
            .evaluate(&three_touch(), &AttributionModel::unwindowed("f", ModelType::FirstTouch))
            .unwrap();
        assert_eq!(first.weights, vec![1.0, 0.0, 0.0]);
        let last = eval
            .evaluate(&three_touch(), &AttributionModel::unwindowed("l", ModelType::LastTouch))
            .unwrap();
        assert_eq!(last.weights, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn single_touchpoint_takes_everything() {
        let j = journey(vec![("email", 1, EngagementKind::Click)], 2);
        for model_type in [
            ModelType::FirstTouch,
            ModelType::LastTouch,
            ModelType::Linear,
            ModelType::TimeDecay,
        ] {
            let result = AttributionEvaluator::default()
                .evaluate(&j, &AttributionModel::unwindowed("m", model_type))
                .unwrap();
            assert_eq!(result.weights, vec![1.0]);
        }
    }

    #[test]
    fn windows_exclude_stale_and_mismatched_touchpoints() {
        // Click window of 7 days: the impression and the view never qualify.
        let model = AttributionModel::unwindowed("clk", ModelType::Linear)
            .with_window(AttributionWindow::new("click", 7.0, WindowKind::Click, 100.0));
        let result = AttributionEvaluator::default().evaluate(&three_touch(), &model).unwrap();
        assert_eq!(result.weights, vec![0.0, 1.0, 0.0]);
        assert_eq!(result.qualifying, 1);
    }

    #[test]
    fn first_touch_uses_first_qualifying_touchpoint() {
        let model = AttributionModel::unwindowed("f", ModelType::FirstTouch)
            .with_window(AttributionWindow::new("view", 3.0, WindowKind::View, 50.0))
            .with_window(AttributionWindow::new("click", 10.0, WindowKind::Click, 50.0));
        let result = AttributionEvaluator::default().evaluate(&three_touch(), &model).unwrap();
        // display impression at recency 12 is outside the 3-day view window.
        assert_eq!(result.weights, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn nothing_qualifying_is_an_error() {
        let model = AttributionModel::unwindowed("strict", ModelType::Linear)
            .with_window(AttributionWindow::new("click", 1.0, WindowKind::Click, 90.0));
        let err = AttributionEvaluator::default().evaluate(&three_touch(), &model).unwrap_err();
        assert!(matches!(err, EngineError::NoQualifyingTouchpoints { .. }));
    }

    #[test]
    fn time_decay_favours_recent_touchpoints() {
        let model = AttributionModel::unwindowed("td", ModelType::TimeDecay)
            .with_window(AttributionWindow::new("any", 28.0, WindowKind::Engagement, 100.0));
        let result = AttributionEvaluator::default().evaluate(&three_touch(), &model).unwrap();
        assert!(result.weights[0] < result.weights[1]);
        assert!(result.weights[1] < result.weights[2]);
        assert_sums_to_one(&result);
    }

    #[test]
    fn time_decay_halves_per_half_life() {
        // Unwindowed, default half-life of 7 days: recency 7 vs 0.
        let j = journey(
            vec![("a", 0, EngagementKind::Click), ("b", 7, EngagementKind::Click)],
            7,
        );
        let result = AttributionEvaluator::default()
            .evaluate(&j, &AttributionModel::unwindowed("td", ModelType::TimeDecay))
            .unwrap();
        assert!((result.weights[1] / result.weights[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn time_decay_applies_window_multipliers() {
        // Same recency; the click window carries 4x the view window's weight.
        let j = journey(
            vec![("a", 5, EngagementKind::Click), ("b", 5, EngagementKind::View)],
            6,
        );
        let model = AttributionModel::unwindowed("td", ModelType::TimeDecay)
            .with_window(AttributionWindow::new("click", 10.0, WindowKind::Click, 80.0))
            .with_window(AttributionWindow::new("view", 10.0, WindowKind::View, 20.0));
        let result = AttributionEvaluator::default().evaluate(&j, &model).unwrap();
        assert!((result.weights[0] - 0.8).abs() < 1e-9);
        assert!((result.weights[1] - 0.2).abs() < 1e-9);
    }

    #[test]
    fn zero_weight_windows_leave_nothing_to_attribute() {
        let model = AttributionModel::unwindowed("td", ModelType::TimeDecay)
            .with_window(AttributionWindow::new("any", 30.0, WindowKind::Engagement, 0.0));
        let err = AttributionEvaluator::default().evaluate(&three_touch(), &model).unwrap_err();
        assert!(matches!(err, EngineError::NoQualifyingTouchpoints { .. }));
    }

    #[test]
    fn data_driven_requires_value_function() {
        let model = AttributionModel::unwindowed("dd", ModelType::DataDriven);
        let err = AttributionEvaluator::default().evaluate(&three_touch(), &model).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn data_driven_delegates_to_shapley() {
        let mut history = PathValueTable::new();
        history.record(vec!["search".to_string()], 300.0).unwrap();
        history
            .record(vec!["search".to_string(), "social".to_string()], 100.0)
            .unwrap();

        let model = AttributionModel::unwindowed("dd", ModelType::DataDriven);
        let result = AttributionEvaluator::default()
            .evaluate_data_driven(&three_touch(), &model, &history)
            .unwrap();

        // display never converts alone or with others: null player.
        assert!(result.weights[0].abs() < 1e-12);
        assert!((result.weights[1] - 350.0 / 400.0).abs() < 1e-9);
        assert!((result.weights[2] - 50.0 / 400.0).abs() < 1e-9);
        assert_sums_to_one(&result);
    }

    #[test]
    fn data_driven_splits_channel_value_across_its_touchpoints() {
        let j = journey(
            vec![
                ("search", 1, EngagementKind::Click),
                ("email", 2, EngagementKind::Click),
                ("search", 3, EngagementKind::Click),
            ],
            4,
        );
        let value = characteristic_fn(|c| Ok(c.len() as f64));
        let result = AttributionEvaluator::default()
            .evaluate_data_driven(
                &j,
                &AttributionModel::unwindowed("dd", ModelType::DataDriven),
                &value,
            )
            .unwrap();
        assert!((result.weights[0] - 0.25).abs() < 1e-9);
        assert!((result.weights[1] - 0.5).abs() < 1e-9);
        assert!((result.weights[2] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn data_driven_with_no_history_is_unattributable() {
        let empty = PathValueTable::new();
        let model = AttributionModel::unwindowed("dd", ModelType::DataDriven);
        let err = AttributionEvaluator::default()
            .evaluate_data_driven(&three_touch(), &model, &empty)
            .unwrap_err();
        assert!(matches!(err, EngineError::NoQualifyingTouchpoints { .. }));
    }

    #[test]
    fn additive_baseline_reproduces_its_weights() {
        let j = three_touch();
        let eval = AttributionEvaluator::default();
        let baseline = eval
            .evaluate(&j, &AttributionModel::unwindowed("td", ModelType::TimeDecay))
            .unwrap();
        let value = additive_channel_value(&j, &baseline);
        let result = eval
            .evaluate_data_driven(
                &j,
                &AttributionModel::unwindowed("dd", ModelType::DataDriven),
                &value,
            )
            .unwrap();
        for (a, b) in result.weights.iter().zip(&baseline.weights) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let attribution = AttributionConfig {
            half_life_ratio: 0.0,
            ..AttributionConfig::default()
        };
        assert!(AttributionEvaluator::new(attribution, ShapleyConfig::default()).is_err());

        let shapley = ShapleyConfig {
            batch_size: 0,
            ..ShapleyConfig::default()
        };
        assert!(matches!(
            AttributionEvaluator::new(AttributionConfig::default(), shapley),
            Err(EngineError::Validation(_))
        ));
    }
}
