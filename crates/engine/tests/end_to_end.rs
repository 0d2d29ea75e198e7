//! End-to-end flows through the engine facade: raw conversions in,
//! attribution, Shapley allocations, CAC forecasts and budget runs out.

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use attribution_budget::{
        BudgetScenario, CampaignBudgetInput, PiecewiseRoasCurve, RoasCurveSpec, ScenarioStatus,
    };
    use attribution_core::{
        AttributionModel, ConversionEvent, EngagementKind, EngineConfig, EngineError, ModelType,
        Touchpoint,
    };
    use attribution_engine::AttributionEngine;
    use attribution_forecast::{CacObservation, FactorDirection};
    use attribution_shapley::{characteristic_fn, Coalition, ShapleyMethod};
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

    fn engine() -> AttributionEngine {
        AttributionEngine::new(EngineConfig::default()).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn day(n: i64) -> DateTime<Utc> {
        t0() + Duration::days(n)
    }

    /// impression@t0, click@t5, view@t10, converted at t12.
    fn sample_conversion() -> ConversionEvent {
        ConversionEvent {
            conversion_id: "conv-001".to_string(),
            campaign_id: "camp-1".to_string(),
            buyer_id: "buyer-1".to_string(),
            total_value: 120.0,
            converted_at: day(12),
            touchpoints: vec![
                Touchpoint::new("display", day(0), EngagementKind::Impression),
                Touchpoint::new("search", day(5), EngagementKind::Click),
                Touchpoint::new("video", day(10), EngagementKind::View),
            ],
        }
    }

    fn sourced_conversion(id: &str, value: f64, sources: &[(&str, &str)]) -> ConversionEvent {
        ConversionEvent {
            conversion_id: id.to_string(),
            campaign_id: "camp-1".to_string(),
            buyer_id: format!("buyer-{id}"),
            total_value: value,
            converted_at: day(20),
            touchpoints: sources
                .iter()
                .enumerate()
                .map(|(i, (channel, source))| {
                    Touchpoint::new(*channel, day(i as i64), EngagementKind::Click)
                        .with_data_source(*source)
                })
                .collect(),
        }
    }

    fn sourced_batch() -> Vec<ConversionEvent> {
        vec![
            sourced_conversion("c1", 100.0, &[("search", "crm")]),
            sourced_conversion("c2", 300.0, &[("search", "crm"), ("social", "pixel")]),
            sourced_conversion("c3", 50.0, &[("social", "pixel")]),
        ]
    }

    #[test]
    fn linear_splits_evenly() {
        let engine = engine();
        let journey = engine.normalize(&sample_conversion()).unwrap();
        let model = AttributionModel::unwindowed("linear", ModelType::Linear);
        let result = engine.evaluate(&journey, &model).unwrap();
        for w in &result.weights {
            assert!((w - 1.0 / 3.0).abs() < 1e-12);
        }
        assert!((result.weight_sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn first_touch_credits_the_impression() {
        let engine = engine();
        let journey = engine.normalize(&sample_conversion()).unwrap();
        let model = AttributionModel::unwindowed("first", ModelType::FirstTouch);
        let result = engine.evaluate(&journey, &model).unwrap();
        assert_eq!(result.weights, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn two_player_shapley() {
        let players = vec!["A".to_string(), "B".to_string()];
        let value = characteristic_fn(|c: &Coalition| {
            Ok(match (c.contains("A"), c.contains("B")) {
                (true, true) => 40.0,
                (true, false) => 10.0,
                (false, true) => 20.0,
                (false, false) => 0.0,
            })
        });
        let allocation = engine().shapley("camp-1", &players, &value).unwrap();
        assert_eq!(allocation.method, ShapleyMethod::Exact);
        assert!((allocation.value_of("A").unwrap() - 15.0).abs() < 1e-9);
        assert!((allocation.value_of("B").unwrap() - 25.0).abs() < 1e-9);
        assert!(allocation.efficiency_gap().abs() < 1e-9);
    }

    #[test]
    fn forecast_needs_three_weeks() {
        let history: Vec<_> = [0, 7]
            .into_iter()
            .map(|offset| CacObservation {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(offset),
                cac: 40.0,
                spend: 400.0,
                conversions: 10,
                channel_spend: BTreeMap::new(),
            })
            .collect();
        let err = engine()
            .forecast("camp-1", &history, 4, &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientHistory {
                available: 2,
                required: 3
            }
        ));
    }

    #[test]
    fn better_campaign_absorbs_the_budget() {
        let campaigns = [
            CampaignBudgetInput::new(
                "X",
                100.0,
                4.0,
                RoasCurveSpec::Piecewise(
                    PiecewiseRoasCurve::new(&[(0.0, 6.0), (100.0, 4.0), (150.0, 3.0)]).unwrap(),
                ),
            ),
            CampaignBudgetInput::new(
                "Y",
                100.0,
                2.0,
                RoasCurveSpec::Piecewise(
                    PiecewiseRoasCurve::new(&[(0.0, 2.5), (50.0, 2.0)]).unwrap(),
                ),
            ),
        ];
        let run = engine().reallocate(&campaigns, None).unwrap();
        assert!((run.allocated() - 200.0).abs() < 1e-9);
        let x = run.recommendation("X").unwrap();
        assert!((x.recommended_budget - 200.0).abs() < 1e-9);
        assert!(x.recommended_budget > x.current_budget);

        let scenario = BudgetScenario::from_run("all in on X", "", &run)
            .activate()
            .unwrap();
        assert_eq!(scenario.status, ScenarioStatus::Active);
        assert!((scenario.allocations[0].percentage - 100.0).abs() < 1e-9);
    }

    #[test]
    fn data_sources_share_campaign_value() {
        let engine = engine();
        let journeys: Vec<_> = sourced_batch()
            .iter()
            .map(|c| engine.normalize(c))
            .collect::<Result<_, _>>()
            .unwrap();
        let allocation = engine.data_source_shapley("camp-1", &journeys).unwrap();

        // v(crm)=100, v(pixel)=50, v(both)=450.
        assert!((allocation.coalition_value - 450.0).abs() < 1e-9);
        assert!((allocation.value_of("crm").unwrap() - 250.0).abs() < 1e-9);
        assert!((allocation.value_of("pixel").unwrap() - 200.0).abs() < 1e-9);
        assert_eq!(allocation.records().len(), 2);
    }

    #[test]
    fn data_driven_batch_feeds_the_forecast() {
        let engine = engine();
        let model = AttributionModel::unwindowed("dd", ModelType::DataDriven);
        let report = engine.attribute_conversions(&sourced_batch(), &model).unwrap();
        assert_eq!(report.conversions(), 3);

        let rows = report.rows();
        let total: f64 = rows.iter().map(|r| r.value).sum();
        assert!((total - 450.0).abs() < 1e-6);
        assert_eq!(rows[0].channel, "search");

        let weights = report.channel_weights();
        let history: Vec<_> = (0..6)
            .map(|week| CacObservation {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::weeks(week),
                cac: 0.0,
                spend: 1_000.0 + 100.0 * week as f64,
                conversions: 20,
                channel_spend: BTreeMap::from([
                    ("search".to_string(), 600.0),
                    ("social".to_string(), 400.0 + 100.0 * week as f64),
                ]),
            })
            .collect();
        let forecast = engine.forecast("camp-1", &history, 4, &weights).unwrap();

        assert_eq!(forecast.predictions.len(), 4);
        assert!((forecast.current_cac - 75.0).abs() < 1e-9);
        assert!(forecast.weekly_trend > 0.0);
        for p in &forecast.predictions {
            assert!(p.confidence_low <= p.predicted_cac && p.predicted_cac <= p.confidence_high);
        }
        let factors = &forecast.predictions[0].factors;
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].name, "social");
        assert_eq!(factors[0].direction, FactorDirection::Negative);
    }

    #[test]
    fn large_coalitions_fall_back_to_sampling() {
        let mut config = EngineConfig::default();
        config.shapley.exact_threshold = 2;
        config.shapley.max_samples = 200;
        config.shapley.min_samples = 100;
        let engine = AttributionEngine::new(config).unwrap();

        let players: Vec<String> = ["a", "b", "c"].iter().map(|p| p.to_string()).collect();
        let value = characteristic_fn(|c: &Coalition| {
            Ok(c.members()
                .map(|p| match p {
                    "a" => 1.0,
                    "b" => 2.0,
                    _ => 3.0,
                })
                .sum())
        });
        let allocation = engine.shapley("camp-1", &players, &value).unwrap();
        assert_eq!(allocation.method, ShapleyMethod::MonteCarlo);
        assert!(allocation.is_approximate());
        // Additive games have the same marginal in every ordering.
        assert!((allocation.value_of("c").unwrap() - 3.0).abs() < 1e-9);
        assert!(allocation.efficiency_gap().abs() < 1e-9);
    }
}
