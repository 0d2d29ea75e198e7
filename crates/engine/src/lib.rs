//! Single entry point over normalization, attribution, Shapley allocation,
//! CAC forecasting and budget reallocation.
//!
//! The engine only holds configuration. Every call is independent, so one
//! instance can be shared across threads.

use std::collections::BTreeMap;

use attribution_budget::{
    BudgetAllocationRun, BudgetAllocator, CampaignBudgetInput, PerformancePrediction,
};
use attribution_core::{
    AttributionModel, AttributionResult, ConversionEvent, EngineConfig, EngineResult,
    ModelType, NormalizedJourney, RawConversionEvent,
};
use attribution_forecast::{CacForecast, CacForecaster, CacObservation};
use attribution_models::{AttributionEvaluator, ChannelAttributionReport};
use attribution_shapley::{
    CharacteristicFunction, PathValueTable, ShapleyAllocation, ShapleyCalculator,
};
use tracing::info;

#[derive(Debug, Clone)]
pub struct AttributionEngine {
    config: EngineConfig,
    evaluator: AttributionEvaluator,
    shapley: ShapleyCalculator,
    forecaster: CacForecaster,
    allocator: BudgetAllocator,
}

impl AttributionEngine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            evaluator: AttributionEvaluator::new(
                config.attribution.clone(),
                config.shapley.clone(),
            )?,
            shapley: ShapleyCalculator::new(config.shapley.clone())?,
            forecaster: CacForecaster::new(config.forecast.clone())?,
            allocator: BudgetAllocator::new(config.budget.clone())?,
            config,
        })
    }

    /// Build from `ATTRIBUTION_ENGINE__*` environment variables.
    pub fn from_env() -> EngineResult<Self> {
        Self::new(EngineConfig::load()?)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Touchpoints and attribution
    // -----------------------------------------------------------------------

    pub fn normalize(&self, conversion: &ConversionEvent) -> EngineResult<NormalizedJourney> {
        attribution_models::normalize(conversion)
    }

    pub fn normalize_raw(&self, raw: RawConversionEvent) -> EngineResult<NormalizedJourney> {
        attribution_models::normalize_raw(raw)
    }

    pub fn evaluate(
        &self,
        journey: &NormalizedJourney,
        model: &AttributionModel,
    ) -> EngineResult<AttributionResult> {
        self.evaluator.evaluate(journey, model)
    }

    pub fn evaluate_data_driven<V>(
        &self,
        journey: &NormalizedJourney,
        model: &AttributionModel,
        channel_value: &V,
    ) -> EngineResult<AttributionResult>
    where
        V: CharacteristicFunction,
    {
        self.evaluator.evaluate_data_driven(journey, model, channel_value)
    }

    /// Normalize and attribute a batch of conversions, aggregated per channel.
    ///
    /// Data-driven models learn their channel values from the batch itself.
    pub fn attribute_conversions(
        &self,
        conversions: &[ConversionEvent],
        model: &AttributionModel,
    ) -> EngineResult<ChannelAttributionReport> {
        let journeys = conversions
            .iter()
            .map(|c| self.normalize(c))
            .collect::<EngineResult<Vec<_>>>()?;
        let table = match model.model_type {
            ModelType::DataDriven => Some(PathValueTable::from_channels(&journeys)?),
            _ => None,
        };

        let mut report = ChannelAttributionReport::new();
        for journey in &journeys {
            let result = match &table {
                Some(table) => self.evaluate_data_driven(journey, model, table)?,
                None => self.evaluate(journey, model)?,
            };
            report.add(journey, &result)?;
        }
        info!(
            model_id = %model.id,
            conversions = report.conversions(),
            "attributed conversion batch"
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Coalition value
    // -----------------------------------------------------------------------

    pub fn shapley<V>(
        &self,
        campaign_id: &str,
        players: &[String],
        value: &V,
    ) -> EngineResult<ShapleyAllocation>
    where
        V: CharacteristicFunction + ?Sized,
    {
        self.shapley.shapley(campaign_id, players, value)
    }

    /// Split a campaign's converted value across the data sources behind its
    /// touchpoints, valuing each coalition by the paths it fully covers.
    pub fn data_source_shapley(
        &self,
        campaign_id: &str,
        journeys: &[NormalizedJourney],
    ) -> EngineResult<ShapleyAllocation> {
        let table = PathValueTable::from_data_sources(journeys)?;
        self.shapley(campaign_id, &table.players(), &table)
    }

    // -----------------------------------------------------------------------
    // Forecasting and budget
    // -----------------------------------------------------------------------

    pub fn forecast(
        &self,
        campaign_id: &str,
        history: &[CacObservation],
        horizon_weeks: u32,
        channel_weights: &BTreeMap<String, f64>,
    ) -> EngineResult<CacForecast> {
        self.forecaster.forecast(campaign_id, history, horizon_weeks, channel_weights)
    }

    pub fn reallocate(
        &self,
        campaigns: &[CampaignBudgetInput],
        total_budget: Option<f64>,
    ) -> EngineResult<BudgetAllocationRun> {
        self.allocator.reallocate(campaigns, total_budget)
    }

    pub fn predict_performance(
        &self,
        campaign: &CampaignBudgetInput,
        multipliers: &[f64],
    ) -> EngineResult<Vec<PerformancePrediction>> {
        self.allocator.predict_performance(campaign, multipliers)
    }
}
