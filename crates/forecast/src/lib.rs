//! Customer acquisition cost forecasting: weekly trend-plus-seasonality
//! projection with widening confidence bands and attributed cost drivers.

pub mod cac;
pub mod trend;

pub use cac::{
    CacFactor, CacForecast, CacForecaster, CacObservation, FactorDirection, WeeklyAggregate,
    WeeklyCacPrediction,
};
pub use trend::TrendFit;
