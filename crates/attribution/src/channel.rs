//! Attributed value per touchpoint, channel and data source, and the
//! cross-conversion channel report.

use std::collections::{BTreeMap, BTreeSet};

use attribution_core::{AttributionResult, EngineError, EngineResult, NormalizedJourney};
use serde::{Deserialize, Serialize};

/// One conversion's value split by an attribution result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributedValue {
    pub conversion_id: String,
    pub per_touchpoint: Vec<f64>,
    pub by_channel: BTreeMap<String, f64>,
    /// Touchpoints without a data source are not represented here.
    pub by_data_source: BTreeMap<String, f64>,
}

/// Multiply weights by the conversion value and roll them up.
pub fn attribute_value(
    journey: &NormalizedJourney,
    result: &AttributionResult,
) -> EngineResult<AttributedValue> {
    check_pairing(journey, result)?;

    let per_touchpoint: Vec<f64> = result
        .weights
        .iter()
        .map(|w| w * journey.total_value)
        .collect();

    let mut by_channel = BTreeMap::new();
    let mut by_data_source = BTreeMap::new();
    for (tp, value) in journey.touchpoints.iter().zip(&per_touchpoint) {
        *by_channel.entry(tp.channel().to_string()).or_insert(0.0) += value;
        if let Some(source) = &tp.touchpoint.data_source_id {
            *by_data_source.entry(source.clone()).or_insert(0.0) += value;
        }
    }

    Ok(AttributedValue {
        conversion_id: journey.conversion_id.clone(),
        per_touchpoint,
        by_channel,
        by_data_source,
    })
}

fn check_pairing(journey: &NormalizedJourney, result: &AttributionResult) -> EngineResult<()> {
    if journey.conversion_id != result.conversion_id || journey.len() != result.weights.len() {
        return Err(EngineError::validation(format!(
            "attribution result for {} does not match conversion {}",
            result.conversion_id, journey.conversion_id
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelAttribution {
    pub channel: String,
    /// Conversions in which the channel received any credit.
    pub conversions: u64,
    pub value: f64,
    pub touchpoints: u64,
    pub avg_value: f64,
}

#[derive(Debug, Clone, Default)]
struct ChannelTotals {
    conversions: u64,
    value: f64,
    touchpoints: u64,
}

/// Aggregates attributed value per channel across many conversions.
#[derive(Debug, Clone, Default)]
pub struct ChannelAttributionReport {
    channels: BTreeMap<String, ChannelTotals>,
    conversions: u64,
}

impl ChannelAttributionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        journey: &NormalizedJourney,
        result: &AttributionResult,
    ) -> EngineResult<()> {
        let attributed = attribute_value(journey, result)?;
        let mut credited = BTreeSet::new();
        for (tp, (weight, value)) in journey
            .touchpoints
            .iter()
            .zip(result.weights.iter().zip(&attributed.per_touchpoint))
        {
            if *weight > 0.0 {
                let totals = self.channels.entry(tp.channel().to_string()).or_default();
                totals.touchpoints += 1;
                totals.value += value;
                credited.insert(tp.channel());
            }
        }
        for channel in credited {
            if let Some(totals) = self.channels.get_mut(channel) {
                totals.conversions += 1;
            }
        }
        self.conversions += 1;
        Ok(())
    }

    pub fn conversions(&self) -> u64 {
        self.conversions
    }

    /// Rows sorted by attributed value, highest first.
    pub fn rows(&self) -> Vec<ChannelAttribution> {
        let mut rows: Vec<ChannelAttribution> = self
            .channels
            .iter()
            .map(|(channel, t)| ChannelAttribution {
                channel: channel.clone(),
                conversions: t.conversions,
                value: t.value,
                touchpoints: t.touchpoints,
                avg_value: if t.conversions > 0 {
                    t.value / t.conversions as f64
                } else {
                    0.0
                },
            })
            .collect();
        rows.sort_by(|a, b| b.value.total_cmp(&a.value).then_with(|| a.channel.cmp(&b.channel)));
        rows
    }

    /// Each channel's share of attributed value; sums to 1 when any value was attributed.
    pub fn channel_weights(&self) -> BTreeMap<String, f64> {
        let total: f64 = self.channels.values().map(|t| t.value).sum();
        self.channels
            .iter()
            .map(|(channel, t)| {
                let share = if total > 0.0 { t.value / total } else { 0.0 };
                (channel.clone(), share)
            })
            .collect()
    }
}
