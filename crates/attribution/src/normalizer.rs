//! Touchpoint normalizer: validates a conversion's touchpoints and orders them in time.

use attribution_core::{
    ConversionEvent, EngineError, EngineResult, NormalizedJourney, NormalizedTouchpoint,
    RawConversionEvent,
};
use tracing::debug;

/// Validate and time-sort a conversion's touchpoints.
///
/// Out-of-order touchpoints are sorted rather than rejected; equal timestamps
/// keep their delivered order.
pub fn normalize(conversion: &ConversionEvent) -> EngineResult<NormalizedJourney> {
    if conversion.touchpoints.is_empty() {
        return Err(EngineError::validation(format!(
            "conversion {} has no touchpoints",
            conversion.conversion_id
        )));
    }
    if !(conversion.total_value.is_finite() && conversion.total_value >= 0.0) {
        return Err(EngineError::validation(format!(
            "conversion {} has invalid total value {}",
            conversion.conversion_id, conversion.total_value
        )));
    }

    for (i, tp) in conversion.touchpoints.iter().enumerate() {
        if tp.channel.trim().is_empty() {
            return Err(EngineError::validation(format!(
                "touchpoint {i} of conversion {} has no channel",
                conversion.conversion_id
            )));
        }
        if tp.timestamp > conversion.converted_at {
            return Err(EngineError::validation(format!(
                "touchpoint {i} of conversion {} occurs after the conversion",
                conversion.conversion_id
            )));
        }
    }

    let mut touchpoints: Vec<NormalizedTouchpoint> = conversion
        .touchpoints
        .iter()
        .cloned()
        .enumerate()
        .map(|(i, tp)| NormalizedTouchpoint::new(tp, i, conversion.converted_at))
        .collect();

    let already_sorted = touchpoints
        .windows(2)
        .all(|w| w[0].touchpoint.timestamp <= w[1].touchpoint.timestamp);
    if !already_sorted {
        debug!(
            conversion_id = %conversion.conversion_id,
            touchpoints = touchpoints.len(),
            "reordering out-of-order touchpoints"
        );
        touchpoints.sort_by_key(|t| t.touchpoint.timestamp);
    }

    Ok(NormalizedJourney {
        conversion_id: conversion.conversion_id.clone(),
        campaign_id: conversion.campaign_id.clone(),
        buyer_id: conversion.buyer_id.clone(),
        total_value: conversion.total_value,
        converted_at: conversion.converted_at,
        touchpoints,
    })
}

/// Parse engagement kinds of a pipeline record, then [`normalize`] it.
pub fn normalize_raw(raw: RawConversionEvent) -> EngineResult<NormalizedJourney> {
    let conversion = ConversionEvent::try_from(raw)?;
    normalize(&conversion)
}
