//! Touchpoint normalization and multi-touch attribution: first/last touch,
//! linear, time-decay and data-driven weighting, model presets, and
//! per-channel aggregation of attributed value.

pub mod channel;
pub mod evaluator;
pub mod normalizer;
pub mod presets;

pub use channel::{attribute_value, AttributedValue, ChannelAttribution, ChannelAttributionReport};
pub use evaluator::{additive_channel_value, AttributionEvaluator};
pub use normalizer::{normalize, normalize_raw};
