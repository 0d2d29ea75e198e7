//! Shared data model: touchpoints, conversions, attribution models and results.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// How the buyer engaged with an ad at a touchpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementKind {
    Impression,
    Click,
    View,
}

impl FromStr for EngagementKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "impression" => Ok(Self::Impression),
            "click" => Ok(Self::Click),
            "view" => Ok(Self::View),
            other => Err(EngineError::validation(format!(
                "unknown engagement kind '{other}'"
            ))),
        }
    }
}

impl fmt::Display for EngagementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Impression => write!(f, "impression"),
            Self::Click => write!(f, "click"),
            Self::View => write!(f, "view"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Touchpoint {
    pub channel: String,
    pub timestamp: DateTime<Utc>,
    pub engagement: EngagementKind,
    #[serde(default)]
    pub data_source_id: Option<String>,
}

impl Touchpoint {
    pub fn new(
        channel: impl Into<String>,
        timestamp: DateTime<Utc>,
        engagement: EngagementKind,
    ) -> Self {
        Self {
            channel: channel.into(),
            timestamp,
            engagement,
            data_source_id: None,
        }
    }

    pub fn with_data_source(mut self, data_source_id: impl Into<String>) -> Self {
        self.data_source_id = Some(data_source_id.into());
        self
    }
}

/// A touchpoint as delivered by the collection pipeline, engagement still untyped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTouchpoint {
    pub channel: String,
    pub timestamp: DateTime<Utc>,
    pub engagement: String,
    #[serde(default)]
    pub data_source_id: Option<String>,
}

impl TryFrom<RawTouchpoint> for Touchpoint {
    type Error = EngineError;

    fn try_from(raw: RawTouchpoint) -> EngineResult<Self> {
        Ok(Self {
            engagement: raw.engagement.parse()?,
            channel: raw.channel,
            timestamp: raw.timestamp,
            data_source_id: raw.data_source_id,
        })
    }
}

/// A conversion and the touchpoints that preceded it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionEvent {
    pub conversion_id: String,
    pub campaign_id: String,
    pub buyer_id: String,
    pub total_value: f64,
    pub converted_at: DateTime<Utc>,
    pub touchpoints: Vec<Touchpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawConversionEvent {
    pub conversion_id: String,
    pub campaign_id: String,
    pub buyer_id: String,
    pub total_value: f64,
    pub converted_at: DateTime<Utc>,
    pub touchpoints: Vec<RawTouchpoint>,
}

impl TryFrom<RawConversionEvent> for ConversionEvent {
    type Error = EngineError;

    fn try_from(raw: RawConversionEvent) -> EngineResult<Self> {
        let touchpoints = raw
            .touchpoints
            .into_iter()
            .map(Touchpoint::try_from)
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Self {
            conversion_id: raw.conversion_id,
            campaign_id: raw.campaign_id,
            buyer_id: raw.buyer_id,
            total_value: raw.total_value,
            converted_at: raw.converted_at,
            touchpoints,
        })
    }
}

/// A touchpoint after validation and time ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedTouchpoint {
    #[serde(flatten)]
    pub touchpoint: Touchpoint,
    /// Position in the record as delivered, before sorting.
    pub original_index: usize,
    /// `converted_at - timestamp`, in fractional days.
    pub recency_days: f64,
}

impl NormalizedTouchpoint {
    pub fn new(touchpoint: Touchpoint, original_index: usize, converted_at: DateTime<Utc>) -> Self {
        let recency = converted_at - touchpoint.timestamp;
        let recency_days = recency.num_milliseconds() as f64 / 1_000.0 / SECONDS_PER_DAY;
        Self {
            touchpoint,
            original_index,
            recency_days,
        }
    }

    pub fn channel(&self) -> &str {
        &self.touchpoint.channel
    }

    pub fn engagement(&self) -> EngagementKind {
        self.touchpoint.engagement
    }
}

/// A conversion whose touchpoints are validated and sorted by time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedJourney {
    pub conversion_id: String,
    pub campaign_id: String,
    pub buyer_id: String,
    pub total_value: f64,
    pub converted_at: DateTime<Utc>,
    pub touchpoints: Vec<NormalizedTouchpoint>,
}

impl NormalizedJourney {
    pub fn len(&self) -> usize {
        self.touchpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.touchpoints.is_empty()
    }
}

/// Weighting policy applied across a journey's touchpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelType {
    FirstTouch,
    LastTouch,
    Linear,
    TimeDecay,
    #[serde(alias = "dataDriver")]
    DataDriven,
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FirstTouch => "firstTouch",
            Self::LastTouch => "lastTouch",
            Self::Linear => "linear",
            Self::TimeDecay => "timeDecay",
            Self::DataDriven => "dataDriven",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    Click,
    View,
    Engagement,
}

impl WindowKind {
    /// Click windows take clicks, view windows take views and impressions,
    /// engagement windows take any engagement.
    pub fn accepts(&self, kind: EngagementKind) -> bool {
        match self {
            Self::Click => kind == EngagementKind::Click,
            Self::View => matches!(kind, EngagementKind::View | EngagementKind::Impression),
            Self::Engagement => true,
        }
    }
}

/// A lookback window. `weight` is a relative decay multiplier in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionWindow {
    pub name: String,
    pub duration_days: f64,
    pub kind: WindowKind,
    pub weight: f64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl AttributionWindow {
    pub fn new(name: impl Into<String>, duration_days: f64, kind: WindowKind, weight: f64) -> Self {
        Self {
            name: name.into(),
            duration_days,
            kind,
            weight,
            is_active: true,
        }
    }

    pub fn qualifies(&self, touchpoint: &NormalizedTouchpoint) -> bool {
        self.is_active
            && touchpoint.recency_days <= self.duration_days
            && self.kind.accepts(touchpoint.engagement())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionModel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_custom: bool,
    pub model_type: ModelType,
    #[serde(default)]
    pub windows: Vec<AttributionWindow>,
}

impl AttributionModel {
    /// A model with no lookback windows: every touchpoint qualifies.
    pub fn unwindowed(id: impl Into<String>, model_type: ModelType) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            is_custom: true,
            model_type,
            windows: Vec::new(),
        }
    }

    pub fn with_window(mut self, window: AttributionWindow) -> Self {
        self.windows.push(window);
        self
    }

    pub fn active_windows(&self) -> impl Iterator<Item = &AttributionWindow> {
        self.windows.iter().filter(|w| w.is_active)
    }

    pub fn is_windowed(&self) -> bool {
        self.active_windows().next().is_some()
    }

    /// Most specific (shortest) active window the touchpoint qualifies for.
    pub fn matching_window(&self, touchpoint: &NormalizedTouchpoint) -> Option<&AttributionWindow> {
        self.active_windows()
            .filter(|w| w.qualifies(touchpoint))
            .min_by(|a, b| a.duration_days.total_cmp(&b.duration_days))
    }

    pub fn validate(&self) -> EngineResult<()> {
        for window in &self.windows {
            if !(window.duration_days.is_finite() && window.duration_days > 0.0) {
                return Err(EngineError::validation(format!(
                    "window '{}' of model '{}' must have a positive duration",
                    window.name, self.id
                )));
            }
            if !(0.0..=100.0).contains(&window.weight) {
                return Err(EngineError::validation(format!(
                    "window '{}' of model '{}' has weight {} outside [0, 100]",
                    window.name, self.id, window.weight
                )));
            }
        }
        Ok(())
    }
}

/// Per-touchpoint weights for one conversion, indexed by normalized position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionResult {
    pub run_id: Uuid,
    pub conversion_id: String,
    pub campaign_id: String,
    pub model_id: String,
    pub model_type: ModelType,
    pub weights: Vec<f64>,
    /// Number of touchpoints that fell inside a window.
    pub qualifying: usize,
    pub computed_at: DateTime<Utc>,
}

impl AttributionResult {
    pub fn weight_sum(&self) -> f64 {
        self.weights.iter().sum()
    }
}
