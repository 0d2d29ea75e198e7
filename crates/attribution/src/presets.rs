//! Stock attribution models offered to every buyer.

use attribution_core::{AttributionModel, AttributionWindow, ModelType, WindowKind};

fn preset(
    id: &str,
    name: &str,
    description: &str,
    model_type: ModelType,
    windows: Vec<AttributionWindow>,
) -> AttributionModel {
    AttributionModel {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        is_custom: false,
        model_type,
        windows,
    }
}

/// 28-day click, 1-day view.
pub fn industry_standard(model_type: ModelType) -> AttributionModel {
    preset(
        "industry-standard",
        "Industry Standard",
        "28-day click, 1-day view",
        model_type,
        vec![
            AttributionWindow::new("Click", 28.0, WindowKind::Click, 80.0),
            AttributionWindow::new("View", 1.0, WindowKind::View, 20.0),
        ],
    )
}

/// Longer windows for brand campaigns.
pub fn aggressive(model_type: ModelType) -> AttributionModel {
    preset(
        "aggressive-attribution",
        "Aggressive Attribution",
        "Longer windows for brand campaigns",
        model_type,
        vec![
            AttributionWindow::new("Click", 60.0, WindowKind::Click, 60.0),
            AttributionWindow::new("View", 7.0, WindowKind::View, 25.0),
            AttributionWindow::new("Engagement", 14.0, WindowKind::Engagement, 15.0),
        ],
    )
}

/// Strict attribution for performance marketing.
pub fn conservative(model_type: ModelType) -> AttributionModel {
    preset(
        "conservative-model",
        "Conservative Model",
        "Strict attribution for performance marketing",
        model_type,
        vec![
            AttributionWindow::new("Click", 7.0, WindowKind::Click, 90.0),
            AttributionWindow::new("View", 0.5, WindowKind::View, 10.0),
        ],
    )
}

pub fn all(model_type: ModelType) -> Vec<AttributionModel> {
    vec![
        industry_standard(model_type),
        aggressive(model_type),
        conservative(model_type),
    ]
}
