//! Saved budget scenarios built from allocation runs.

use attribution_core::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::allocator::BudgetAllocationRun;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    Draft,
    Active,
    Archived,
}

#[allow(clippy::derivable_impls)]
impl Default for ScenarioStatus {
    fn default() -> Self {
        Self::Draft
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioAllocation {
    pub campaign_id: String,
    pub campaign_name: String,
    pub budget: f64,
    /// Share of the scenario total, 0-100.
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetScenario {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub total_budget: f64,
    pub projected_revenue: f64,
    pub projected_roas: f64,
    pub allocations: Vec<ScenarioAllocation>,
    #[serde(default)]
    pub status: ScenarioStatus,
    pub created_at: DateTime<Utc>,
}

impl BudgetScenario {
    /// Draft scenario holding the recommended budgets of `run`.
    pub fn from_run(
        name: impl Into<String>,
        description: impl Into<String>,
        run: &BudgetAllocationRun,
    ) -> Self {
        let allocations = run
            .recommendations
            .iter()
            .map(|r| ScenarioAllocation {
                campaign_id: r.campaign_id.clone(),
                campaign_name: r.campaign_name.clone(),
                budget: r.recommended_budget,
                percentage: if run.total_budget > 0.0 {
                    r.recommended_budget / run.total_budget * 100.0
                } else {
                    0.0
                },
            })
            .collect();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            total_budget: run.total_budget,
            projected_revenue: run.projected_revenue,
            projected_roas: run.projected_roas,
            allocations,
            status: ScenarioStatus::Draft,
            created_at: Utc::now(),
        }
    }

    pub fn activate(self) -> EngineResult<Self> {
        match self.status {
            ScenarioStatus::Archived => Err(EngineError::validation(format!(
                "scenario {} is archived",
                self.id
            ))),
            _ => Ok(Self {
                status: ScenarioStatus::Active,
                ..self
            }),
        }
    }

    pub fn archive(self) -> Self {
        Self {
            status: ScenarioStatus::Archived,
            ..self
        }
    }
}
