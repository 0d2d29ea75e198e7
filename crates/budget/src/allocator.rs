//! Greedy water-filling of a fixed total budget over marginal ROAS curves.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use attribution_core::config::BudgetConfig;
use attribution_core::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::curve::{FlattenedCurve, RoasCurveSpec};

const EPSILON: f64 = 1e-9;

/// Budget multipliers used when predicting performance at alternative levels.
pub const DEFAULT_BUDGET_LEVELS: [f64; 6] = [0.5, 0.75, 1.0, 1.25, 1.5, 2.0];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignBudgetInput {
    pub campaign_id: String,
    pub campaign_name: String,
    pub current_budget: f64,
    pub current_roas: f64,
    pub curve: RoasCurveSpec,
    #[serde(default)]
    pub min_budget: f64,
    #[serde(default)]
    pub max_budget: Option<f64>,
}

impl CampaignBudgetInput {
    pub fn new(
        campaign_id: impl Into<String>,
        current_budget: f64,
        current_roas: f64,
        curve: RoasCurveSpec,
    ) -> Self {
        let campaign_id = campaign_id.into();
        Self {
            campaign_name: campaign_id.clone(),
            campaign_id,
            current_budget,
            current_roas,
            curve,
            min_budget: 0.0,
            max_budget: None,
        }
    }

    pub fn with_bounds(mut self, min_budget: f64, max_budget: Option<f64>) -> Self {
        self.min_budget = min_budget;
        self.max_budget = max_budget;
        self
    }

    fn cap(&self) -> f64 {
        self.max_budget.unwrap_or(f64::INFINITY)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetAllocationRecommendation {
    pub campaign_id: String,
    pub campaign_name: String,
    pub current_budget: f64,
    pub recommended_budget: f64,
    pub current_roas: f64,
    /// Average flattened marginal ROAS over the recommended spend.
    pub projected_roas: f64,
    pub confidence: f64,
    pub reason: String,
}

impl BudgetAllocationRecommendation {
    pub fn change(&self) -> f64 {
        self.recommended_budget - self.current_budget
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetAllocationRun {
    pub run_id: Uuid,
    pub total_budget: f64,
    pub recommendations: Vec<BudgetAllocationRecommendation>,
    /// Marginal ROAS of the last increment handed out.
    pub marginal_cutoff: f64,
    pub projected_revenue: f64,
    pub projected_roas: f64,
    pub computed_at: DateTime<Utc>,
}

impl BudgetAllocationRun {
    pub fn recommendation(&self, campaign_id: &str) -> Option<&BudgetAllocationRecommendation> {
        self.recommendations
            .iter()
            .find(|r| r.campaign_id == campaign_id)
    }

    pub fn allocated(&self) -> f64 {
        self.recommendations
            .iter()
            .map(|r| r.recommended_budget)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformancePrediction {
    pub campaign_id: String,
    pub budget_level: f64,
    pub predicted_revenue: f64,
    pub predicted_roas: f64,
}

// ---------------------------------------------------------------------------
// Allocator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Candidate {
    marginal: f64,
    index: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Highest marginal first, then earliest input position.
    fn cmp(&self, other: &Self) -> Ordering {
        self.marginal
            .total_cmp(&other.marginal)
            .then_with(|| other.index.cmp(&self.index))
    }
}

struct CampaignState<'a> {
    curve: FlattenedCurve<'a>,
    allocated: f64,
    revenue: f64,
    cap: f64,
}

impl CampaignState<'_> {
    fn room(&self) -> f64 {
        self.cap - self.allocated
    }
}

#[derive(Debug, Clone)]
pub struct BudgetAllocator {
    config: BudgetConfig,
}

impl Default for BudgetAllocator {
    fn default() -> Self {
        Self {
            config: BudgetConfig::default(),
        }
    }
}

impl BudgetAllocator {
    pub fn new(config: BudgetConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Redistribute `total_budget` (default: the sum of current budgets) so
    /// every increment goes where the next dollar returns the most.
    pub fn reallocate(
        &self,
        campaigns: &[CampaignBudgetInput],
        total_budget: Option<f64>,
    ) -> EngineResult<BudgetAllocationRun> {
        validate_campaigns(campaigns)?;
        let total =
            total_budget.unwrap_or_else(|| campaigns.iter().map(|c| c.current_budget).sum());
        if !total.is_finite() || total < 0.0 {
            return Err(EngineError::validation(format!(
                "total budget must be a non-negative number, got {total}"
            )));
        }
        let minimums: f64 = campaigns.iter().map(|c| c.min_budget).sum();
        if minimums > total + EPSILON {
            return Err(EngineError::validation(format!(
                "minimum budgets ({minimums:.2}) exceed the total budget ({total:.2})"
            )));
        }
        let capacity: f64 = campaigns.iter().map(CampaignBudgetInput::cap).sum();
        if capacity + EPSILON < total {
            return Err(EngineError::validation(format!(
                "maximum budgets ({capacity:.2}) cannot absorb the total budget ({total:.2})"
            )));
        }

        let chunk = total / self.config.increments.max(1) as f64;
        let mut states = Vec::with_capacity(campaigns.len());
        let mut heap = BinaryHeap::with_capacity(campaigns.len());
        for (index, campaign) in campaigns.iter().enumerate() {
            let mut state = CampaignState {
                curve: FlattenedCurve::new(&campaign.curve),
                allocated: campaign.min_budget,
                revenue: 0.0,
                cap: campaign.cap(),
            };
            state.revenue = state.curve.integrate(0.0, campaign.min_budget, chunk)?;
            if state.room() > EPSILON {
                let marginal = state.curve.probe(state.allocated)?;
                heap.push(Candidate { marginal, index });
            }
            states.push(state);
        }

        let mut remaining = total - minimums;
        let mut marginal_cutoff = 0.0;
        let mut steps = 0usize;
        while remaining > EPSILON * total.max(1.0) {
            let Some(Candidate { marginal, index }) = heap.pop() else {
                return Err(EngineError::validation(
                    "maximum budgets cannot absorb the total budget",
                ));
            };
            let state = &mut states[index];
            let amount = chunk.min(remaining).min(state.room());
            state.allocated += amount;
            state.revenue += marginal * amount;
            remaining -= amount;
            marginal_cutoff = marginal;
            steps += 1;
            if state.room() > EPSILON {
                let next = state.curve.probe(state.allocated)?;
                heap.push(Candidate {
                    marginal: next,
                    index,
                });
            }
        }
        debug!(steps, chunk, marginal_cutoff, "budget increments assigned");

        let recommendations: Vec<_> = campaigns
            .iter()
            .zip(&states)
            .map(|(campaign, state)| self.recommend(campaign, state, marginal_cutoff))
            .collect();
        let projected_revenue: f64 = states.iter().map(|s| s.revenue).sum();

        let run = BudgetAllocationRun {
            run_id: Uuid::new_v4(),
            total_budget: total,
            recommendations,
            marginal_cutoff,
            projected_revenue,
            projected_roas: ratio(projected_revenue, total),
            computed_at: Utc::now(),
        };
        info!(
            run_id = %run.run_id,
            campaigns = campaigns.len(),
            total_budget = total,
            projected_revenue,
            "budget reallocation computed"
        );
        Ok(run)
    }

    /// Revenue and ROAS each campaign would see at multiples of its current budget.
    pub fn predict_performance(
        &self,
        campaign: &CampaignBudgetInput,
        multipliers: &[f64],
    ) -> EngineResult<Vec<PerformancePrediction>> {
        campaign.curve.validate()?;
        multipliers
            .iter()
            .map(|&multiplier| {
                if !multiplier.is_finite() || multiplier < 0.0 {
                    return Err(EngineError::validation(format!(
                        "budget multiplier must be non-negative, got {multiplier}"
                    )));
                }
                let budget_level = campaign.current_budget * multiplier;
                let chunk = budget_level / self.config.increments.max(1) as f64;
                let mut curve = FlattenedCurve::new(&campaign.curve);
                let predicted_revenue = curve.integrate(0.0, budget_level, chunk)?;
                Ok(PerformancePrediction {
                    campaign_id: campaign.campaign_id.clone(),
                    budget_level,
                    predicted_revenue,
                    predicted_roas: ratio(predicted_revenue, budget_level),
                })
            })
            .collect()
    }

    fn recommend(
        &self,
        campaign: &CampaignBudgetInput,
        state: &CampaignState<'_>,
        cutoff: f64,
    ) -> BudgetAllocationRecommendation {
        if state.curve.violations > 0 {
            warn!(
                campaign_id = %campaign.campaign_id,
                violations = state.curve.violations,
                samples = state.curve.samples,
                "ROAS curve increased with spend, flattened"
            );
        }
        let recommended = state.allocated;
        let mut reason = self.reason(campaign.current_budget, recommended, cutoff);
        if state.curve.violations > 0 {
            reason.push_str(&format!(
                "; curve flattened at {} of {} points",
                state.curve.violations, state.curve.samples
            ));
        }
        BudgetAllocationRecommendation {
            campaign_id: campaign.campaign_id.clone(),
            campaign_name: campaign.campaign_name.clone(),
            current_budget: campaign.current_budget,
            recommended_budget: recommended,
            current_roas: campaign.current_roas,
            projected_roas: ratio(state.revenue, recommended),
            confidence: self.config.base_confidence * state.curve.reliability(),
            reason,
        }
    }

    fn reason(&self, current: f64, recommended: f64, cutoff: f64) -> String {
        let change_pct = if current > 0.0 {
            (recommended - current) / current * 100.0
        } else if recommended > EPSILON {
            f64::INFINITY
        } else {
            0.0
        };
        if change_pct > self.config.maintain_band_pct {
            format!("Scale up: marginal ROAS stays above the {cutoff:.2}x cutoff")
        } else if change_pct < -self.config.maintain_band_pct {
            format!("Reduce: marginal ROAS falls below the {cutoff:.2}x cutoff")
        } else {
            format!("Maintain: marginal ROAS is near the {cutoff:.2}x cutoff")
        }
    }
}

fn validate_campaigns(campaigns: &[CampaignBudgetInput]) -> EngineResult<()> {
    if campaigns.is_empty() {
        return Err(EngineError::NoCampaigns);
    }
    let mut seen = HashSet::with_capacity(campaigns.len());
    for c in campaigns {
        if !seen.insert(c.campaign_id.as_str()) {
            return Err(EngineError::validation(format!(
                "duplicate campaign {}",
                c.campaign_id
            )));
        }
        let non_negative = |v: f64| v.is_finite() && v >= 0.0;
        if !non_negative(c.current_budget) || !non_negative(c.min_budget) {
            return Err(EngineError::validation(format!(
                "campaign {} has an invalid budget",
                c.campaign_id
            )));
        }
        if let Some(max) = c.max_budget {
            if !max.is_finite() || max < c.min_budget {
                return Err(EngineError::validation(format!(
                    "campaign {} has max_budget {max} below min_budget {}",
                    c.campaign_id, c.min_budget
                )));
            }
        }
        c.curve.validate()?;
    }
    Ok(())
}

fn ratio(revenue: f64, spend: f64) -> f64 {
    if spend > 0.0 {
        revenue / spend
    } else {
        0.0
    }
}
