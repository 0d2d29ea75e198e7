//! Budget reallocation across campaigns: greedy water-filling over marginal
//! ROAS curves, saved budget scenarios, and budget-level performance predictions.

pub mod allocator;
pub mod curve;
pub mod scenario;

pub use allocator::{
    BudgetAllocationRecommendation, BudgetAllocationRun, BudgetAllocator, CampaignBudgetInput,
    PerformancePrediction, DEFAULT_BUDGET_LEVELS,
};
pub use curve::{
    DiminishingReturnsCurve, PiecewiseRoasCurve, RoasBreakpoint, RoasCurve, RoasCurveSpec,
};
pub use scenario::{BudgetScenario, ScenarioAllocation, ScenarioStatus};
