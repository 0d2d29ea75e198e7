//! Coalition value engine: Shapley allocation of a campaign's outcome value
//! across contributing data sources, exact for small coalitions and
//! Monte Carlo permutation sampling beyond that.

pub mod cache;
pub mod calculator;
pub mod coalition;
mod exact;
pub mod path_table;
mod sampling;

pub use cache::CoalitionCache;
pub use calculator::{
    PlayerShare, ShapleyAllocation, ShapleyCalculator, ShapleyMethod, ShapleyValueRecord,
};
pub use coalition::{characteristic_fn, CharacteristicFunction, Coalition, MAX_PLAYERS};
pub use path_table::PathValueTable;
