//! Shapley allocation runs: input checks, exact/sampled dispatch, result records.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use attribution_core::config::ShapleyConfig;
use attribution_core::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::CoalitionCache;
use crate::coalition::{CharacteristicFunction, MAX_PLAYERS};
use crate::{exact, sampling};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapleyMethod {
    Exact,
    MonteCarlo,
}

/// One player's share of the coalition value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerShare {
    pub player_id: String,
    pub shapley_value: f64,
    /// `v(N) - v(N \ {i})`: what the full coalition loses without this player.
    pub marginal_contribution: f64,
    /// Share of `v(N)`, in percent (0 when `v(N)` is 0).
    pub share_pct: f64,
    /// Standard error of the estimate; only set for sampled runs.
    pub std_error: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapleyAllocation {
    pub run_id: Uuid,
    pub campaign_id: String,
    pub method: ShapleyMethod,
    pub coalition_size: usize,
    /// `v(N)` for the full set of players.
    pub coalition_value: f64,
    pub shares: Vec<PlayerShare>,
    /// Permutations drawn (sampled runs) or orderings covered (`n!`, saturating) for exact runs.
    pub samples: u64,
    pub evaluations: u64,
    pub cache_hits: u64,
    pub std_error_max: Option<f64>,
    pub computation_time_ms: f64,
    pub computed_at: DateTime<Utc>,
}

impl ShapleyAllocation {
    pub fn is_approximate(&self) -> bool {
        self.method == ShapleyMethod::MonteCarlo
    }

    pub fn value_of(&self, player_id: &str) -> Option<f64> {
        self.shares
            .iter()
            .find(|s| s.player_id == player_id)
            .map(|s| s.shapley_value)
    }

    /// `sum(phi_i) - v(N)`; zero up to floating-point error.
    pub fn efficiency_gap(&self) -> f64 {
        self.shares.iter().map(|s| s.shapley_value).sum::<f64>() - self.coalition_value
    }

    /// Flat rows for the external `shapleyValues` store, one per data asset.
    pub fn records(&self) -> Vec<ShapleyValueRecord> {
        self.shares
            .iter()
            .map(|s| ShapleyValueRecord {
                asset_id: s.player_id.clone(),
                campaign_id: self.campaign_id.clone(),
                shapley_value: s.shapley_value,
                marginal_contribution: s.marginal_contribution,
                coalition_size: self.coalition_size,
                calculation_date: self.computed_at,
                computation_time_ms: self.computation_time_ms,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapleyValueRecord {
    pub asset_id: String,
    pub campaign_id: String,
    pub shapley_value: f64,
    pub marginal_contribution: f64,
    pub coalition_size: usize,
    pub calculation_date: DateTime<Utc>,
    pub computation_time_ms: f64,
}

/// Computes Shapley allocations. Holds configuration only; every call builds
/// its own cache.
#[derive(Debug, Clone, Default)]
pub struct ShapleyCalculator {
    config: ShapleyConfig,
}

impl ShapleyCalculator {
    pub fn new(config: ShapleyConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ShapleyConfig {
        &self.config
    }

    pub fn shapley<V>(
        &self,
        campaign_id: &str,
        players: &[String],
        value: &V,
    ) -> EngineResult<ShapleyAllocation>
    where
        V: CharacteristicFunction + ?Sized,
    {
        validate_players(players)?;

        let started = Instant::now();
        let n = players.len();
        let player_ids: Arc<[String]> = players.to_vec().into();
        let cache = CoalitionCache::new(campaign_id, Arc::clone(&player_ids));
        let full = full_mask(n);

        debug!(campaign_id, players = n, "starting shapley run");

        let (method, values, std_errors, samples) = if n <= self.config.exact_threshold {
            let outcome = exact::compute(n, &cache, value)?;
            let orderings = (1..=n as u64).try_fold(1u64, |acc, k| acc.checked_mul(k));
            (
                ShapleyMethod::Exact,
                outcome.values,
                None,
                orderings.unwrap_or(u64::MAX),
            )
        } else {
            warn!(
                campaign_id,
                players = n,
                threshold = self.config.exact_threshold,
                "coalition exceeds exact threshold, sampling permutations"
            );
            let outcome = sampling::compute(n, &cache, value, &self.config)?;
            (
                ShapleyMethod::MonteCarlo,
                outcome.values,
                Some(outcome.std_errors),
                outcome.samples as u64,
            )
        };

        let coalition_value = cache.value(full, value)?;
        let mut shares = Vec::with_capacity(n);
        for (i, player_id) in player_ids.iter().enumerate() {
            let without = cache.value(full & !(1u64 << i), value)?;
            let shapley_value = values[i];
            shares.push(PlayerShare {
                player_id: player_id.clone(),
                shapley_value,
                marginal_contribution: coalition_value - without,
                share_pct: if coalition_value != 0.0 {
                    shapley_value / coalition_value * 100.0
                } else {
                    0.0
                },
                std_error: std_errors.as_ref().map(|e| e[i]),
            });
        }

        let std_error_max = std_errors
            .as_ref()
            .map(|e| e.iter().copied().fold(0.0_f64, f64::max));

        let allocation = ShapleyAllocation {
            run_id: Uuid::new_v4(),
            campaign_id: campaign_id.to_string(),
            method,
            coalition_size: n,
            coalition_value,
            shares,
            samples,
            evaluations: cache.evaluations(),
            cache_hits: cache.hits(),
            std_error_max,
            computation_time_ms: started.elapsed().as_secs_f64() * 1_000.0,
            computed_at: Utc::now(),
        };

        info!(
            campaign_id,
            method = ?allocation.method,
            players = n,
            evaluations = allocation.evaluations,
            elapsed_ms = allocation.computation_time_ms,
            "shapley run complete"
        );
        Ok(allocation)
    }
}

fn full_mask(n: usize) -> u64 {
    if n >= 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}

fn validate_players(players: &[String]) -> EngineResult<()> {
    if players.is_empty() {
        return Err(EngineError::EmptyCoalition);
    }
    if players.len() > MAX_PLAYERS {
        return Err(EngineError::validation(format!(
            "coalition of {} players exceeds the supported maximum of {}",
            players.len(),
            MAX_PLAYERS
        )));
    }
    let mut seen = HashSet::with_capacity(players.len());
    for p in players {
        if !seen.insert(p.as_str()) {
            return Err(EngineError::validation(format!("duplicate player '{p}'")));
        }
    }
    Ok(())
}
