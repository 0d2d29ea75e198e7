//! Run-scoped memo of characteristic-function evaluations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use attribution_core::{EngineError, EngineResult};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::coalition::{CharacteristicFunction, Coalition};

/// Caches `v(S)` by coalition bitmask for a single campaign run.
///
/// A cache is created per call and dropped with it, so values computed from
/// one run's outcome data never leak into another. Sampling workers share it
/// by reference; a worker asking for a coalition another worker is already
/// evaluating waits for that result instead of evaluating it again.
pub struct CoalitionCache {
    campaign_id: String,
    players: Arc<[String]>,
    values: DashMap<u64, Arc<Mutex<Option<f64>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CoalitionCache {
    pub fn new(campaign_id: impl Into<String>, players: Arc<[String]>) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            players,
            values: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// `v(S)` for the coalition encoded by `mask`. The empty coalition is worth 0
    /// and is never evaluated.
    pub fn value<V>(&self, mask: u64, value: &V) -> EngineResult<f64>
    where
        V: CharacteristicFunction + ?Sized,
    {
        if mask == 0 {
            return Ok(0.0);
        }
        // Clone the slot out so the shard lock is released before evaluating.
        let cell = Arc::clone(self.values.entry(mask).or_default().value());
        let mut slot = cell.lock();
        if let Some(cached) = *slot {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(cached);
        }

        let coalition = Coalition::new(mask, Arc::clone(&self.players));
        let v = value
            .value(&coalition)
            .map_err(EngineError::CharacteristicFunction)?;
        if !v.is_finite() {
            return Err(EngineError::CharacteristicFunction(anyhow!(
                "non-finite value {v} for coalition of {} players in campaign {}",
                coalition.len(),
                self.campaign_id
            )));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        *slot = Some(v);
        Ok(v)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of distinct coalitions actually evaluated.
    pub fn evaluations(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
