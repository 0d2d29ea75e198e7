//! Characteristic function learned from historical conversion paths.

use std::collections::{BTreeMap, BTreeSet};

use attribution_core::{EngineError, EngineResult, NormalizedJourney};
use serde::{Deserialize, Serialize};

use crate::coalition::{CharacteristicFunction, Coalition};

/// `v(S)` = total value of historical conversions whose players all lie in `S`.
///
/// Players are channels or data sources depending on how the table was built.
/// The resulting game is monotone, so every marginal contribution is
/// non-negative.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathValueTable {
    paths: BTreeMap<BTreeSet<String>, f64>,
}

impl PathValueTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keyed by the channels each journey touched.
    pub fn from_channels(journeys: &[NormalizedJourney]) -> EngineResult<Self> {
        let mut table = Self::new();
        for journey in journeys {
            table.record(
                journey.touchpoints.iter().map(|t| t.channel().to_string()),
                journey.total_value,
            )?;
        }
        Ok(table)
    }

    /// Keyed by the data sources behind each journey's touchpoints. Touchpoints
    /// without a data source are ignored.
    pub fn from_data_sources(journeys: &[NormalizedJourney]) -> EngineResult<Self> {
        let mut table = Self::new();
        for journey in journeys {
            table.record(
                journey
                    .touchpoints
                    .iter()
                    .filter_map(|t| t.touchpoint.data_source_id.clone()),
                journey.total_value,
            )?;
        }
        Ok(table)
    }

    /// Add one observed path. Empty player sets carry no information and are skipped.
    pub fn record<I>(&mut self, players: I, value: f64) -> EngineResult<()>
    where
        I: IntoIterator<Item = String>,
    {
        if !(value.is_finite() && value >= 0.0) {
            return Err(EngineError::validation(format!(
                "path value must be a non-negative number, got {value}"
            )));
        }
        let key: BTreeSet<String> = players.into_iter().collect();
        if key.is_empty() {
            return Ok(());
        }
        *self.paths.entry(key).or_insert(0.0) += value;
        Ok(())
    }

    /// Every player seen in any path, sorted.
    pub fn players(&self) -> Vec<String> {
        self.paths
            .keys()
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    pub fn total_value(&self) -> f64 {
        self.paths.values().sum()
    }
}

impl CharacteristicFunction for PathValueTable {
    fn value(&self, coalition: &Coalition) -> anyhow::Result<f64> {
        Ok(self
            .paths
            .iter()
            .filter(|(path, _)| path.iter().all(|p| coalition.contains(p)))
            .map(|(_, v)| *v)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::ShapleyCalculator;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn sample_table() -> PathValueTable {
        let mut t = PathValueTable::new();
        t.record(strings(&["search"]), 100.0).unwrap();
        t.record(strings(&["search", "social"]), 60.0).unwrap();
        t.record(strings(&["email"]), 40.0).unwrap();
        t
    }

    #[test]
    fn merges_identical_paths() {
        let mut t = sample_table();
        t.record(strings(&["social", "search"]), 20.0).unwrap();
        assert_eq!(t.path_count(), 3);
        assert!((t.total_value() - 220.0).abs() < 1e-9);
        assert_eq!(t.players(), strings(&["email", "search", "social"]));
    }

    #[test]
    fn rejects_negative_values() {
        let mut t = PathValueTable::new();
        assert!(t.record(strings(&["search"]), -1.0).is_err());
    }

    #[test]
    fn shapley_over_paths_splits_joint_paths() {
        let t = sample_table();
        let alloc = ShapleyCalculator::default()
            .shapley("cmp", &t.players(), &t)
            .unwrap();
        // search: 100 alone + half of the 60 joint path; social: other half.
        assert!((alloc.value_of("search").unwrap() - 130.0).abs() < 1e-9);
        assert!((alloc.value_of("social").unwrap() - 30.0).abs() < 1e-9);
        assert!((alloc.value_of("email").unwrap() - 40.0).abs() < 1e-9);
        assert!((alloc.coalition_value - 200.0).abs() < 1e-9);
    }
}
