//! Coalitions of players and the characteristic function evaluated over them.

use std::sync::Arc;

/// Players are tracked in a `u64` bitmask.
pub const MAX_PLAYERS: usize = 64;

/// A subset of the players taking part in one run.
#[derive(Debug, Clone)]
pub struct Coalition {
    mask: u64,
    players: Arc<[String]>,
}

impl Coalition {
    pub(crate) fn new(mask: u64, players: Arc<[String]>) -> Self {
        Self { mask, players }
    }

    pub fn mask(&self) -> u64 {
        self.mask
    }

    pub fn len(&self) -> usize {
        self.mask.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    pub fn contains_index(&self, index: usize) -> bool {
        index < self.players.len() && self.mask & (1u64 << index) != 0
    }

    pub fn contains(&self, player: &str) -> bool {
        self.players
            .iter()
            .enumerate()
            .any(|(i, p)| p == player && self.mask & (1u64 << i) != 0)
    }

    /// Member ids, in the order players were supplied to the run.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.players
            .iter()
            .enumerate()
            .filter(move |(i, _)| self.mask & (1u64 << i) != 0)
            .map(|(_, p)| p.as_str())
    }
}

/// Value achievable by exactly the given coalition. Implementations must be
/// pure for the duration of a run; results are cached per coalition.
pub trait CharacteristicFunction: Sync {
    fn value(&self, coalition: &Coalition) -> anyhow::Result<f64>;
}

impl<F> CharacteristicFunction for F
where
    F: Fn(&Coalition) -> anyhow::Result<f64> + Sync,
{
    fn value(&self, coalition: &Coalition) -> anyhow::Result<f64> {
        self(coalition)
    }
}

/// Pins a closure's signature so it can be passed where a
/// `CharacteristicFunction` is expected without annotations.
pub fn characteristic_fn<F>(f: F) -> F
where
    F: Fn(&Coalition) -> anyhow::Result<f64> + Sync,
{
    f
}

#[cfg(test)]
mod tests {
    use super::*;

    fn players() -> Arc<[String]> {
        vec!["a".to_string(), "b".to_string(), "c".to_string()].into()
    }

    #[test]
    fn membership_follows_mask() {
        let coalition = Coalition::new(0b101, players());
        assert_eq!(coalition.len(), 2);
        assert!(coalition.contains("a"));
        assert!(!coalition.contains("b"));
        assert!(coalition.contains("c"));
        assert!(!coalition.contains("z"));
        assert_eq!(coalition.members().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn empty_coalition() {
        let coalition = Coalition::new(0, players());
        assert!(coalition.is_empty());
        assert_eq!(coalition.members().count(), 0);
    }

    #[test]
    fn closures_are_characteristic_functions() {
        let f = characteristic_fn(|c| Ok(c.len() as f64 * 2.0));
        let coalition = Coalition::new(0b011, players());
        assert!((f.value(&coalition).unwrap() - 4.0).abs() < f64::EPSILON);
    }
}
