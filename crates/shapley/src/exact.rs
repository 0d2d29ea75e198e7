//! Exact Shapley values by enumerating every coalition.
//!
//! phi_i = sum over S not containing i of |S|!(n-|S|-1)!/n! * [v(S u {i}) - v(S)]

use attribution_core::EngineResult;

use crate::cache::CoalitionCache;
use crate::coalition::CharacteristicFunction;

/// Shapley values plus the table of `v(S)` for every mask.
pub(crate) struct ExactOutcome {
    pub values: Vec<f64>,
    pub coalition_values: Vec<f64>,
}

pub(crate) fn compute<V>(n: usize, cache: &CoalitionCache, value: &V) -> EngineResult<ExactOutcome>
where
    V: CharacteristicFunction + ?Sized,
{
    let total = 1usize << n;
    let mut coalition_values = vec![0.0; total];
    for (mask, slot) in coalition_values.iter_mut().enumerate().skip(1) {
        *slot = cache.value(mask as u64, value)?;
    }

    let weights: Vec<f64> = (0..n).map(|size| ordering_weight(n, size)).collect();
    let mut values = vec![0.0; n];
    for mask in 0..total {
        let size = mask.count_ones() as usize;
        if size == n {
            continue;
        }
        let w = weights[size];
        let v_s = coalition_values[mask];
        for (i, phi) in values.iter_mut().enumerate() {
            let bit = 1usize << i;
            if mask & bit == 0 {
                *phi += w * (coalition_values[mask | bit] - v_s);
            }
        }
    }

    Ok(ExactOutcome {
        values,
        coalition_values,
    })
}

/// `|S|!(n-|S|-1)!/n!`, computed as `1 / (n * C(n-1, |S|))` to stay in range.
fn ordering_weight(n: usize, size: usize) -> f64 {
    1.0 / (n as f64 * binomial(n - 1, size))
}

fn binomial(n: usize, k: usize) -> f64 {
    let k = k.min(n - k);
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binomial_coefficients() {
        assert_eq!(binomial(4, 0), 1.0);
        assert_eq!(binomial(4, 2), 6.0);
        assert_eq!(binomial(11, 5), 462.0);
    }

    #[test]
    fn ordering_weights_sum_to_one_over_coalitions() {
        // Each player sees every subset of the others exactly once.
        let n = 5;
        let total: f64 = (0..n)
            .map(|size| binomial(n - 1, size) * ordering_weight(n, size))
            .sum();
        assert!((total - 1.0).abs() < 1e-12);
    }
}
