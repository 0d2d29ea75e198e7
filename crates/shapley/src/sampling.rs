//! Monte Carlo permutation sampling for coalitions too large to enumerate.
//!
//! Each sampled ordering inserts players one at a time and credits every
//! player with its marginal contribution at its position. Rounds of
//! permutations can be split across scoped worker threads; the coalition
//! cache is shared between them.

use std::sync::atomic::{AtomicBool, Ordering};

use attribution_core::config::ShapleyConfig;
use attribution_core::EngineResult;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::cache::CoalitionCache;
use crate::coalition::CharacteristicFunction;

const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Running sums of marginal contributions per player.
#[derive(Debug, Clone)]
struct Accumulator {
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
    samples: usize,
}

impl Accumulator {
    fn new(n: usize) -> Self {
        Self {
            sum: vec![0.0; n],
            sum_sq: vec![0.0; n],
            samples: 0,
        }
    }

    fn merge(&mut self, other: &Accumulator) {
        for (a, b) in self.sum.iter_mut().zip(&other.sum) {
            *a += b;
        }
        for (a, b) in self.sum_sq.iter_mut().zip(&other.sum_sq) {
            *a += b;
        }
        self.samples += other.samples;
    }

    fn means(&self) -> Vec<f64> {
        let k = self.samples.max(1) as f64;
        self.sum.iter().map(|s| s / k).collect()
    }

    /// Standard error of each player's mean marginal contribution.
    fn std_errors(&self) -> Vec<f64> {
        if self.samples < 2 {
            return vec![f64::INFINITY; self.sum.len()];
        }
        let k = self.samples as f64;
        self.sum
            .iter()
            .zip(&self.sum_sq)
            .map(|(s, sq)| {
                let mean = s / k;
                let variance = ((sq / k - mean * mean) * k / (k - 1.0)).max(0.0);
                (variance / k).sqrt()
            })
            .collect()
    }
}

pub(crate) struct SampledOutcome {
    pub values: Vec<f64>,
    pub std_errors: Vec<f64>,
    pub samples: usize,
}

pub(crate) fn compute<V>(
    n: usize,
    cache: &CoalitionCache,
    value: &V,
    config: &ShapleyConfig,
) -> EngineResult<SampledOutcome>
where
    V: CharacteristicFunction + ?Sized,
{
    let mut total = Accumulator::new(n);
    let mut round = 0u64;

    while total.samples < config.max_samples {
        let round_size = config.batch_size.min(config.max_samples - total.samples);
        let batch = run_round(n, cache, value, config, round, round_size)?;
        total.merge(&batch);
        round += 1;

        if let Some(tolerance) = config.tolerance {
            if total.samples >= config.min_samples {
                let worst = total
                    .std_errors()
                    .into_iter()
                    .fold(0.0_f64, f64::max);
                if worst <= tolerance {
                    tracing::debug!(
                        samples = total.samples,
                        std_error = worst,
                        "sampling converged"
                    );
                    break;
                }
            }
        }
    }

    Ok(SampledOutcome {
        values: total.means(),
        std_errors: total.std_errors(),
        samples: total.samples,
    })
}

fn run_round<V>(
    n: usize,
    cache: &CoalitionCache,
    value: &V,
    config: &ShapleyConfig,
    round: u64,
    round_size: usize,
) -> EngineResult<Accumulator>
where
    V: CharacteristicFunction + ?Sized,
{
    let workers = config.workers.min(round_size).max(1);
    let seed_for = |worker: usize| {
        let stream = round * workers as u64 + worker as u64;
        config.seed.wrapping_add(stream.wrapping_mul(SEED_STRIDE))
    };

    if workers == 1 {
        let abort = AtomicBool::new(false);
        return sample_permutations(n, cache, value, round_size, seed_for(0), &abort);
    }

    let abort = AtomicBool::new(false);
    let base = round_size / workers;
    let extra = round_size % workers;

    let results: Vec<EngineResult<Accumulator>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|w| {
                let quota = base + usize::from(w < extra);
                let seed = seed_for(w);
                let abort = &abort;
                scope.spawn(move || sample_permutations(n, cache, value, quota, seed, abort))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    let mut merged = Accumulator::new(n);
    for result in results {
        merged.merge(&result?);
    }
    Ok(merged)
}

fn sample_permutations<V>(
    n: usize,
    cache: &CoalitionCache,
    value: &V,
    count: usize,
    seed: u64,
    abort: &AtomicBool,
) -> EngineResult<Accumulator>
where
    V: CharacteristicFunction + ?Sized,
{
    let mut rng = StdRng::seed_from_u64(seed);
    let mut acc = Accumulator::new(n);
    let mut order: Vec<usize> = (0..n).collect();

    for _ in 0..count {
        if abort.load(Ordering::Relaxed) {
            break;
        }
        order.shuffle(&mut rng);

        let mut mask = 0u64;
        let mut previous = 0.0;
        for &player in &order {
            mask |= 1u64 << player;
            let current = match cache.value(mask, value) {
                Ok(v) => v,
                Err(e) => {
                    abort.store(true, Ordering::Relaxed);
                    return Err(e);
                }
            };
            let marginal = current - previous;
            acc.sum[player] += marginal;
            acc.sum_sq[player] += marginal * marginal;
            previous = current;
        }
        acc.samples += 1;
    }

    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_statistics() {
        let mut acc = Accumulator::new(1);
        for x in [1.0, 3.0] {
            acc.sum[0] += x;
            acc.sum_sq[0] += x * x;
            acc.samples += 1;
        }
        assert!((acc.means()[0] - 2.0).abs() < 1e-12);
        // sample variance 2, standard error sqrt(2/2) = 1
        assert!((acc.std_errors()[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn merged_accumulators_add_samples() {
        let mut a = Accumulator::new(2);
        a.sum = vec![1.0, 2.0];
        a.samples = 1;
        let mut b = Accumulator::new(2);
        b.sum = vec![3.0, 4.0];
        b.samples = 1;
        a.merge(&b);
        assert_eq!(a.samples, 2);
        assert_eq!(a.means(), vec![2.0, 3.0]);
    }
}
