//! Least-squares linear trend with optional additive seasonality.

/// Fitted model over points observed at `x = 0..n`.
#[derive(Debug, Clone)]
pub struct TrendFit {
    pub intercept: f64,
    pub slope: f64,
    /// Additive seasonal offsets indexed by `x % len`; empty when not fitted.
    pub seasonal: Vec<f64>,
    /// Residual standard deviation.
    pub sigma: f64,
    /// Mean absolute percentage error of the in-sample fit (0..).
    pub mape: f64,
    pub points: usize,
}

impl TrendFit {
    /// Fit `ys`. Seasonality is only estimated with at least two full seasons.
    /// Callers guarantee at least three points.
    pub fn fit(ys: &[f64], season_length: Option<usize>) -> Self {
        let n = ys.len();
        let (intercept, slope) = least_squares(ys);

        let seasonal = match season_length {
            Some(len) if len >= 2 && n >= 2 * len => {
                let mut sums = vec![0.0; len];
                let mut counts = vec![0usize; len];
                for (x, y) in ys.iter().enumerate() {
                    sums[x % len] += y - (intercept + slope * x as f64);
                    counts[x % len] += 1;
                }
                let raw: Vec<f64> = sums
                    .iter()
                    .zip(&counts)
                    .map(|(s, c)| s / (*c).max(1) as f64)
                    .collect();
                let mean = raw.iter().sum::<f64>() / len as f64;
                raw.into_iter().map(|s| s - mean).collect()
            }
            _ => Vec::new(),
        };

        let mut fit = Self {
            intercept,
            slope,
            seasonal,
            sigma: 0.0,
            mape: 0.0,
            points: n,
        };

        let mut ssr = 0.0;
        let mut ape_sum = 0.0;
        let mut ape_count = 0usize;
        for (x, y) in ys.iter().enumerate() {
            let predicted = fit.predict(x as f64);
            ssr += (y - predicted).powi(2);
            if *y > 0.0 {
                ape_sum += ((y - predicted) / y).abs();
                ape_count += 1;
            }
        }
        let params = 2 + fit.seasonal.len().saturating_sub(1);
        let dof = n.saturating_sub(params).max(1);
        fit.sigma = (ssr / dof as f64).sqrt();
        fit.mape = if ape_count > 0 {
            ape_sum / ape_count as f64
        } else {
            1.0
        };
        fit
    }

    pub fn predict(&self, x: f64) -> f64 {
        let mut y = self.intercept + self.slope * x;
        if !self.seasonal.is_empty() && x >= 0.0 {
            y += self.seasonal[(x.round() as usize) % self.seasonal.len()];
        }
        y
    }
}

fn least_squares(ys: &[f64]) -> (f64, f64) {
    let n = ys.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = ys.iter().sum::<f64>() / n;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (x, y) in ys.iter().enumerate() {
        let dx = x as f64 - mean_x;
        sxy += dx * (y - mean_y);
        sxx += dx * dx;
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    (mean_y - slope * mean_x, slope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_exact_line() {
        let fit = TrendFit::fit(&[10.0, 12.0, 14.0, 16.0], None);
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 10.0).abs() < 1e-12);
        assert!(fit.sigma < 1e-12);
        assert!(fit.mape < 1e-12);
        assert!((fit.predict(5.0) - 20.0).abs() < 1e-12);
    }

    #[test]
    fn noisy_series_has_positive_sigma() {
        let fit = TrendFit::fit(&[10.0, 13.0, 11.0, 15.0, 12.0], None);
        assert!(fit.sigma > 0.0);
        assert!(fit.mape > 0.0);
    }

    #[test]
    fn seasonality_needs_two_full_seasons() {
        let ys = [10.0, 20.0, 10.0, 20.0, 10.0];
        assert!(TrendFit::fit(&ys, Some(3)).seasonal.is_empty());
        let fit = TrendFit::fit(&[10.0, 20.0, 10.0, 20.0, 10.0, 20.0], Some(2));
        assert_eq!(fit.seasonal.len(), 2);
        // The alternating pattern is captured by the seasonal terms.
        assert!(fit.predict(6.0) < fit.predict(7.0));
    }
}
