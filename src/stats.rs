use serde::Serialize;

/// Ordinary least squares fit of `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r2: f64,
    pub n: usize,
}

impl LinearFit {
    pub fn nan(n: usize) -> Self {
        Self {
            slope: f64::NAN,
            intercept: f64::NAN,
            r2: f64::NAN,
            n,
        }
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Fits a line through the finite `(x, y)` pairs.
///
/// No regularisation is applied: when every `x` is identical the slope is
/// `Inf` or `NaN`, exactly as the normal equations dictate.
pub fn linear_regression(x: &[f64], y: &[f64]) -> LinearFit {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y.iter())
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| (a, b))
        .collect();

    let n = pairs.len();
    if n == 0 {
        return LinearFit::nan(0);
    }

    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n as f64;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n as f64;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for &(a, b) in &pairs {
        sxx += (a - mean_x) * (a - mean_x);
        sxy += (a - mean_x) * (b - mean_y);
        syy += (b - mean_y) * (b - mean_y);
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let r2 = if syy > 0.0 {
        (sxy * sxy) / (sxx * syy)
    } else {
        1.0
    };

    LinearFit {
        slope,
        intercept,
        r2,
        n,
    }
}

/// Root-mean-square of the finite values.
pub fn rms(values: &[f64]) -> f64 {
    let valid: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if valid.is_empty() {
        return f64::NAN;
    }
    (valid.iter().map(|v| v * v).sum::<f64>() / valid.len() as f64).sqrt()
}

/// Coefficient of variation (std / |mean|) of the finite values.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let valid: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if valid.len() < 2 {
        return 0.0;
    }
    let mean = valid.iter().sum::<f64>() / valid.len() as f64;
    let var = valid.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / valid.len() as f64;
    if mean == 0.0 {
        return f64::INFINITY;
    }
    var.sqrt() / mean.abs()
}
