#![allow(clippy::needless_range_loop)]

use crate::linalg::lower_upper;

/// Residual norm below which a fit is considered exact.
const EXACT_COST: f64 = 1e-24;
const LAMBDA_START: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e12;

#[derive(Debug, Clone, Copy)]
pub struct LmOptions {
    pub max_iterations: usize,
    pub ftol: f64,
    pub xtol: f64,
}

fn cost(residuals: &[f64]) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}

fn step_size(p: f64) -> f64 {
    1e-6 * p.abs().max(1e-3)
}

/// Central difference Jacobian, falling back to one-sided differences when
/// one of the probes leaves the valid parameter domain.
fn eval_jacobian<const N: usize, F>(
    p: &[f64; N],
    r0: &[f64],
    residuals: &F,
) -> Option<Vec<[f64; N]>>
where
    F: Fn(&[f64; N]) -> Option<Vec<f64>>,
{
    let mut jac = vec![[0.0; N]; r0.len()];

    for i in 0..N {
        let h = step_size(p[i]);

        let mut lo = *p;
        lo[i] -= h;
        let mut hi = *p;
        hi[i] += h;

        let (r_lo, r_hi, span) = match (residuals(&lo), residuals(&hi)) {
            (Some(a), Some(b)) => (a, b, 2.0 * h),
            (None, Some(b)) => (r0.to_vec(), b, h),
            (Some(a), None) => (a, r0.to_vec(), h),
            (None, None) => return None,
        };

        for j in 0..r0.len() {
            jac[j][i] = (r_hi[j] - r_lo[j]) / span;
        }
    }

    Some(jac)
}

/// Damped least squares minimisation of `residuals(p)`.
///
/// `residuals` returns `None` for parameters outside the valid domain; such
/// trial steps are rejected like steps that increase the cost. Returns
/// `None` when the iteration budget runs out before convergence.
pub fn levenberg_marquardt<const N: usize, F>(
    x0: [f64; N],
    residuals: F,
    options: &LmOptions,
) -> Option<[f64; N]>
where
    F: Fn(&[f64; N]) -> Option<Vec<f64>>,
{
    let mut p = x0;
    let mut r = residuals(&p)?;
    let mut c = cost(&r);
    let mut lambda = LAMBDA_START;

    for _ in 0..options.max_iterations {
        if c < EXACT_COST {
            return Some(p);
        }

        let jac = eval_jacobian(&p, &r, &residuals)?;

        let mut jtj = [[0.0; N]; N];
        let mut jtr = [0.0; N];
        for (row, res) in jac.iter().zip(r.iter()) {
            for a in 0..N {
                jtr[a] += row[a] * res;
                for b in 0..N {
                    jtj[a][b] += row[a] * row[b];
                }
            }
        }

        let mut improved = false;
        while lambda <= LAMBDA_MAX {
            let mut damped = jtj;
            for a in 0..N {
                damped[a][a] += lambda * jtj[a][a].max(1e-12);
            }

            let neg_g = jtr.map(|g| -g);
            let delta = match lower_upper::solve_system(&damped, &neg_g) {
                Ok(d) => d,
                Err(_) => {
                    lambda *= 10.0;
                    continue;
                }
            };

            let mut trial = p;
            for a in 0..N {
                trial[a] += delta[a];
            }

            let Some(r_trial) = residuals(&trial) else {
                lambda *= 10.0;
                continue;
            };
            let c_trial = cost(&r_trial);

            if c_trial.is_finite() && c_trial < c {
                let step: f64 = delta.iter().map(|d| d * d).sum::<f64>().sqrt();
                let scale: f64 = p.iter().map(|v| v * v).sum::<f64>().sqrt();
                let small_gain = c - c_trial <= options.ftol * c;
                let small_step = step <= options.xtol * (scale + options.xtol);

                p = trial;
                r = r_trial;
                c = c_trial;
                lambda = (lambda / 10.0).max(1e-12);
                improved = true;

                if small_gain || small_step {
                    return Some(p);
                }
                break;
            }

            lambda *= 10.0;
        }

        // No damping level reduces the cost any further: numerically at a minimum.
        if !improved {
            return Some(p);
        }
    }

    (c < EXACT_COST).then_some(p)
}
