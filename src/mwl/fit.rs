//! Per-spectrum feature location and fitting.

use crate::config::{FitMethod, MwlConfig};
use crate::linalg::lower_upper;
use crate::mwl::basis::Basis;
use crate::mwl::lm::{LmOptions, levenberg_marquardt};
use crate::mwl::result::{Feature, N_ATTRIBUTES};
use crate::spectra::Detrend;

/// What happened to a single unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitOutcome {
    pub attempted: usize,
    pub failed: usize,
    pub unusable: bool,
}

impl UnitOutcome {
    /// A unit counts as failed when its input was unusable or every feature
    /// it tried to fit was rejected.
    pub fn is_failure(&self) -> bool {
        self.unusable || (self.attempted > 0 && self.failed == self.attempted)
    }
}

/// Fits the features of one spectrum inside a fixed band window.
pub struct UnitFitter<'a> {
    config: &'a MwlConfig,
    wavelengths: &'a [f64],
    start: usize,
    end: usize,
    detrend: Option<&'a dyn Detrend>,
}

impl<'a> UnitFitter<'a> {
    /// `start..=end` is the band window, usually from
    /// [window_indices](crate::spectra::window_indices).
    pub fn new(
        config: &'a MwlConfig,
        wavelengths: &'a [f64],
        start: usize,
        end: usize,
        detrend: Option<&'a dyn Detrend>,
    ) -> Self {
        Self {
            config,
            wavelengths,
            start,
            end,
            detrend,
        }
    }

    /// Writes `n_features` slots of `[depth, pos, width, width2]` into `out`.
    pub fn fit_into(&self, spectrum: &[f64], out: &mut [f64]) -> UnitOutcome {
        out.fill(f64::NAN);

        if spectrum.len() != self.wavelengths.len() {
            return UnitOutcome {
                unusable: true,
                ..UnitOutcome::default()
            };
        }

        let wl = &self.wavelengths[self.start..=self.end];
        let segment = &spectrum[self.start..=self.end];

        if segment.iter().any(|v| !v.is_finite()) {
            return UnitOutcome {
                unusable: true,
                ..UnitOutcome::default()
            };
        }

        let signal = match self.detrend {
            Some(d) => d.detrend(wl, segment),
            None => segment.to_vec(),
        };
        if signal.iter().any(|v| !v.is_finite()) {
            return UnitOutcome {
                unusable: true,
                ..UnitOutcome::default()
            };
        }

        // Features become positive bumps regardless of polarity
        let amplitude: Vec<f64> = if self.config.minima {
            signal.iter().map(|s| 1.0 - s).collect()
        } else {
            signal.iter().map(|s| s - 1.0).collect()
        };

        let peaks = find_peaks(&amplitude, self.config.n_features);
        let mut outcome = UnitOutcome {
            attempted: peaks.len(),
            ..UnitOutcome::default()
        };

        for (slot, &peak) in out.chunks_mut(N_ATTRIBUTES).zip(peaks.iter()) {
            match self.fit_feature(wl, &amplitude, peak) {
                Some(feature) => slot.copy_from_slice(&feature.to_array()),
                None => outcome.failed += 1,
            }
        }

        outcome
    }

    fn fit_feature(&self, wl: &[f64], a: &[f64], peak: usize) -> Option<Feature> {
        let (left, right) = neighbourhood(a, peak);

        let feature = match self.config.method {
            FitMethod::MinMax => self.direct(wl, a, peak, left, right),
            FitMethod::Parabola => self.parabola(wl, a, peak, left, right),
            FitMethod::Gaussian => self.nonlinear(Basis::Gaussian, wl, a, peak, left, right),
            FitMethod::Lorentzian => self.nonlinear(Basis::Lorentzian, wl, a, peak, left, right),
        }?;

        let in_window = feature.pos >= wl[0] && feature.pos <= wl[wl.len() - 1];
        let widths_ok = feature.width > 0.0 && (self.config.symmetric || feature.width2 > 0.0);
        if !feature.depth.is_finite() || feature.depth <= 0.0 || !in_window || !widths_ok {
            return None;
        }

        let depth = if self.config.minima {
            feature.depth.min(1.0)
        } else {
            feature.depth
        };

        Some(Feature { depth, ..feature })
    }

    fn shape(&self, left_width: f64, right_width: f64) -> (f64, f64) {
        if self.config.symmetric {
            (0.5 * (left_width + right_width), f64::NAN)
        } else {
            (left_width, right_width)
        }
    }

    fn direct(
        &self,
        wl: &[f64],
        a: &[f64],
        peak: usize,
        left: usize,
        right: usize,
    ) -> Option<Feature> {
        let depth = a[peak];
        let pos = wl[peak];
        let (xl, xr) = half_depth_crossings(wl, a, peak, left, right, depth);
        let (width, width2) = self.shape(pos - xl, xr - pos);

        Some(Feature {
            depth,
            pos,
            width,
            width2,
        })
    }

    #[allow(clippy::needless_range_loop)]
    fn parabola(
        &self,
        wl: &[f64],
        a: &[f64],
        peak: usize,
        left: usize,
        right: usize,
    ) -> Option<Feature> {
        let half = 0.5 * a[peak];
        let mut lo = peak - 1;
        while lo > left && a[lo - 1] >= half {
            lo -= 1;
        }
        let mut hi = peak + 1;
        while hi < right && a[hi + 1] >= half {
            hi += 1;
        }

        // Quadratic in offsets from the sampled peak keeps the system well conditioned
        let x0 = wl[peak];
        let mut ata = [[0.0; 3]; 3];
        let mut atb = [0.0; 3];
        for i in lo..=hi {
            let u = wl[i] - x0;
            let row = [1.0, u, u * u];
            for r in 0..3 {
                atb[r] += row[r] * a[i];
                for c in 0..3 {
                    ata[r][c] += row[r] * row[c];
                }
            }
        }

        let [c0, c1, c2] = lower_upper::solve_system(&ata, &atb).ok()?;
        if c2 >= 0.0 {
            return None;
        }

        let pos = x0 - c1 / (2.0 * c2);
        let depth = c0 - c1 * c1 / (4.0 * c2);
        let hwhm = (depth / (-2.0 * c2)).sqrt();

        let (width, width2) = if self.config.symmetric {
            (hwhm, f64::NAN)
        } else {
            let (xl, xr) = half_depth_crossings(wl, a, peak, left, right, depth);
            (pos - xl, xr - pos)
        };

        Some(Feature {
            depth,
            pos,
            width,
            width2,
        })
    }

    fn nonlinear(
        &self,
        basis: Basis,
        wl: &[f64],
        a: &[f64],
        peak: usize,
        left: usize,
        right: usize,
    ) -> Option<Feature> {
        let guess = self.direct(wl, a, peak, left, right)?;
        let xs = &wl[left..=right];
        let ys = &a[left..=right];
        let options = LmOptions {
            max_iterations: self.config.max_iterations,
            ftol: self.config.ftol,
            xtol: self.config.xtol,
        };

        let residuals = |depth: f64, pos: f64, w1: f64, w2: f64| -> Option<Vec<f64>> {
            if !(depth > 0.0 && w1 > 0.0 && w2 > 0.0) {
                return None;
            }
            Some(
                xs.iter()
                    .zip(ys.iter())
                    .map(|(&x, &y)| basis.eval(x, depth, pos, w1, w2) - y)
                    .collect(),
            )
        };

        if self.config.symmetric {
            let p = levenberg_marquardt(
                [guess.depth, guess.pos, guess.width],
                |p: &[f64; 3]| residuals(p[0], p[1], p[2], p[2]),
                &options,
            )?;
            Some(Feature {
                depth: p[0],
                pos: p[1],
                width: p[2],
                width2: f64::NAN,
            })
        } else {
            let p = levenberg_marquardt(
                [guess.depth, guess.pos, guess.width, guess.width2],
                |p: &[f64; 4]| residuals(p[0], p[1], p[2], p[3]),
                &options,
            )?;
            Some(Feature {
                depth: p[0],
                pos: p[1],
                width: p[2],
                width2: p[3],
            })
        }
    }
}

/// Interior local maxima of `a` with positive height, tallest first.
pub fn find_peaks(a: &[f64], n: usize) -> Vec<usize> {
    if a.len() < 3 {
        return Vec::new();
    }

    let mut peaks: Vec<usize> = (1..a.len() - 1)
        .filter(|&i| a[i] > 0.0 && a[i] > a[i - 1] && a[i] >= a[i + 1])
        .collect();

    peaks.sort_by(|&x, &y| a[y].total_cmp(&a[x]));
    peaks.truncate(n);
    peaks
}

/// Bands sloping down from `peak` on both sides, up to the adjacent valleys.
fn neighbourhood(a: &[f64], peak: usize) -> (usize, usize) {
    let mut left = peak;
    while left > 0 && a[left - 1] <= a[left] {
        left -= 1;
    }
    let mut right = peak;
    while right + 1 < a.len() && a[right + 1] <= a[right] {
        right += 1;
    }
    (left, right)
}

/// Wavelengths where the feature falls to half of `depth`, linearly
/// interpolated; clamped to the neighbourhood edges.
fn half_depth_crossings(
    wl: &[f64],
    a: &[f64],
    peak: usize,
    left: usize,
    right: usize,
    depth: f64,
) -> (f64, f64) {
    let half = 0.5 * depth;

    let mut xl = wl[left];
    let mut j = peak;
    while j > left {
        if a[j - 1] <= half {
            xl = interpolate(wl[j - 1], a[j - 1], wl[j], a[j], half);
            break;
        }
        j -= 1;
    }

    let mut xr = wl[right];
    let mut j = peak;
    while j < right {
        if a[j + 1] <= half {
            xr = interpolate(wl[j], a[j], wl[j + 1], a[j + 1], half);
            break;
        }
        j += 1;
    }

    (xl, xr)
}

fn interpolate(x0: f64, y0: f64, x1: f64, y1: f64, y: f64) -> f64 {
    if (y1 - y0).abs() < f64::EPSILON {
        return 0.5 * (x0 + x1);
    }
    x0 + (y - y0) / (y1 - y0) * (x1 - x0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectra::HullCorrection;

    fn axis() -> Vec<f64> {
        (0..61).map(|i| 2100.0 + 5.0 * i as f64).collect()
    }

    fn absorption(wl: &[f64], features: &[(f64, f64, f64)]) -> Vec<f64> {
        wl.iter()
            .map(|&x| {
                1.0 - features
                    .iter()
                    .map(|&(d, p, w)| Basis::Gaussian.eval(x, d, p, w, w))
                    .sum::<f64>()
            })
            .collect()
    }

    fn fit(config: &MwlConfig, wl: &[f64], spectrum: &[f64]) -> (Vec<Feature>, UnitOutcome) {
        let fitter = UnitFitter::new(config, wl, 0, wl.len() - 1, None);
        let mut out = vec![0.0; config.n_features * N_ATTRIBUTES];
        let outcome = fitter.fit_into(spectrum, &mut out);
        let features = out.chunks(N_ATTRIBUTES).map(Feature::from_slot).collect();
        (features, outcome)
    }

    #[test]
    fn test_short_spectrum_is_unusable() {
        let wl = axis();
        let spectrum = absorption(&wl, &[(0.3, 2200.0, 12.0)]);
        let config = MwlConfig::new(2100.0, 2400.0);

        let (features, outcome) = fit(&config, &wl, &spectrum[..40]);

        assert!(outcome.unusable);
        assert!(outcome.is_failure());
        assert!(!features[0].is_valid());
    }

    #[test]
    fn test_find_peaks_ranks_by_height() {
        let a = [0.0, 0.1, 0.0, 0.3, 0.0, 0.2, 0.0];
        assert_eq!(find_peaks(&a, 2), vec![3, 5]);
        assert_eq!(find_peaks(&a, 5), vec![3, 5, 1]);
    }

    #[test]
    fn test_gaussian_recovers_synthetic_feature() {
        let wl = axis();
        let spectrum = absorption(&wl, &[(0.3, 2203.0, 12.0)]);
        let config = MwlConfig::new(2100.0, 2400.0);

        let (features, outcome) = fit(&config, &wl, &spectrum);

        assert_eq!(outcome.attempted, 1);
        assert_eq!(outcome.failed, 0);
        let f = features[0];
        assert!((f.depth - 0.3).abs() < 0.015, "{:?}", f);
        assert!((f.pos - 2203.0).abs() < 5.0, "{:?}", f);
        assert!((f.width - 12.0).abs() < 0.6, "{:?}", f);
        assert!(f.width2.is_nan());
    }

    #[test]
    fn test_lorentzian_recovers_synthetic_feature() {
        let wl = axis();
        let spectrum: Vec<f64> = wl
            .iter()
            .map(|&x| 1.0 - Basis::Lorentzian.eval(x, 0.25, 2250.0, 15.0, 15.0))
            .collect();
        let config = MwlConfig::new(2100.0, 2400.0).with_method(FitMethod::Lorentzian);

        let (features, _) = fit(&config, &wl, &spectrum);

        assert!((features[0].depth - 0.25).abs() < 0.0125);
        assert!((features[0].pos - 2250.0).abs() < 5.0);
    }

    #[test]
    fn test_asymmetric_gaussian_recovers_both_widths() {
        let wl = axis();
        let spectrum: Vec<f64> = wl
            .iter()
            .map(|&x| 1.0 - Basis::Gaussian.eval(x, 0.4, 2200.0, 10.0, 25.0))
            .collect();
        let config = MwlConfig::new(2100.0, 2400.0).asymmetric();

        let (features, _) = fit(&config, &wl, &spectrum);
        let f = features[0];

        assert!((f.width - 10.0).abs() < 0.5, "{:?}", f);
        assert!((f.width2 - 25.0).abs() < 1.25, "{:?}", f);
    }

    #[test]
    fn test_minmax_reads_sample_extremum() {
        let wl = axis();
        let spectrum = absorption(&wl, &[(0.3, 2200.0, 12.0)]);
        let config = MwlConfig::new(2100.0, 2400.0).with_method(FitMethod::MinMax);

        let (features, _) = fit(&config, &wl, &spectrum);

        assert_eq!(features[0].pos, 2200.0);
        assert!((features[0].depth - 0.3).abs() < 1e-12);
        assert!((features[0].width - 12.0).abs() < 1.0);
    }

    #[test]
    fn test_parabola_interpolates_between_bands() {
        let wl = axis();
        let spectrum = absorption(&wl, &[(0.3, 2202.0, 15.0)]);
        let config = MwlConfig::new(2100.0, 2400.0).with_method(FitMethod::Parabola);

        let (features, _) = fit(&config, &wl, &spectrum);

        assert!((features[0].pos - 2202.0).abs() < 2.5, "{:?}", features[0]);
        assert!((features[0].depth - 0.3).abs() < 0.03, "{:?}", features[0]);
    }

    #[test]
    fn test_missing_features_are_padded() {
        let wl = axis();
        let spectrum = absorption(&wl, &[(0.2, 2200.0, 10.0)]);
        let config = MwlConfig::new(2100.0, 2400.0).with_features(3);

        let (features, outcome) = fit(&config, &wl, &spectrum);

        assert!(features[0].is_valid());
        assert!(!features[1].is_valid());
        assert!(!features[2].is_valid());
        assert_eq!(outcome.attempted, 1);
        assert!(!outcome.is_failure());
    }

    #[test]
    fn test_two_features_fit_in_prominence_order() {
        let wl = axis();
        let spectrum = absorption(&wl, &[(0.1, 2160.0, 8.0), (0.3, 2330.0, 8.0)]);
        let config = MwlConfig::new(2100.0, 2400.0).with_features(2);

        let (features, _) = fit(&config, &wl, &spectrum);

        assert!((features[0].pos - 2330.0).abs() < 5.0);
        assert!((features[1].pos - 2160.0).abs() < 5.0);
    }

    #[test]
    fn test_maxima_fits_emission_peak() {
        let wl = axis();
        let spectrum: Vec<f64> = wl
            .iter()
            .map(|&x| 1.0 + Basis::Gaussian.eval(x, 0.5, 2280.0, 10.0, 10.0))
            .collect();
        let config = MwlConfig::new(2100.0, 2400.0).maxima();

        let (features, _) = fit(&config, &wl, &spectrum);

        assert!((features[0].pos - 2280.0).abs() < 5.0);
        assert!((features[0].depth - 0.5).abs() < 0.025);
    }

    #[test]
    fn test_nan_input_is_unusable() {
        let wl = axis();
        let mut spectrum = absorption(&wl, &[(0.3, 2200.0, 12.0)]);
        spectrum[10] = f64::NAN;
        let config = MwlConfig::new(2100.0, 2400.0);

        let (features, outcome) = fit(&config, &wl, &spectrum);

        assert!(outcome.unusable);
        assert!(outcome.is_failure());
        assert!(features.iter().all(|f| !f.is_valid()));
    }

    #[test]
    fn test_hull_detrend_before_fitting() {
        let wl = axis();
        // Sloping continuum multiplied by a feature
        let spectrum: Vec<f64> = absorption(&wl, &[(0.3, 2250.0, 12.0)])
            .iter()
            .zip(wl.iter())
            .map(|(s, x)| s * (0.5 + 0.001 * (x - 2100.0)))
            .collect();
        let config = MwlConfig::new(2100.0, 2400.0);
        let hull = HullCorrection;
        let fitter = UnitFitter::new(&config, &wl, 0, wl.len() - 1, Some(&hull));
        let mut out = vec![0.0; N_ATTRIBUTES];

        fitter.fit_into(&spectrum, &mut out);
        let f = Feature::from_slot(&out);

        assert!((f.pos - 2250.0).abs() < 5.0, "{:?}", f);
        assert!((f.depth - 0.3).abs() < 0.015, "{:?}", f);
    }
}
