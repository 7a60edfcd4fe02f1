use log::{debug, info, warn};
use rayon::prelude::*;

use crate::config::{ConfigError, MwlConfig, Trend};
use crate::mwl::fit::UnitFitter;
use crate::mwl::result::{BatchStats, Feature, MwlResult, N_ATTRIBUTES};
use crate::spectra::{
    Detrend, HullCorrection, LowerHullCorrection, SpectralSource, validate_wavelengths,
    window_indices,
};

/// Fits absorption (or emission) features in every unit of `source`.
///
/// The detrending step follows `config.trend`. Per-unit numerical failures
/// never abort the batch; they leave NaN slots and are counted in
/// [BatchStats]. Only invalid global parameters return an error.
pub fn minimum_wavelength<S>(source: &S, config: &MwlConfig) -> Result<MwlResult, ConfigError>
where
    S: SpectralSource + ?Sized,
{
    match config.trend {
        Trend::None => run(source, config, None),
        Trend::Hull if config.minima => run(source, config, Some(&HullCorrection)),
        Trend::Hull => run(source, config, Some(&LowerHullCorrection)),
    }
}

/// Same as [minimum_wavelength] but with a caller supplied continuum removal.
pub fn minimum_wavelength_with<S>(
    source: &S,
    config: &MwlConfig,
    detrend: &dyn Detrend,
) -> Result<MwlResult, ConfigError>
where
    S: SpectralSource + ?Sized,
{
    run(source, config, Some(detrend))
}

/// Fits a single spectrum on the calling thread.
pub fn fit_spectrum(
    wavelengths: &[f64],
    spectrum: &[f64],
    config: &MwlConfig,
) -> Result<Vec<Feature>, ConfigError> {
    config.validate()?;
    validate_wavelengths(wavelengths)?;
    if spectrum.len() != wavelengths.len() {
        return Err(ConfigError::Shape {
            expected: wavelengths.len(),
            found: spectrum.len(),
        });
    }

    let (lo, hi) = config.window;
    let (start, end) = window_indices(wavelengths, lo, hi, config.wavelength_tolerance)?;
    let hull = HullCorrection;
    let lower = LowerHullCorrection;
    let detrend: Option<&dyn Detrend> = match config.trend {
        Trend::None => None,
        Trend::Hull if config.minima => Some(&hull),
        Trend::Hull => Some(&lower),
    };

    let fitter = UnitFitter::new(config, wavelengths, start, end, detrend);
    let mut out = vec![f64::NAN; config.n_features * N_ATTRIBUTES];
    fitter.fit_into(spectrum, &mut out);

    Ok(out.chunks(N_ATTRIBUTES).map(Feature::from_slot).collect())
}

fn run<S>(
    source: &S,
    config: &MwlConfig,
    detrend: Option<&dyn Detrend>,
) -> Result<MwlResult, ConfigError>
where
    S: SpectralSource + ?Sized,
{
    config.validate()?;

    let wavelengths = source.wavelengths();
    validate_wavelengths(wavelengths)?;

    let (lo, hi) = config.window;
    let (start, end) = window_indices(wavelengths, lo, hi, config.wavelength_tolerance)?;

    let n_units = source.n_units();
    let workers = config.threads.resolve_available();
    let stride = config.n_features * N_ATTRIBUTES;

    info!(
        "Fitting {} feature(s) in {} units over {:.1}-{:.1} ({} bands, {:?}) with {} worker(s)",
        config.n_features,
        n_units,
        wavelengths[start],
        wavelengths[end],
        end - start + 1,
        config.method,
        workers
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| ConfigError::ThreadPool(e.to_string()))?;

    let fitter = UnitFitter::new(config, wavelengths, start, end, detrend);
    let mut data = vec![f64::NAN; n_units * stride];

    // One contiguous block of units per worker; blocks are disjoint so the
    // output order matches the input order whatever the completion order.
    let units_per_block = n_units.div_ceil(workers).max(1);

    let stats = pool.install(|| {
        data.par_chunks_mut(units_per_block * stride)
            .enumerate()
            .map(|(block, out)| {
                let first = block * units_per_block;
                let mut stats = BatchStats::default();

                for (offset, slot) in out.chunks_mut(stride).enumerate() {
                    let outcome = fitter.fit_into(source.spectrum(first + offset), slot);

                    stats.units += 1;
                    stats.attempted_features += outcome.attempted;
                    stats.failed_features += outcome.failed;
                    if outcome.is_failure() {
                        stats.failed_units += 1;
                    }
                }

                debug!("Block {} finished {} units", block, stats.units);
                stats
            })
            .reduce(BatchStats::default, BatchStats::merge)
    });

    if stats.failed_units > 0 {
        warn!(
            "{} of {} units failed ({:.1}%), {} of {} feature fits rejected",
            stats.failed_units,
            stats.units,
            100.0 * stats.failure_rate(),
            stats.failed_features,
            stats.attempted_features
        );
    }
    info!("Finished fitting {} units", stats.units);

    Ok(MwlResult::new(
        n_units,
        config.n_features,
        config.symmetric,
        config.minima,
        config.method,
        data,
        stats,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FitMethod, Threads};
    use crate::mwl::basis::Basis;
    use crate::mwl::result::Attribute;
    use crate::spectra::SpectralMatrix;

    fn axis() -> Vec<f64> {
        (0..81).map(|i| 2000.0 + 5.0 * i as f64).collect()
    }

    // Units with one or two Gaussian dips whose parameters vary with the index.
    fn library(n: usize) -> SpectralMatrix {
        let wl = axis();
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|u| {
                let depth = 0.1 + 0.02 * (u % 10) as f64;
                let pos = 2150.0 + 3.7 * (u % 17) as f64;
                wl.iter()
                    .map(|&x| {
                        let mut s = 1.0 - Basis::Gaussian.eval(x, depth, pos, 12.0, 12.0);
                        if u % 3 == 0 {
                            s -= Basis::Gaussian.eval(x, 0.08, 2330.0, 9.0, 9.0);
                        }
                        s
                    })
                    .collect()
            })
            .collect();
        SpectralMatrix::from_rows(wl, &rows).unwrap()
    }

    #[test]
    fn test_recovers_single_feature() {
        let wl = axis();
        let spectrum: Vec<f64> = wl
            .iter()
            .map(|&x| 1.0 - Basis::Gaussian.eval(x, 0.35, 2201.0, 14.0, 14.0))
            .collect();
        let source = SpectralMatrix::from_rows(wl, &[spectrum]).unwrap();
        let config = MwlConfig::new(2100.0, 2300.0).with_threads(Threads(1));

        let mwl = minimum_wavelength(&source, &config).unwrap();

        let depth = mwl.get(0, Attribute::Depth).unwrap()[0];
        let pos = mwl.get(0, Attribute::Pos).unwrap()[0];
        let width = mwl.get(0, Attribute::Width).unwrap()[0];
        assert!((depth - 0.35).abs() < 0.35 * 0.05, "depth {}", depth);
        assert!((pos - 2201.0).abs() < 5.0, "pos {}", pos);
        assert!((width - 14.0).abs() < 14.0 * 0.05, "width {}", width);
        assert_eq!(mwl.stats().failed_units, 0);
    }

    #[test]
    fn test_thread_count_does_not_change_results() {
        let source = library(53);

        for method in [FitMethod::Gaussian, FitMethod::Parabola, FitMethod::MinMax] {
            let base = MwlConfig::new(2050.0, 2380.0)
                .with_features(2)
                .with_method(method);

            let one = base.clone().with_threads(Threads(1));
            let four = base.with_threads(Threads(4));
            let single = minimum_wavelength(&source, &one).unwrap();
            let many = minimum_wavelength(&source, &four).unwrap();

            for attr in Attribute::ALL {
                for rank in 0..2 {
                    let a = single.get(rank, attr).unwrap();
                    let b = many.get(rank, attr).unwrap();
                    let a_bits: Vec<u64> = a.iter().map(|v| v.to_bits()).collect();
                    let b_bits: Vec<u64> = b.iter().map(|v| v.to_bits()).collect();
                    assert_eq!(a_bits, b_bits, "{:?} {:?} rank {}", method, attr, rank);
                }
            }
            assert_eq!(single.stats(), many.stats());
        }
    }

    #[test]
    fn test_more_workers_than_units() {
        let source = library(3);
        let config = MwlConfig::new(2050.0, 2380.0).with_threads(Threads(8));

        let mwl = minimum_wavelength(&source, &config).unwrap();

        assert_eq!(mwl.n_units(), 3);
        assert!(mwl.get(0, Attribute::Pos).unwrap().iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_failed_units_are_counted_not_fatal() {
        let wl = axis();
        let good: Vec<f64> = wl
            .iter()
            .map(|&x| 1.0 - Basis::Gaussian.eval(x, 0.2, 2200.0, 10.0, 10.0))
            .collect();
        let bad = vec![f64::NAN; wl.len()];
        let source = SpectralMatrix::from_rows(wl, &[good, bad]).unwrap();
        let config = MwlConfig::new(2100.0, 2300.0).with_threads(Threads(2));

        let mwl = minimum_wavelength(&source, &config).unwrap();

        assert_eq!(mwl.stats().failed_units, 1);
        assert!((mwl.stats().failure_rate() - 0.5).abs() < 1e-12);
        let pos = mwl.get(0, Attribute::Pos).unwrap();
        assert!(pos[0].is_finite());
        assert!(pos[1].is_nan());
    }

    #[test]
    fn test_invalid_parameters_fail_fast() {
        let source = library(2);

        let outside = MwlConfig::new(2500.0, 2600.0);
        assert!(matches!(
            minimum_wavelength(&source, &outside),
            Err(ConfigError::WindowOutsideDomain { .. })
        ));

        let no_features = MwlConfig::new(2100.0, 2300.0).with_features(0);
        assert!(matches!(
            minimum_wavelength(&source, &no_features),
            Err(ConfigError::FeatureCount)
        ));
    }

    #[test]
    fn test_sorted_queries_after_batch() {
        let source = library(9);
        let config = MwlConfig::new(2050.0, 2380.0).with_features(2);

        let mut mwl = minimum_wavelength(&source, &config).unwrap();
        mwl.sort_by_depth();

        let first = mwl.get(0, Attribute::Depth).unwrap();
        let last = mwl.get(-1, Attribute::Depth).unwrap();
        for u in 0..mwl.n_units() {
            assert!(first[u].is_finite());
            if last[u].is_finite() {
                assert!(first[u] >= last[u]);
            }
        }

        // Single-feature units report the same feature at both ends
        assert_eq!(first[1], last[1]);

        // Units 0, 3 and 6 carry the extra shallow feature at 2330
        let shallow = mwl.deepest(2310.0, 2350.0);
        assert!((shallow[0].pos - 2330.0).abs() < 5.0);
        assert!(!shallow[1].is_valid());
    }

    #[test]
    fn test_last_rank_of_padded_units() {
        let wl = axis();
        let single: Vec<f64> = wl
            .iter()
            .map(|&x| 1.0 - Basis::Gaussian.eval(x, 0.05, 2330.0, 10.0, 10.0))
            .collect();
        let double: Vec<f64> = wl
            .iter()
            .map(|&x| {
                1.0 - Basis::Gaussian.eval(x, 0.3, 2200.0, 10.0, 10.0)
                    - Basis::Gaussian.eval(x, 0.1, 2120.0, 10.0, 10.0)
            })
            .collect();
        let source = SpectralMatrix::from_rows(wl, &[double, single]).unwrap();
        let config = MwlConfig::new(2050.0, 2380.0).with_features(3);

        let mut mwl = minimum_wavelength(&source, &config).unwrap();
        mwl.sort_by_depth();

        assert_eq!(mwl.valid_count(), vec![2, 1]);
        let last = mwl.get(-1, Attribute::Depth).unwrap();
        assert!((last[0] - 0.1).abs() < 0.005, "{:?}", last);
        assert!((last[1] - 0.05).abs() < 0.0025, "{:?}", last);
    }

    // Source whose second unit is shorter than the wavelength axis.
    struct Ragged {
        wavelengths: Vec<f64>,
        rows: Vec<Vec<f64>>,
    }

    impl SpectralSource for Ragged {
        fn wavelengths(&self) -> &[f64] {
            &self.wavelengths
        }

        fn n_units(&self) -> usize {
            self.rows.len()
        }

        fn spectrum(&self, unit: usize) -> &[f64] {
            &self.rows[unit]
        }
    }

    #[test]
    fn test_mismatched_spectrum_length_is_a_failed_unit() {
        let wl = axis();
        let good: Vec<f64> = wl
            .iter()
            .map(|&x| 1.0 - Basis::Gaussian.eval(x, 0.2, 2200.0, 10.0, 10.0))
            .collect();
        let short = good[..30].to_vec();
        let source = Ragged {
            wavelengths: wl,
            rows: vec![good, short],
        };
        let config = MwlConfig::new(2100.0, 2300.0).with_threads(Threads(2));

        let mwl = minimum_wavelength(&source, &config).unwrap();

        assert_eq!(mwl.stats().failed_units, 1);
        let pos = mwl.get(0, Attribute::Pos).unwrap();
        assert!(pos[0].is_finite());
        assert!(pos[1].is_nan());
    }

    #[test]
    fn test_fit_spectrum_matches_batch() {
        let source = library(4);
        let config = MwlConfig::new(2050.0, 2380.0).with_features(2);

        let mwl = minimum_wavelength(&source, &config).unwrap();
        let single = fit_spectrum(source.wavelengths(), source.spectrum(3), &config).unwrap();

        assert_eq!(single[0].pos.to_bits(), mwl.feature(3, 0).unwrap().pos.to_bits());
    }

    #[test]
    fn test_hull_trend_on_sloped_spectra() {
        let wl = axis();
        let spectrum: Vec<f64> = wl
            .iter()
            .map(|&x| {
                let continuum = 0.3 + 0.0005 * (x - 2000.0);
                (1.0 - Basis::Gaussian.eval(x, 0.25, 2210.0, 12.0, 12.0)) * continuum
            })
            .collect();
        let source = SpectralMatrix::from_rows(wl, &[spectrum]).unwrap();
        let config = MwlConfig::new(2100.0, 2300.0).with_trend(Trend::Hull);

        let mwl = minimum_wavelength(&source, &config).unwrap();
        let f = mwl.feature(0, 0).unwrap();

        assert!((f.pos - 2210.0).abs() < 5.0, "{:?}", f);
        assert!((f.depth - 0.25).abs() < 0.0125, "{:?}", f);
    }
}
