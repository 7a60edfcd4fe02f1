//! Fits synthetic two-feature spectra and queries the result.
//!
//! Run with `RUST_LOG=info cargo run --example mwl_synthetic`.

use hyfit::config::{FitMethod, MwlConfig, Threads, Trend};
use hyfit::mwl::{Attribute, Basis, minimum_wavelength};
use hyfit::spectra::SpectralMatrix;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let wavelengths: Vec<f64> = (0..121).map(|i| 2000.0 + 4.0 * i as f64).collect();

    // White mica (2200 nm) with variable position plus a weaker carbonate
    // feature (2340 nm), on a sloping continuum.
    let rows: Vec<Vec<f64>> = (0..500)
        .map(|u| {
            let pos = 2195.0 + 0.02 * u as f64;
            let depth = 0.1 + 0.0004 * u as f64;
            wavelengths
                .iter()
                .map(|&x| {
                    let continuum = 0.35 + 0.0002 * (x - 2000.0);
                    let s = 1.0
                        - Basis::Gaussian.eval(x, depth, pos, 12.0, 12.0)
                        - Basis::Gaussian.eval(x, 0.06, 2340.0, 10.0, 10.0);
                    s * continuum
                })
                .collect()
        })
        .collect();
    let spectra = SpectralMatrix::from_rows(wavelengths.clone(), &rows)?;
    println!("{}", spectra);

    for method in [FitMethod::Gaussian, FitMethod::Parabola, FitMethod::MinMax] {
        let config = MwlConfig::new(2100.0, 2400.0)
            .with_features(2)
            .with_method(method)
            .with_trend(Trend::Hull)
            .with_threads(Threads::ALL_BUT_ONE);

        let mut result = minimum_wavelength(&spectra, &config)?;
        result.sort_by_depth();

        let pos = result.get(0, Attribute::Pos)?;
        let mica = result.deepest(2150.0, 2250.0);
        let carbonate = result.closest(2340.0, 2300.0, 2380.0);

        println!("{:?}: {}", method, result);
        println!(
            "  unit 0: deepest at {:.1} nm, mica {:.1} nm (depth {:.3}), carbonate {:.1} nm",
            pos[0], mica[0].pos, mica[0].depth, carbonate[0].pos
        );
        println!(
            "  unit 499: mica {:.1} nm (depth {:.3})",
            mica[499].pos, mica[499].depth
        );
    }

    Ok(())
}
