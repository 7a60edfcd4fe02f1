use std::env;
use std::fs::File;
use std::io::BufWriter;
use std::str::FromStr;

use log::info;

use hyfit::config::{Config, Threads};
use hyfit::mwl::{Attribute, minimum_wavelength};
use hyfit::spectra::SpectralMatrix;

const DEFAULT_CONFIG: &str = "./data/config/mwl_config.json";

fn summarize(name: &str, unit: &str, values: &[f64]) {
    let valid: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if valid.is_empty() {
        println!("  {}: no valid values", name);
        return;
    }
    println!(
        "  {}: min {:.4} {}, max {:.4} {}, mean {:.4} {}",
        name,
        valid.iter().fold(f64::INFINITY, |a, &b| a.min(b)),
        unit,
        valid.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)),
        unit,
        valid.iter().sum::<f64>() / valid.len() as f64,
        unit
    );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Usage: hyfit [config.json] [threads]
    let args: Vec<String> = env::args().collect();
    let config_path = args.get(1).map(String::as_str).unwrap_or(DEFAULT_CONFIG);

    let mut config = Config::from_file(config_path)?;
    if let Some(threads) = args.get(2) {
        config.set_threads(Threads::from_str(threads)?);
    }
    info!("Loaded configuration from {}", config_path);

    let spectra = SpectralMatrix::from_file(config.spectra())?;
    println!("{}", spectra);

    let mut result = minimum_wavelength(&spectra, config.mwl())?;
    result.sort_by_depth();

    let stats = result.stats();
    println!(
        "Fitted {} units: {} failed ({:.1}%), {} of {} feature fits rejected",
        stats.units,
        stats.failed_units,
        100.0 * stats.failure_rate(),
        stats.failed_features,
        stats.attempted_features
    );

    println!("Deepest feature:");
    summarize("depth", "", &result.get(0, Attribute::Depth)?);
    summarize("position", "nm", &result.get(0, Attribute::Pos)?);
    summarize("width", "nm", &result.get(0, Attribute::Width)?);

    if let Some(path) = config.output() {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &result)?;
        println!("Results written to {}", path);
    }

    Ok(())
}
