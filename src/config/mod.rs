use serde::de::Error;
use serde::{Deserialize, Deserializer, Serialize};

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub mod error;
pub use error::ConfigError;

pub mod threads;
pub use threads::Threads;

/// Basis used to describe a single absorption feature.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FitMethod {
    /// Direct extremum location, no curve fit.
    MinMax,
    Parabola,
    #[default]
    Gaussian,
    Lorentzian,
}

/// Continuum removal applied to the window before features are located.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    /// Spectra are already detrended (e.g. hull corrected upstream).
    #[default]
    None,
    Hull,
}

/// Parameters of a minimum wavelength run.
#[derive(Debug, Clone, Serialize)]
pub struct MwlConfig {
    pub window: (f64, f64),
    pub n_features: usize,
    pub method: FitMethod,
    pub symmetric: bool,
    pub minima: bool,
    pub threads: Threads,
    pub trend: Trend,
    pub max_iterations: usize,
    pub ftol: f64,
    pub xtol: f64,
    pub wavelength_tolerance: f64,
}

impl MwlConfig {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self {
            window: (lo, hi),
            n_features: 1,
            method: FitMethod::default(),
            symmetric: true,
            minima: true,
            threads: Threads::default(),
            trend: Trend::default(),
            max_iterations: 100,
            ftol: 1e-10,
            xtol: 1e-10,
            wavelength_tolerance: 5.0,
        }
    }

    pub fn with_features(mut self, n: usize) -> Self {
        self.n_features = n;
        self
    }

    pub fn with_method(mut self, method: FitMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_threads(mut self, threads: Threads) -> Self {
        self.threads = threads;
        self
    }

    pub fn asymmetric(mut self) -> Self {
        self.symmetric = false;
        self
    }

    pub fn maxima(mut self) -> Self {
        self.minima = false;
        self
    }

    pub fn with_trend(mut self, trend: Trend) -> Self {
        self.trend = trend;
        self
    }

    /// Checks everything that can be checked without the wavelength axis.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (lo, hi) = self.window;
        if !lo.is_finite() || !hi.is_finite() || lo >= hi {
            return Err(ConfigError::WindowOrder { lo, hi });
        }
        if self.n_features == 0 {
            return Err(ConfigError::FeatureCount);
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::Iterations);
        }
        for tol in [self.ftol, self.xtol] {
            if !tol.is_finite() || tol <= 0.0 {
                return Err(ConfigError::Tolerance(tol));
            }
        }
        // A zero wavelength tolerance is allowed and means exact matches only
        if !self.wavelength_tolerance.is_finite() || self.wavelength_tolerance < 0.0 {
            return Err(ConfigError::Tolerance(self.wavelength_tolerance));
        }
        Ok(())
    }
}

// Fills in defaults for omitted keys and rejects invalid combinations while
// deserializing, so a loaded config is always usable.
impl<'de> Deserialize<'de> for MwlConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct MwlHelper {
            window: [f64; 2],
            n_features: Option<usize>,
            method: Option<FitMethod>,
            symmetric: Option<bool>,
            minima: Option<bool>,
            threads: Option<Threads>,
            trend: Option<Trend>,
            max_iterations: Option<usize>,
            ftol: Option<f64>,
            xtol: Option<f64>,
            wavelength_tolerance: Option<f64>,
        }

        let helper = MwlHelper::deserialize(deserializer)?;
        let defaults = MwlConfig::new(helper.window[0], helper.window[1]);

        let config = MwlConfig {
            window: defaults.window,
            n_features: helper.n_features.unwrap_or(defaults.n_features),
            method: helper.method.unwrap_or(defaults.method),
            symmetric: helper.symmetric.unwrap_or(defaults.symmetric),
            minima: helper.minima.unwrap_or(defaults.minima),
            threads: helper.threads.unwrap_or(defaults.threads),
            trend: helper.trend.unwrap_or(defaults.trend),
            max_iterations: helper.max_iterations.unwrap_or(defaults.max_iterations),
            ftol: helper.ftol.unwrap_or(defaults.ftol),
            xtol: helper.xtol.unwrap_or(defaults.xtol),
            wavelength_tolerance: helper
                .wavelength_tolerance
                .unwrap_or(defaults.wavelength_tolerance),
        };

        config.validate().map_err(D::Error::custom)?;

        Ok(config)
    }
}

/// Run configuration for the command line tool.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    spectra: String,
    output: Option<String>,
    mwl: MwlConfig,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let config: Config = serde_json::from_reader(reader).map_err(ConfigError::from)?;

        Ok(config)
    }

    pub fn spectra(&self) -> &str {
        &self.spectra
    }

    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn mwl(&self) -> &MwlConfig {
        &self.mwl
    }

    pub fn set_threads(&mut self, threads: Threads) {
        self.mwl.threads = threads;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_from_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("config.json");
        let mut file = File::create(&file_path).unwrap();

        let config_data = r#"
    {
        "spectra": "data/library.json",
        "mwl": {
            "window": [2100.0, 2400.0],
            "n_features": 2,
            "method": "lorentzian",
            "symmetric": false,
            "threads": 2,
            "trend": "hull"
        }
    }
    "#;

        file.write_all(config_data.as_bytes()).unwrap();

        let config = Config::from_file(file_path).unwrap();

        assert_eq!(config.spectra(), "data/library.json");
        assert!(config.output().is_none());

        let mwl = config.mwl();
        assert_eq!(mwl.window, (2100.0, 2400.0));
        assert_eq!(mwl.n_features, 2);
        assert_eq!(mwl.method, FitMethod::Lorentzian);
        assert!(!mwl.symmetric);
        assert!(mwl.minima);
        assert_eq!(mwl.threads, Threads(2));
        assert_eq!(mwl.trend, Trend::Hull);
        assert_eq!(mwl.max_iterations, 100);
    }

    #[test]
    fn test_defaults_from_minimal_json() {
        let mwl: MwlConfig = serde_json::from_str(r#"{ "window": [2150, 2250] }"#).unwrap();

        assert_eq!(mwl.n_features, 1);
        assert_eq!(mwl.method, FitMethod::Gaussian);
        assert!(mwl.symmetric);
        assert_eq!(mwl.threads, Threads::ALL_BUT_ONE);
        assert_eq!(mwl.trend, Trend::None);
    }

    #[test]
    fn test_invalid_window_is_rejected() {
        let result: Result<MwlConfig, _> = serde_json::from_str(r#"{ "window": [2300, 2100] }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_features_is_rejected() {
        let result: Result<MwlConfig, _> =
            serde_json::from_str(r#"{ "window": [2100, 2300], "n_features": 0 }"#);
        assert!(result.is_err());

        let config = MwlConfig::new(2100.0, 2300.0).with_features(0);
        assert!(matches!(config.validate(), Err(ConfigError::FeatureCount)));
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let result: Result<MwlConfig, _> =
            serde_json::from_str(r#"{ "window": [2100, 2300], "method": "spline" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let result = Config::from_file(dir.path().join("missing.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
