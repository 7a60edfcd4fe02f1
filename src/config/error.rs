use crate::config::threads::ThreadsParseError;

use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Threads(ThreadsParseError),
    ThreadPool(String),
    WindowOrder { lo: f64, hi: f64 },
    WindowOutsideDomain { lo: f64, hi: f64, min: f64, max: f64 },
    WindowTooNarrow { bands: usize },
    FeatureCount,
    Tolerance(f64),
    Iterations,
    EmptyWavelengths,
    UnsortedWavelengths,
    Shape { expected: usize, found: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "I/O error: {}", e),
            ConfigError::Json(e) => write!(f, "Failed to parse JSON: {}", e),
            ConfigError::Threads(e) => write!(f, "{}", e),
            ConfigError::ThreadPool(e) => write!(f, "Failed to build thread pool: {}", e),
            ConfigError::WindowOrder { lo, hi } => {
                write!(f, "window start {} must be lower than window end {}", lo, hi)
            }
            ConfigError::WindowOutsideDomain { lo, hi, min, max } => write!(
                f,
                "window [{}, {}] lies outside the wavelength domain [{}, {}]",
                lo, hi, min, max
            ),
            ConfigError::WindowTooNarrow { bands } => write!(
                f,
                "window contains {} bands, at least 3 are needed to locate a feature",
                bands
            ),
            ConfigError::FeatureCount => write!(f, "n_features must be at least 1"),
            ConfigError::Tolerance(t) => {
                write!(f, "tolerances must be finite and positive, got {}", t)
            }
            ConfigError::Iterations => write!(f, "max_iterations must be at least 1"),
            ConfigError::EmptyWavelengths => write!(f, "wavelength axis is empty"),
            ConfigError::UnsortedWavelengths => {
                write!(f, "wavelengths must be strictly increasing")
            }
            ConfigError::Shape { expected, found } => write!(
                f,
                "spectral data has {} values, expected {}",
                found, expected
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Json(e) => Some(e),
            ConfigError::Threads(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> ConfigError {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> ConfigError {
        ConfigError::Json(err)
    }
}

impl From<ThreadsParseError> for ConfigError {
    fn from(err: ThreadsParseError) -> ConfigError {
        ConfigError::Threads(err)
    }
}
