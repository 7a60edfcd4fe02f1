//! Access to per-unit spectra sharing one wavelength axis.

use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::config::ConfigError;

pub mod hull;

pub use hull::{Detrend, HullCorrection, LowerHullCorrection};

/// Anything that can hand out spectra for a set of spatial units (pixels,
/// points, library entries) on a shared wavelength axis.
pub trait SpectralSource: Sync {
    fn wavelengths(&self) -> &[f64];
    fn n_units(&self) -> usize;
    /// Values of `unit`, one per wavelength. A spectrum of any other length
    /// is treated as unusable by the fitting engine.
    fn spectrum(&self, unit: usize) -> &[f64];

    fn n_bands(&self) -> usize {
        self.wavelengths().len()
    }
}

/// Dense row-major `[unit][band]` store.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralMatrix {
    wavelengths: Vec<f64>,
    data: Vec<f64>,
}

impl SpectralMatrix {
    pub fn new(wavelengths: Vec<f64>, data: Vec<f64>) -> Result<Self, ConfigError> {
        validate_wavelengths(&wavelengths)?;

        let n_bands = wavelengths.len();
        if data.len() % n_bands != 0 {
            let expected = (data.len() / n_bands + 1) * n_bands;
            return Err(ConfigError::Shape {
                expected,
                found: data.len(),
            });
        }

        Ok(Self { wavelengths, data })
    }

    pub fn from_rows(wavelengths: Vec<f64>, rows: &[Vec<f64>]) -> Result<Self, ConfigError> {
        let n_bands = wavelengths.len();
        let mut data = Vec::with_capacity(n_bands * rows.len());
        for row in rows {
            if row.len() != n_bands {
                return Err(ConfigError::Shape {
                    expected: n_bands,
                    found: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Self::new(wavelengths, data)
    }

    /// Reads `{ "wavelengths": [...], "spectra": [[...], ...] }`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct LibraryHelper {
            wavelengths: Vec<f64>,
            spectra: Vec<Vec<f64>>,
        }

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let helper: LibraryHelper = serde_json::from_reader(reader)?;

        Self::from_rows(helper.wavelengths, &helper.spectra)
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

impl SpectralSource for SpectralMatrix {
    fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    fn n_units(&self) -> usize {
        self.data.len() / self.wavelengths.len()
    }

    fn spectrum(&self, unit: usize) -> &[f64] {
        let n = self.wavelengths.len();
        &self.data[unit * n..(unit + 1) * n]
    }
}

impl fmt::Display for SpectralMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SpectralMatrix {{ units: {}, bands: {}, range: {:.1}-{:.1} }}",
            self.n_units(),
            self.n_bands(),
            self.wavelengths[0],
            self.wavelengths[self.wavelengths.len() - 1]
        )
    }
}

pub fn validate_wavelengths(wavelengths: &[f64]) -> Result<(), ConfigError> {
    if wavelengths.is_empty() {
        return Err(ConfigError::EmptyWavelengths);
    }
    if wavelengths
        .windows(2)
        .any(|w| !w[0].is_finite() || !w[1].is_finite() || w[1] <= w[0])
    {
        return Err(ConfigError::UnsortedWavelengths);
    }
    Ok(())
}

/// Index of the band closest to `target`, if it lies within `tolerance`.
pub fn band_index(wavelengths: &[f64], target: f64, tolerance: f64) -> Option<usize> {
    let (idx, distance) = wavelengths
        .iter()
        .enumerate()
        .map(|(i, w)| (i, (w - target).abs()))
        .min_by(|a, b| a.1.total_cmp(&b.1))?;

    (distance <= tolerance).then_some(idx)
}

/// Inclusive band range covered by `[lo, hi]`.
///
/// The window may overhang the data by at most `tolerance` on either side.
pub fn window_indices(
    wavelengths: &[f64],
    lo: f64,
    hi: f64,
    tolerance: f64,
) -> Result<(usize, usize), ConfigError> {
    if wavelengths.is_empty() {
        return Err(ConfigError::EmptyWavelengths);
    }
    if !(lo < hi) {
        return Err(ConfigError::WindowOrder { lo, hi });
    }

    let min = wavelengths[0];
    let max = wavelengths[wavelengths.len() - 1];
    if lo < min - tolerance || hi > max + tolerance {
        return Err(ConfigError::WindowOutsideDomain { lo, hi, min, max });
    }

    let start = wavelengths.partition_point(|&w| w < lo);
    let end = wavelengths.partition_point(|&w| w <= hi);
    let bands = end.saturating_sub(start);
    if bands < 3 {
        return Err(ConfigError::WindowTooNarrow { bands });
    }

    Ok((start, end - 1))
}
