use std::fmt;

use log::warn;

use crate::illumination::error::IlluError;
use crate::illumination::panel::{Panel, check_panels};
use crate::stats::{linear_regression, rms};

/// Empirical line calibration: a per-band affine map
/// `radiance = gain * reflectance + offset` fitted across panels.
///
/// No regularisation is applied. Panels that do not share the target's
/// illumination and path radiance give poorly conditioned lines, and panels
/// with identical reflectance at a band give a non-finite gain there.
#[derive(Debug, Clone)]
pub struct Elc {
    gain: Vec<f64>,
    offset: Vec<f64>,
    residual_rms: Vec<f64>,
}

impl Elc {
    pub fn fit(panels: &[Panel]) -> Result<Self, IlluError> {
        let n_bands = check_panels(panels, 2)?;

        let mut gain = Vec::with_capacity(n_bands);
        let mut offset = Vec::with_capacity(n_bands);
        let mut residual_rms = Vec::with_capacity(n_bands);

        for band in 0..n_bands {
            let reflectance: Vec<f64> = panels.iter().map(|p| p.reflectance()[band]).collect();
            let radiance: Vec<f64> = panels.iter().map(|p| p.radiance()[band]).collect();
            let line = linear_regression(&reflectance, &radiance);

            // Residuals in reflectance units
            let residuals: Vec<f64> = reflectance
                .iter()
                .zip(radiance.iter())
                .map(|(r, l)| (l - line.intercept) / line.slope - r)
                .collect();

            gain.push(line.slope);
            offset.push(line.intercept);
            residual_rms.push(rms(&residuals));
        }

        let unusable = gain.iter().filter(|g| !g.is_finite() || **g == 0.0).count();
        if unusable > 0 {
            warn!(
                "Empirical line has no usable gain at {} of {} bands",
                unusable, n_bands
            );
        }

        Ok(Elc {
            gain,
            offset,
            residual_rms,
        })
    }

    pub fn n_bands(&self) -> usize {
        self.gain.len()
    }

    pub fn gain(&self) -> &[f64] {
        &self.gain
    }

    pub fn offset(&self) -> &[f64] {
        &self.offset
    }

    pub fn residual_rms(&self) -> &[f64] {
        &self.residual_rms
    }

    /// Converts row-major radiance (`n_units * n_bands`) to reflectance.
    pub fn apply(&self, radiance: &[f64]) -> Result<Vec<f64>, IlluError> {
        let n_bands = self.n_bands();
        if radiance.len() % n_bands != 0 {
            return Err(IlluError::Shape {
                expected: radiance.len().div_ceil(n_bands) * n_bands,
                found: radiance.len(),
            });
        }

        Ok(radiance
            .chunks(n_bands)
            .flat_map(|spectrum| {
                spectrum
                    .iter()
                    .zip(self.gain.iter().zip(self.offset.iter()))
                    .map(|(l, (g, o))| (l - o) / g)
            })
            .collect())
    }
}

impl fmt::Display for Elc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let worst = self
            .residual_rms
            .iter()
            .copied()
            .filter(|r| r.is_finite())
            .fold(0.0, f64::max);
        write!(
            f,
            "Empirical line: {} bands, max residual RMS {:.2e}",
            self.n_bands(),
            worst
        )
    }
}
