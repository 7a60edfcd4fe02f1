use std::fmt;

use log::{debug, info, warn};
use serde::Serialize;

use crate::illumination::brdf::Brdf;
use crate::illumination::error::IlluError;
use crate::illumination::geometry::{SceneGeometry, Vec3};
use crate::illumination::panel::{Panel, PanelSolution, back_calculate};
use crate::stats::{LinearFit, coefficient_of_variation, linear_regression};

/// Illumination below which reflectance cannot be recovered.
const MIN_ILLUMINATION: f64 = 1e-9;
/// Fewest samples for a trustworthy statistical adjustment.
const MIN_RELIABLE_SAMPLES: usize = 5;
/// Smallest illumination coefficient of variation for a trustworthy adjustment.
const MIN_RELIABLE_CV: f64 = 0.05;

/// Atmospheric path radiance per band.
#[derive(Debug, Clone, PartialEq)]
pub enum PathRadiance {
    /// Same contribution for every unit.
    Constant(Vec<f64>),
    /// Contribution proportional to the unit's distance to the sensor.
    PerMeter(Vec<f64>),
}

impl PathRadiance {
    pub fn n_bands(&self) -> usize {
        match self {
            PathRadiance::Constant(v) | PathRadiance::PerMeter(v) => v.len(),
        }
    }

    pub fn at(&self, band: usize, distance: f64) -> f64 {
        match self {
            PathRadiance::Constant(v) => v[band],
            PathRadiance::PerMeter(v) => v[band] * distance,
        }
    }
}

/// How the statistical adjustment forces the radiance/illumination line
/// through the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    /// Subtract the intercept from radiance (extra path radiance).
    Y,
    /// Add `intercept / slope` to the illumination.
    ///
    /// Often described as a multiplicative c-factor correction. A scale
    /// factor alone cannot move a line with a non-zero intercept through the
    /// origin, so the correction is stored as an additive illumination
    /// offset: `radiance = slope * (illumination + intercept / slope)`.
    X,
}

/// Regression outcome at one band.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BandAdjustment {
    pub fit: LinearFit,
    pub illumination_cv: f64,
    pub reliable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentQuality {
    pub bands: Vec<BandAdjustment>,
}

impl AdjustmentQuality {
    pub fn unreliable_bands(&self) -> Vec<usize> {
        self.bands
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.reliable)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_reliable(&self) -> bool {
        self.bands.iter().all(|b| b.reliable)
    }
}

/// Radiative model linking reflectance and at-sensor radiance:
///
/// `radiance = reflectance * (skylight * skyview + sunlight * rf) + path`
///
/// where `rf` is the BRDF reflectance factor of each unit. A statistical
/// adjustment fitted with [IlluModel::fit] adds a per-band radiance or
/// illumination boost that applies to every later forward and inverse call.
#[derive(Debug, Clone)]
pub struct IlluModel {
    sunlight: Vec<f64>,
    skylight: Vec<f64>,
    path: PathRadiance,
    brdf: Brdf,
    sun: Vec3,
    radiance_boost: Option<Vec<f64>>,
    illumination_boost: Option<Vec<f64>>,
}

impl IlluModel {
    pub fn new(
        sunlight: Vec<f64>,
        skylight: Vec<f64>,
        path: PathRadiance,
        brdf: Brdf,
        sun: Vec3,
    ) -> Result<Self, IlluError> {
        brdf.validate()?;
        let n = sunlight.len();
        for len in [skylight.len(), path.n_bands()] {
            if len != n {
                return Err(IlluError::Shape {
                    expected: n,
                    found: len,
                });
            }
        }

        Ok(IlluModel {
            sunlight,
            skylight,
            path,
            brdf,
            sun,
            radiance_boost: None,
            illumination_boost: None,
        })
    }

    /// Model whose light spectra and path radiance are solved from panels.
    pub fn from_solution(
        solution: &PanelSolution,
        brdf: Brdf,
        sun: Vec3,
    ) -> Result<Self, IlluError> {
        Self::new(
            solution.sunlight.clone(),
            solution.skylight.clone(),
            PathRadiance::PerMeter(solution.path_per_meter.clone()),
            brdf,
            sun,
        )
    }

    /// Back-calculates illumination from panels (see [back_calculate]) and
    /// builds the model from it.
    pub fn from_panels(panels: &[Panel], brdf: Brdf, sun: Vec3) -> Result<Self, IlluError> {
        let solution = back_calculate(panels)?;
        Self::from_solution(&solution, brdf, sun)
    }

    pub fn n_bands(&self) -> usize {
        self.sunlight.len()
    }

    pub fn sunlight(&self) -> &[f64] {
        &self.sunlight
    }

    pub fn skylight(&self) -> &[f64] {
        &self.skylight
    }

    pub fn path(&self) -> &PathRadiance {
        &self.path
    }

    pub fn radiance_boost(&self) -> Option<&[f64]> {
        self.radiance_boost.as_deref()
    }

    pub fn illumination_boost(&self) -> Option<&[f64]> {
        self.illumination_boost.as_deref()
    }

    pub fn is_fit(&self) -> bool {
        self.radiance_boost.is_some() || self.illumination_boost.is_some()
    }

    /// Drops any statistical adjustment.
    pub fn reset(&mut self) {
        self.radiance_boost = None;
        self.illumination_boost = None;
    }

    /// Direct-light reflectance factor of every unit; occluded units get 0.
    pub fn reflectance_factors(&self, geometry: &SceneGeometry) -> Vec<f64> {
        (0..geometry.n_units())
            .map(|u| {
                if geometry.is_occluded(u) {
                    0.0
                } else {
                    self.brdf
                        .reflectance_factor(geometry.normal(u), geometry.view(u), self.sun)
                }
            })
            .collect()
    }

    /// Total illumination, row-major `n_units * n_bands`.
    pub fn illumination(&self, geometry: &SceneGeometry) -> Vec<f64> {
        let rf = self.reflectance_factors(geometry);
        self.layer(geometry, |u, b| self.illumination_at(u, b, geometry, &rf))
    }

    /// Path radiance including any radiance boost, row-major.
    pub fn path_radiance(&self, geometry: &SceneGeometry) -> Vec<f64> {
        self.layer(geometry, |u, b| self.path_at(u, b, geometry))
    }

    /// Forward model. `reflectance` is row-major `n_units * n_bands`.
    pub fn get_radiance(
        &self,
        reflectance: &[f64],
        geometry: &SceneGeometry,
    ) -> Result<Vec<f64>, IlluError> {
        self.check_shape(reflectance, geometry)?;
        let rf = self.reflectance_factors(geometry);
        let n_bands = self.n_bands();

        Ok(self.layer(geometry, |u, b| {
            reflectance[u * n_bands + b] * self.illumination_at(u, b, geometry, &rf)
                + self.path_at(u, b, geometry)
        }))
    }

    /// Inverse model. Units and bands without usable illumination (full
    /// shadow with no sky view, singular bands) come out as NaN.
    pub fn get_reflectance(
        &self,
        radiance: &[f64],
        geometry: &SceneGeometry,
    ) -> Result<Vec<f64>, IlluError> {
        self.check_shape(radiance, geometry)?;
        let rf = self.reflectance_factors(geometry);
        let n_bands = self.n_bands();

        Ok(self.layer(geometry, |u, b| {
            let illumination = self.illumination_at(u, b, geometry, &rf);
            if illumination.is_nan() || illumination.abs() <= MIN_ILLUMINATION {
                return f64::NAN;
            }
            (radiance[u * n_bands + b] - self.path_at(u, b, geometry)) / illumination
        }))
    }

    /// Statistical ("c-factor") adjustment against measured radiance.
    ///
    /// At every band, path-corrected radiance is regressed against modelled
    /// illumination across units and the boost that moves the regression
    /// line through the origin is stored, replacing any earlier adjustment.
    /// Poorly constrained bands are reported as unreliable, never rejected.
    pub fn fit(
        &mut self,
        radiance: &[f64],
        geometry: &SceneGeometry,
        shift: Shift,
    ) -> Result<AdjustmentQuality, IlluError> {
        self.check_shape(radiance, geometry)?;
        self.reset();

        let n_bands = self.n_bands();
        let n_units = geometry.n_units();
        let illumination = self.illumination(geometry);
        let path = self.path_radiance(geometry);

        let mut boost = vec![0.0; n_bands];
        let mut bands = Vec::with_capacity(n_bands);

        for b in 0..n_bands {
            let x: Vec<f64> = (0..n_units).map(|u| illumination[u * n_bands + b]).collect();
            let y: Vec<f64> = (0..n_units)
                .map(|u| radiance[u * n_bands + b] - path[u * n_bands + b])
                .collect();

            let line = linear_regression(&x, &y);
            let illumination_cv = coefficient_of_variation(&x);
            let reliable = line.n >= MIN_RELIABLE_SAMPLES
                && illumination_cv >= MIN_RELIABLE_CV
                && line.slope.is_finite()
                && line.slope > 0.0;

            boost[b] = match shift {
                Shift::Y => line.intercept,
                Shift::X => line.intercept / line.slope,
            };
            debug!("Band {}: {:?}, boost {}", b, line, boost[b]);

            bands.push(BandAdjustment {
                fit: line,
                illumination_cv,
                reliable,
            });
        }

        let quality = AdjustmentQuality { bands };
        let unreliable = quality.unreliable_bands().len();
        if unreliable > 0 {
            warn!(
                "Statistical adjustment unreliable at {} of {} bands",
                unreliable, n_bands
            );
        }
        info!("Fitted {:?} shift over {} units", shift, n_units);

        match shift {
            Shift::Y => self.radiance_boost = Some(boost),
            Shift::X => self.illumination_boost = Some(boost),
        }

        Ok(quality)
    }

    fn illumination_at(
        &self,
        unit: usize,
        band: usize,
        geometry: &SceneGeometry,
        rf: &[f64],
    ) -> f64 {
        let boost = self.illumination_boost.as_ref().map_or(0.0, |v| v[band]);
        self.skylight[band] * geometry.skyview(unit) + self.sunlight[band] * rf[unit] + boost
    }

    fn path_at(&self, unit: usize, band: usize, geometry: &SceneGeometry) -> f64 {
        let boost = self.radiance_boost.as_ref().map_or(0.0, |v| v[band]);
        self.path.at(band, geometry.distance(unit)) + boost
    }

    fn layer<F>(&self, geometry: &SceneGeometry, value: F) -> Vec<f64>
    where
        F: Fn(usize, usize) -> f64,
    {
        let n_bands = self.n_bands();
        let mut out = Vec::with_capacity(geometry.n_units() * n_bands);
        for u in 0..geometry.n_units() {
            for b in 0..n_bands {
                out.push(value(u, b));
            }
        }
        out
    }

    fn check_shape(&self, values: &[f64], geometry: &SceneGeometry) -> Result<(), IlluError> {
        let expected = geometry.n_units() * self.n_bands();
        if values.len() != expected {
            return Err(IlluError::Shape {
                expected,
                found: values.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for IlluModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let adjustment = match (&self.radiance_boost, &self.illumination_boost) {
            (Some(_), _) => "radiance boost",
            (_, Some(_)) => "illumination boost",
            _ => "unadjusted",
        };
        write!(
            f,
            "IlluModel: {} bands, {:?}, sun [{:.3}, {:.3}, {:.3}], {}",
            self.n_bands(),
            self.brdf,
            self.sun[0],
            self.sun[1],
            self.sun[2],
            adjustment
        )
    }
}
