//! Illumination model for terrain-corrected reflectance.
//!
//! Converts between at-sensor radiance and surface reflectance given scene
//! geometry, sun and sky light spectra and atmospheric path radiance. Light
//! spectra can be back-calculated from calibration panels, radiance can be
//! calibrated directly with an empirical line, and a statistical adjustment
//! corrects residual bias against measured radiance.

pub mod brdf;
pub mod elc;
pub mod error;
pub mod geometry;
pub mod model;
pub mod panel;
pub mod solar;

pub use brdf::Brdf;
pub use elc::Elc;
pub use error::IlluError;
pub use geometry::{SceneGeometry, Vec3};
pub use model::{AdjustmentQuality, BandAdjustment, IlluModel, PathRadiance, Shift};
pub use panel::{Panel, PanelSolution, back_calculate};
pub use solar::{SolarPosition, sun_vector};
