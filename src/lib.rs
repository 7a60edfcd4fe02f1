//! Absorption feature fitting and illumination correction for hyperspectral
//! reflectance data.

pub mod config;
pub mod illumination;
pub mod linalg;
pub mod mwl;
pub mod spectra;
pub mod stats;
