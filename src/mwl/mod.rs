//! Minimum wavelength (MWL) absorption feature fitting.
//!
//! Each unit's spectrum is optionally detrended inside a wavelength window,
//! the most prominent extrema are located and every one of them is described
//! by a depth, a position and one or two widths. Results are gathered in an
//! [MwlResult] that supports sorting and range queries.

pub mod basis;
pub mod engine;
pub mod fit;
pub mod lm;
pub mod result;

pub use basis::Basis;
pub use engine::{fit_spectrum, minimum_wavelength, minimum_wavelength_with};
pub use result::{Attribute, BatchStats, Feature, MwlResult, QueryError};
