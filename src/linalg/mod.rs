//! Small dense linear algebra used by the curve fitter and the illumination solver.

pub mod lower_upper;

pub use lower_upper::{DegenerateMatrixError, solve_system};
