use std::f64::consts::LN_2;

use crate::config::FitMethod;

/// Feature shapes. Every shape is normalised so that `width` is the
/// half-width at half depth, which keeps widths comparable between methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Basis {
    Gaussian,
    Lorentzian,
    Parabola,
}

impl Basis {
    /// Shape used to model features found with `method`. Direct extremum
    /// location has no shape of its own and is drawn as a Gaussian.
    pub fn for_method(method: FitMethod) -> Self {
        match method {
            FitMethod::Parabola => Basis::Parabola,
            FitMethod::Lorentzian => Basis::Lorentzian,
            FitMethod::Gaussian | FitMethod::MinMax => Basis::Gaussian,
        }
    }

    /// Unit-depth profile at normalised offset `u = (x - pos) / width`.
    pub fn profile(self, u: f64) -> f64 {
        match self {
            Basis::Gaussian => (-LN_2 * u * u).exp(),
            Basis::Lorentzian => 1.0 / (1.0 + u * u),
            Basis::Parabola => (1.0 - 0.5 * u * u).max(0.0),
        }
    }

    /// Feature amplitude at wavelength `x`; `width` applies left of `pos`
    /// and `width2` right of it.
    pub fn eval(self, x: f64, depth: f64, pos: f64, width: f64, width2: f64) -> f64 {
        let w = if x < pos { width } else { width2 };
        depth * self.profile((x - pos) / w)
    }
}
