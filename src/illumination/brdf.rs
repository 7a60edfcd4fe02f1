use crate::illumination::error::IlluError;
use crate::illumination::geometry::{Vec3, dot, norm, normalize, scale, sub};

/// Reflection distribution used to turn surface, view and light directions
/// into the direct-light reflectance factor of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Brdf {
    #[default]
    Lambertian,
    /// Rough diffuse surface; `sigma` is the facet slope standard deviation
    /// in radians.
    OrenNayar { sigma: f64 },
}

impl Brdf {
    pub fn oren_nayar(sigma: f64) -> Result<Self, IlluError> {
        let brdf = Brdf::OrenNayar { sigma };
        brdf.validate()?;
        Ok(brdf)
    }

    pub fn validate(&self) -> Result<(), IlluError> {
        match *self {
            Brdf::OrenNayar { sigma } if !sigma.is_finite() || sigma < 0.0 => {
                Err(IlluError::InvalidBrdf(sigma))
            }
            _ => Ok(()),
        }
    }

    /// Reflectance factor for surface normal `normal`, view direction `view`
    /// (surface to sensor) and light direction `light` (surface to source).
    ///
    /// Zero when the surface faces away from the light, or, for
    /// Oren-Nayar, away from the sensor. Degenerate vectors give NaN.
    pub fn reflectance_factor(&self, normal: Vec3, view: Vec3, light: Vec3) -> f64 {
        let (Some(n), Some(v), Some(l)) = (normalize(normal), normalize(view), normalize(light))
        else {
            return f64::NAN;
        };

        let cos_i = dot(n, l);
        if cos_i <= 0.0 {
            return 0.0;
        }

        match *self {
            Brdf::Lambertian => cos_i,
            Brdf::OrenNayar { sigma } => {
                let cos_r = dot(n, v);
                if cos_r <= 0.0 {
                    return 0.0;
                }

                let s2 = sigma * sigma;
                let a = 1.0 - 0.5 * s2 / (s2 + 0.33);
                let b = 0.45 * s2 / (s2 + 0.09);

                let theta_i = cos_i.min(1.0).acos();
                let theta_r = cos_r.min(1.0).acos();
                let alpha = theta_i.max(theta_r);
                let beta = theta_i.min(theta_r);

                // Azimuth difference measured in the tangent plane
                let li = sub(l, scale(n, cos_i));
                let vr = sub(v, scale(n, cos_r));
                let (nl, nv) = (norm(li), norm(vr));
                let cos_phi = if nl > 1e-12 && nv > 1e-12 {
                    dot(li, vr) / (nl * nv)
                } else {
                    0.0
                };

                cos_i * (a + b * cos_phi.max(0.0) * alpha.sin() * beta.tan())
            }
        }
    }
}
