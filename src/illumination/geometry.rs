use crate::illumination::error::IlluError;

/// Cartesian vector in a local east, north, up frame.
pub type Vec3 = [f64; 3];

pub fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub fn norm(a: Vec3) -> f64 {
    dot(a, a).sqrt()
}

pub fn scale(a: Vec3, k: f64) -> Vec3 {
    [a[0] * k, a[1] * k, a[2] * k]
}

pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Unit vector along `a`, or `None` for a zero or non-finite vector.
pub fn normalize(a: Vec3) -> Option<Vec3> {
    let n = norm(a);
    if n.is_finite() && n > 0.0 {
        Some(scale(a, 1.0 / n))
    } else {
        None
    }
}

/// Per-unit geometric layers of a scene.
///
/// `view` points from the surface towards the sensor, `distance` is the
/// optical path length to the sensor (metres) and `skyview` the visible sky
/// fraction in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct SceneGeometry {
    normals: Vec<Vec3>,
    view: Vec<Vec3>,
    distance: Vec<f64>,
    skyview: Vec<f64>,
    occluded: Option<Vec<bool>>,
}

impl SceneGeometry {
    pub fn new(
        normals: Vec<Vec3>,
        view: Vec<Vec3>,
        distance: Vec<f64>,
        skyview: Vec<f64>,
    ) -> Result<Self, IlluError> {
        let n = normals.len();
        for len in [view.len(), distance.len(), skyview.len()] {
            if len != n {
                return Err(IlluError::Shape {
                    expected: n,
                    found: len,
                });
            }
        }

        if let Some(d) = distance.iter().find(|d| !d.is_finite() || **d < 0.0) {
            return Err(IlluError::InvalidGeometry(format!(
                "distance must be finite and >= 0, got {}",
                d
            )));
        }
        if let Some(s) = skyview.iter().find(|s| !(0.0..=1.0).contains(*s)) {
            return Err(IlluError::InvalidGeometry(format!(
                "skyview factor must lie in [0, 1], got {}",
                s
            )));
        }

        Ok(SceneGeometry {
            normals,
            view,
            distance,
            skyview,
            occluded: None,
        })
    }

    /// Every unit shares the same normal, view vector, distance and skyview.
    pub fn uniform(
        n_units: usize,
        normal: Vec3,
        view: Vec3,
        distance: f64,
        skyview: f64,
    ) -> Result<Self, IlluError> {
        Self::new(
            vec![normal; n_units],
            vec![view; n_units],
            vec![distance; n_units],
            vec![skyview; n_units],
        )
    }

    /// Marks units that receive no direct sunlight (cast shadows).
    pub fn with_occlusion(mut self, occluded: Vec<bool>) -> Result<Self, IlluError> {
        if occluded.len() != self.n_units() {
            return Err(IlluError::Shape {
                expected: self.n_units(),
                found: occluded.len(),
            });
        }
        self.occluded = Some(occluded);
        Ok(self)
    }

    pub fn n_units(&self) -> usize {
        self.normals.len()
    }

    pub fn normal(&self, unit: usize) -> Vec3 {
        self.normals[unit]
    }

    pub fn view(&self, unit: usize) -> Vec3 {
        self.view[unit]
    }

    pub fn distance(&self, unit: usize) -> f64 {
        self.distance[unit]
    }

    pub fn skyview(&self, unit: usize) -> f64 {
        self.skyview[unit]
    }

    pub fn is_occluded(&self, unit: usize) -> bool {
        self.occluded.as_ref().is_some_and(|mask| mask[unit])
    }
}
