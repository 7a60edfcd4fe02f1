/// Removes a continuum from a spectrum segment.
pub trait Detrend: Sync {
    fn detrend(&self, wavelengths: &[f64], values: &[f64]) -> Vec<f64>;
}

/// Divides by the upper convex hull, leaving absorption features as dips
/// below 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct HullCorrection;

/// Divides by the lower convex hull, leaving emission features as peaks
/// above 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowerHullCorrection;

impl Detrend for HullCorrection {
    fn detrend(&self, wavelengths: &[f64], values: &[f64]) -> Vec<f64> {
        divide_by_hull(wavelengths, values, true)
    }
}

impl Detrend for LowerHullCorrection {
    fn detrend(&self, wavelengths: &[f64], values: &[f64]) -> Vec<f64> {
        divide_by_hull(wavelengths, values, false)
    }
}

fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

// Monotone chain over points already sorted by wavelength.
fn hull_vertices(wavelengths: &[f64], values: &[f64], upper: bool) -> Vec<usize> {
    let mut hull: Vec<usize> = Vec::with_capacity(wavelengths.len());

    for i in 0..wavelengths.len() {
        let p = (wavelengths[i], values[i]);
        while hull.len() >= 2 {
            let a = hull[hull.len() - 2];
            let b = hull[hull.len() - 1];
            let c = cross((wavelengths[a], values[a]), (wavelengths[b], values[b]), p);
            let concave = if upper { c >= 0.0 } else { c <= 0.0 };
            if concave {
                hull.pop();
            } else {
                break;
            }
        }
        hull.push(i);
    }

    hull
}

fn divide_by_hull(wavelengths: &[f64], values: &[f64], upper: bool) -> Vec<f64> {
    if values.iter().any(|v| !v.is_finite()) {
        return vec![f64::NAN; values.len()];
    }
    if values.len() < 2 {
        return values.iter().map(|_| 1.0).collect();
    }

    let vertices = hull_vertices(wavelengths, values, upper);
    let mut out = Vec::with_capacity(values.len());

    for segment in vertices.windows(2) {
        let (a, b) = (segment[0], segment[1]);
        let slope = (values[b] - values[a]) / (wavelengths[b] - wavelengths[a]);
        for i in a..b {
            let hull = values[a] + slope * (wavelengths[i] - wavelengths[a]);
            out.push(ratio(values[i], hull));
        }
    }
    let last = values.len() - 1;
    out.push(ratio(values[last], values[last]));

    out
}

fn ratio(value: f64, hull: f64) -> f64 {
    if hull.abs() < f64::EPSILON {
        f64::NAN
    } else {
        value / hull
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upper_hull_flattens_continuum() {
        let wl: Vec<f64> = (0..5).map(|i| i as f64).collect();
        // Linear continuum 1 + 0.1x with a dip at x = 2
        let values = [1.0, 1.1, 0.6, 1.3, 1.4];

        let corrected = HullCorrection.detrend(&wl, &values);

        assert!((corrected[0] - 1.0).abs() < 1e-12);
        assert!((corrected[1] - 1.0).abs() < 1e-12);
        assert!((corrected[2] - 0.5).abs() < 1e-12);
        assert!((corrected[4] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_lower_hull_keeps_peaks_above_one() {
        let wl: Vec<f64> = (0..5).map(|i| i as f64).collect();
        let values = [1.0, 1.0, 2.0, 1.0, 1.0];

        let corrected = LowerHullCorrection.detrend(&wl, &values);

        assert!((corrected[2] - 2.0).abs() < 1e-12);
        assert!(corrected.iter().all(|v| *v >= 1.0 - 1e-12));
    }

    #[test]
    fn test_nan_input_gives_nan_output() {
        let corrected = HullCorrection.detrend(&[0.0, 1.0, 2.0], &[1.0, f64::NAN, 1.0]);
        assert!(corrected.iter().all(|v| v.is_nan()));
    }
}
