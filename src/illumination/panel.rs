use std::fmt;

use log::{debug, warn};

use crate::illumination::error::IlluError;
use crate::linalg::solve_system;

/// Cosine of incidence at or below which a panel counts as shaded.
pub const SHADED_COS_INCIDENCE: f64 = 0.01;

/// Calibration target with known reflectance and measured radiance.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    reflectance: Vec<f64>,
    radiance: Vec<f64>,
    skyview: f64,
    cos_incidence: f64,
    distance: f64,
}

impl Panel {
    pub fn new(
        reflectance: Vec<f64>,
        radiance: Vec<f64>,
        skyview: f64,
        cos_incidence: f64,
        distance: f64,
    ) -> Result<Self, IlluError> {
        if reflectance.is_empty() {
            return Err(IlluError::InvalidPanel("reflectance is empty".into()));
        }
        if radiance.len() != reflectance.len() {
            return Err(IlluError::Shape {
                expected: reflectance.len(),
                found: radiance.len(),
            });
        }
        if !(0.0..=1.0).contains(&skyview) {
            return Err(IlluError::InvalidPanel(format!(
                "skyview factor must lie in [0, 1], got {}",
                skyview
            )));
        }
        if !(0.0..=1.0).contains(&cos_incidence) {
            return Err(IlluError::InvalidPanel(format!(
                "cosine of incidence must lie in [0, 1], got {}",
                cos_incidence
            )));
        }
        if !distance.is_finite() || distance <= 0.0 {
            return Err(IlluError::InvalidPanel(format!(
                "distance must be positive, got {}",
                distance
            )));
        }

        Ok(Panel {
            reflectance,
            radiance,
            skyview,
            cos_incidence,
            distance,
        })
    }

    /// Builds a panel from several radiance measurements of the same target,
    /// averaging the finite samples of each band.
    pub fn from_samples(
        reflectance: Vec<f64>,
        samples: &[Vec<f64>],
        skyview: f64,
        cos_incidence: f64,
        distance: f64,
    ) -> Result<Self, IlluError> {
        if samples.is_empty() {
            return Err(IlluError::InvalidPanel("no radiance samples".into()));
        }

        let n_bands = reflectance.len();
        let mut radiance = Vec::with_capacity(n_bands);
        for band in 0..n_bands {
            let mut sum = 0.0;
            let mut count = 0usize;
            for sample in samples {
                if sample.len() != n_bands {
                    return Err(IlluError::Shape {
                        expected: n_bands,
                        found: sample.len(),
                    });
                }
                if sample[band].is_finite() {
                    sum += sample[band];
                    count += 1;
                }
            }
            radiance.push(if count > 0 {
                sum / count as f64
            } else {
                f64::NAN
            });
        }

        Self::new(reflectance, radiance, skyview, cos_incidence, distance)
    }

    pub fn n_bands(&self) -> usize {
        self.reflectance.len()
    }

    pub fn reflectance(&self) -> &[f64] {
        &self.reflectance
    }

    pub fn radiance(&self) -> &[f64] {
        &self.radiance
    }

    pub fn skyview(&self) -> f64 {
        self.skyview
    }

    pub fn cos_incidence(&self) -> f64 {
        self.cos_incidence
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn is_shaded(&self) -> bool {
        self.cos_incidence <= SHADED_COS_INCIDENCE
    }
}

impl fmt::Display for Panel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Panel: {} bands, skyview {:.2}, cos(i) {:.2}, distance {:.1} m{}",
            self.n_bands(),
            self.skyview,
            self.cos_incidence,
            self.distance,
            if self.is_shaded() { " (shaded)" } else { "" }
        )
    }
}

/// Per-band illumination recovered from calibration panels.
#[derive(Debug, Clone)]
pub struct PanelSolution {
    pub skylight: Vec<f64>,
    pub sunlight: Vec<f64>,
    pub path_per_meter: Vec<f64>,
    /// Bands whose panel system could not be solved; they hold NaN.
    pub singular_bands: Vec<usize>,
}

/// Checks panel count and band agreement, returning the shared band count.
pub(crate) fn check_panels(panels: &[Panel], required: usize) -> Result<usize, IlluError> {
    if panels.len() < required {
        return Err(IlluError::TooFewPanels {
            required,
            found: panels.len(),
        });
    }

    let n_bands = panels[0].n_bands();
    if let Some(p) = panels.iter().find(|p| p.n_bands() != n_bands) {
        return Err(IlluError::Shape {
            expected: n_bands,
            found: p.n_bands(),
        });
    }

    Ok(n_bands)
}

/// Solves skylight, sunlight and path radiance per metre at every band from
/// at least three panels, one of them shaded.
///
/// Each panel contributes
/// `radiance = r * skyview * skylight + r * cos_i * sunlight + distance * path`.
/// Exactly three panels give a square system; more are combined through the
/// normal equations.
pub fn back_calculate(panels: &[Panel]) -> Result<PanelSolution, IlluError> {
    let n_bands = check_panels(panels, 3)?;
    if !panels.iter().any(Panel::is_shaded) {
        return Err(IlluError::NoShadedPanel);
    }

    let mut solution = PanelSolution {
        skylight: vec![f64::NAN; n_bands],
        sunlight: vec![f64::NAN; n_bands],
        path_per_meter: vec![f64::NAN; n_bands],
        singular_bands: Vec::new(),
    };

    for band in 0..n_bands {
        let rows: Vec<([f64; 3], f64)> = panels
            .iter()
            .map(|p| {
                let r = p.reflectance[band];
                ([r * p.skyview, r * p.cos_incidence, p.distance], p.radiance[band])
            })
            .collect();

        let (a, b) = if rows.len() == 3 {
            ([rows[0].0, rows[1].0, rows[2].0], [rows[0].1, rows[1].1, rows[2].1])
        } else {
            normal_equations(&rows)
        };

        match solve_system(&a, &b) {
            Ok(x) => {
                solution.skylight[band] = x[0];
                solution.sunlight[band] = x[1];
                solution.path_per_meter[band] = x[2];
            }
            Err(e) => {
                debug!("Band {}: {}", band, e);
                solution.singular_bands.push(band);
            }
        }
    }

    if solution.singular_bands.len() == n_bands {
        return Err(IlluError::AllBandsSingular);
    }
    if !solution.singular_bands.is_empty() {
        warn!(
            "Panel system singular at {} of {} bands, those bands are left as NaN",
            solution.singular_bands.len(),
            n_bands
        );
    }

    Ok(solution)
}

#[allow(clippy::needless_range_loop)]
fn normal_equations(rows: &[([f64; 3], f64)]) -> ([[f64; 3]; 3], [f64; 3]) {
    let mut ata = [[0.0; 3]; 3];
    let mut atb = [0.0; 3];
    for (row, y) in rows {
        for i in 0..3 {
            atb[i] += row[i] * y;
            for j in 0..3 {
                ata[i][j] += row[i] * row[j];
            }
        }
    }
    (ata, atb)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SKY: [f64; 2] = [30.0, 40.0];
    const SUN: [f64; 2] = [500.0, 600.0];
    const PATH: [f64; 2] = [0.01, 0.02];

    fn synthetic(reflectance: [f64; 2], skyview: f64, cos_i: f64, distance: f64) -> Panel {
        let radiance = (0..2)
            .map(|b| {
                reflectance[b] * (skyview * SKY[b] + cos_i * SUN[b]) + distance * PATH[b]
            })
            .collect();
        Panel::new(reflectance.to_vec(), radiance, skyview, cos_i, distance).unwrap()
    }

    #[test]
    fn test_back_calculation_recovers_constants() {
        let panels = vec![
            synthetic([0.5, 0.5], 0.9, 0.8, 10.0),
            synthetic([0.2, 0.2], 0.7, 0.6, 25.0),
            synthetic([0.5, 0.5], 0.5, 0.0, 15.0),
        ];

        let solution = back_calculate(&panels).unwrap();

        for b in 0..2 {
            assert!((solution.skylight[b] - SKY[b]).abs() < 1e-8);
            assert!((solution.sunlight[b] - SUN[b]).abs() < 1e-8);
            assert!((solution.path_per_meter[b] - PATH[b]).abs() < 1e-10);
        }
        assert!(solution.singular_bands.is_empty());
    }

    #[test]
    fn test_back_calculation_least_squares() {
        let panels = vec![
            synthetic([0.5, 0.5], 0.9, 0.8, 10.0),
            synthetic([0.2, 0.2], 0.7, 0.6, 25.0),
            synthetic([0.5, 0.5], 0.5, 0.0, 15.0),
            synthetic([0.8, 0.7], 1.0, 0.9, 5.0),
        ];

        let solution = back_calculate(&panels).unwrap();

        for b in 0..2 {
            assert!((solution.skylight[b] - SKY[b]).abs() < 1e-6);
            assert!((solution.sunlight[b] - SUN[b]).abs() < 1e-6);
            assert!((solution.path_per_meter[b] - PATH[b]).abs() < 1e-8);
        }
    }

    #[test]
    fn test_singular_band_is_nan() {
        // Black panels at band 1 leave no information on sky and sun light
        let panels = vec![
            synthetic([0.5, 0.0], 0.9, 0.8, 10.0),
            synthetic([0.2, 0.0], 0.7, 0.6, 25.0),
            synthetic([0.5, 0.0], 0.5, 0.0, 15.0),
        ];

        let solution = back_calculate(&panels).unwrap();

        assert_eq!(solution.singular_bands, vec![1]);
        assert!(solution.sunlight[1].is_nan());
        assert!((solution.sunlight[0] - SUN[0]).abs() < 1e-8);
    }

    #[test]
    fn test_all_bands_singular() {
        let panels = vec![
            synthetic([0.0, 0.0], 0.9, 0.8, 10.0),
            synthetic([0.0, 0.0], 0.7, 0.6, 25.0),
            synthetic([0.0, 0.0], 0.5, 0.0, 15.0),
        ];
        assert_eq!(back_calculate(&panels).unwrap_err(), IlluError::AllBandsSingular);
    }

    #[test]
    fn test_requires_three_panels_and_shade() {
        let lit = vec![
            synthetic([0.5, 0.5], 0.9, 0.8, 10.0),
            synthetic([0.2, 0.2], 0.7, 0.6, 25.0),
        ];
        assert_eq!(
            back_calculate(&lit).unwrap_err(),
            IlluError::TooFewPanels {
                required: 3,
                found: 2
            }
        );

        let mut all_lit = lit.clone();
        all_lit.push(synthetic([0.8, 0.8], 1.0, 0.9, 5.0));
        assert_eq!(back_calculate(&all_lit).unwrap_err(), IlluError::NoShadedPanel);
    }

    #[test]
    fn test_from_samples_averages() {
        let panel = Panel::from_samples(
            vec![0.5, 0.5],
            &[vec![10.0, 20.0], vec![12.0, f64::NAN], vec![14.0, 22.0]],
            1.0,
            0.7,
            8.0,
        )
        .unwrap();

        assert!((panel.radiance()[0] - 12.0).abs() < 1e-12);
        assert!((panel.radiance()[1] - 21.0).abs() < 1e-12);
    }

    #[test]
    fn test_panel_validation() {
        assert!(Panel::new(vec![0.5], vec![1.0, 2.0], 1.0, 0.5, 1.0).is_err());
        assert!(Panel::new(vec![0.5], vec![1.0], 1.2, 0.5, 1.0).is_err());
        assert!(Panel::new(vec![0.5], vec![1.0], 1.0, 0.5, 0.0).is_err());
        assert!(Panel::new(vec![], vec![], 1.0, 0.5, 1.0).is_err());
    }
}
