//! Back-calculates illumination from synthetic calibration panels, corrects
//! a synthetic scene and compares against an empirical line calibration.
//!
//! Run with `RUST_LOG=info cargo run --example panel_calibration`.

use chrono::NaiveDateTime;

use hyfit::illumination::{
    Brdf, Elc, IlluModel, Panel, PathRadiance, SceneGeometry, Shift, SolarPosition,
    back_calculate,
};
use hyfit::stats::rms;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let time = NaiveDateTime::parse_from_str("2024-07-15 11:00:00", "%Y-%m-%d %H:%M:%S")?;
    let sun = SolarPosition::from_datetime(time, 50.9, 13.3);
    println!(
        "Sun: zenith {:.1} deg, azimuth {:.1} deg",
        sun.zenith_deg, sun.azimuth_deg
    );

    let sunlight = vec![520.0, 610.0, 480.0, 300.0];
    let skylight = vec![60.0, 45.0, 30.0, 15.0];
    let truth = IlluModel::new(
        sunlight,
        skylight,
        PathRadiance::PerMeter(vec![0.03, 0.02, 0.012, 0.006]),
        Brdf::Lambertian,
        sun.sun_vector(),
    )?;

    // Panels measured in the field: two lit at different brightness, one shaded
    let panel = |r: f64, skyview: f64, cos_i: f64, distance: f64| {
        let radiance = (0..4)
            .map(|b| {
                let illumination = truth.skylight()[b] * skyview + truth.sunlight()[b] * cos_i;
                r * illumination + truth.path().at(b, distance)
            })
            .collect();
        Panel::new(vec![r; 4], radiance, skyview, cos_i, distance)
    };
    let panels = vec![
        panel(0.95, 0.95, 0.85, 12.0)?,
        panel(0.25, 0.9, 0.8, 30.0)?,
        panel(0.95, 0.6, 0.0, 18.0)?,
    ];
    for p in &panels {
        println!("{}", p);
    }

    let solution = back_calculate(&panels)?;
    println!("Solved sunlight {:?}", solution.sunlight);
    let mut model = IlluModel::from_solution(&solution, Brdf::Lambertian, sun.sun_vector())?;
    println!("{}", model);

    // Rough hillside with facets in every direction
    let n = 200;
    let normals = (0..n)
        .map(|i| {
            let tilt = (10.0 + 0.2 * i as f64).to_radians();
            let az = (17.0 * i as f64).to_radians();
            [tilt.sin() * az.sin(), tilt.sin() * az.cos(), tilt.cos()]
        })
        .collect();
    let geometry = SceneGeometry::new(
        normals,
        vec![[0.0, -0.5, 0.866]; n],
        (0..n).map(|i| 40.0 + 0.5 * i as f64).collect(),
        (0..n).map(|i| 0.7 + 0.3 * ((i % 10) as f64 / 10.0)).collect(),
    )?;

    let reflectance: Vec<f64> = (0..n * 4).map(|i| 0.2 + 0.1 * ((i / 4) % 3) as f64).collect();
    // Unmodelled haze adds a constant offset to the measurement
    let measured: Vec<f64> = truth
        .get_radiance(&reflectance, &geometry)?
        .iter()
        .map(|l| l + 3.0)
        .collect();

    let uncorrected = model.get_reflectance(&measured, &geometry)?;
    let quality = model.fit(&measured, &geometry, Shift::Y)?;
    let corrected = model.get_reflectance(&measured, &geometry)?;

    let error = |estimate: &[f64]| {
        let diff: Vec<f64> = estimate.iter().zip(&reflectance).map(|(a, b)| a - b).collect();
        rms(&diff)
    };
    println!(
        "Reflectance RMS error: {:.4} before adjustment, {:.4} after (reliable: {})",
        error(&uncorrected),
        error(&corrected),
        quality.is_reliable()
    );

    // The empirical line assumes every target shares the panels' illumination
    let elc = Elc::fit(&panels[..2])?;
    println!("{}", elc);
    let elc_reflectance = elc.apply(&measured)?;
    println!(
        "Empirical line RMS error on the hillside: {:.4}",
        error(&elc_reflectance)
    );

    Ok(())
}
