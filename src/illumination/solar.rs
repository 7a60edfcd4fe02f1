//! Solar position and the illumination direction derived from it.
//!
//! Angles follow the usual surveying convention: azimuth is measured
//! clockwise from north, zenith from the local vertical.

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::illumination::geometry::Vec3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarPosition {
    pub zenith_deg: f64,
    pub azimuth_deg: f64,
    pub altitude_deg: f64,
    pub declination_deg: f64,
    pub hour_angle_deg: f64,
}

impl SolarPosition {
    /// Solar position for a day of year and UTC time at a location.
    ///
    /// # Arguments
    /// * `day_of_year` - Day of the year (1-366)
    /// * `hour_utc` - Decimal hour, UTC (0.0-24.0)
    /// * `latitude` - Decimal degrees (-90 to +90)
    /// * `longitude` - Decimal degrees, east positive (-180 to +180)
    pub fn calculate(day_of_year: u32, hour_utc: f64, latitude: f64, longitude: f64) -> Self {
        let declination =
            23.45 * (360.0 * (284.0 + day_of_year as f64) / 365.0).to_radians().sin();

        // Mean solar time; the hour angle is positive in the afternoon
        let solar_time = hour_utc + longitude / 15.0;
        let hour_angle = 15.0 * (solar_time - 12.0);

        let lat = latitude.to_radians();
        let dec = declination.to_radians();
        let ha = hour_angle.to_radians();

        let sin_alt = (lat.sin() * dec.sin() + lat.cos() * dec.cos() * ha.cos()).clamp(-1.0, 1.0);
        let altitude = sin_alt.asin().to_degrees();

        let azimuth = (-dec.cos() * ha.sin())
            .atan2(dec.sin() * lat.cos() - dec.cos() * lat.sin() * ha.cos())
            .to_degrees()
            .rem_euclid(360.0);

        SolarPosition {
            zenith_deg: 90.0 - altitude,
            azimuth_deg: azimuth,
            altitude_deg: altitude,
            declination_deg: declination,
            hour_angle_deg: hour_angle,
        }
    }

    /// Solar position at the UTC timestamp `time`.
    pub fn from_datetime(time: NaiveDateTime, latitude: f64, longitude: f64) -> Self {
        let hour = time.num_seconds_from_midnight() as f64 / 3600.0;
        Self::calculate(time.ordinal(), hour, latitude, longitude)
    }

    pub fn is_above_horizon(&self) -> bool {
        self.altitude_deg > 0.0
    }

    /// Unit vector pointing from the scene towards the sun.
    pub fn sun_vector(&self) -> Vec3 {
        sun_vector(self.zenith_deg, self.azimuth_deg)
    }
}

/// Unit vector (east, north, up) towards a light source at the given
/// zenith and azimuth angles, in degrees.
pub fn sun_vector(zenith_deg: f64, azimuth_deg: f64) -> Vec3 {
    let zen = zenith_deg.to_radians();
    let az = azimuth_deg.to_radians();
    [zen.sin() * az.sin(), zen.sin() * az.cos(), zen.cos()]
}
