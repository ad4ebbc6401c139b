//! Albers equal-area conic projection on an ellipsoid.
//!
//! Follows Snyder, *Map Projections: A Working Manual* (USGS PP 1395),
//! equations 14-1 to 14-21. The campaign data is in EPSG:3338
//! (NAD83 / Alaska Albers), available through [`AlbersEqualArea::alaska`].

use thiserror::Error;

use crate::config::ProjectionConfig;

/// Errors from projection setup or inversion.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("degenerate projection parameters: {0}")]
    Degenerate(String),

    #[error("inverse projection did not converge for x={x}, y={y}")]
    NoConvergence { x: f64, y: f64 },
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

const MAX_ITERATIONS: usize = 25;
const TOLERANCE: f64 = 1e-12;

/// Precomputed Albers projection constants.
#[derive(Debug, Clone, PartialEq)]
pub struct AlbersEqualArea {
    a: f64,
    e: f64,
    e2: f64,
    lon0: f64,
    n: f64,
    c: f64,
    rho0: f64,
    false_easting: f64,
    false_northing: f64,
}

impl AlbersEqualArea {
    /// Build a projection from configuration values (angles in degrees).
    pub fn new(config: &ProjectionConfig) -> Result<Self> {
        let a = config.semi_major_axis;
        if a <= 0.0 || config.inverse_flattening <= 1.0 {
            return Err(ProjectionError::Degenerate(format!(
                "invalid ellipsoid a={} 1/f={}",
                a, config.inverse_flattening
            )));
        }
        let f = 1.0 / config.inverse_flattening;
        let e2 = f * (2.0 - f);
        let e = e2.sqrt();

        let phi0 = config.lat_origin.to_radians();
        let phi1 = config.standard_parallel_1.to_radians();
        let phi2 = config.standard_parallel_2.to_radians();

        let m1 = m(phi1, e2);
        let m2 = m(phi2, e2);
        let q0 = q(phi0, e, e2);
        let q1 = q(phi1, e, e2);
        let q2 = q(phi2, e, e2);

        let n = if (phi1 - phi2).abs() < 1e-10 {
            phi1.sin()
        } else {
            (m1 * m1 - m2 * m2) / (q2 - q1)
        };
        if n.abs() < 1e-10 {
            return Err(ProjectionError::Degenerate(format!(
                "standard parallels {} and {} give a zero cone constant",
                config.standard_parallel_1, config.standard_parallel_2
            )));
        }

        let c = m1 * m1 + n * q1;
        let rho0 = a * (c - n * q0).max(0.0).sqrt() / n;

        Ok(Self {
            a,
            e,
            e2,
            lon0: config.lon_origin.to_radians(),
            n,
            c,
            rho0,
            false_easting: config.false_easting,
            false_northing: config.false_northing,
        })
    }

    /// EPSG:3338, NAD83 / Alaska Albers.
    pub fn alaska() -> Result<Self> {
        Self::new(&ProjectionConfig::default())
    }

    /// Project geographic degrees to map meters.
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let phi = lat.to_radians();
        let lambda = lon.to_radians();

        let rho = self.a * (self.c - self.n * q(phi, self.e, self.e2)).max(0.0).sqrt() / self.n;
        let theta = self.n * normalize_lon(lambda - self.lon0);

        let x = self.false_easting + rho * theta.sin();
        let y = self.false_northing + self.rho0 - rho * theta.cos();
        (x, y)
    }

    /// Map meters back to geographic degrees `(lon, lat)`.
    pub fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let dx = x - self.false_easting;
        let dy = self.rho0 - (y - self.false_northing);

        let (rho, theta) = if self.n >= 0.0 {
            ((dx * dx + dy * dy).sqrt(), dx.atan2(dy))
        } else {
            (-(dx * dx + dy * dy).sqrt(), (-dx).atan2(-dy))
        };

        let q_val = (self.c - (rho * rho * self.n * self.n) / (self.a * self.a)) / self.n;
        let phi = self.latitude_from_q(q_val).ok_or(ProjectionError::NoConvergence { x, y })?;
        let lambda = self.lon0 + theta / self.n;

        Ok((normalize_lon(lambda).to_degrees(), phi.to_degrees()))
    }

    /// Snyder eq. 3-16, iterated.
    fn latitude_from_q(&self, q_val: f64) -> Option<f64> {
        let (e, e2) = (self.e, self.e2);

        // q at the poles; beyond it the point is off the ellipsoid.
        let q_pole = 1.0 - (1.0 - e2) / (2.0 * e) * ((1.0 - e) / (1.0 + e)).ln();
        if (q_val.abs() - q_pole).abs() < 1e-12 {
            return Some(std::f64::consts::FRAC_PI_2.copysign(q_val));
        }

        let mut phi = (q_val / 2.0).clamp(-1.0, 1.0).asin();
        for _ in 0..MAX_ITERATIONS {
            let sin_phi = phi.sin();
            let cos_phi = phi.cos();
            let es = e * sin_phi;
            let one_minus = 1.0 - es * es;

            let delta = one_minus * one_minus / (2.0 * cos_phi)
                * (q_val / (1.0 - e2) - sin_phi / one_minus
                    + 1.0 / (2.0 * e) * ((1.0 - es) / (1.0 + es)).ln());
            phi += delta;
            if delta.abs() < TOLERANCE {
                return Some(phi);
            }
        }
        None
    }
}

/// Snyder eq. 14-15.
fn m(phi: f64, e2: f64) -> f64 {
    let s = phi.sin();
    phi.cos() / (1.0 - e2 * s * s).sqrt()
}

/// Snyder eq. 3-12.
fn q(phi: f64, e: f64, e2: f64) -> f64 {
    let s = phi.sin();
    let es = e * s;
    (1.0 - e2) * (s / (1.0 - es * es) - 1.0 / (2.0 * e) * ((1.0 - es) / (1.0 + es)).ln())
}

/// Wrap a longitude difference into [-pi, pi].
fn normalize_lon(lambda: f64) -> f64 {
    let two_pi = 2.0 * std::f64::consts::PI;
    let mut l = lambda % two_pi;
    if l > std::f64::consts::PI {
        l -= two_pi;
    } else if l < -std::f64::consts::PI {
        l += two_pi;
    }
    l
}
