//! Spatial reference parsing and coordinate projection.
//!
//! Supports the handful of references a US census workflow touches:
//! geographic WGS 84 / NAD83, spherical Web Mercator, and CONUS Albers
//! Equal Area on the GRS80 ellipsoid. NAD83 is treated as coincident
//! with WGS 84 (the sub-metre datum shift is irrelevant at buffer scale).

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use geo::{Coord, MapCoords};
use thiserror::Error;

/// WGS 84 / Web Mercator sphere radius in metres.
const MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Latitude at which Web Mercator's square extent ends.
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// GRS80 semi-major axis.
const GRS80_A: f64 = 6_378_137.0;

/// GRS80 inverse flattening.
const GRS80_INV_F: f64 = 298.257_222_101;

/// EPSG:5070 parameters (NAD83 / Conus Albers).
static CONUS_ALBERS: LazyLock<AlbersEqualArea> =
    LazyLock::new(|| AlbersEqualArea::new(GRS80_A, GRS80_INV_F, 23.0, -96.0, 29.5, 45.5));

/// Errors raised while parsing a reference or projecting a coordinate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CrsError {
    /// The reference string is not in a recognized syntax.
    #[error("unparseable spatial reference '{0}'")]
    Unparseable(String),

    /// The reference parsed but is not one this crate can project.
    #[error("unsupported spatial reference EPSG:{0}")]
    Unsupported(u32),

    /// A coordinate falls outside the projection's domain.
    #[error("coordinate ({x}, {y}) cannot be represented in {crs}")]
    OutOfDomain {
        /// Reference being projected into or out of.
        crs: Crs,
        /// Offending x / longitude.
        x: f64,
        /// Offending y / latitude.
        y: f64,
    },
}

/// A supported coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crs {
    /// EPSG:4326, geographic longitude/latitude in degrees.
    Wgs84,
    /// EPSG:4269, geographic NAD83 (treated as WGS 84).
    Nad83,
    /// EPSG:3857, spherical Web Mercator in metres.
    WebMercator,
    /// EPSG:5070, NAD83 / Conus Albers Equal Area in metres.
    ConusAlbers,
}

impl Crs {
    /// EPSG code of this reference.
    #[must_use]
    pub const fn epsg(self) -> u32 {
        match self {
            Self::Wgs84 => 4326,
            Self::Nad83 => 4269,
            Self::WebMercator => 3857,
            Self::ConusAlbers => 5070,
        }
    }

    /// Returns `true` for references with linear (metre) units.
    #[must_use]
    pub const fn is_projected(self) -> bool {
        matches!(self, Self::WebMercator | Self::ConusAlbers)
    }

    /// Converts a coordinate in this reference to WGS 84 degrees.
    ///
    /// # Errors
    ///
    /// Returns [`CrsError::OutOfDomain`] for non-finite input or
    /// geographic coordinates beyond ±90° latitude.
    pub fn to_geographic(self, c: Coord<f64>) -> Result<Coord<f64>, CrsError> {
        let out_of_domain = || CrsError::OutOfDomain {
            crs: self,
            x: c.x,
            y: c.y,
        };
        if !(c.x.is_finite() && c.y.is_finite()) {
            return Err(out_of_domain());
        }
        match self {
            Self::Wgs84 | Self::Nad83 => {
                if c.y.abs() > 90.0 {
                    return Err(out_of_domain());
                }
                Ok(c)
            }
            Self::WebMercator => Ok(Coord {
                x: (c.x / MERCATOR_RADIUS).to_degrees(),
                y: 2.0f64
                    .mul_add((c.y / MERCATOR_RADIUS).exp().atan(), -FRAC_PI_2)
                    .to_degrees(),
            }),
            Self::ConusAlbers => CONUS_ALBERS.inverse(c).ok_or_else(out_of_domain),
        }
    }

    /// Converts a WGS 84 coordinate (degrees) into this reference.
    ///
    /// # Errors
    ///
    /// Returns [`CrsError::OutOfDomain`] for non-finite input or
    /// latitudes beyond ±90°.
    pub fn from_geographic(self, c: Coord<f64>) -> Result<Coord<f64>, CrsError> {
        if !(c.x.is_finite() && c.y.is_finite()) || c.y.abs() > 90.0 {
            return Err(CrsError::OutOfDomain {
                crs: self,
                x: c.x,
                y: c.y,
            });
        }
        match self {
            Self::Wgs84 | Self::Nad83 => Ok(c),
            Self::WebMercator => {
                let lat = c.y.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT).to_radians();
                Ok(Coord {
                    x: MERCATOR_RADIUS * c.x.to_radians(),
                    y: MERCATOR_RADIUS * (FRAC_PI_4 + lat / 2.0).tan().ln(),
                })
            }
            Self::ConusAlbers => Ok(CONUS_ALBERS.forward(c)),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for Crs {
    type Err = CrsError;

    /// Accepts `EPSG:<code>`, bare codes, OGC URNs, and the CRS84 aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();

        match upper.as_str() {
            "CRS84" | "OGC:CRS84" | "URN:OGC:DEF:CRS:OGC:1.3:CRS84" | "URN:OGC:DEF:CRS:OGC::CRS84"
            | "WGS84" | "WGS 84" => return Ok(Self::Wgs84),
            _ => {}
        }

        let code = if let Some(rest) = upper.strip_prefix("URN:OGC:DEF:CRS:EPSG:") {
            // urn:ogc:def:crs:EPSG:<version>:<code>, version often empty
            rest.rsplit(':').next().unwrap_or_default()
        } else if let Some(rest) = upper.strip_prefix("EPSG:") {
            rest.trim_start_matches(':')
        } else {
            upper.as_str()
        };

        let code: u32 = code
            .trim()
            .parse()
            .map_err(|_| CrsError::Unparseable(s.to_string()))?;

        match code {
            4326 => Ok(Self::Wgs84),
            4269 => Ok(Self::Nad83),
            3857 | 3785 | 900_913 | 102_100 => Ok(Self::WebMercator),
            5070 => Ok(Self::ConusAlbers),
            other => Err(CrsError::Unsupported(other)),
        }
    }
}

/// Converts a single coordinate between two references.
///
/// # Errors
///
/// Returns [`CrsError::OutOfDomain`] if either leg of the conversion
/// fails.
pub fn transform(from: Crs, to: Crs, c: Coord<f64>) -> Result<Coord<f64>, CrsError> {
    if from == to {
        return Ok(c);
    }
    to.from_geographic(from.to_geographic(c)?)
}

/// Reprojects every coordinate of `geometry` from `from` to `to`.
///
/// # Errors
///
/// Returns the first [`CrsError`] encountered.
pub fn reproject<G>(geometry: &G, from: Crs, to: Crs) -> Result<G::Output, CrsError>
where
    G: MapCoords<f64, f64>,
{
    geometry.try_map_coords(|c| transform(from, to, c))
}

/// Albers conic equal-area projection on an ellipsoid.
///
/// Formulas follow Snyder, *Map Projections: A Working Manual*, §14.
struct AlbersEqualArea {
    a: f64,
    e: f64,
    e2: f64,
    n: f64,
    c: f64,
    rho0: f64,
    lon0: f64,
}

impl AlbersEqualArea {
    fn new(a: f64, inv_f: f64, lat0: f64, lon0: f64, lat1: f64, lat2: f64) -> Self {
        let f = 1.0 / inv_f;
        let e2 = 2.0f64.mul_add(f, -(f * f));
        let e = e2.sqrt();

        let m = |phi: f64| phi.cos() / (1.0 - e2 * phi.sin().powi(2)).sqrt();
        let (m1, m2) = (m(lat1.to_radians()), m(lat2.to_radians()));
        let (q0, q1, q2) = (
            q(e, e2, lat0.to_radians()),
            q(e, e2, lat1.to_radians()),
            q(e, e2, lat2.to_radians()),
        );

        let n = (m1 * m1 - m2 * m2) / (q2 - q1);
        let c = n.mul_add(q1, m1 * m1);
        let rho0 = a * n.mul_add(-q0, c).sqrt() / n;

        Self {
            a,
            e,
            e2,
            n,
            c,
            rho0,
            lon0: lon0.to_radians(),
        }
    }

    fn forward(&self, c: Coord<f64>) -> Coord<f64> {
        let q = q(self.e, self.e2, c.y.to_radians());
        let rho = self.a * self.n.mul_add(-q, self.c).max(0.0).sqrt() / self.n;
        let theta = self.n * normalize_lon(c.x.to_radians() - self.lon0);
        Coord {
            x: rho * theta.sin(),
            y: rho.mul_add(-theta.cos(), self.rho0),
        }
    }

    fn inverse(&self, c: Coord<f64>) -> Option<Coord<f64>> {
        let dy = self.rho0 - c.y;
        let rho = c.x.hypot(dy);
        let theta = c.x.atan2(dy);
        let q = (self.c - (rho * self.n / self.a).powi(2)) / self.n;

        let lon = (self.lon0 + theta / self.n).to_degrees();
        let lat = self.latitude_from_q(q)?;
        Some(Coord {
            x: lon,
            y: lat.to_degrees(),
        })
    }

    /// Iteratively solves `q(phi) = q` (Snyder eq. 3-16).
    fn latitude_from_q(&self, q_target: f64) -> Option<f64> {
        let half = q_target / 2.0;
        if !half.is_finite() || half.abs() > 1.0 + 1e-9 {
            return None;
        }
        let mut phi = half.clamp(-1.0, 1.0).asin();

        for _ in 0..25 {
            let sin = phi.sin();
            let cos = phi.cos();
            if cos.abs() < 1e-12 {
                break;
            }
            let t = self.e2.mul_add(-(sin * sin), 1.0);
            let delta = t * t / (2.0 * cos)
                * (q_target / (1.0 - self.e2) - sin / t
                    + (1.0 / (2.0 * self.e)) * ((1.0 - self.e * sin) / (1.0 + self.e * sin)).ln());
            phi += delta;
            if delta.abs() < 1e-14 {
                break;
            }
        }

        phi.is_finite().then_some(phi)
    }
}

/// Snyder's authalic `q` function.
fn q(e: f64, e2: f64, phi: f64) -> f64 {
    let sin = phi.sin();
    (1.0 - e2)
        * (sin / e2.mul_add(-(sin * sin), 1.0)
            - (1.0 / (2.0 * e)) * ((1.0 - e * sin) / (1.0 + e * sin)).ln())
}

/// Wraps an angle in radians into `[-PI, PI]`.
fn normalize_lon(lambda: f64) -> f64 {
    let wrapped = (lambda + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped == -PI && lambda > 0.0 { PI } else { wrapped }
}
