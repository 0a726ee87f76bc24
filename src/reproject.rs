//! Point reprojection between coordinate reference systems.
use std::{fmt, str::FromStr};

use map_3d::{Ellipsoid, ecef2geodetic, geodetic2ecef};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Supported coordinate reference systems
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Crs {
    /// Geographic WGS84: longitude, latitude (ddeg), ellipsoidal height (m)
    #[default]
    Wgs84,
    /// Geocentric WGS84 (m)
    Ecef,
}

impl Crs {
    /// Authority code, as exported in reference files
    pub fn code(&self) -> &'static str {
        match self {
            Self::Wgs84 => "EPSG::4326",
            Self::Ecef => "EPSG::4978",
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Crs {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let code = s
            .trim()
            .to_uppercase()
            .replace("EPSG::", "")
            .replace("EPSG:", "");

        match code.as_str() {
            "4326" | "WGS84" => Ok(Self::Wgs84),
            "4978" | "ECEF" => Ok(Self::Ecef),
            _ => Err(Error::Reprojection(format!("unsupported crs \"{}\"", s))),
        }
    }
}

/// 3D point. For geographic systems, `x` is the longitude
/// and `y` the latitude (easting, northing order).
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Builds a geographic [Point] from latitude, longitude (ddeg) and height (m)
    pub fn geographic(lat: f64, lon: f64, height: f64) -> Self {
        Self {
            x: lon,
            y: lat,
            z: height,
        }
    }
}

/// Single point reprojection primitive
pub trait Reproject {
    fn reproject(&self, point: Point, source: Crs, target: Crs) -> Result<Point>;
}

/// Ellipsoidal WGS84 conversions
#[derive(Debug, Copy, Clone, Default)]
pub struct Geodetic;

impl Reproject for Geodetic {
    fn reproject(&self, point: Point, source: Crs, target: Crs) -> Result<Point> {
        if !point.x.is_finite() || !point.y.is_finite() || !point.z.is_finite() {
            return Err(Error::Reprojection(format!(
                "invalid coordinates {:?}",
                point
            )));
        }

        match (source, target) {
            (Crs::Wgs84, Crs::Wgs84) | (Crs::Ecef, Crs::Ecef) => Ok(point),
            (Crs::Wgs84, Crs::Ecef) => {
                let (x, y, z) = geodetic2ecef(
                    point.y.to_radians(),
                    point.x.to_radians(),
                    point.z,
                    Ellipsoid::WGS84,
                );
                Ok(Point::new(x, y, z))
            },
            (Crs::Ecef, Crs::Wgs84) => {
                let (lat, lon, height) = ecef2geodetic(point.x, point.y, point.z, Ellipsoid::WGS84);
                Ok(Point::geographic(lat.to_degrees(), lon.to_degrees(), height))
            },
        }
    }
}
