use crate::vars::EARTH_RADIUS;
use geo::{Coordinate, LineString, Point, Polygon, Rect};
use std::ops::{Add, Div, Mul, Neg, Sub};

macro_rules! impl_ops_internal {
    ($dat:ty, $trait: ident, $op: tt, $method: ident) => {
        impl $trait for $dat {
            type Output = Self;

            fn $method(self, other: Self) -> Self::Output {
               Self {lon: self.lon $op other.lon, lat: self.lat $op other.lat}
            }
        }
    };
}

macro_rules! impl_ops_external {
    ($dat:ty, $num:ty, $trait: ident, $op: tt, $method: ident) => {
        impl $trait<$num> for $dat {
            type Output = Self;

            fn $method(self, other: $num) -> Self::Output {
               Self {lon: self.lon $op other, lat: self.lat $op other}
            }
        }
    };
}

/// geographic coordinate in decimal degrees
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// great circle distance in kilometers
    pub fn haversine(&self, other: &Self) -> f64 {
        let (phi1, phi2) = (self.lat.to_radians(), other.lat.to_radians());
        let dphi = phi2 - phi1;
        let dlambda = (other.lon - self.lon).to_radians();
        let a = (dphi / 2.).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.).sin().powi(2);
        2. * EARTH_RADIUS * a.sqrt().asin()
    }
}

impl From<LonLat> for Coordinate<f64> {
    fn from(dat: LonLat) -> Self {
        Self {
            x: dat.lon,
            y: dat.lat,
        }
    }
}

impl From<LonLat> for Point<f64> {
    fn from(dat: LonLat) -> Self {
        Point::new(dat.lon, dat.lat)
    }
}

impl From<Coordinate<f64>> for LonLat {
    fn from(coord: Coordinate<f64>) -> Self {
        Self {
            lon: coord.x,
            lat: coord.y,
        }
    }
}

impl Neg for LonLat {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self {
            lon: -self.lon,
            lat: -self.lat,
        }
    }
}

impl_ops_internal!(LonLat, Add, +, add);
impl_ops_internal!(LonLat, Sub, -, sub);
impl_ops_external!(LonLat, f64, Mul, *, mul);
impl_ops_external!(LonLat, f64, Div, /, div);

/// bounding box as (lon0, lat0, lon1, lat1)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: LonLat,
    pub max: LonLat,
}

impl Bounds {
    pub fn new(lon0: f64, lat0: f64, lon1: f64, lat1: f64) -> Self {
        Self {
            min: LonLat::new(lon0.min(lon1), lat0.min(lat1)),
            max: LonLat::new(lon0.max(lon1), lat0.max(lat1)),
        }
    }

    pub fn tuple(&self) -> (f64, f64, f64, f64) {
        (self.min.lon, self.min.lat, self.max.lon, self.max.lat)
    }

    pub fn centre(&self) -> LonLat {
        (self.min + self.max) / 2.
    }

    pub fn contains_point(&self, point: &LonLat) -> bool {
        self.min.lon <= point.lon
            && point.lon <= self.max.lon
            && self.min.lat <= point.lat
            && point.lat <= self.max.lat
    }

    pub fn contains(&self, other: &Bounds) -> bool {
        self.contains_point(&other.min) && self.contains_point(&other.max)
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min.lon < other.max.lon
            && other.min.lon < self.max.lon
            && self.min.lat < other.max.lat
            && other.min.lat < self.max.lat
    }

    /// smallest box covering both
    pub fn merge(&self, other: &Bounds) -> Bounds {
        Bounds {
            min: LonLat::new(self.min.lon.min(other.min.lon), self.min.lat.min(other.min.lat)),
            max: LonLat::new(self.max.lon.max(other.max.lon), self.max.lat.max(other.max.lat)),
        }
    }

    pub fn polygon(&self) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (self.min.lon, self.min.lat),
                (self.max.lon, self.min.lat),
                (self.max.lon, self.max.lat),
                (self.min.lon, self.max.lat),
                (self.min.lon, self.min.lat),
            ]),
            vec![],
        )
    }
}

impl From<Rect<f64>> for Bounds {
    fn from(rect: Rect<f64>) -> Self {
        Self {
            min: rect.min().into(),
            max: rect.max().into(),
        }
    }
}
