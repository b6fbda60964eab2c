use crate::core::constants::MAX_LATITUDE;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mean equatorial radius used for ground-resolution figures
const EARTH_RADIUS: f64 = 6378137.0;

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Creates a coordinate that is guaranteed to be projectable:
    /// latitude clamped, longitude wrapped, NaN replaced by zero.
    pub fn sanitized(lat: f64, lng: f64) -> Self {
        Self::new(Self::clamp_lat(lat), Self::wrap_lng(lng))
    }

    /// Wraps longitude to the (-180, 180] range
    pub fn wrap_lng(lng: f64) -> f64 {
        if !lng.is_finite() {
            return 0.0;
        }
        if lng > -180.0 && lng <= 180.0 {
            return lng;
        }
        let wrapped = (lng + 180.0).rem_euclid(360.0) - 180.0;
        if wrapped <= -180.0 {
            180.0
        } else {
            wrapped
        }
    }

    /// Clamps latitude to the projectable range
    pub fn clamp_lat(lat: f64) -> f64 {
        if lat.is_nan() {
            return 0.0;
        }
        lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
    }

    /// Calculates the distance to another LatLng using the Haversine formula
    pub fn distance_to(&self, other: &LatLng) -> f64 {
        let lat1_rad = self.lat.to_radians();
        let lat2_rad = other.lat.to_radians();
        let delta_lat = (other.lat - self.lat).to_radians();
        let delta_lng = (other.lng - self.lng).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS * c
    }

    /// Ground resolution in meters per pixel at this latitude
    pub fn meters_per_pixel(&self, zoom: f64, tile_size: f64) -> f64 {
        let circumference = 2.0 * std::f64::consts::PI * EARTH_RADIUS * self.lat.to_radians().cos();
        circumference / (tile_size * 2_f64.powf(zoom))
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a point in screen or projected coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn subtract(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn multiply(&self, scalar: f64) -> Point {
        Point::new(self.x * scalar, self.y * scalar)
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    /// Angle of the vector from `self` to `other`, in degrees.
    pub fn angle_to(&self, other: &Point) -> f64 {
        (other.y - self.y).atan2(other.x - self.x).to_degrees()
    }

    /// Rotates the point about the origin. Screen y points down, so a
    /// positive angle turns clockwise on screen.
    pub fn rotate(&self, degrees: f64) -> Point {
        if degrees == 0.0 {
            return *self;
        }
        let (sin, cos) = degrees.to_radians().sin_cos();
        Point::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a tile coordinate in the slippy map tile system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Number of tiles along one axis at this zoom
    pub fn tiles_per_axis(z: u8) -> u32 {
        1u32 << z.min(31)
    }

    /// Gets the parent tile at a lower zoom level
    pub fn parent(&self) -> Option<TileCoord> {
        if self.z == 0 {
            None
        } else {
            Some(TileCoord::new(self.x / 2, self.y / 2, self.z - 1))
        }
    }

    /// Gets the ancestor `levels` zoom levels up
    pub fn ancestor(&self, levels: u8) -> Option<TileCoord> {
        if levels > self.z {
            return None;
        }
        Some(TileCoord::new(
            self.x >> levels,
            self.y >> levels,
            self.z - levels,
        ))
    }

    /// Gets the four child tiles at the next zoom level, in
    /// top-left, top-right, bottom-left, bottom-right order
    pub fn children(&self) -> [TileCoord; 4] {
        let z = self.z + 1;
        [
            TileCoord::new(self.x * 2, self.y * 2, z),
            TileCoord::new(self.x * 2 + 1, self.y * 2, z),
            TileCoord::new(self.x * 2, self.y * 2 + 1, z),
            TileCoord::new(self.x * 2 + 1, self.y * 2 + 1, z),
        ]
    }

    /// Checks if the tile is valid for its zoom level
    pub fn is_valid(&self) -> bool {
        let max_coord = Self::tiles_per_axis(self.z);
        self.x < max_coord && self.y < max_coord
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}
