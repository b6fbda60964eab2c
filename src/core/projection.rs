//! Spherical Web-Mercator projection between geographic, screen-pixel and
//! tile-index spaces.
//!
//! These are pure functions; the only state they read is the viewport passed
//! in. "World pixels" are the unbounded pixel space of the whole map at a
//! given zoom, `tile_size * 2^zoom` pixels wide, with the origin at the
//! north-west corner of the projectable square.

use crate::core::geo::{LatLng, Point, TileCoord};
use crate::core::viewport::ViewportState;
use std::f64::consts::PI;

/// Width of the world in pixels at `zoom`.
pub fn world_size(zoom: f64, tile_size: f64) -> f64 {
    tile_size * 2_f64.powf(zoom)
}

/// Projects a coordinate to world pixels at a (possibly fractional) zoom.
pub fn project(lat_lng: LatLng, zoom: f64, tile_size: f64) -> Point {
    let lat_rad = LatLng::clamp_lat(lat_lng.lat).to_radians();
    let lng = if lat_lng.lng.is_finite() { lat_lng.lng } else { 0.0 };
    let scale = world_size(zoom, tile_size);

    let x = (lng + 180.0) / 360.0 * scale;
    let y = (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * scale;
    Point::new(x, y)
}

/// Inverse of [`project`]. Latitude is clamped and longitude wrapped.
pub fn unproject(point: Point, zoom: f64, tile_size: f64) -> LatLng {
    let scale = world_size(zoom, tile_size);
    let lng = point.x / scale * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * point.y / scale)).sinh().atan().to_degrees();
    LatLng::sanitized(lat, lng)
}

/// Geographic coordinate to viewport pixel.
///
/// With `painting_unrotated` false the result is in screen space: it is
/// rotated by `-bearing` about the viewport center, which is what hit-testing
/// and marker placement want. The paint path sets it to true because it has
/// already rotated the whole surface once.
pub fn geo_to_pixel(
    lat: f64,
    lng: f64,
    viewport: &ViewportState,
    size: Point,
    painting_unrotated: bool,
) -> Point {
    let tile_size = viewport.tile_size();
    let center_world = project(viewport.center(), viewport.zoom(), tile_size);
    let offset = project(LatLng::new(lat, lng), viewport.zoom(), tile_size).subtract(&center_world);

    let offset = if painting_unrotated || viewport.bearing() == 0.0 {
        offset
    } else {
        offset.rotate(-viewport.bearing())
    };
    Point::new(size.x / 2.0 + offset.x, size.y / 2.0 + offset.y)
}

/// Viewport pixel (screen space) to geographic coordinate.
pub fn pixel_to_geo(x: f64, y: f64, viewport: &ViewportState, size: Point) -> LatLng {
    let tile_size = viewport.tile_size();
    let offset = Point::new(x - size.x / 2.0, y - size.y / 2.0).rotate(viewport.bearing());
    let center_world = project(viewport.center(), viewport.zoom(), tile_size);
    unproject(center_world.add(&offset), viewport.zoom(), tile_size)
}

/// Tile containing the coordinate at integer `zoom`.
pub fn geo_to_tile_index(lat: f64, lng: f64, zoom: u8) -> TileCoord {
    let world = project(LatLng::new(lat, lng), zoom as f64, 1.0);
    let max_index = TileCoord::tiles_per_axis(zoom) as f64 - 1.0;
    let x = world.x.floor().clamp(0.0, max_index) as u32;
    let y = world.y.floor().clamp(0.0, max_index) as u32;
    TileCoord::new(x, y, zoom)
}

/// The center that puts `geo` exactly under the screen pixel `anchor` for the
/// given zoom and bearing. This is the closed form behind every
/// anchor-preserving update: it never depends on the previous center.
pub fn center_for_anchor(
    geo: LatLng,
    anchor: Point,
    zoom: f64,
    bearing: f64,
    size: Point,
    tile_size: f64,
) -> LatLng {
    let offset = Point::new(anchor.x - size.x / 2.0, anchor.y - size.y / 2.0).rotate(bearing);
    let center_world = project(geo, zoom, tile_size).subtract(&offset);
    unproject(center_world, zoom, tile_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn viewport(lat: f64, lng: f64, zoom: f64, bearing: f64) -> ViewportState {
        let mut vp = ViewportState::new(LatLng::new(lat, lng), zoom, Point::new(800.0, 600.0));
        vp.set_bearing(bearing);
        vp
    }

    #[test]
    fn test_center_maps_to_viewport_center() {
        let vp = viewport(37.4215, -119.1892, 12.0, 30.0);
        let p = geo_to_pixel(37.4215, -119.1892, &vp, vp.size(), false);
        assert!((p.x - 400.0).abs() < 1e-6);
        assert!((p.y - 300.0).abs() < 1e-6);
    }

    #[test]
    fn test_tile_index() {
        assert_eq!(geo_to_tile_index(0.0, 0.0, 1), TileCoord::new(1, 1, 1));
        assert_eq!(geo_to_tile_index(85.0, -180.0, 3), TileCoord::new(0, 0, 3));
        // Longitude 180 sits on the east edge; it must stay inside the grid
        assert_eq!(geo_to_tile_index(-85.0, 180.0, 2), TileCoord::new(3, 3, 2));
    }

    #[test]
    fn test_rotation_is_screen_space_only_when_not_painting() {
        let vp = viewport(10.0, 10.0, 8.0, 90.0);
        let east = LatLng::new(10.0, 10.5);
        let painted = geo_to_pixel(east.lat, east.lng, &vp, vp.size(), true);
        let screen = geo_to_pixel(east.lat, east.lng, &vp, vp.size(), false);

        // Unrotated: east is to the right of center
        assert!(painted.x > 400.0);
        assert!((painted.y - 300.0).abs() < 1e-6);
        // Bearing 90: east points up on screen
        assert!((screen.x - 400.0).abs() < 1e-6);
        assert!(screen.y < 300.0);
    }

    #[test]
    fn test_center_for_anchor_is_exact() {
        let vp = viewport(48.85, 2.35, 11.3, 45.0);
        let anchor = Point::new(120.0, 480.0);
        let geo = pixel_to_geo(anchor.x, anchor.y, &vp, vp.size());
        let center = center_for_anchor(geo, anchor, 14.0, 45.0, vp.size(), 256.0);

        let moved = viewport(center.lat, center.lng, 14.0, 45.0);
        let back = pixel_to_geo(anchor.x, anchor.y, &moved, moved.size());
        assert!((back.lat - geo.lat).abs() < 1e-9);
        assert!((back.lng - geo.lng).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_projection_round_trip(
            lat in -85.0f64..=85.0,
            lng in -179.9f64..=179.9,
            zoom in 3.0f64..=19.0,
            bearing in 0.0f64..360.0,
        ) {
            let vp = viewport(lat, lng, zoom, bearing);
            // Stay near the viewport so the test covers the on-screen range
            let target_lat = LatLng::clamp_lat(lat + 0.001);
            let target_lng = lng + 0.001;
            let p = geo_to_pixel(target_lat, target_lng, &vp, vp.size(), false);
            let back = pixel_to_geo(p.x, p.y, &vp, vp.size());
            prop_assert!((back.lat - target_lat).abs() < 1e-7);
            prop_assert!((back.lng - target_lng).abs() < 1e-7);
        }
    }
}
