use crate::core::constants::{
    DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM, ROTATION_UNLOCK_DEGREES, TILE_SIZE, ZOOM_UNLOCK_DELTA,
};
use crate::core::geo::{LatLng, Point, TileCoord};
use crate::core::projection::{self, center_for_anchor, pixel_to_geo, world_size};
use crate::prelude::HashSet;
use serde::{Deserialize, Serialize};

/// Normalizes a bearing to [0, 360)
pub fn normalize_bearing(bearing: f64) -> f64 {
    if !bearing.is_finite() {
        return 0.0;
    }
    let b = bearing.rem_euclid(360.0);
    if b >= 360.0 {
        0.0
    } else {
        b
    }
}

/// Wraps an angle difference to [-180, 180]
pub fn wrap_angle_delta(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    (degrees + 180.0).rem_euclid(360.0) - 180.0
}

/// A tile drawn in one screen slot.
///
/// `column` is the unwrapped tile column, which lies outside
/// `[0, 2^z)` for copies of the world east or west of the primary one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePlacement {
    pub coord: TileCoord,
    pub column: i64,
}

/// Immutable copy of the view taken when a gesture session starts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewSnapshot {
    pub center: LatLng,
    pub zoom: f64,
    pub bearing: f64,
}

/// Geometry of a two-pointer contact
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerGeometry {
    pub distance: f64,
    /// Angle of the line from the first to the second pointer, in degrees
    pub angle: f64,
    pub centroid: Point,
}

impl PointerGeometry {
    pub fn from_points(a: Point, b: Point) -> Self {
        Self {
            distance: a.distance_to(&b),
            angle: a.angle_to(&b),
            centroid: a.midpoint(&b),
        }
    }
}

/// Per-session state of a pinch/rotate gesture.
///
/// Every update is computed from `initial` and `initial_geometry`; nothing
/// here is derived from the previous frame except the two lock flags.
#[derive(Debug, Clone)]
pub struct PinchSession {
    pub initial: ViewSnapshot,
    pub initial_geometry: PointerGeometry,
    pub last_geometry: PointerGeometry,
    pub rotation_unlocked: bool,
    pub zoom_locked: bool,
    pub rotation_unlock_degrees: f64,
    pub zoom_unlock_delta: f64,
}

impl PinchSession {
    pub fn new(initial: ViewSnapshot, geometry: PointerGeometry) -> Self {
        Self {
            initial,
            initial_geometry: geometry,
            last_geometry: geometry,
            rotation_unlocked: false,
            zoom_locked: false,
            rotation_unlock_degrees: ROTATION_UNLOCK_DEGREES,
            zoom_unlock_delta: ZOOM_UNLOCK_DELTA,
        }
    }

    pub fn with_thresholds(mut self, rotation_unlock_degrees: f64, zoom_unlock_delta: f64) -> Self {
        self.rotation_unlock_degrees = rotation_unlock_degrees;
        self.zoom_unlock_delta = zoom_unlock_delta;
        self
    }
}

/// The authoritative view: center, zoom and bearing, plus the pixel size of
/// the viewport and the transient interaction flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    lat: f64,
    lng: f64,
    zoom: f64,
    bearing: f64,
    size: Point,
    min_zoom: f64,
    max_zoom: f64,
    tile_size: u32,
    /// True while a drag or pinch is moving the map
    pub is_panning: bool,
    /// Modal map-click behaviour owned by a collaborator
    pub interaction_mode: Option<String>,
}

impl ViewportState {
    /// Creates a new viewport
    pub fn new(center: LatLng, zoom: f64, size: Point) -> Self {
        let center = LatLng::sanitized(center.lat, center.lng);
        Self {
            lat: center.lat,
            lng: center.lng,
            zoom: Self::sanitize_zoom(zoom, DEFAULT_MIN_ZOOM, DEFAULT_MAX_ZOOM),
            bearing: 0.0,
            size,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            tile_size: TILE_SIZE,
            is_panning: false,
            interaction_mode: None,
        }
    }

    fn sanitize_zoom(zoom: f64, min: f64, max: f64) -> f64 {
        if zoom.is_nan() {
            min
        } else {
            zoom.clamp(min, max)
        }
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn bearing(&self) -> f64 {
        self.bearing
    }

    pub fn size(&self) -> Point {
        self.size
    }

    pub fn tile_size(&self) -> f64 {
        self.tile_size as f64
    }

    pub fn zoom_range(&self) -> (f64, f64) {
        (self.min_zoom, self.max_zoom)
    }

    /// Sets the center; latitude is clamped and longitude wrapped
    pub fn set_center(&mut self, center: LatLng) {
        let center = LatLng::sanitized(center.lat, center.lng);
        self.lat = center.lat;
        self.lng = center.lng;
    }

    /// Sets the zoom level, clamping to valid range
    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = Self::sanitize_zoom(zoom, self.min_zoom, self.max_zoom);
    }

    /// Sets the bearing, normalized to [0, 360)
    pub fn set_bearing(&mut self, bearing: f64) {
        self.bearing = normalize_bearing(bearing);
    }

    /// Sets the viewport size
    pub fn set_size(&mut self, size: Point) {
        self.size = size;
    }

    /// Sets the zoom limits
    pub fn set_zoom_limits(&mut self, min_zoom: f64, max_zoom: f64) {
        self.min_zoom = min_zoom.min(max_zoom);
        self.max_zoom = max_zoom.max(min_zoom);
        self.zoom = self.zoom.clamp(self.min_zoom, self.max_zoom);
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            center: self.center(),
            zoom: self.zoom,
            bearing: self.bearing,
        }
    }

    pub fn restore(&mut self, snapshot: &ViewSnapshot) {
        self.set_center(snapshot.center);
        self.set_zoom(snapshot.zoom);
        self.set_bearing(snapshot.bearing);
    }

    /// Screen pixel to coordinate for this viewport
    pub fn pixel_to_lat_lng(&self, pixel: &Point) -> LatLng {
        pixel_to_geo(pixel.x, pixel.y, self, self.size)
    }

    /// Coordinate to screen pixel (rotation applied)
    pub fn lat_lng_to_pixel(&self, lat_lng: &LatLng) -> Point {
        projection::geo_to_pixel(lat_lng.lat, lat_lng.lng, self, self.size, false)
    }

    /// Pans by a screen-space pixel delta: the content under the pointer
    /// follows the pointer.
    ///
    /// The delta is rotated into map space, then converted with the linear
    /// Mercator approximation at the current latitude.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        if !dx.is_finite() || !dy.is_finite() {
            return;
        }
        let map_delta = Point::new(dx, dy).rotate(self.bearing);
        let degrees_per_pixel = 360.0 / world_size(self.zoom, self.tile_size());

        let lng = self.lng - map_delta.x * degrees_per_pixel;
        let lat = self.lat + map_delta.y * degrees_per_pixel * self.lat.to_radians().cos();
        self.set_center(LatLng::new(lat, lng));
    }

    /// Changes zoom while keeping the coordinate under `anchor` fixed on screen.
    pub fn zoom_at(&mut self, new_zoom: f64, anchor: Point) {
        let geo = self.pixel_to_lat_lng(&anchor);
        let zoom = Self::sanitize_zoom(new_zoom, self.min_zoom, self.max_zoom);
        let center = center_for_anchor(geo, anchor, zoom, self.bearing, self.size, self.tile_size());
        self.zoom = zoom;
        self.set_center(center);
    }

    /// Applies a two-pointer update, always starting from the session's
    /// initial snapshot.
    ///
    /// Rotation stays pinned to the initial bearing until the angle delta
    /// passes the unlock threshold; at that moment the zoom lock engages and
    /// holds zoom until the zoom delta passes its own threshold. While zoom
    /// is locked the map spins around the viewport center; otherwise the
    /// coordinate under the initial centroid is kept under the current one.
    pub fn rotate_and_zoom_from_session(
        &mut self,
        session: &mut PinchSession,
        current: &PointerGeometry,
    ) {
        let initial = session.initial;
        let initial_geometry = session.initial_geometry;

        let zoom_delta = if initial_geometry.distance > 0.0 && current.distance > 0.0 {
            (current.distance / initial_geometry.distance).log2()
        } else {
            0.0
        };
        let candidate_zoom =
            Self::sanitize_zoom(initial.zoom + zoom_delta, self.min_zoom, self.max_zoom);

        let angle_delta = wrap_angle_delta(current.angle - initial_geometry.angle);
        let candidate_bearing = normalize_bearing(initial.bearing - angle_delta);

        if !session.rotation_unlocked && angle_delta.abs() > session.rotation_unlock_degrees {
            session.rotation_unlocked = true;
            session.zoom_locked = true;
        }
        if session.zoom_locked && zoom_delta.abs() > session.zoom_unlock_delta {
            session.zoom_locked = false;
        }

        let bearing = if session.rotation_unlocked {
            candidate_bearing
        } else {
            initial.bearing
        };

        self.restore(&initial);
        if session.zoom_locked {
            self.set_bearing(bearing);
        } else {
            let anchor_geo = self.pixel_to_lat_lng(&initial_geometry.centroid);
            self.zoom = candidate_zoom;
            self.set_bearing(bearing);
            let center = center_for_anchor(
                anchor_geo,
                current.centroid,
                self.zoom,
                self.bearing,
                self.size,
                self.tile_size(),
            );
            self.set_center(center);
        }

        session.last_geometry = *current;
    }

    /// The integer zoom at which tiles are drawn.
    ///
    /// Tiles of level `z` are stretched up to the next integer, so the
    /// switch to `z + 1` happens exactly at the boundary and prefetch gets
    /// to run ahead of it.
    pub fn tile_zoom(&self) -> u8 {
        self.zoom.floor().max(0.0) as u8
    }

    /// Tile slots at `zoom` covering the viewport, nearest to the center
    /// first.
    ///
    /// Columns run past the world edges so that the map repeats east and
    /// west of the antimeridian; each slot carries the wrapped tile to draw
    /// there. When rotated the covered area is the circumscribed square of
    /// the viewport, since any corner may swing into view.
    pub fn visible_placements(&self, zoom: u8) -> Vec<TilePlacement> {
        let tile_zoom = zoom as f64;
        let center = projection::project(self.center(), tile_zoom, self.tile_size());
        let scale = 2_f64.powf(tile_zoom - self.zoom);

        let (half_w, half_h) = if self.bearing == 0.0 {
            (self.size.x / 2.0, self.size.y / 2.0)
        } else {
            let r = self.size.length() / 2.0;
            (r, r)
        };
        let half_w = half_w * scale;
        let half_h = half_h * scale;

        let tile_size = self.tile_size();
        let n = TileCoord::tiles_per_axis(zoom) as i64;
        let min_x = ((center.x - half_w) / tile_size).floor() as i64;
        let max_x = ((center.x + half_w) / tile_size).floor() as i64;
        let min_y = (((center.y - half_h) / tile_size).floor() as i64).max(0);
        let max_y = (((center.y + half_h) / tile_size).floor() as i64).min(n - 1);

        let mut placements = Vec::new();
        for column in min_x..=max_x {
            for y in min_y..=max_y {
                placements.push(TilePlacement {
                    coord: TileCoord::new(column.rem_euclid(n) as u32, y as u32, zoom),
                    column,
                });
            }
        }

        let center_tile = Point::new(center.x / tile_size, center.y / tile_size);
        let distance = |p: &TilePlacement| {
            Point::new(p.column as f64 + 0.5, p.coord.y as f64 + 0.5).distance_to(&center_tile)
        };
        placements.sort_by(|a, b| distance(a).total_cmp(&distance(b)));
        placements
    }

    /// Distinct tiles at `zoom` needed to cover the viewport, nearest to
    /// the center first
    pub fn visible_tiles(&self, zoom: u8) -> Vec<TileCoord> {
        let mut seen = HashSet::default();
        self.visible_placements(zoom)
            .into_iter()
            .map(|placement| placement.coord)
            .filter(|coord| seen.insert(*coord))
            .collect()
    }

    /// Gets the resolution in meters per pixel at the current zoom level
    pub fn meters_per_pixel(&self) -> f64 {
        self.center().meters_per_pixel(self.zoom, self.tile_size())
    }
}

impl Default for ViewportState {
    fn default() -> Self {
        Self::new(LatLng::new(0.0, 0.0), DEFAULT_MIN_ZOOM, Point::new(800.0, 600.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn viewport() -> ViewportState {
        ViewportState::new(LatLng::new(37.4215, -119.1892), 12.0, Point::new(800.0, 600.0))
    }

    #[test]
    fn test_viewport_creation() {
        let viewport = viewport();
        assert_eq!(viewport.zoom(), 12.0);
        assert_eq!(viewport.center().lat, 37.4215);
        assert_eq!(viewport.size().x, 800.0);
        assert_eq!(viewport.bearing(), 0.0);
    }

    #[test]
    fn test_zoom_limits() {
        let mut viewport = ViewportState::default();
        viewport.set_zoom_limits(2.0, 15.0);

        viewport.set_zoom(1.0);
        assert_eq!(viewport.zoom(), 2.0);

        viewport.set_zoom(20.0);
        assert_eq!(viewport.zoom(), 15.0);

        viewport.set_zoom(f64::NAN);
        assert_eq!(viewport.zoom(), 2.0);
    }

    #[test]
    fn test_bearing_normalization() {
        let mut viewport = viewport();
        viewport.set_bearing(-30.0);
        assert!((viewport.bearing() - 330.0).abs() < 1e-9);
        viewport.set_bearing(720.0);
        assert_eq!(viewport.bearing(), 0.0);
        assert!((wrap_angle_delta(350.0) - -10.0).abs() < 1e-9);
        assert!((wrap_angle_delta(-190.0) - 170.0).abs() < 1e-9);
    }

    #[test]
    fn test_pan_moves_content_with_pointer() {
        let mut viewport = viewport();
        let anchor = Point::new(400.0, 300.0);
        let geo = viewport.pixel_to_lat_lng(&anchor);

        viewport.pan_by(20.0, 0.0);
        // The coordinate that was at the center is now 20px to the right
        let moved = viewport.lat_lng_to_pixel(&geo);
        assert!((moved.x - 420.0).abs() < 0.01);
        assert!((moved.y - 300.0).abs() < 0.01);
    }

    #[test]
    fn test_pan_respects_bearing() {
        let mut viewport = viewport();
        viewport.set_bearing(90.0);
        let geo = viewport.center();

        viewport.pan_by(0.0, 25.0);
        let moved = viewport.lat_lng_to_pixel(&geo);
        assert!((moved.x - 400.0).abs() < 0.05);
        assert!((moved.y - 325.0).abs() < 0.05);
    }

    #[test]
    fn test_zoom_at_keeps_anchor_fixed() {
        for bearing in [0.0, 45.0, 180.0] {
            for delta in [-5.0, -3.0, -1.0, 1.0, 3.0, 5.0] {
                let mut viewport = viewport();
                viewport.set_bearing(bearing);
                let anchor = Point::new(650.0, 120.0);
                let before = viewport.pixel_to_lat_lng(&anchor);

                viewport.zoom_at(12.0 + delta, anchor);
                let after = viewport.pixel_to_lat_lng(&anchor);

                assert_eq!(viewport.zoom(), 12.0 + delta);
                assert!((after.lat - before.lat).abs() < 1e-9, "bearing {bearing} delta {delta}");
                assert!((after.lng - before.lng).abs() < 1e-9, "bearing {bearing} delta {delta}");
            }
        }
    }

    #[test]
    fn test_pinch_rotation_lock_holds_bearing() {
        let mut viewport = viewport();
        viewport.set_bearing(20.0);
        let a = Point::new(350.0, 300.0);
        let b = Point::new(450.0, 300.0);
        let initial = PointerGeometry::from_points(a, b);
        let mut session = PinchSession::new(viewport.snapshot(), initial);

        // 10 degrees of twist and a 1.5x spread
        let b2 = a.add(&Point::new(150.0, 0.0).rotate(10.0));
        let current = PointerGeometry::from_points(a, b2);
        viewport.rotate_and_zoom_from_session(&mut session, &current);

        assert_eq!(viewport.bearing(), 20.0);
        assert!(!session.rotation_unlocked);
        assert!((viewport.zoom() - (12.0 + 1.5_f64.log2())).abs() < 1e-9);
    }

    #[test]
    fn test_pinch_rotation_unlock_engages_zoom_lock() {
        let mut viewport = viewport();
        let center = Point::new(400.0, 300.0);
        let a = Point::new(350.0, 300.0);
        let b = Point::new(450.0, 300.0);
        let mut session =
            PinchSession::new(viewport.snapshot(), PointerGeometry::from_points(a, b));

        // Twist 40 degrees about the center with a slight spread
        let a2 = center.add(&Point::new(-55.0, 0.0).rotate(40.0));
        let b2 = center.add(&Point::new(55.0, 0.0).rotate(40.0));
        viewport.rotate_and_zoom_from_session(&mut session, &PointerGeometry::from_points(a2, b2));

        assert!(session.rotation_unlocked);
        assert!(session.zoom_locked);
        assert_eq!(viewport.zoom(), 12.0);
        assert!((viewport.bearing() - 320.0).abs() < 1e-9);
        assert_eq!(viewport.center(), LatLng::new(37.4215, -119.1892));

        // A deliberate spread unlocks zoom
        let a3 = center.add(&Point::new(-120.0, 0.0).rotate(40.0));
        let b3 = center.add(&Point::new(120.0, 0.0).rotate(40.0));
        viewport.rotate_and_zoom_from_session(&mut session, &PointerGeometry::from_points(a3, b3));
        assert!(!session.zoom_locked);
        assert!((viewport.zoom() - (12.0 + 2.4_f64.log2())).abs() < 1e-9);
    }

    #[test]
    fn test_pinch_keeps_centroid_anchor() {
        let mut viewport = viewport();
        let a = Point::new(100.0, 100.0);
        let b = Point::new(200.0, 200.0);
        let initial = PointerGeometry::from_points(a, b);
        let anchor_geo = viewport.pixel_to_lat_lng(&initial.centroid);
        let mut session = PinchSession::new(viewport.snapshot(), initial);

        for spread in [1.2, 1.6, 2.5, 0.7] {
            let half = Point::new(50.0, 50.0).multiply(spread);
            let current = PointerGeometry::from_points(
                initial.centroid.subtract(&half),
                initial.centroid.add(&half),
            );
            viewport.rotate_and_zoom_from_session(&mut session, &current);
            let under = viewport.pixel_to_lat_lng(&initial.centroid);
            assert!((under.lat - anchor_geo.lat).abs() < 1e-9);
            assert!((under.lng - anchor_geo.lng).abs() < 1e-9);
        }
    }

    #[test]
    fn test_visible_tiles_cover_center() {
        let viewport = viewport();
        let tiles = viewport.visible_tiles(12);
        let center_tile = projection::geo_to_tile_index(37.4215, -119.1892, 12);
        assert_eq!(tiles[0], center_tile);
        // 800x600 needs at least a 4x3 block
        assert!(tiles.len() >= 12);
    }

    #[test]
    fn test_tiles_drawn_at_floor_zoom() {
        let mut viewport = viewport();
        viewport.set_zoom(12.45);
        assert_eq!(viewport.tile_zoom(), 12);
        viewport.set_zoom(12.9);
        assert_eq!(viewport.tile_zoom(), 12);
        viewport.set_zoom(13.0);
        assert_eq!(viewport.tile_zoom(), 13);
    }

    #[test]
    fn test_visible_tiles_wrap_across_antimeridian() {
        let at_origin = ViewportState::new(LatLng::new(0.0, 0.0), 3.0, Point::new(800.0, 600.0));
        let full = at_origin.visible_placements(3).len();

        let viewport = ViewportState::new(LatLng::new(0.0, 179.0), 3.0, Point::new(800.0, 600.0));
        let placements = viewport.visible_placements(3);
        assert_eq!(placements.len(), full);
        // Columns east of the edge show the western tiles again
        assert!(placements.iter().any(|p| p.column >= 8));
        assert!(placements
            .iter()
            .all(|p| p.coord.x == p.column.rem_euclid(8) as u32 && p.coord.is_valid()));
        assert!(viewport.visible_tiles(3).iter().any(|t| t.x == 0));
    }

    #[test]
    fn test_small_world_dedups_visible_tiles() {
        // 3000 px is wider than the 2048 px world at zoom 3
        let viewport = ViewportState::new(LatLng::new(0.0, 0.0), 3.0, Point::new(3000.0, 400.0));
        let placements = viewport.visible_placements(3);
        let tiles = viewport.visible_tiles(3);
        assert_eq!(placements.len(), 24);
        assert_eq!(tiles.len(), 16);
    }

    proptest! {
        #[test]
        fn prop_pan_keeps_center_in_range(
            steps in proptest::collection::vec((-5000.0f64..5000.0, -5000.0f64..5000.0), 1..60),
            bearing in 0.0f64..360.0,
        ) {
            let mut viewport = ViewportState::new(LatLng::new(80.0, 179.0), 3.0, Point::new(400.0, 400.0));
            viewport.set_bearing(bearing);
            for (dx, dy) in steps {
                viewport.pan_by(dx, dy);
                let c = viewport.center();
                prop_assert!(c.lng > -180.0 && c.lng <= 180.0);
                prop_assert!(c.lat >= -85.0 && c.lat <= 85.0);
            }
        }
    }
}
