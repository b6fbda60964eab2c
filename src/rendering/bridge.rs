//! Predict-and-reconcile fast path between full repaints.
//!
//! A full repaint commits the view it was painted from. Until the next one,
//! the already painted frame can be moved with a 2D affine transform derived
//! from the committed view and the current one. The transform is a readback
//! of state the full repaint recorded; it never feeds back into the view.

use crate::core::geo::Point;
use crate::core::projection::geo_to_pixel;
use crate::core::viewport::{wrap_angle_delta, ViewSnapshot, ViewportState};

/// 2D affine transform: `x' = a*x + b*y + tx`, `y' = c*x + d*y + ty`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine {
    /// Create identity transform (no change)
    pub fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            tx: 0.0,
            ty: 0.0,
        }
    }

    /// Uniform scale combined with a rotation, same convention as
    /// [`Point::rotate`]
    pub fn scale_rotate(scale: f64, degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self {
            a: scale * cos,
            b: -scale * sin,
            c: scale * sin,
            d: scale * cos,
            tx: 0.0,
            ty: 0.0,
        }
    }

    pub fn apply(&self, p: Point) -> Point {
        Point::new(
            self.a * p.x + self.b * p.y + self.tx,
            self.c * p.x + self.d * p.y + self.ty,
        )
    }

    /// Check if this is effectively an identity transform
    pub fn is_identity(&self) -> bool {
        (self.a - 1.0).abs() < 1e-9
            && (self.d - 1.0).abs() < 1e-9
            && self.b.abs() < 1e-9
            && self.c.abs() < 1e-9
            && self.tx.abs() < 1e-6
            && self.ty.abs() < 1e-6
    }

    pub fn scale(&self) -> f64 {
        (self.a * self.d - self.b * self.c).abs().sqrt()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompositorBridge {
    committed: Option<ViewSnapshot>,
    enabled: bool,
}

impl CompositorBridge {
    pub fn new(enabled: bool) -> Self {
        Self {
            committed: None,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Records the view a full repaint was painted from
    pub fn commit(&mut self, viewport: &ViewportState) {
        self.committed = Some(viewport.snapshot());
    }

    pub fn committed(&self) -> Option<ViewSnapshot> {
        self.committed
    }

    pub fn clear(&mut self) {
        self.committed = None;
    }

    /// Transform taking a pixel of the committed frame to where the same
    /// coordinate sits in `current`. `None` when disabled or nothing has
    /// been painted yet.
    pub fn predict(&self, current: &ViewportState) -> Option<Affine> {
        if !self.enabled {
            return None;
        }
        let committed = self.committed?;
        let size = current.size();
        let center = Point::new(size.x / 2.0, size.y / 2.0);

        let scale = 2_f64.powf(current.zoom() - committed.zoom);
        let turn = -wrap_angle_delta(current.bearing() - committed.bearing);
        let mut affine = Affine::scale_rotate(scale, turn);

        // Where the committed center lands now; the frame pivots about it
        let anchor = geo_to_pixel(
            committed.center.lat,
            committed.center.lng,
            current,
            size,
            false,
        );
        let pivot = affine.apply(center);
        affine.tx = anchor.x - pivot.x;
        affine.ty = anchor.y - pivot.y;
        Some(affine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::LatLng;

    fn viewport() -> ViewportState {
        ViewportState::new(LatLng::new(47.6, -122.3), 11.0, Point::new(800.0, 600.0))
    }

    #[test]
    fn test_no_prediction_before_commit() {
        let bridge = CompositorBridge::new(true);
        assert!(bridge.predict(&viewport()).is_none());

        let mut disabled = CompositorBridge::new(false);
        disabled.commit(&viewport());
        assert!(disabled.predict(&viewport()).is_none());
    }

    #[test]
    fn test_unchanged_view_is_identity() {
        let vp = viewport();
        let mut bridge = CompositorBridge::new(true);
        bridge.commit(&vp);
        assert!(bridge.predict(&vp).unwrap().is_identity());
    }

    #[test]
    fn test_prediction_tracks_painted_points() {
        let painted = viewport();
        let mut bridge = CompositorBridge::new(true);
        bridge.commit(&painted);

        let mut current = painted.clone();
        current.set_bearing(30.0);
        current.zoom_at(11.6, Point::new(250.0, 420.0));
        current.pan_by(35.0, -12.0);

        let affine = bridge.predict(&current).unwrap();
        assert!((affine.scale() - 2_f64.powf(0.6)).abs() < 1e-9);

        for pixel in [Point::new(0.0, 0.0), Point::new(400.0, 300.0), Point::new(777.0, 123.0)] {
            let geo = painted.pixel_to_lat_lng(&pixel);
            let expected = current.lat_lng_to_pixel(&geo);
            let predicted = affine.apply(pixel);
            assert!(
                predicted.distance_to(&expected) < 1e-6,
                "{pixel:?}: {predicted:?} vs {expected:?}"
            );
        }
    }
}
