//! Time-driven view changes: fling inertia, animated zoom and bearing reset.
//!
//! Every animation is advanced from the display-refresh tick with the current
//! time and is cancelled, never awaited, when new pointer input arrives.

use crate::core::geo::Point;
use crate::core::viewport::{normalize_bearing, wrap_angle_delta, ViewSnapshot, ViewportState};
use crate::prelude::{Duration, Instant};

/// Frames per second the friction constant is tuned for
const REFERENCE_FPS: f64 = 60.0;

pub fn lerp(start: f64, end: f64, t: f64) -> f64 {
    start + (end - start) * t
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EasingType {
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    Smooth,
}

impl EasingType {
    /// Apply easing function to a normalized time value (0.0 to 1.0)
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            EasingType::Linear => t,
            EasingType::EaseIn => t * t * t,
            EasingType::EaseOut => {
                let t = t - 1.0;
                t * t * t + 1.0
            }
            EasingType::EaseInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            // Smooth step (3t^2 - 2t^3)
            EasingType::Smooth => t * t * (3.0 - 2.0 * t),
        }
    }
}

/// Continues a fling after release with exponentially decaying velocity.
#[derive(Debug, Clone)]
pub struct InertiaAnimation {
    /// Screen pixels per millisecond
    velocity: Point,
    last_tick: Instant,
    friction: f64,
    stop_speed: f64,
}

impl InertiaAnimation {
    pub fn new(velocity: Point, started: Instant, friction: f64, stop_speed: f64) -> Self {
        Self {
            velocity,
            last_tick: started,
            friction,
            stop_speed,
        }
    }

    pub fn velocity(&self) -> Point {
        self.velocity
    }

    /// Pans by the distance covered since the last tick and decays the
    /// velocity by `friction^(dt * 60)`. Returns false once it has stopped.
    pub fn step(&mut self, viewport: &mut ViewportState, now: Instant) -> bool {
        let dt = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        if dt.is_zero() {
            return self.velocity.length() >= self.stop_speed;
        }

        let dt_ms = dt.as_secs_f64() * 1000.0;
        let moved = self.velocity.multiply(dt_ms);
        viewport.pan_by(moved.x, moved.y);

        self.velocity = self
            .velocity
            .multiply(self.friction.powf(dt.as_secs_f64() * REFERENCE_FPS));
        self.velocity.length() >= self.stop_speed
    }
}

/// Eases zoom toward a target while the coordinate under `anchor` stays put.
#[derive(Debug, Clone)]
pub struct ZoomAnimation {
    start: ViewSnapshot,
    to_zoom: f64,
    anchor: Point,
    started: Instant,
    duration: Duration,
    easing: EasingType,
}

impl ZoomAnimation {
    pub fn new(
        start: ViewSnapshot,
        to_zoom: f64,
        anchor: Point,
        started: Instant,
        duration: Duration,
    ) -> Self {
        Self {
            start,
            to_zoom,
            anchor,
            started,
            duration,
            easing: EasingType::EaseOut,
        }
    }

    pub fn target_zoom(&self) -> f64 {
        self.to_zoom
    }

    pub fn step(&mut self, viewport: &mut ViewportState, now: Instant) -> bool {
        let progress = progress(self.started, self.duration, now);
        let zoom = lerp(self.start.zoom, self.to_zoom, self.easing.apply(progress));

        viewport.restore(&self.start);
        viewport.zoom_at(zoom, self.anchor);
        progress < 1.0
    }
}

/// Rotates back to a bearing along the shorter way round, about the
/// viewport center.
#[derive(Debug, Clone)]
pub struct BearingAnimation {
    from: f64,
    delta: f64,
    started: Instant,
    duration: Duration,
}

impl BearingAnimation {
    pub fn new(from: f64, to: f64, started: Instant, duration: Duration) -> Self {
        Self {
            from,
            delta: wrap_angle_delta(to - from),
            started,
            duration,
        }
    }

    pub fn step(&mut self, viewport: &mut ViewportState, now: Instant) -> bool {
        let progress = progress(self.started, self.duration, now);
        let eased = EasingType::EaseInOut.apply(progress);
        viewport.set_bearing(normalize_bearing(self.from + self.delta * eased));
        progress < 1.0
    }
}

fn progress(started: Instant, duration: Duration, now: Instant) -> f64 {
    if duration.is_zero() {
        return 1.0;
    }
    let elapsed = now.saturating_duration_since(started);
    (elapsed.as_secs_f64() / duration.as_secs_f64()).min(1.0)
}

/// The view animation currently owning the viewport, if any.
#[derive(Debug, Clone)]
pub enum ViewAnimation {
    Inertia(InertiaAnimation),
    Zoom(ZoomAnimation),
    Bearing(BearingAnimation),
}

impl ViewAnimation {
    /// Advances the animation. Returns false when it has finished.
    pub fn step(&mut self, viewport: &mut ViewportState, now: Instant) -> bool {
        match self {
            ViewAnimation::Inertia(inertia) => inertia.step(viewport, now),
            ViewAnimation::Zoom(zoom) => zoom.step(viewport, now),
            ViewAnimation::Bearing(bearing) => bearing.step(viewport, now),
        }
    }
}
