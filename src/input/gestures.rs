//! Pointer gesture state machine.
//!
//! Turns raw pointer samples into view changes: drag with inertia,
//! pinch/rotate with axis locks, double-tap-and-hold zoom, taps and long
//! presses. Every session keeps the view snapshot taken when it started and
//! recomputes the view from it on each update.

use crate::animation::{BearingAnimation, InertiaAnimation, ViewAnimation, ZoomAnimation};
use crate::core::config::GestureConfig;
use crate::core::geo::Point;
use crate::core::viewport::{
    wrap_angle_delta, PinchSession, PointerGeometry, ViewSnapshot, ViewportState,
};
use crate::input::events::{PointerEvent, PointerPhase};
use crate::prelude::{Duration, Instant, VecDeque};

/// Something the owner of the engine has to act on
#[derive(Debug, Clone, PartialEq)]
pub enum GestureAction {
    /// The view changed; request a coalesced redraw
    Redraw,
    /// A drag moved the view; persistence should be debounced
    Dragged,
    /// The view settled; persist it and notify move-end listeners
    Settled,
    /// A single tap that survived the double-tap window
    Tap(Point),
    /// Pointer held still past the long-press delay
    LongPress(Point),
}

/// Public view of the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Idle,
    SinglePending,
    SingleDrag,
    TwoPending,
    TwoActive,
    OneFingerZoom,
}

#[derive(Debug, Clone)]
enum Session {
    Idle,
    SinglePending {
        id: u64,
        start: Point,
        started: Instant,
        snapshot: ViewSnapshot,
    },
    SingleDrag {
        id: u64,
        start: Point,
        snapshot: ViewSnapshot,
    },
    /// Pointer whose session ended early (long press fired, two-finger tap);
    /// ignored until it lifts
    Consumed { id: u64 },
    TwoPending {
        ids: (u64, u64),
        pinch: PinchSession,
        started: Instant,
    },
    TwoActive {
        ids: (u64, u64),
        pinch: PinchSession,
        started: Instant,
    },
    OneFingerZoom {
        id: u64,
        anchor: Point,
        start_y: f64,
        snapshot: ViewSnapshot,
        moved: bool,
    },
}

/// Finite-state machine over pointer count, time and movement.
#[derive(Debug)]
pub struct GestureEngine {
    config: GestureConfig,
    session: Session,
    /// Pointers currently down, in arrival order
    pointers: Vec<(u64, Point)>,
    /// Set when a third pointer cancelled everything; cleared once all lift
    suppressed: bool,
    samples: VecDeque<(Point, Instant)>,
    last_tap: Option<(Point, Instant)>,
    pending_tap: Option<(Point, Instant)>,
    animation: Option<ViewAnimation>,
}

impl GestureEngine {
    pub fn new(config: GestureConfig) -> Self {
        let samples = VecDeque::with_capacity(config.inertia_samples.max(2));
        Self {
            config,
            session: Session::Idle,
            pointers: Vec::with_capacity(3),
            suppressed: false,
            samples,
            last_tap: None,
            pending_tap: None,
            animation: None,
        }
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    pub fn phase(&self) -> GesturePhase {
        match self.session {
            Session::Idle | Session::Consumed { .. } => GesturePhase::Idle,
            Session::SinglePending { .. } => GesturePhase::SinglePending,
            Session::SingleDrag { .. } => GesturePhase::SingleDrag,
            Session::TwoPending { .. } => GesturePhase::TwoPending,
            Session::TwoActive { .. } => GesturePhase::TwoActive,
            Session::OneFingerZoom { .. } => GesturePhase::OneFingerZoom,
        }
    }

    /// True while a session is visibly moving the map
    pub fn is_active(&self) -> bool {
        matches!(
            self.session,
            Session::SingleDrag { .. } | Session::TwoActive { .. } | Session::OneFingerZoom { .. }
        )
    }

    pub fn pointer_count(&self) -> usize {
        self.pointers.len()
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Replaces any running animation
    pub fn start_animation(&mut self, animation: ViewAnimation) {
        self.animation = Some(animation);
    }

    pub fn cancel_animation(&mut self) -> bool {
        self.animation.take().is_some()
    }

    /// Feeds one pointer sample through the state machine
    pub fn handle_pointer(
        &mut self,
        event: &PointerEvent,
        viewport: &mut ViewportState,
    ) -> Vec<GestureAction> {
        let mut actions = Vec::new();
        match event.phase {
            PointerPhase::Down => self.pointer_down(event, viewport, &mut actions),
            PointerPhase::Move => self.pointer_move(event, viewport, &mut actions),
            PointerPhase::Up => self.pointer_up(event, viewport, false, &mut actions),
            PointerPhase::Cancel => self.pointer_up(event, viewport, true, &mut actions),
        }
        actions
    }

    /// Zooms to the next integer level in the wheel direction, anchored
    /// at the cursor.
    pub fn wheel(
        &mut self,
        notches: f64,
        position: Point,
        viewport: &mut ViewportState,
    ) -> Vec<GestureAction> {
        if !notches.is_finite() || notches == 0.0 {
            return Vec::new();
        }
        self.animation = None;
        let target = viewport.zoom() + notches * self.config.wheel_zoom_step;
        let snapped = if notches > 0.0 {
            target.ceil()
        } else {
            target.floor()
        };
        let before = viewport.zoom();
        viewport.zoom_at(snapped, position);
        if viewport.zoom() == before {
            return Vec::new();
        }
        vec![GestureAction::Redraw, GestureAction::Settled]
    }

    /// Fires timers and advances the running animation
    pub fn tick(&mut self, viewport: &mut ViewportState, now: Instant) -> Vec<GestureAction> {
        let mut actions = Vec::new();

        if let Session::SinglePending { id, start, started, .. } = self.session {
            if now.saturating_duration_since(started) >= self.config.long_press() {
                log::debug!("long press at ({:.1}, {:.1})", start.x, start.y);
                self.session = Session::Consumed { id };
                self.last_tap = None;
                actions.push(GestureAction::LongPress(start));
            }
        }

        if let Some((position, at)) = self.pending_tap {
            if now.saturating_duration_since(at) >= self.config.double_tap_window() {
                self.pending_tap = None;
                actions.push(GestureAction::Tap(position));
            }
        }

        if let Some(animation) = self.animation.as_mut() {
            let running = animation.step(viewport, now);
            actions.push(GestureAction::Redraw);
            if !running {
                self.animation = None;
                actions.push(GestureAction::Settled);
            }
        }

        actions
    }

    /// When the earliest timer is due, if any. Hosts without a display
    /// loop can sleep until then.
    pub fn next_deadline(&self) -> Option<Instant> {
        let long_press = match self.session {
            Session::SinglePending { started, .. } => Some(started + self.config.long_press()),
            _ => None,
        };
        let tap = self
            .pending_tap
            .map(|(_, at)| at + self.config.double_tap_window());
        match (long_press, tap) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Returns false for a pointer that is not down
    fn update_pointer(&mut self, id: u64, position: Point) -> bool {
        let index = self.pointers.iter().position(|(pointer, _)| *pointer == id);
        match index {
            Some(index) => {
                self.pointers[index].1 = position;
                true
            }
            None => false,
        }
    }

    fn pointer_position(&self, id: u64) -> Option<Point> {
        self.pointers
            .iter()
            .find(|(pointer, _)| *pointer == id)
            .map(|(_, position)| *position)
    }

    fn pinch_geometry(&self, ids: (u64, u64)) -> Option<PointerGeometry> {
        let a = self.pointer_position(ids.0)?;
        let b = self.pointer_position(ids.1)?;
        Some(PointerGeometry::from_points(a, b))
    }

    fn pointer_down(
        &mut self,
        event: &PointerEvent,
        viewport: &mut ViewportState,
        actions: &mut Vec<GestureAction>,
    ) {
        if self.animation.take().is_some() {
            log::trace!("animation cancelled by pointer down");
        }
        if !self.update_pointer(event.id, event.position) {
            self.pointers.push((event.id, event.position));
        }
        if self.suppressed {
            return;
        }

        match self.pointers.len() {
            1 => self.begin_single(event, viewport),
            2 => {
                self.end_session(viewport, actions);
                self.begin_pinch(event.timestamp, viewport);
            }
            count => {
                log::debug!("{} pointers down; cancelling gesture", count);
                self.end_session(viewport, actions);
                self.suppressed = true;
            }
        }
    }

    fn begin_single(&mut self, event: &PointerEvent, viewport: &mut ViewportState) {
        self.samples.clear();
        let snapshot = viewport.snapshot();

        let double_tap = self.last_tap.filter(|(position, at)| {
            event.timestamp.saturating_duration_since(*at) <= self.config.double_tap_window()
                && position.distance_to(&event.position) <= self.config.double_tap_distance_px
        });

        self.session = match double_tap {
            Some((anchor, _)) => {
                log::debug!("double tap and hold; one-finger zoom");
                self.pending_tap = None;
                self.last_tap = None;
                Session::OneFingerZoom {
                    id: event.id,
                    anchor,
                    start_y: event.position.y,
                    snapshot,
                    moved: false,
                }
            }
            None => Session::SinglePending {
                id: event.id,
                start: event.position,
                started: event.timestamp,
                snapshot,
            },
        };
    }

    fn begin_pinch(&mut self, started: Instant, viewport: &mut ViewportState) {
        let ids = (self.pointers[0].0, self.pointers[1].0);
        let Some(geometry) = self.pinch_geometry(ids) else {
            self.session = Session::Idle;
            return;
        };
        let pinch = PinchSession::new(viewport.snapshot(), geometry).with_thresholds(
            self.config.rotation_unlock_degrees,
            self.config.zoom_unlock_delta,
        );
        log::debug!("two pointers down; pinch pending");
        self.session = Session::TwoPending {
            ids,
            pinch,
            started,
        };
    }

    fn pointer_move(
        &mut self,
        event: &PointerEvent,
        viewport: &mut ViewportState,
        actions: &mut Vec<GestureAction>,
    ) {
        if !self.update_pointer(event.id, event.position) {
            return;
        }
        if self.suppressed {
            return;
        }

        let session = std::mem::replace(&mut self.session, Session::Idle);
        self.session = match session {
            Session::SinglePending {
                id,
                start,
                started,
                snapshot,
            } if id == event.id => {
                if start.distance_to(&event.position) > self.config.drag_threshold_px {
                    log::debug!("drag started");
                    viewport.is_panning = true;
                    self.record_sample(start, started);
                    self.drag_to(event, start, &snapshot, viewport, actions);
                    Session::SingleDrag {
                        id,
                        start,
                        snapshot,
                    }
                } else {
                    Session::SinglePending {
                        id,
                        start,
                        started,
                        snapshot,
                    }
                }
            }
            Session::SingleDrag {
                id,
                start,
                snapshot,
            } if id == event.id => {
                self.drag_to(event, start, &snapshot, viewport, actions);
                Session::SingleDrag {
                    id,
                    start,
                    snapshot,
                }
            }
            Session::TwoPending {
                ids,
                mut pinch,
                started,
            } => match self.pinch_geometry(ids) {
                Some(geometry) => {
                    if self.outside_dead_zone(&pinch, &geometry) {
                        log::debug!("pinch active");
                        viewport.is_panning = true;
                        viewport.rotate_and_zoom_from_session(&mut pinch, &geometry);
                        actions.push(GestureAction::Redraw);
                        Session::TwoActive {
                            ids,
                            pinch,
                            started,
                        }
                    } else {
                        Session::TwoPending {
                            ids,
                            pinch,
                            started,
                        }
                    }
                }
                None => {
                    self.snap_pinch(&pinch, viewport, actions);
                    Session::Idle
                }
            },
            Session::TwoActive {
                ids,
                mut pinch,
                started,
            } => match self.pinch_geometry(ids) {
                Some(geometry) => {
                    viewport.rotate_and_zoom_from_session(&mut pinch, &geometry);
                    actions.push(GestureAction::Redraw);
                    Session::TwoActive {
                        ids,
                        pinch,
                        started,
                    }
                }
                None => {
                    log::debug!("pinch update without both pointers; ending session");
                    self.snap_pinch(&pinch, viewport, actions);
                    Session::Idle
                }
            },
            Session::OneFingerZoom {
                id,
                anchor,
                start_y,
                snapshot,
                mut moved,
            } if id == event.id => {
                let dy = start_y - event.position.y;
                if dy.abs() > self.config.one_finger_zoom_move_threshold_px {
                    moved = true;
                }
                if moved {
                    viewport.is_panning = true;
                    viewport.restore(&snapshot);
                    viewport.zoom_at(
                        snapshot.zoom + dy / self.config.one_finger_zoom_px_per_level,
                        anchor,
                    );
                    actions.push(GestureAction::Redraw);
                }
                Session::OneFingerZoom {
                    id,
                    anchor,
                    start_y,
                    snapshot,
                    moved,
                }
            }
            other => other,
        };
    }

    fn drag_to(
        &mut self,
        event: &PointerEvent,
        start: Point,
        snapshot: &ViewSnapshot,
        viewport: &mut ViewportState,
        actions: &mut Vec<GestureAction>,
    ) {
        let delta = event.position.subtract(&start);
        viewport.restore(snapshot);
        viewport.pan_by(delta.x, delta.y);
        self.record_sample(event.position, event.timestamp);
        actions.push(GestureAction::Redraw);
        actions.push(GestureAction::Dragged);
    }

    fn outside_dead_zone(&self, pinch: &PinchSession, geometry: &PointerGeometry) -> bool {
        let initial = &pinch.initial_geometry;
        let ratio = if initial.distance > 0.0 {
            geometry.distance / initial.distance
        } else {
            1.0
        };
        (ratio - 1.0).abs() > self.config.pinch_dead_zone_ratio
            || geometry.centroid.distance_to(&initial.centroid)
                > self.config.pinch_dead_zone_centroid_px
    }

    fn pointer_up(
        &mut self,
        event: &PointerEvent,
        viewport: &mut ViewportState,
        cancelled: bool,
        actions: &mut Vec<GestureAction>,
    ) {
        self.update_pointer(event.id, event.position);

        if self.suppressed {
            self.pointers.retain(|(id, _)| *id != event.id);
            if self.pointers.is_empty() {
                self.suppressed = false;
            }
            return;
        }

        let session = std::mem::replace(&mut self.session, Session::Idle);
        self.session = match session {
            Session::SinglePending { id, .. } if id == event.id => {
                if !cancelled {
                    self.pending_tap = Some((event.position, event.timestamp));
                    self.last_tap = Some((event.position, event.timestamp));
                }
                Session::Idle
            }
            Session::SingleDrag { id, .. } if id == event.id => {
                viewport.is_panning = false;
                self.record_sample(event.position, event.timestamp);
                match self.release_velocity(event.timestamp).filter(|_| !cancelled) {
                    Some(velocity) => {
                        log::debug!(
                            "fling at ({:.2}, {:.2}) px/ms",
                            velocity.x,
                            velocity.y
                        );
                        self.animation = Some(ViewAnimation::Inertia(InertiaAnimation::new(
                            velocity,
                            event.timestamp,
                            self.config.inertia_friction,
                            self.config.inertia_stop_speed,
                        )));
                        actions.push(GestureAction::Redraw);
                    }
                    None => actions.push(GestureAction::Settled),
                }
                Session::Idle
            }
            Session::Consumed { id } if id == event.id => Session::Idle,
            Session::TwoPending { ids, pinch, started } | Session::TwoActive { ids, pinch, started }
                if ids.0 == event.id || ids.1 == event.id =>
            {
                viewport.is_panning = false;
                let remaining = if ids.0 == event.id { ids.1 } else { ids.0 };
                if !cancelled && self.is_two_finger_tap(&pinch, started, event.timestamp, viewport) {
                    log::debug!("two-finger tap; zooming out");
                    let centroid = pinch.last_geometry.centroid;
                    viewport.restore(&pinch.initial);
                    self.animation = Some(ViewAnimation::Zoom(ZoomAnimation::new(
                        pinch.initial,
                        pinch.initial.zoom - 1.0,
                        centroid,
                        event.timestamp,
                        self.zoom_duration(),
                    )));
                    actions.push(GestureAction::Redraw);
                    self.pointers.retain(|(id, _)| *id != event.id);
                    self.session = Session::Consumed { id: remaining };
                    return;
                }
                self.snap_pinch(&pinch, viewport, actions);
                self.pointers.retain(|(id, _)| *id != event.id);
                match self.pointer_position(remaining) {
                    Some(position) if !cancelled => {
                        self.samples.clear();
                        self.record_sample(position, event.timestamp);
                        viewport.is_panning = true;
                        Session::SingleDrag {
                            id: remaining,
                            start: position,
                            snapshot: viewport.snapshot(),
                        }
                    }
                    _ => Session::Idle,
                }
            }
            Session::OneFingerZoom {
                id,
                anchor,
                moved,
                snapshot,
                ..
            } if id == event.id => {
                viewport.is_panning = false;
                if moved {
                    viewport.zoom_at(viewport.zoom().round(), anchor);
                    actions.push(GestureAction::Redraw);
                    actions.push(GestureAction::Settled);
                } else if !cancelled {
                    log::debug!("double tap; zooming in");
                    self.animation = Some(ViewAnimation::Zoom(ZoomAnimation::new(
                        snapshot,
                        snapshot.zoom.round() + 1.0,
                        anchor,
                        event.timestamp,
                        self.zoom_duration(),
                    )));
                    actions.push(GestureAction::Redraw);
                }
                Session::Idle
            }
            other => other,
        };

        self.pointers.retain(|(id, _)| *id != event.id);
    }

    fn zoom_duration(&self) -> Duration {
        Duration::from_millis(self.config.zoom_animation_ms)
    }

    fn is_two_finger_tap(
        &self,
        pinch: &PinchSession,
        started: Instant,
        now: Instant,
        viewport: &ViewportState,
    ) -> bool {
        now.saturating_duration_since(started) < self.config.two_finger_tap()
            && (viewport.zoom() - pinch.initial.zoom).abs() <= self.config.two_finger_tap_zoom_tolerance
            && wrap_angle_delta(viewport.bearing() - pinch.initial.bearing).abs()
                <= self.config.two_finger_tap_bearing_tolerance
    }

    /// Snaps bearing first, then zoom anchored at the last centroid.
    fn snap_pinch(
        &self,
        pinch: &PinchSession,
        viewport: &mut ViewportState,
        actions: &mut Vec<GestureAction>,
    ) {
        viewport.is_panning = false;
        if !pinch.rotation_unlocked {
            viewport.set_bearing(pinch.initial.bearing);
        } else if wrap_angle_delta(viewport.bearing()).abs() <= self.config.bearing_snap_degrees {
            viewport.set_bearing(0.0);
        }
        viewport.zoom_at(viewport.zoom().round(), pinch.last_geometry.centroid);
        actions.push(GestureAction::Redraw);
        actions.push(GestureAction::Settled);
    }

    /// Drops the current session without taps or inertia
    fn end_session(&mut self, viewport: &mut ViewportState, actions: &mut Vec<GestureAction>) {
        let session = std::mem::replace(&mut self.session, Session::Idle);
        match session {
            Session::TwoPending { pinch, .. } | Session::TwoActive { pinch, .. } => {
                self.snap_pinch(&pinch, viewport, actions);
            }
            Session::SingleDrag { .. } => {
                viewport.is_panning = false;
                actions.push(GestureAction::Settled);
            }
            Session::OneFingerZoom { anchor, moved, .. } => {
                viewport.is_panning = false;
                if moved {
                    viewport.zoom_at(viewport.zoom().round(), anchor);
                    actions.push(GestureAction::Redraw);
                    actions.push(GestureAction::Settled);
                }
            }
            _ => {}
        }
    }

    fn record_sample(&mut self, position: Point, at: Instant) {
        let cap = self.config.inertia_samples.max(2);
        while self.samples.len() >= cap {
            self.samples.pop_front();
        }
        self.samples.push_back((position, at));
    }

    /// Pointer velocity over the recent window, in px/ms, if the samples
    /// support a fling.
    fn release_velocity(&self, released: Instant) -> Option<Point> {
        let window = Duration::from_millis(self.config.inertia_window_ms);
        let recent: Vec<_> = self
            .samples
            .iter()
            .filter(|(_, at)| released.saturating_duration_since(*at) <= window)
            .collect();
        let (first, last) = (recent.first()?, recent.last()?);
        if recent.len() < 2 {
            return None;
        }

        let span = last.1.saturating_duration_since(first.1);
        if span < Duration::from_millis(self.config.inertia_min_span_ms) {
            return None;
        }
        let span_ms = span.as_secs_f64() * 1000.0;
        let velocity = last.0.subtract(&first.0).multiply(1.0 / span_ms);
        (velocity.length() >= self.config.inertia_min_speed).then_some(velocity)
    }
}

/// Animated return to north, the shorter way round
pub fn bearing_reset(viewport: &ViewportState, now: Instant, config: &GestureConfig) -> ViewAnimation {
    ViewAnimation::Bearing(BearingAnimation::new(
        viewport.bearing(),
        0.0,
        now,
        Duration::from_millis(config.bearing_reset_ms),
    ))
}

impl Default for GestureEngine {
    fn default() -> Self {
        Self::new(GestureConfig::default())
    }
}
