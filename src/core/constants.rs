//! Core constants for the Web-Mercator tile pyramid and the gesture engine.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Latitude limit of the projectable region. Mercator diverges at the poles.
pub const MAX_LATITUDE: f64 = 85.0;

/// Default viewport zoom range.
pub const DEFAULT_MIN_ZOOM: f64 = 3.0;
pub const DEFAULT_MAX_ZOOM: f64 = 19.0;

/// Hard upper bound on integer tile zoom levels.
pub const MAX_TILE_ZOOM: u8 = 24;

/// Per-layer tile cache caps.
pub const BASE_LAYER_CACHE_CAP: usize = 400;
pub const OVERLAY_LAYER_CACHE_CAP: usize = 150;

/// How long a caller waits on someone else's in-flight request for the same tile.
pub const PENDING_TILE_TIMEOUT_MS: u64 = 10_000;

/// How many ancestor levels the paint path searches for a placeholder.
pub const FALLBACK_ANCESTOR_DEPTH: u8 = 3;

/// Single-pointer movement before a press becomes a drag (tolerates digitizer jitter).
pub const DRAG_THRESHOLD_PX: f64 = 15.0;

/// Hold time before a stationary press is a long press.
pub const LONG_PRESS_MS: u64 = 600;

/// Window and radius for the second tap of a double tap.
pub const DOUBLE_TAP_WINDOW_MS: u64 = 350;
pub const DOUBLE_TAP_DISTANCE_PX: f64 = 40.0;

/// Vertical pixels per zoom level during one-finger zoom.
pub const ONE_FINGER_ZOOM_PX_PER_LEVEL: f64 = 150.0;

/// Two-pointer dead zone.
pub const PINCH_DEAD_ZONE_RATIO: f64 = 0.05;
pub const PINCH_DEAD_ZONE_CENTROID_PX: f64 = 8.0;

/// Axis-lock thresholds.
pub const ROTATION_UNLOCK_DEGREES: f64 = 25.0;
pub const ZOOM_UNLOCK_DELTA: f64 = 0.5;

/// Two-finger tap recognition.
pub const TWO_FINGER_TAP_MS: u64 = 400;

/// Inertia sampling.
pub const INERTIA_SAMPLES: usize = 5;
pub const INERTIA_WINDOW_MS: u64 = 100;
pub const INERTIA_MIN_SPAN_MS: u64 = 15;
pub const INERTIA_FRICTION: f64 = 0.95;
