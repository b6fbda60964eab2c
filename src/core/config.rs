//! Configuration system for engine behavior tuning
//!
//! A hierarchical configuration that can be built from presets or loaded
//! from a (partial) JSON document; every field falls back to its default.

use crate::core::constants::*;
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineProfile {
    Balanced,
    LowMemory,
    Custom(EngineConfig),
}

impl EngineProfile {
    pub fn resolve(&self) -> EngineConfig {
        match self {
            Self::Balanced => EngineConfig::default(),
            Self::LowMemory => EngineConfig {
                tiles: TileCacheConfig {
                    base_cap: 160,
                    overlay_cap: 60,
                    ..TileCacheConfig::default()
                },
                prefetch: PrefetchConfig {
                    enabled: false,
                    ..PrefetchConfig::default()
                },
                ..EngineConfig::default()
            },
            Self::Custom(config) => config.clone(),
        }
    }
}

impl Default for EngineProfile {
    fn default() -> Self {
        Self::Balanced
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub gesture: GestureConfig,
    pub tiles: TileCacheConfig,
    pub prefetch: PrefetchConfig,
    pub render: RenderConfig,
    pub persistence: PersistenceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            gesture: GestureConfig::default(),
            tiles: TileCacheConfig::default(),
            prefetch: PrefetchConfig::default(),
            render: RenderConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_zoom > self.max_zoom {
            return Err(MapError::Config(format!(
                "min_zoom {} is above max_zoom {}",
                self.min_zoom, self.max_zoom
            )));
        }
        if self.tiles.base_cap == 0 || self.tiles.overlay_cap == 0 {
            return Err(MapError::Config("tile cache caps must be non-zero".into()));
        }
        if !(0.0..1.0).contains(&self.prefetch.fraction_threshold) {
            return Err(MapError::Config(
                "prefetch fraction_threshold must be in [0, 1)".into(),
            ));
        }
        if self.gesture.one_finger_zoom_px_per_level <= 0.0 {
            return Err(MapError::Config(
                "one_finger_zoom_px_per_level must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Gesture thresholds. Pixel values are logical pixels, times are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub drag_threshold_px: f64,
    pub long_press_ms: u64,
    pub double_tap_window_ms: u64,
    pub double_tap_distance_px: f64,
    pub one_finger_zoom_px_per_level: f64,
    pub one_finger_zoom_move_threshold_px: f64,
    pub pinch_dead_zone_ratio: f64,
    pub pinch_dead_zone_centroid_px: f64,
    pub rotation_unlock_degrees: f64,
    pub zoom_unlock_delta: f64,
    pub two_finger_tap_ms: u64,
    pub two_finger_tap_zoom_tolerance: f64,
    pub two_finger_tap_bearing_tolerance: f64,
    pub bearing_snap_degrees: f64,
    pub inertia_samples: usize,
    pub inertia_window_ms: u64,
    pub inertia_min_span_ms: u64,
    /// Pixels per millisecond
    pub inertia_min_speed: f64,
    pub inertia_stop_speed: f64,
    pub inertia_friction: f64,
    pub zoom_animation_ms: u64,
    pub bearing_reset_ms: u64,
    /// Zoom levels per wheel notch
    pub wheel_zoom_step: f64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            drag_threshold_px: DRAG_THRESHOLD_PX,
            long_press_ms: LONG_PRESS_MS,
            double_tap_window_ms: DOUBLE_TAP_WINDOW_MS,
            double_tap_distance_px: DOUBLE_TAP_DISTANCE_PX,
            one_finger_zoom_px_per_level: ONE_FINGER_ZOOM_PX_PER_LEVEL,
            one_finger_zoom_move_threshold_px: 10.0,
            pinch_dead_zone_ratio: PINCH_DEAD_ZONE_RATIO,
            pinch_dead_zone_centroid_px: PINCH_DEAD_ZONE_CENTROID_PX,
            rotation_unlock_degrees: ROTATION_UNLOCK_DEGREES,
            zoom_unlock_delta: ZOOM_UNLOCK_DELTA,
            two_finger_tap_ms: TWO_FINGER_TAP_MS,
            two_finger_tap_zoom_tolerance: 0.1,
            two_finger_tap_bearing_tolerance: 2.0,
            bearing_snap_degrees: 7.0,
            inertia_samples: INERTIA_SAMPLES,
            inertia_window_ms: INERTIA_WINDOW_MS,
            inertia_min_span_ms: INERTIA_MIN_SPAN_MS,
            inertia_min_speed: 0.25,
            inertia_stop_speed: 0.02,
            inertia_friction: INERTIA_FRICTION,
            zoom_animation_ms: 250,
            bearing_reset_ms: 300,
            wheel_zoom_step: 1.0,
        }
    }
}

impl GestureConfig {
    pub fn long_press(&self) -> Duration {
        Duration::from_millis(self.long_press_ms)
    }

    pub fn double_tap_window(&self) -> Duration {
        Duration::from_millis(self.double_tap_window_ms)
    }

    pub fn two_finger_tap(&self) -> Duration {
        Duration::from_millis(self.two_finger_tap_ms)
    }
}

/// Eviction order within one layer's share of the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Oldest insertion goes first, regardless of use
    Fifo,
    /// Least recently looked-up goes first
    Lru,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileCacheConfig {
    pub base_cap: usize,
    pub overlay_cap: usize,
    pub pending_timeout_ms: u64,
    pub eviction: EvictionPolicy,
    pub fallback_depth: u8,
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            base_cap: BASE_LAYER_CACHE_CAP,
            overlay_cap: OVERLAY_LAYER_CACHE_CAP,
            pending_timeout_ms: PENDING_TILE_TIMEOUT_MS,
            eviction: EvictionPolicy::Fifo,
            fallback_depth: FALLBACK_ANCESTOR_DEPTH,
        }
    }
}

impl TileCacheConfig {
    pub fn pending_timeout(&self) -> Duration {
        Duration::from_millis(self.pending_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    pub enabled: bool,
    /// Fraction of the way to the next integer zoom that triggers prefetch
    pub fraction_threshold: f64,
    /// Tiles on each side of the center tile
    pub radius: u32,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fraction_threshold: 0.6,
            radius: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub compositor_bridge: bool,
    pub reduced_during_gestures: bool,
    pub marker_hit_radius_px: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            compositor_bridge: true,
            reduced_during_gestures: true,
            marker_hit_radius_px: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub drag_debounce_ms: u64,
    pub move_end_debounce_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            drag_debounce_ms: 500,
            move_end_debounce_ms: 250,
        }
    }
}
