//! # slipmap
//!
//! An interactive slippy-map viewport engine.
//!
//! The crate projects geographic coordinates onto a 2D raster surface,
//! keeps the authoritative pan/zoom/rotation state, loads and caches raster
//! tiles from several providers and drives all of it from multi-pointer
//! gesture input. Everything hangs off a single [`MapEngine`] value so that
//! several independent maps can live side by side.

pub mod animation;
pub mod collaborators;
pub mod core;
pub mod input;
pub mod layers;
pub mod prelude;
pub mod rendering;
pub mod runtime;
pub mod tiles;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    config::{EngineConfig, EngineProfile},
    geo::{LatLng, Point, TileCoord},
    map::MapEngine,
    projection::{geo_to_pixel, geo_to_tile_index, pixel_to_geo},
    viewport::{TilePlacement, ViewportState},
};

pub use input::{
    events::{MapEvent, PointerEvent, PointerPhase},
    gestures::{GestureEngine, GesturePhase},
};

pub use rendering::{
    bridge::{Affine, CompositorBridge},
    scheduler::{RenderProfile, RenderScheduler},
    surface::Surface,
};

pub use tiles::{
    cache::{Fallback, SourceRect, TileCache, TileImage, TileKey},
    loader::{TileFetcher, TileLoader},
    source::{LayerType, TileProvider},
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
///
/// Every failure in this crate is local and recoverable; the worst outcome
/// for a caller is a stale or placeholder tile.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("zoom {zoom} exceeds max zoom {max_zoom} of layer {layer}")]
    ZoomExceeded { layer: String, zoom: u8, max_zoom: u8 },

    #[error("timed out waiting for tile {key}")]
    TileTimeout { key: TileKey },

    #[error("tile {key} failed to load: {reason}")]
    TileLoadFailed { key: TileKey, reason: String },

    #[error("unknown layer: {0}")]
    UnknownLayer(String),

    #[error("Decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[cfg(feature = "http")]
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

/// Error type alias for convenience
pub type Error = MapError;
