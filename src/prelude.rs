//! Prelude module for common slipmap types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use slipmap::prelude::*;`

pub use crate::core::{
    config::{
        EngineConfig, EngineProfile, EvictionPolicy, GestureConfig, PersistenceConfig,
        PrefetchConfig, RenderConfig, TileCacheConfig,
    },
    geo::{LatLng, Point, TileCoord},
    map::MapEngine,
    projection::{center_for_anchor, geo_to_pixel, geo_to_tile_index, pixel_to_geo},
    viewport::{PinchSession, PointerGeometry, TilePlacement, ViewSnapshot, ViewportState},
};

pub use crate::input::{
    events::{EventManager, InputEvent, MapEvent, PointerEvent, PointerPhase},
    gestures::{GestureAction, GestureEngine, GesturePhase},
};

pub use crate::animation::{EasingType, ViewAnimation};

pub use crate::collaborators::{
    ContextMenuHandler, JsonFileViewStore, OverlayRenderer, PersistedView, PositionProvider,
    ViewStore,
};

pub use crate::layers::{Marker, MarkerLayer, OverlayRegistry, TileLayer};

pub use crate::rendering::{
    bridge::{Affine, CompositorBridge},
    scheduler::{FrameStats, RenderProfile, RenderScheduler},
    surface::{RecordingSurface, ScreenRect, Surface},
};

pub use crate::runtime::{runtime, spawn, AsyncHandle, AsyncSpawner};

pub use crate::tiles::{
    cache::{Fallback, SourceRect, TileCache, TileImage, TileKey},
    loader::{TileEvent, TileFetcher, TileLoader},
    source::{LayerType, TileProvider},
};

pub use crate::{Error as MapError, Result};

pub use std::{
    collections::VecDeque,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};

pub use futures::Future;
