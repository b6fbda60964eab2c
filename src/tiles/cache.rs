use crate::core::config::{EvictionPolicy, TileCacheConfig};
use crate::core::constants::TILE_SIZE;
use crate::core::geo::TileCoord;
use crate::prelude::{Arc, HashMap, Mutex, VecDeque};
use crate::tiles::source::LayerType;
use image::{imageops, RgbaImage};
use lru::LruCache;
use std::fmt;
use std::num::NonZeroUsize;

/// Cache key: one tile of one layer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub layer: String,
    pub coord: TileCoord,
}

impl TileKey {
    pub fn new(layer: impl Into<String>, coord: TileCoord) -> Self {
        Self {
            layer: layer.into(),
            coord,
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.layer, self.coord)
    }
}

/// A decoded raster tile. The cache owns these; callers only read them.
#[derive(Debug, Clone, PartialEq)]
pub struct TileImage {
    pub pixels: RgbaImage,
}

impl TileImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    /// Decodes PNG/JPEG bytes as returned by a tile server.
    pub fn decode(bytes: &[u8]) -> crate::Result<Self> {
        let decoded = image::load_from_memory(bytes)?;
        Ok(Self::new(decoded.to_rgba8()))
    }

    /// Uniformly colored tile of the standard size.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self::new(RgbaImage::from_pixel(TILE_SIZE, TILE_SIZE, image::Rgba(rgba)))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }
}

/// Sub-rectangle of a tile image, in that image's pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl SourceRect {
    pub fn full(size: f64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: size,
            height: size,
        }
    }

    /// The part of an ancestor `levels` above that covers `coord`.
    pub fn for_descendant(coord: TileCoord, levels: u8, tile_size: f64) -> Self {
        let n = 1u32 << levels;
        let size = tile_size / n as f64;
        Self {
            x: (coord.x % n) as f64 * size,
            y: (coord.y % n) as f64 * size,
            width: size,
            height: size,
        }
    }
}

/// Where a coarser tile stands in for a requested one beyond the provider's
/// deepest level. Pure function of `(coord, max_zoom)`.
pub fn overzoom_source(coord: TileCoord, max_zoom: u8, tile_size: f64) -> (TileCoord, SourceRect) {
    if coord.z <= max_zoom {
        return (coord, SourceRect::full(tile_size));
    }
    let levels = coord.z - max_zoom;
    // levels <= z, so the ancestor exists
    let ancestor = coord.ancestor(levels).unwrap_or(coord);
    (ancestor, SourceRect::for_descendant(coord, levels, tile_size))
}

/// Placeholder for a missing tile
#[derive(Debug, Clone)]
pub enum Fallback {
    /// Crop `source` of a cached ancestor and scale it up
    Ancestor {
        coord: TileCoord,
        tile: Arc<TileImage>,
        source: SourceRect,
    },
    /// The four cached children drawn into the parent's footprint
    Children { composite: Arc<TileImage> },
}

/// One layer's share of the cache
enum LayerStore {
    Fifo {
        cap: usize,
        entries: HashMap<TileCoord, Arc<TileImage>>,
        order: VecDeque<TileCoord>,
    },
    Lru(LruCache<TileCoord, Arc<TileImage>>),
}

impl LayerStore {
    fn new(policy: EvictionPolicy, cap: usize) -> Self {
        let cap = cap.max(1);
        match policy {
            EvictionPolicy::Fifo => LayerStore::Fifo {
                cap,
                entries: HashMap::default(),
                order: VecDeque::with_capacity(cap + 1),
            },
            EvictionPolicy::Lru => LayerStore::Lru(LruCache::new(
                NonZeroUsize::new(cap).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Inserts and returns the evicted coordinate, if any
    fn insert(&mut self, coord: TileCoord, tile: Arc<TileImage>) -> Option<TileCoord> {
        match self {
            LayerStore::Fifo {
                cap,
                entries,
                order,
            } => {
                if entries.insert(coord, tile).is_none() {
                    order.push_back(coord);
                }
                if entries.len() > *cap {
                    let oldest = order.pop_front()?;
                    entries.remove(&oldest);
                    return Some(oldest);
                }
                None
            }
            LayerStore::Lru(cache) => match cache.push(coord, tile) {
                Some((evicted, _)) if evicted != coord => Some(evicted),
                _ => None,
            },
        }
    }

    fn get(&mut self, coord: &TileCoord) -> Option<Arc<TileImage>> {
        match self {
            LayerStore::Fifo { entries, .. } => entries.get(coord).cloned(),
            LayerStore::Lru(cache) => cache.get(coord).cloned(),
        }
    }

    fn peek(&self, coord: &TileCoord) -> Option<Arc<TileImage>> {
        match self {
            LayerStore::Fifo { entries, .. } => entries.get(coord).cloned(),
            LayerStore::Lru(cache) => cache.peek(coord).cloned(),
        }
    }

    fn len(&self) -> usize {
        match self {
            LayerStore::Fifo { entries, .. } => entries.len(),
            LayerStore::Lru(cache) => cache.len(),
        }
    }
}

struct CacheInner {
    layers: HashMap<String, LayerStore>,
    caps: HashMap<String, usize>,
}

/// In-memory store of decoded tiles, bounded per layer.
///
/// Clones share the same storage.
#[derive(Clone)]
pub struct TileCache {
    inner: Arc<Mutex<CacheInner>>,
    config: TileCacheConfig,
}

impl fmt::Debug for TileCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileCache")
            .field("config", &self.config)
            .field("len", &self.len())
            .finish()
    }
}

impl TileCache {
    /// Create a new tile cache
    pub fn new(config: TileCacheConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                layers: HashMap::default(),
                caps: HashMap::default(),
            })),
            config,
        }
    }

    pub fn config(&self) -> &TileCacheConfig {
        &self.config
    }

    /// Sets the per-layer cap from the layer's type
    pub fn register_layer(&self, layer: &str, layer_type: LayerType) {
        let cap = match layer_type {
            LayerType::Base => self.config.base_cap,
            LayerType::Overlay => self.config.overlay_cap,
        };
        if let Ok(mut inner) = self.inner.lock() {
            inner.caps.insert(layer.to_string(), cap);
        }
    }

    /// Insert a tile, evicting within the same layer if it is over its cap.
    /// Returns the evicted key, if any.
    pub fn insert(&self, key: TileKey, tile: Arc<TileImage>) -> Option<TileKey> {
        let mut inner = self.inner.lock().ok()?;
        let cap = inner
            .caps
            .get(&key.layer)
            .copied()
            .unwrap_or(self.config.base_cap);
        let policy = self.config.eviction;
        let store = inner
            .layers
            .entry(key.layer.clone())
            .or_insert_with(|| LayerStore::new(policy, cap));

        let evicted = store.insert(key.coord, tile)?;
        log::debug!("evicted tile {}/{} from cache", key.layer, evicted);
        Some(TileKey::new(key.layer, evicted))
    }

    /// Non-blocking lookup for the paint path
    pub fn lookup(&self, layer: &str, coord: TileCoord) -> Option<Arc<TileImage>> {
        let mut inner = self.inner.lock().ok()?;
        inner.layers.get_mut(layer)?.get(&coord)
    }

    /// Lookup that never affects eviction order
    pub fn peek(&self, layer: &str, coord: TileCoord) -> Option<Arc<TileImage>> {
        let inner = self.inner.lock().ok()?;
        inner.layers.get(layer)?.peek(&coord)
    }

    pub fn contains(&self, layer: &str, coord: TileCoord) -> bool {
        self.peek(layer, coord).is_some()
    }

    /// Placeholder for an absent tile: a cached ancestor up to
    /// `fallback_depth` levels up, else the four cached children.
    pub fn fallback(&self, layer: &str, coord: TileCoord) -> Option<Fallback> {
        for levels in 1..=self.config.fallback_depth {
            let Some(ancestor) = coord.ancestor(levels) else {
                break;
            };
            if let Some(tile) = self.peek(layer, ancestor) {
                let source = SourceRect::for_descendant(coord, levels, tile.width() as f64);
                return Some(Fallback::Ancestor {
                    coord: ancestor,
                    tile,
                    source,
                });
            }
        }

        if coord.z >= 31 {
            return None;
        }
        let children = coord.children();
        let mut tiles = Vec::with_capacity(4);
        for child in children {
            tiles.push(self.peek(layer, child)?);
        }
        Some(Fallback::Children {
            composite: Arc::new(composite_children(&tiles)),
        })
    }

    /// Number of tiles cached for one layer
    pub fn layer_len(&self, layer: &str) -> usize {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.layers.get(layer).map(LayerStore::len))
            .unwrap_or(0)
    }

    /// Get the current number of cached tiles
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.layers.values().map(LayerStore::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every tile of one layer
    pub fn clear_layer(&self, layer: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.layers.remove(layer);
        }
    }

    /// Clear all tiles from the cache
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.layers.clear();
        }
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new(TileCacheConfig::default())
    }
}

/// Downsamples four children (top-left, top-right, bottom-left,
/// bottom-right) into one parent-sized image.
fn composite_children(children: &[Arc<TileImage>]) -> TileImage {
    let size = children
        .first()
        .map(|child| child.width())
        .unwrap_or(TILE_SIZE);
    let half = (size / 2).max(1);
    let mut canvas = RgbaImage::new(size, size);

    for (i, child) in children.iter().enumerate().take(4) {
        let scaled = imageops::resize(&child.pixels, half, half, imageops::FilterType::Triangle);
        let dx = (i as i64 % 2) * half as i64;
        let dy = (i as i64 / 2) * half as i64;
        imageops::overlay(&mut canvas, &scaled, dx, dy);
    }
    TileImage::new(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(shade: u8) -> Arc<TileImage> {
        Arc::new(TileImage::solid([shade, shade, shade, 255]))
    }

    fn small_cache(policy: EvictionPolicy) -> TileCache {
        let cache = TileCache::new(TileCacheConfig {
            base_cap: 3,
            overlay_cap: 2,
            eviction: policy,
            ..TileCacheConfig::default()
        });
        cache.register_layer("base", LayerType::Base);
        cache.register_layer("radar", LayerType::Overlay);
        cache
    }

    #[test]
    fn test_tile_cache_basic_operations() {
        let cache = TileCache::default();
        let coord = TileCoord::new(1, 2, 3);
        assert!(cache.is_empty());

        cache.insert(TileKey::new("base", coord), tile(10));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("base", coord));
        assert!(!cache.contains("other", coord));
        assert_eq!(cache.lookup("base", coord).unwrap().pixels.get_pixel(0, 0)[0], 10);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_fifo_eviction_is_per_layer() {
        let cache = small_cache(EvictionPolicy::Fifo);
        cache.insert(TileKey::new("radar", TileCoord::new(0, 0, 1)), tile(1));
        cache.insert(TileKey::new("radar", TileCoord::new(1, 0, 1)), tile(1));

        let first = TileCoord::new(0, 0, 2);
        cache.insert(TileKey::new("base", first), tile(1));
        cache.insert(TileKey::new("base", TileCoord::new(1, 0, 2)), tile(2));
        cache.insert(TileKey::new("base", TileCoord::new(2, 0, 2)), tile(3));

        // A lookup does not protect the oldest entry under FIFO
        assert!(cache.lookup("base", first).is_some());

        let evicted = cache.insert(TileKey::new("base", TileCoord::new(3, 0, 2)), tile(4));
        assert_eq!(evicted, Some(TileKey::new("base", first)));
        assert!(!cache.contains("base", first));
        assert_eq!(cache.layer_len("base"), 3);
        assert_eq!(cache.layer_len("radar"), 2);
    }

    #[test]
    fn test_lru_eviction_honors_lookups() {
        let cache = small_cache(EvictionPolicy::Lru);
        let first = TileCoord::new(0, 0, 2);
        let second = TileCoord::new(1, 0, 2);
        cache.insert(TileKey::new("base", first), tile(1));
        cache.insert(TileKey::new("base", second), tile(2));
        cache.insert(TileKey::new("base", TileCoord::new(2, 0, 2)), tile(3));

        assert!(cache.lookup("base", first).is_some());
        let evicted = cache.insert(TileKey::new("base", TileCoord::new(3, 0, 2)), tile(4));
        assert_eq!(evicted, Some(TileKey::new("base", second)));
        assert!(cache.contains("base", first));
    }

    #[test]
    fn test_fallback_to_ancestor_quadrant() {
        let cache = TileCache::default();
        cache.insert(TileKey::new("base", TileCoord::new(5, 5, 4)), tile(50));

        match cache.fallback("base", TileCoord::new(10, 10, 5)) {
            Some(Fallback::Ancestor { coord, source, .. }) => {
                assert_eq!(coord, TileCoord::new(5, 5, 4));
                assert_eq!(source, SourceRect { x: 0.0, y: 0.0, width: 128.0, height: 128.0 });
            }
            other => panic!("expected ancestor fallback, got {other:?}"),
        }

        match cache.fallback("base", TileCoord::new(23, 22, 6)) {
            Some(Fallback::Ancestor { source, .. }) => {
                // 23 % 4 = 3, 22 % 4 = 2 at quarter size
                assert_eq!(source, SourceRect { x: 192.0, y: 128.0, width: 64.0, height: 64.0 });
            }
            other => panic!("expected ancestor fallback, got {other:?}"),
        }
    }

    #[test]
    fn test_fallback_depth_is_bounded() {
        let cache = TileCache::default();
        cache.insert(TileKey::new("base", TileCoord::new(0, 0, 1)), tile(1));
        // Four levels up is beyond the default depth of three
        assert!(cache.fallback("base", TileCoord::new(0, 0, 5)).is_none());
        assert!(cache.fallback("base", TileCoord::new(0, 0, 4)).is_some());
    }

    #[test]
    fn test_fallback_composites_children() {
        let cache = TileCache::default();
        let parent = TileCoord::new(3, 3, 3);
        for (i, child) in parent.children().into_iter().enumerate() {
            cache.insert(TileKey::new("base", child), tile(40 * (i as u8 + 1)));
        }

        match cache.fallback("base", parent) {
            Some(Fallback::Children { composite }) => {
                assert_eq!(composite.width(), 256);
                assert_eq!(composite.pixels.get_pixel(10, 10)[0], 40);
                assert_eq!(composite.pixels.get_pixel(200, 10)[0], 80);
                assert_eq!(composite.pixels.get_pixel(10, 200)[0], 120);
                assert_eq!(composite.pixels.get_pixel(200, 200)[0], 160);
            }
            other => panic!("expected children fallback, got {other:?}"),
        }

        cache.clear();
        cache.insert(TileKey::new("base", parent.children()[0]), tile(1));
        assert!(cache.fallback("base", parent).is_none());
    }

    #[test]
    fn test_overzoom_source() {
        let (coord, rect) = overzoom_source(TileCoord::new(5, 6, 18), 19, 256.0);
        assert_eq!(coord, TileCoord::new(5, 6, 18));
        assert_eq!(rect, SourceRect::full(256.0));

        let (coord, rect) = overzoom_source(TileCoord::new(13, 6, 19), 17, 256.0);
        assert_eq!(coord, TileCoord::new(3, 1, 17));
        assert_eq!(rect, SourceRect { x: 64.0, y: 128.0, width: 64.0, height: 64.0 });
    }
}
