use async_trait::async_trait;
use crossbeam_channel::{unbounded, Receiver, Sender};
use futures::channel::oneshot;

use super::cache::{overzoom_source, TileCache, TileImage, TileKey};
use super::source::TileProvider;
use crate::core::config::{PrefetchConfig, TileCacheConfig};
use crate::core::constants::MAX_TILE_ZOOM;
use crate::core::geo::TileCoord;
use crate::core::projection::geo_to_tile_index;
use crate::core::viewport::ViewportState;
use crate::prelude::{Arc, HashMap, HashSet, Mutex, MutexGuard};
use crate::{MapError, Result};

#[cfg(feature = "http")]
use once_cell::sync::Lazy;

/// Shared async HTTP client for tile fetching
#[cfg(feature = "http")]
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("slipmap/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(30))
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .pool_max_idle_per_host(16)
        .build()
        .unwrap_or_else(|e| {
            log::warn!("falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        })
});

/// Source of raw tile bytes.
#[async_trait]
pub trait TileFetcher: Send + Sync {
    async fn fetch(&self, provider: &TileProvider, coord: TileCoord) -> Result<Vec<u8>>;
}

/// Fetches tiles over HTTP using the provider's URL template
#[cfg(feature = "http")]
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpTileFetcher;

#[cfg(feature = "http")]
#[async_trait]
impl TileFetcher for HttpTileFetcher {
    async fn fetch(&self, provider: &TileProvider, coord: TileCoord) -> Result<Vec<u8>> {
        let url = provider.url(coord);
        let response = HTTP_CLIENT.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(MapError::TileLoadFailed {
                key: TileKey::new(provider.id.clone(), coord),
                reason: format!("HTTP {}", response.status()),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Outcome of a load, reported back to the owner of the loader
#[derive(Debug, Clone, PartialEq)]
pub enum TileEvent {
    Loaded(TileKey),
    Failed { key: TileKey, reason: String },
}

type Waiters = Vec<oneshot::Sender<Option<Arc<TileImage>>>>;

/// Owns the pending entry of a leading request. If the request is dropped
/// before it finishes (outer timeout, cancelled task, panicking fetcher)
/// the entry is cleared and its waiters are released.
struct PendingGuard<'a> {
    loader: &'a TileLoader,
    key: &'a TileKey,
    armed: bool,
}

impl<'a> PendingGuard<'a> {
    fn new(loader: &'a TileLoader, key: &'a TileKey) -> Self {
        Self {
            loader,
            key,
            armed: true,
        }
    }

    fn finish(mut self, result: &Result<Arc<TileImage>>) {
        self.armed = false;
        self.loader.complete(self.key, result);
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        log::debug!("request for tile {} dropped before completion", self.key);
        let cancelled = Err(MapError::TileLoadFailed {
            key: self.key.clone(),
            reason: "request cancelled".to_string(),
        });
        self.loader.complete(self.key, &cancelled);
    }
}

/// Asynchronous tile loader in front of a [`TileCache`].
///
/// Concurrent requests for the same tile share one fetch; late callers wait
/// on the first with a bounded timeout. Clones share all state.
#[derive(Clone)]
pub struct TileLoader {
    cache: TileCache,
    fetcher: Arc<dyn TileFetcher>,
    providers: Arc<Mutex<HashMap<String, TileProvider>>>,
    pending: Arc<Mutex<HashMap<TileKey, Waiters>>>,
    event_tx: Sender<TileEvent>,
    event_rx: Receiver<TileEvent>,
    config: TileCacheConfig,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl TileLoader {
    pub fn new(cache: TileCache, fetcher: Arc<dyn TileFetcher>) -> Self {
        let (event_tx, event_rx) = unbounded();
        let config = cache.config().clone();
        Self {
            cache,
            fetcher,
            providers: Arc::new(Mutex::new(HashMap::default())),
            pending: Arc::new(Mutex::new(HashMap::default())),
            event_tx,
            event_rx,
            config,
        }
    }

    /// Loader that fetches over HTTP
    #[cfg(feature = "http")]
    pub fn with_http(cache: TileCache) -> Self {
        Self::new(cache, Arc::new(HttpTileFetcher))
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn register_provider(&self, provider: TileProvider) {
        self.cache.register_layer(&provider.id, provider.layer_type);
        lock(&self.providers).insert(provider.id.clone(), provider);
    }

    pub fn remove_provider(&self, layer: &str) {
        lock(&self.providers).remove(layer);
        self.cache.clear_layer(layer);
    }

    pub fn provider(&self, layer: &str) -> Option<TileProvider> {
        lock(&self.providers).get(layer).cloned()
    }

    pub fn is_pending(&self, layer: &str, coord: TileCoord) -> bool {
        lock(&self.pending).contains_key(&TileKey::new(layer, coord))
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Returns the tile, loading it if necessary.
    pub async fn request_tile(&self, layer: &str, coord: TileCoord) -> Result<Arc<TileImage>> {
        if let Some(tile) = self.cache.lookup(layer, coord) {
            return Ok(tile);
        }

        let key = TileKey::new(layer, coord);
        let provider = self
            .provider(layer)
            .ok_or_else(|| MapError::UnknownLayer(layer.to_string()))?;

        let waiter = {
            let mut pending = lock(&self.pending);
            match pending.get_mut(&key) {
                Some(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                None => {
                    if coord.z > provider.max_zoom {
                        return Err(MapError::ZoomExceeded {
                            layer: key.layer,
                            zoom: coord.z,
                            max_zoom: provider.max_zoom,
                        });
                    }
                    pending.insert(key.clone(), Vec::new());
                    None
                }
            }
        };

        if let Some(rx) = waiter {
            log::trace!("waiting on pending tile {}", key);
            return match tokio::time::timeout(self.config.pending_timeout(), rx).await {
                Ok(Ok(Some(tile))) => Ok(tile),
                _ => Err(MapError::TileTimeout { key }),
            };
        }

        let guard = PendingGuard::new(self, &key);
        let result = self.load(&provider, &key).await;
        guard.finish(&result);
        result
    }

    async fn load(&self, provider: &TileProvider, key: &TileKey) -> Result<Arc<TileImage>> {
        let bytes = self.fetcher.fetch(provider, key.coord).await?;
        let tile = Arc::new(TileImage::decode(&bytes)?);
        self.cache.insert(key.clone(), tile.clone());
        Ok(tile)
    }

    fn complete(&self, key: &TileKey, result: &Result<Arc<TileImage>>) {
        let waiters = lock(&self.pending).remove(key).unwrap_or_default();
        let tile = result.as_ref().ok().cloned();
        for waiter in waiters {
            let _ = waiter.send(tile.clone());
        }

        let event = match result {
            Ok(_) => {
                log::debug!("loaded tile {}", key);
                TileEvent::Loaded(key.clone())
            }
            Err(e) => {
                log::warn!("tile {} failed: {}", key, e);
                TileEvent::Failed {
                    key: key.clone(),
                    reason: e.to_string(),
                }
            }
        };
        let _ = self.event_tx.send(event);
    }

    /// Fire-and-forget load on the ambient runtime. Cached and in-flight
    /// tiles are skipped.
    pub fn spawn_request(&self, layer: &str, coord: TileCoord) {
        if self.cache.contains(layer, coord) || self.is_pending(layer, coord) {
            return;
        }
        let loader = self.clone();
        let layer = layer.to_string();
        crate::runtime::spawn(async move {
            if let Err(e) = loader.request_tile(&layer, coord).await {
                log::debug!("background request for {}/{} ended: {}", layer, coord, e);
            }
        });
    }

    /// Drains load outcomes reported since the last call
    pub fn try_recv_events(&self) -> Vec<TileEvent> {
        self.event_rx.try_iter().collect()
    }

    /// Speculatively requests the next zoom level around the center.
    /// Returns the number of loads started.
    pub fn prefetch(
        &self,
        viewport: &ViewportState,
        prefetch: &PrefetchConfig,
        gesture_active: bool,
    ) -> usize {
        if gesture_active {
            return 0;
        }
        let targets = prefetch_targets(viewport, prefetch);
        if targets.is_empty() {
            return 0;
        }

        let providers: Vec<TileProvider> = lock(&self.providers).values().cloned().collect();
        let mut started = 0;
        for provider in providers {
            let mut seen = HashSet::default();
            for coord in &targets {
                let (source, _) = overzoom_source(*coord, provider.max_zoom, viewport.tile_size());
                if !seen.insert(source) {
                    continue;
                }
                if self.cache.contains(&provider.id, source) || self.is_pending(&provider.id, source) {
                    continue;
                }
                self.spawn_request(&provider.id, source);
                started += 1;
            }
        }
        if started > 0 {
            log::debug!("prefetching {} tiles at zoom {}", started, viewport.tile_zoom() + 1);
        }
        started
    }
}

/// Tiles at the next integer zoom around the center, once the fractional
/// zoom is past the threshold. Empty otherwise.
pub fn prefetch_targets(viewport: &ViewportState, config: &PrefetchConfig) -> Vec<TileCoord> {
    let zoom = viewport.zoom();
    let fraction = zoom - zoom.floor();
    if !config.enabled || fraction <= config.fraction_threshold {
        return Vec::new();
    }
    let next = zoom.floor() as i64 + 1;
    if next < 0 || next > MAX_TILE_ZOOM as i64 {
        return Vec::new();
    }
    let next = next as u8;

    let center = viewport.center();
    let middle = geo_to_tile_index(center.lat, center.lng, next);
    let n = TileCoord::tiles_per_axis(next) as i64;
    let r = config.radius as i64;

    let mut tiles = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
    for dy in -r..=r {
        for dx in -r..=r {
            let x = (middle.x as i64 + dx).rem_euclid(n);
            let y = middle.y as i64 + dy;
            if y < 0 || y >= n {
                continue;
            }
            let coord = TileCoord::new(x as u32, y as u32, next);
            if !tiles.contains(&coord) {
                tiles.push(coord);
            }
        }
    }
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::{LatLng, Point};
    use crate::tiles::source::LayerType;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn png_bytes() -> Vec<u8> {
        let image = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            4,
            4,
            image::Rgba([1, 2, 3, 255]),
        ));
        let mut bytes = Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, image::ImageOutputFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    struct MockFetcher {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl MockFetcher {
        fn new(delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                fail,
            })
        }
    }

    #[async_trait]
    impl TileFetcher for MockFetcher {
        async fn fetch(&self, provider: &TileProvider, coord: TileCoord) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(MapError::TileLoadFailed {
                    key: TileKey::new(provider.id.clone(), coord),
                    reason: "HTTP 503".into(),
                });
            }
            Ok(png_bytes())
        }
    }

    fn loader(fetcher: Arc<MockFetcher>, timeout_ms: u64) -> TileLoader {
        let cache = TileCache::new(TileCacheConfig {
            pending_timeout_ms: timeout_ms,
            ..TileCacheConfig::default()
        });
        let loader = TileLoader::new(cache, fetcher);
        loader.register_provider(TileProvider::new(
            "base",
            "https://tiles/{z}/{x}/{y}.png",
            5,
            LayerType::Base,
        ));
        loader
    }

    #[tokio::test]
    async fn test_request_stores_in_cache() {
        let fetcher = MockFetcher::new(Duration::ZERO, false);
        let loader = loader(fetcher.clone(), 10_000);
        let coord = TileCoord::new(1, 1, 2);

        let tile = loader.request_tile("base", coord).await.unwrap();
        assert_eq!(tile.width(), 4);
        assert!(loader.cache().contains("base", coord));
        assert_eq!(
            loader.try_recv_events(),
            vec![TileEvent::Loaded(TileKey::new("base", coord))]
        );

        // Second request is served from the cache
        loader.request_tile("base", coord).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_fetch() {
        let fetcher = MockFetcher::new(Duration::from_millis(20), false);
        let loader = loader(fetcher.clone(), 10_000);
        let coord = TileCoord::new(3, 2, 4);

        let (a, b) = tokio::join!(
            loader.request_tile("base", coord),
            loader.request_tile("base", coord)
        );
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(loader.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_times_out() {
        let fetcher = MockFetcher::new(Duration::from_secs(3600), false);
        let loader = loader(fetcher, 100);
        let coord = TileCoord::new(0, 0, 1);

        let (first, second) = tokio::join!(
            loader.request_tile("base", coord),
            loader.request_tile("base", coord)
        );
        assert!(first.is_ok());
        assert!(matches!(second, Err(MapError::TileTimeout { .. })));
    }

    #[tokio::test]
    async fn test_waiter_fails_with_original() {
        let fetcher = MockFetcher::new(Duration::from_millis(5), true);
        let loader = loader(fetcher, 10_000);
        let coord = TileCoord::new(0, 0, 1);

        let (first, second) = tokio::join!(
            loader.request_tile("base", coord),
            loader.request_tile("base", coord)
        );
        assert!(matches!(first, Err(MapError::TileLoadFailed { .. })));
        assert!(matches!(second, Err(MapError::TileTimeout { .. })));
        assert!(matches!(
            loader.try_recv_events().as_slice(),
            [TileEvent::Failed { .. }]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_request_releases_pending_tile() {
        let fetcher = MockFetcher::new(Duration::from_millis(50), false);
        let loader = loader(fetcher.clone(), 10_000);
        let coord = TileCoord::new(1, 1, 2);

        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), loader.request_tile("base", coord)).await;
        assert!(abandoned.is_err());
        assert_eq!(loader.pending_count(), 0);
        assert!(matches!(
            loader.try_recv_events().as_slice(),
            [TileEvent::Failed { .. }]
        ));

        // A fresh request starts its own load instead of waiting on the dead one
        let tile = loader.request_tile("base", coord).await.unwrap();
        assert_eq!(tile.width(), 4);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_released_when_leader_dropped() {
        let fetcher = MockFetcher::new(Duration::from_secs(3600), false);
        let loader = loader(fetcher, 10_000);
        let coord = TileCoord::new(0, 0, 1);
        let started = tokio::time::Instant::now();

        let (leader, waiter) = tokio::join!(
            tokio::time::timeout(Duration::from_millis(10), loader.request_tile("base", coord)),
            loader.request_tile("base", coord)
        );
        assert!(leader.is_err());
        assert!(waiter.is_err());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!loader.is_pending("base", coord));
    }

    #[tokio::test]
    async fn test_zoom_and_layer_validation() {
        let fetcher = MockFetcher::new(Duration::ZERO, false);
        let loader = loader(fetcher.clone(), 10_000);

        let err = loader
            .request_tile("base", TileCoord::new(0, 0, 6))
            .await
            .unwrap_err();
        assert!(matches!(err, MapError::ZoomExceeded { zoom: 6, max_zoom: 5, .. }));

        let err = loader
            .request_tile("nope", TileCoord::new(0, 0, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, MapError::UnknownLayer(_)));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_prefetch_targets() {
        let config = PrefetchConfig::default();
        let mut viewport = ViewportState::new(LatLng::new(0.0, 0.0), 4.5, Point::new(800.0, 600.0));
        assert!(prefetch_targets(&viewport, &config).is_empty());

        viewport.set_zoom(4.7);
        let targets = prefetch_targets(&viewport, &config);
        assert_eq!(targets.len(), 9);
        assert!(targets.iter().all(|t| t.z == 5));
        assert!(targets.contains(&TileCoord::new(16, 16, 5)));

        let disabled = PrefetchConfig {
            enabled: false,
            ..config
        };
        assert!(prefetch_targets(&viewport, &disabled).is_empty());
    }

    #[test]
    fn test_prefetch_runs_ahead_of_level_switch() {
        let config = PrefetchConfig::default();
        let mut viewport =
            ViewportState::new(LatLng::new(37.4215, -119.1892), 12.0, Point::new(800.0, 600.0));

        for zoom in [12.65, 12.7, 12.9] {
            viewport.set_zoom(zoom);
            let targets = prefetch_targets(&viewport, &config);
            assert_eq!(targets.len(), 9);
            let visible = viewport.visible_tiles(viewport.tile_zoom());
            assert!(targets.iter().all(|t| !visible.contains(t)));
        }

        // Once the boundary is crossed the prefetched level is the drawn one
        viewport.set_zoom(13.0);
        let visible = viewport.visible_tiles(viewport.tile_zoom());
        assert!(visible.contains(&geo_to_tile_index(37.4215, -119.1892, 13)));
    }

    #[test]
    fn test_prefetch_targets_wrap_at_world_edge() {
        let viewport = ViewportState::new(LatLng::new(0.0, 179.9), 3.7, Point::new(800.0, 600.0));
        let targets = prefetch_targets(&viewport, &PrefetchConfig::default());
        assert_eq!(targets.len(), 9);
        assert!(targets.contains(&TileCoord::new(0, 8, 4)));
        assert!(targets.iter().all(|t| t.is_valid()));
    }

    #[test]
    fn test_prefetch_suppressed_during_gesture() {
        let loader = loader(MockFetcher::new(Duration::ZERO, false), 10_000);
        let viewport = ViewportState::new(LatLng::new(0.0, 0.0), 3.8, Point::new(800.0, 600.0));
        assert_eq!(loader.prefetch(&viewport, &PrefetchConfig::default(), true), 0);
    }
}
