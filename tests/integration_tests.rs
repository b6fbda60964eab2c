use async_trait::async_trait;
use slipmap::core::config::TileCacheConfig;
use slipmap::input::events::PointerEvent;
use slipmap::rendering::RecordingSurface;
use slipmap::tiles::cache::overzoom_source;
use slipmap::{
    Fallback, LatLng, LayerType, MapEngine, MapError, Point, SourceRect, TileCache, TileCoord,
    TileFetcher, TileImage, TileKey, TileLoader, TileProvider,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// End-to-end scenarios driving the public API the way a host would
#[cfg(test)]
mod integration_tests {
    use super::*;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    struct PngFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TileFetcher for PngFetcher {
        async fn fetch(&self, _provider: &TileProvider, _coord: TileCoord) -> slipmap::Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let image = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
                256,
                256,
                image::Rgba([200, 200, 200, 255]),
            ));
            let mut bytes = Cursor::new(Vec::new());
            image.write_to(&mut bytes, image::ImageOutputFormat::Png)?;
            Ok(bytes.into_inner())
        }
    }

    fn png_fetcher() -> Arc<PngFetcher> {
        Arc::new(PngFetcher {
            calls: AtomicUsize::new(0),
        })
    }

    fn yosemite() -> MapEngine {
        MapEngine::new(
            LatLng::new(37.4215, -119.1892),
            12.0,
            Point::new(800.0, 600.0),
            png_fetcher(),
        )
    }

    fn at(t0: Instant, millis: u64) -> Instant {
        t0 + Duration::from_millis(millis)
    }

    /// Pinch from 100 px to 200 px around the viewport center zooms in one
    /// level without moving the center
    #[test]
    fn test_centered_pinch_doubles_scale() {
        init_logging();
        let mut engine = yosemite();
        let t0 = Instant::now();

        engine.handle_input(PointerEvent::down(1, 350.0, 300.0, t0).into());
        engine.handle_input(PointerEvent::down(2, 450.0, 300.0, at(t0, 10)).into());
        engine.handle_input(PointerEvent::moved(1, 300.0, 300.0, at(t0, 60)).into());
        engine.handle_input(PointerEvent::moved(2, 500.0, 300.0, at(t0, 80)).into());

        assert!((engine.get_zoom() - 13.0).abs() < 1e-9);
        let center = engine.get_center();
        assert!((center.lat - 37.4215).abs() < 1e-9);
        assert!((center.lng - -119.1892).abs() < 1e-9);

        engine.handle_input(PointerEvent::up(1, 300.0, 300.0, at(t0, 300)).into());
        engine.handle_input(PointerEvent::up(2, 500.0, 300.0, at(t0, 310)).into());
        assert_eq!(engine.get_zoom(), 13.0);
        assert_eq!(engine.get_bearing(), 0.0);
        assert!((engine.get_center().lat - 37.4215).abs() < 1e-9);
    }

    /// A 10 degree twist stays below the rotation unlock threshold
    #[test]
    fn test_small_twist_keeps_bearing() {
        init_logging();
        let mut engine = yosemite();
        let t0 = Instant::now();
        let (sin, cos) = 10_f64.to_radians().sin_cos();

        engine.handle_input(PointerEvent::down(1, 350.0, 300.0, t0).into());
        engine.handle_input(PointerEvent::down(2, 450.0, 300.0, t0).into());
        engine.handle_input(
            PointerEvent::moved(2, 350.0 + 160.0 * cos, 300.0 + 160.0 * sin, at(t0, 100)).into(),
        );

        assert!(engine.is_gesture_active());
        assert!(engine.get_zoom() > 12.5);
        assert_eq!(engine.get_bearing(), 0.0);
    }

    /// Missing tile with a cached parent falls back to the parent's quadrant
    #[test]
    fn test_fallback_to_parent_quadrant() {
        let cache = TileCache::default();
        cache.register_layer("base", LayerType::Base);
        let parent = TileCoord::new(5, 5, 4);
        cache.insert(TileKey::new("base", parent), Arc::new(TileImage::solid([0, 80, 0, 255])));

        match cache.fallback("base", TileCoord::new(10, 10, 5)) {
            Some(Fallback::Ancestor { coord, source, .. }) => {
                assert_eq!(coord, parent);
                assert_eq!(
                    source,
                    SourceRect {
                        x: 0.0,
                        y: 0.0,
                        width: 128.0,
                        height: 128.0
                    }
                );
            }
            other => panic!("expected ancestor fallback, got {:?}", other),
        }
    }

    /// One insert past the cap drops exactly the oldest tile of that layer
    #[test]
    fn test_eviction_is_per_layer() {
        let cache = TileCache::new(TileCacheConfig {
            base_cap: 3,
            overlay_cap: 3,
            ..TileCacheConfig::default()
        });
        cache.register_layer("base", LayerType::Base);
        cache.register_layer("radar", LayerType::Overlay);

        let tile = Arc::new(TileImage::solid([0, 0, 0, 255]));
        cache.insert(TileKey::new("radar", TileCoord::new(0, 0, 1)), tile.clone());
        for x in 0..3 {
            cache.insert(TileKey::new("base", TileCoord::new(x, 0, 2)), tile.clone());
        }
        let evicted = cache.insert(TileKey::new("base", TileCoord::new(3, 0, 2)), tile);

        assert_eq!(evicted, Some(TileKey::new("base", TileCoord::new(0, 0, 2))));
        assert_eq!(cache.layer_len("base"), 3);
        assert!(cache.contains("radar", TileCoord::new(0, 0, 1)));
    }

    /// Past the provider's deepest level the caller loads the ancestor and
    /// crops it
    #[tokio::test]
    async fn test_overzoom_loads_ancestor() {
        init_logging();
        let fetcher = png_fetcher();
        let loader = TileLoader::new(TileCache::default(), fetcher.clone());
        loader.register_provider(TileProvider::new(
            "trails",
            "https://trails/{z}/{x}/{y}.png",
            15,
            LayerType::Overlay,
        ));

        let deep = TileCoord::new(40_000, 20_000, 17);
        let result = loader.request_tile("trails", deep).await;
        assert!(matches!(result, Err(MapError::ZoomExceeded { max_zoom: 15, .. })));

        let (source, rect) = overzoom_source(deep, 15, 256.0);
        assert_eq!(source, TileCoord::new(10_000, 5_000, 15));
        assert_eq!(rect.width, 64.0);

        let tile = loader.request_tile("trails", source).await.unwrap();
        assert_eq!(tile.width(), 256);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    /// Refresh, load, refresh: the second frame has real tiles
    #[tokio::test]
    async fn test_refresh_cycle_fills_viewport() {
        init_logging();
        let mut engine = MapEngine::new(
            LatLng::new(46.0, 8.0),
            6.0,
            Point::new(400.0, 400.0),
            png_fetcher(),
        );
        engine.add_tile_layer(slipmap::layers::TileLayer::new(TileProvider::new(
            "base",
            "https://tiles/{z}/{x}/{y}.png",
            18,
            LayerType::Base,
        )));

        let mut surface = RecordingSurface::new();
        let first = engine.on_display_refresh(&mut surface).unwrap();
        assert!(first.placeholders > 0);

        for _ in 0..200 {
            if engine.loader().pending_count() == 0
                && engine.cache().layer_len("base") >= first.missing.len()
            {
                break;
            }
            tokio::task::yield_now().await;
        }

        let second = engine.on_display_refresh(&mut surface).unwrap();
        assert_eq!(second.placeholders, 0);
        assert_eq!(second.tiles, engine.visible_tiles().len());
        assert_eq!(surface.frames(), 2);
    }
}
