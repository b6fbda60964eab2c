use crate::{
    animation::{ViewAnimation, ZoomAnimation},
    collaborators::{
        ContextMenuHandler, OverlayRenderer, PersistedView, PositionProvider, ViewStore,
    },
    core::{
        config::{EngineConfig, EngineProfile},
        geo::{LatLng, Point, TileCoord},
        projection,
        viewport::ViewportState,
    },
    input::{
        events::{EventManager, InputEvent, MapEvent},
        gestures::{bearing_reset, GestureAction, GestureEngine, GesturePhase},
    },
    layers::{MarkerLayer, Overlay, OverlayRegistry, TileLayer},
    rendering::{
        bridge::{Affine, CompositorBridge},
        scheduler::{FrameStats, RenderScheduler},
        surface::Surface,
    },
    prelude::{Arc, Duration, Instant},
    tiles::{
        cache::TileCache,
        loader::{TileEvent, TileFetcher, TileLoader},
    },
    MapError, Result,
};

/// One interactive map.
///
/// Owns the authoritative view, the tile cache and loader, the gesture
/// state machine, the overlay registry and the render scheduler. Several
/// engines can live side by side; they share nothing but the process-wide
/// task spawner.
///
/// All methods are meant to be called from one logical thread: pointer
/// input through [`handle_input`](Self::handle_input), timers through
/// [`tick`](Self::tick) and painting through
/// [`on_display_refresh`](Self::on_display_refresh).
pub struct MapEngine {
    config: EngineConfig,
    viewport: ViewportState,
    loader: TileLoader,
    gestures: GestureEngine,
    layers: OverlayRegistry,
    events: EventManager,
    scheduler: RenderScheduler,
    bridge: CompositorBridge,

    overlay_renderer: Option<Box<dyn OverlayRenderer>>,
    position_provider: Option<Box<dyn PositionProvider>>,
    context_menu: Option<Box<dyn ContextMenuHandler>>,
    view_store: Option<Box<dyn ViewStore>>,

    /// Trailing deadline for the debounced move-end notification
    move_end_due: Option<Instant>,
    /// Trailing deadline for saving the view during a drag
    persist_due: Option<Instant>,
    /// Zoom when the current movement started
    move_start_zoom: Option<f64>,
    /// A bridge transform is on the surface and must be cleared
    bridged: bool,
}

impl MapEngine {
    /// Engine with the balanced profile
    pub fn new(center: LatLng, zoom: f64, size: Point, fetcher: Arc<dyn TileFetcher>) -> Self {
        Self::build(EngineConfig::default(), center, zoom, size, fetcher)
    }

    /// Engine with a preset or custom profile; custom configurations are
    /// validated first
    pub fn with_profile(
        profile: EngineProfile,
        center: LatLng,
        zoom: f64,
        size: Point,
        fetcher: Arc<dyn TileFetcher>,
    ) -> Result<Self> {
        let config = profile.resolve();
        config.validate()?;
        Ok(Self::build(config, center, zoom, size, fetcher))
    }

    /// Engine that loads tiles over HTTP
    #[cfg(feature = "http")]
    pub fn with_http(center: LatLng, zoom: f64, size: Point) -> Self {
        Self::new(
            center,
            zoom,
            size,
            Arc::new(crate::tiles::loader::HttpTileFetcher),
        )
    }

    fn build(
        config: EngineConfig,
        center: LatLng,
        zoom: f64,
        size: Point,
        fetcher: Arc<dyn TileFetcher>,
    ) -> Self {
        let mut viewport = ViewportState::new(center, zoom, size);
        viewport.set_zoom_limits(config.min_zoom, config.max_zoom);
        viewport.set_zoom(zoom);

        let cache = TileCache::new(config.tiles.clone());
        let mut scheduler = RenderScheduler::new(&config.render);
        scheduler.request_redraw();

        Self {
            loader: TileLoader::new(cache, fetcher),
            gestures: GestureEngine::new(config.gesture.clone()),
            layers: OverlayRegistry::new(),
            events: EventManager::new(),
            bridge: CompositorBridge::new(config.render.compositor_bridge),
            scheduler,
            viewport,
            config,
            overlay_renderer: None,
            position_provider: None,
            context_menu: None,
            view_store: None,
            move_end_due: None,
            persist_due: None,
            move_start_zoom: None,
            bridged: false,
        }
    }

    /// Attaches settings storage and restores the view saved there, if any.
    /// A store that fails to load leaves the initial view in place.
    pub fn with_view_store(mut self, store: Box<dyn ViewStore>) -> Self {
        match store.load() {
            Ok(Some(view)) => {
                log::debug!("restoring view {:?}", view);
                self.viewport.restore(&view.snapshot());
            }
            Ok(None) => {}
            Err(e) => log::warn!("could not load saved view: {}", e),
        }
        self.view_store = Some(store);
        self
    }

    pub fn with_overlay_renderer(mut self, renderer: Box<dyn OverlayRenderer>) -> Self {
        self.overlay_renderer = Some(renderer);
        self
    }

    pub fn with_position_provider(mut self, provider: Box<dyn PositionProvider>) -> Self {
        self.position_provider = Some(provider);
        self
    }

    pub fn with_context_menu(mut self, handler: Box<dyn ContextMenuHandler>) -> Self {
        self.context_menu = Some(handler);
        self
    }

    // Query surface

    pub fn get_center(&self) -> LatLng {
        self.viewport.center()
    }

    pub fn get_zoom(&self) -> f64 {
        self.viewport.zoom()
    }

    pub fn get_bearing(&self) -> f64 {
        self.viewport.bearing()
    }

    /// Jumps to a view. Cancels any animation; the move counts as settled.
    pub fn set_center(&mut self, lat: f64, lon: f64, zoom: Option<f64>) {
        self.gestures.cancel_animation();
        self.move_start_zoom.get_or_insert(self.viewport.zoom());
        self.viewport.set_center(LatLng::new(lat, lon));
        if let Some(zoom) = zoom {
            self.viewport.set_zoom(zoom);
        }
        self.scheduler.request_redraw();
        self.settled(Instant::now());
    }

    /// Screen pixel of a coordinate, bearing applied
    pub fn geo_to_pixel(&self, lat: f64, lon: f64) -> Point {
        projection::geo_to_pixel(lat, lon, &self.viewport, self.viewport.size(), false)
    }

    pub fn pixel_to_geo(&self, x: f64, y: f64) -> LatLng {
        projection::pixel_to_geo(x, y, &self.viewport, self.viewport.size())
    }

    /// Animates the bearing back to north
    pub fn reset_bearing(&mut self, now: Instant) {
        if self.viewport.bearing() == 0.0 {
            return;
        }
        let animation = bearing_reset(&self.viewport, now, self.gestures.config());
        self.gestures.start_animation(animation);
        self.scheduler.request_redraw();
    }

    /// Animates the zoom keeping the coordinate under `anchor` in place
    pub fn animate_zoom_at(&mut self, zoom: f64, anchor: Point, now: Instant) {
        self.move_start_zoom.get_or_insert(self.viewport.zoom());
        let duration = Duration::from_millis(self.config.gesture.zoom_animation_ms);
        let animation = ZoomAnimation::new(self.viewport.snapshot(), zoom, anchor, now, duration);
        self.gestures.start_animation(ViewAnimation::Zoom(animation));
        self.scheduler.request_redraw();
    }

    /// Centers on the position reported by the position provider.
    /// Returns the position, or `None` without a provider or a fix.
    pub fn center_on_position(&mut self) -> Option<LatLng> {
        let position = self.position_provider.as_ref()?.current_position()?;
        self.set_center(position.lat, position.lng, None);
        Some(position)
    }

    pub fn set_size(&mut self, size: Point) {
        self.viewport.set_size(size);
        self.bridge.clear();
        self.scheduler.request_redraw();
    }

    pub fn set_interaction_mode(&mut self, mode: Option<String>) {
        self.viewport.interaction_mode = mode;
    }

    /// Tiles covering the viewport at the drawn zoom, nearest first
    pub fn visible_tiles(&self) -> Vec<TileCoord> {
        self.viewport.visible_tiles(self.viewport.tile_zoom())
    }

    pub fn meters_per_pixel(&self) -> f64 {
        self.viewport.meters_per_pixel()
    }

    pub fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn layers(&self) -> &OverlayRegistry {
        &self.layers
    }

    pub fn cache(&self) -> &TileCache {
        self.loader.cache()
    }

    pub fn loader(&self) -> &TileLoader {
        &self.loader
    }

    pub fn gesture_phase(&self) -> GesturePhase {
        self.gestures.phase()
    }

    pub fn is_gesture_active(&self) -> bool {
        self.gestures.is_active()
    }

    pub fn is_redraw_requested(&self) -> bool {
        self.scheduler.is_redraw_requested()
    }

    // Layers

    pub fn add_tile_layer(&mut self, layer: TileLayer) {
        let layer_id = layer.id().to_string();
        self.loader.register_provider(layer.provider.clone());
        self.layers.add_tile_layer(layer);
        self.layer_added(layer_id);
    }

    pub fn add_marker_layer(&mut self, layer: MarkerLayer) {
        let layer_id = layer.id.clone();
        self.layers.add_marker_layer(layer);
        self.layer_added(layer_id);
    }

    fn layer_added(&mut self, layer_id: String) {
        log::debug!("layer {} added", layer_id);
        self.events.emit(MapEvent::LayerAdd { layer_id });
        self.scheduler.request_redraw();
    }

    /// Removes a layer; a tile layer's cached tiles go with it
    pub fn remove_layer(&mut self, layer_id: &str) -> Result<()> {
        match self.layers.remove(layer_id) {
            Some(Overlay::Tiles(_)) => self.loader.remove_provider(layer_id),
            Some(Overlay::Markers(_)) => {}
            None => return Err(MapError::UnknownLayer(layer_id.to_string())),
        }
        self.events.emit(MapEvent::LayerRemove {
            layer_id: layer_id.to_string(),
        });
        self.scheduler.request_redraw();
        Ok(())
    }

    pub fn set_layer_opacity(&mut self, layer_id: &str, opacity: f32) -> Result<()> {
        self.layers.set_opacity(layer_id, opacity)?;
        self.scheduler.request_redraw();
        Ok(())
    }

    pub fn set_layer_visible(&mut self, layer_id: &str, visible: bool) -> Result<()> {
        self.layers.set_visible(layer_id, visible)?;
        self.scheduler.request_redraw();
        Ok(())
    }

    // Events

    /// Registers a listener for one event type (see [`MapEvent::event_type`])
    pub fn on<F>(&mut self, event_type: &'static str, callback: F)
    where
        F: Fn(&MapEvent) + Send + Sync + 'static,
    {
        self.events.on(event_type, callback);
    }

    pub fn on_move_end<F>(&mut self, callback: F)
    where
        F: Fn(&MapEvent) + Send + Sync + 'static,
    {
        self.on("moveend", callback);
    }

    pub fn on_click<F>(&mut self, callback: F)
    where
        F: Fn(&MapEvent) + Send + Sync + 'static,
    {
        self.on("click", callback);
    }

    pub fn on_long_press<F>(&mut self, callback: F)
    where
        F: Fn(&MapEvent) + Send + Sync + 'static,
    {
        self.on("longpress", callback);
    }

    // Input

    pub fn handle_input(&mut self, input: InputEvent) {
        match input {
            InputEvent::Pointer(pointer) => {
                let was_active = self.gestures.is_active();
                let actions = self.gestures.handle_pointer(&pointer, &mut self.viewport);
                let active = self.gestures.is_active();
                if active && !was_active {
                    self.move_started();
                }
                self.viewport.is_panning = active;
                self.apply_actions(actions, pointer.timestamp);
            }
            InputEvent::Wheel {
                notches,
                position,
                timestamp,
            } => {
                if !self.gestures.is_active() && self.move_start_zoom.is_none() {
                    self.move_started();
                }
                let actions = self.gestures.wheel(notches, position, &mut self.viewport);
                self.apply_actions(actions, timestamp);
            }
            InputEvent::Resize { size } => self.set_size(size),
        }
    }

    fn move_started(&mut self) {
        self.move_end_due = None;
        self.move_start_zoom.get_or_insert(self.viewport.zoom());
        self.events.emit(MapEvent::MoveStart {
            center: self.viewport.center(),
        });
    }

    fn apply_actions(&mut self, actions: Vec<GestureAction>, now: Instant) {
        for action in actions {
            match action {
                GestureAction::Redraw => self.scheduler.request_redraw(),
                GestureAction::Dragged => {
                    self.persist_due = Some(now + self.drag_debounce());
                }
                GestureAction::Settled => self.settled(now),
                GestureAction::Tap(pixel) => self.tapped(pixel),
                GestureAction::LongPress(pixel) => {
                    let lat_lng = self.viewport.pixel_to_lat_lng(&pixel);
                    if let Some(handler) = self.context_menu.as_mut() {
                        handler.open(lat_lng, pixel);
                    }
                    self.events.emit(MapEvent::LongPress { lat_lng, pixel });
                }
            }
        }
    }

    fn drag_debounce(&self) -> Duration {
        Duration::from_millis(self.config.persistence.drag_debounce_ms)
    }

    fn settled(&mut self, now: Instant) {
        self.persist_due = None;
        self.persist();
        self.move_end_due =
            Some(now + Duration::from_millis(self.config.persistence.move_end_debounce_ms));
    }

    fn tapped(&mut self, pixel: Point) {
        let lat_lng = self.viewport.pixel_to_lat_lng(&pixel);

        if let Some(mode) = self.viewport.interaction_mode.clone() {
            self.events.emit(MapEvent::ModeClick { mode, lat_lng });
            return;
        }

        let radius = self.config.render.marker_hit_radius_px;
        if let Some(hit) = self.layers.hit_test(pixel, &self.viewport, radius) {
            hit.layer.click(hit.marker);
            self.events.emit(MapEvent::MarkerClick {
                layer_id: hit.layer.id.clone(),
                marker_id: hit.marker.id.clone(),
                lat_lng: hit.marker.position(),
            });
            return;
        }

        self.events.emit(MapEvent::Click { lat_lng, pixel });
    }

    fn persist(&mut self) {
        let Some(store) = self.view_store.as_mut() else {
            return;
        };
        let view = PersistedView::from_viewport(&self.viewport);
        if let Err(e) = store.save(&view) {
            log::warn!("could not save view: {}", e);
        }
    }

    /// Fires due timers and animations, then dispatches queued events to
    /// their listeners and returns them.
    pub fn tick(&mut self, now: Instant) -> Vec<MapEvent> {
        let actions = self.gestures.tick(&mut self.viewport, now);
        self.apply_actions(actions, now);

        if self.persist_due.is_some_and(|due| now >= due) {
            self.persist_due = None;
            self.persist();
        }

        if self.move_end_due.is_some_and(|due| now >= due) && !self.gestures.is_active() {
            self.move_end_due = None;
            let zoom = self.viewport.zoom();
            self.events.emit(MapEvent::MoveEnd {
                center: self.viewport.center(),
                zoom,
                bearing: self.viewport.bearing(),
            });
            if let Some(start) = self.move_start_zoom.take() {
                if (start - zoom).abs() > f64::EPSILON {
                    self.events.emit(MapEvent::ZoomEnd { zoom });
                }
            }
        }

        self.events.process_events()
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.gestures.next_deadline(),
            self.persist_due,
            self.move_end_due,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// True while fingers or an inertia/zoom animation are moving the view
    pub fn is_in_motion(&self) -> bool {
        self.gestures.is_active() || self.gestures.is_animating()
    }

    /// Display refresh callback. Paints at most one frame, however many
    /// changes were requested since the last refresh, and starts loads for
    /// the tiles the frame was missing.
    pub fn on_display_refresh(&mut self, surface: &mut dyn Surface) -> Option<FrameStats> {
        for event in self.loader.try_recv_events() {
            match event {
                TileEvent::Loaded(_) => self.scheduler.request_redraw(),
                TileEvent::Failed { key, reason } => {
                    log::debug!("painting fallback for {}: {}", key, reason)
                }
            }
        }

        if !self.scheduler.take_redraw() {
            return None;
        }

        if self.bridged {
            surface.set_transform(None);
            self.bridged = false;
        }

        let in_motion = self.is_in_motion();
        let profile = self.scheduler.profile_for(in_motion);
        let overlay = self
            .overlay_renderer
            .as_mut()
            .map(|renderer| renderer.as_mut() as &mut dyn OverlayRenderer);
        let stats = self.scheduler.paint(
            surface,
            &self.viewport,
            &self.layers,
            self.loader.cache(),
            profile,
            overlay,
        );
        self.bridge.commit(&self.viewport);

        for key in &stats.missing {
            self.loader.spawn_request(&key.layer, key.coord);
        }
        self.loader
            .prefetch(&self.viewport, &self.config.prefetch, in_motion);

        Some(stats)
    }

    /// Transform from the last painted frame to the current view while a
    /// gesture or its follow-up animation is moving the map
    pub fn bridge_transform(&self) -> Option<Affine> {
        if !self.is_in_motion() {
            return None;
        }
        self.bridge.predict(&self.viewport)
    }

    /// Moves the last painted frame to track the gesture until the next
    /// refresh repaints it. Returns false when there is nothing to apply.
    pub fn apply_bridge(&mut self, surface: &mut dyn Surface) -> bool {
        match self.bridge_transform() {
            Some(transform) => {
                surface.set_transform(Some(transform));
                self.bridged = true;
                true
            }
            None => false,
        }
    }
}
