//! Redraw coalescing and the paint plan.
//!
//! Every view mutation calls [`RenderScheduler::request_redraw`]; the display
//! refresh calls [`RenderScheduler::take_redraw`] once and paints at most one
//! frame no matter how many requests piled up since the last refresh.

use crate::collaborators::OverlayRenderer;
use crate::core::config::RenderConfig;
use crate::core::geo::{Point, TileCoord};
use crate::core::projection::{geo_to_pixel, project};
use crate::core::viewport::{TilePlacement, ViewportState};
use crate::layers::{MarkerLayer, Overlay, OverlayRegistry, TileLayer};
use crate::rendering::surface::{ScreenRect, Surface};
use crate::tiles::cache::{overzoom_source, Fallback, SourceRect, TileCache, TileKey};

/// Markers this far outside the viewport are still painted so that
/// their icons do not pop in at the edge
const MARKER_CULL_MARGIN_PX: f64 = 64.0;

/// Which layers a repaint includes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderProfile {
    /// Every visible layer, attribution and compass
    Full,
    /// Base tiles plus markers flagged for gestures
    Reduced,
}

/// What one paint pass did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    pub tiles: usize,
    pub fallbacks: usize,
    pub placeholders: usize,
    pub markers: usize,
    /// Tiles that were not cached; the caller should request them
    pub missing: Vec<TileKey>,
}

#[derive(Debug, Clone)]
pub struct RenderScheduler {
    redraw_requested: bool,
    reduced_during_gestures: bool,
    frames: u64,
}

impl Default for RenderScheduler {
    fn default() -> Self {
        Self::new(&RenderConfig::default())
    }
}

impl RenderScheduler {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            redraw_requested: false,
            reduced_during_gestures: config.reduced_during_gestures,
            frames: 0,
        }
    }

    /// Marks the view dirty. Cheap; call it after every mutation.
    pub fn request_redraw(&mut self) {
        self.redraw_requested = true;
    }

    pub fn is_redraw_requested(&self) -> bool {
        self.redraw_requested
    }

    /// Consumes the pending request, if any
    pub fn take_redraw(&mut self) -> bool {
        std::mem::replace(&mut self.redraw_requested, false)
    }

    /// Number of frames painted so far
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    pub fn profile_for(&self, gesture_active: bool) -> RenderProfile {
        if gesture_active && self.reduced_during_gestures {
            RenderProfile::Reduced
        } else {
            RenderProfile::Full
        }
    }

    /// Paints one frame from authoritative state.
    ///
    /// Tiles and markers are placed in the unrotated frame; the surface
    /// applies the bearing.
    pub fn paint(
        &mut self,
        surface: &mut dyn Surface,
        viewport: &ViewportState,
        layers: &OverlayRegistry,
        cache: &TileCache,
        profile: RenderProfile,
        overlay: Option<&mut dyn OverlayRenderer>,
    ) -> FrameStats {
        let mut stats = FrameStats::default();
        surface.begin_frame(viewport.size(), viewport.bearing());

        for layer in layers.layers().filter(|layer| layer.is_visible()) {
            match layer {
                Overlay::Tiles(tiles) => {
                    if profile == RenderProfile::Reduced && !tiles.is_base() {
                        continue;
                    }
                    paint_tile_layer(surface, viewport, tiles, cache, &mut stats);
                }
                Overlay::Markers(markers) => {
                    if profile == RenderProfile::Reduced && !markers.show_during_gesture {
                        continue;
                    }
                    paint_marker_layer(surface, viewport, markers, &mut stats);
                }
            }
        }

        if profile == RenderProfile::Full {
            if let Some(renderer) = overlay {
                log::trace!("overlay renderer {}", renderer.name());
                renderer.render(surface, viewport);
            }
            let attribution = layers.attribution();
            if !attribution.is_empty() {
                surface.draw_attribution(&attribution);
            }
            surface.draw_compass(viewport.bearing());
        }

        surface.end_frame();
        self.frames += 1;
        log::trace!(
            "frame {} ({:?}): {} tiles, {} fallbacks, {} placeholders, {} markers",
            self.frames,
            profile,
            stats.tiles,
            stats.fallbacks,
            stats.placeholders,
            stats.markers
        );
        stats
    }
}

/// Where tile `coord` lands in the unrotated frame at the current zoom
pub fn tile_screen_rect(coord: TileCoord, viewport: &ViewportState) -> ScreenRect {
    column_screen_rect(coord.x as i64, coord.y, coord.z, viewport)
}

/// Where a placement lands, following its unwrapped column so that copies
/// of the world east and west of the primary one line up
pub fn placement_screen_rect(placement: TilePlacement, viewport: &ViewportState) -> ScreenRect {
    let coord = placement.coord;
    column_screen_rect(placement.column, coord.y, coord.z, viewport)
}

fn column_screen_rect(column: i64, row: u32, z: u8, viewport: &ViewportState) -> ScreenRect {
    let tile_size = viewport.tile_size();
    let size = viewport.size();
    let zoom = z as f64;
    let center = project(viewport.center(), zoom, tile_size);
    let scale = 2_f64.powf(viewport.zoom() - zoom);

    ScreenRect::new(
        (column as f64 * tile_size - center.x) * scale + size.x / 2.0,
        (row as f64 * tile_size - center.y) * scale + size.y / 2.0,
        tile_size * scale,
        tile_size * scale,
    )
}

/// `inner` is relative to a tile of `tile_size` pixels; re-express it inside
/// `outer`, which covers that same tile in another image
fn nest_rect(outer: SourceRect, inner: SourceRect, tile_size: f64) -> SourceRect {
    let k = outer.width / tile_size;
    SourceRect {
        x: outer.x + inner.x * k,
        y: outer.y + inner.y * k,
        width: inner.width * k,
        height: inner.height * k,
    }
}

fn paint_tile_layer(
    surface: &mut dyn Surface,
    viewport: &ViewportState,
    layer: &TileLayer,
    cache: &TileCache,
    stats: &mut FrameStats,
) {
    let tile_size = viewport.tile_size();
    let layer_id = layer.id();

    for placement in viewport.visible_placements(viewport.tile_zoom()) {
        let coord = placement.coord;
        let dest = placement_screen_rect(placement, viewport);
        let (source_coord, overzoom) = overzoom_source(coord, layer.provider.max_zoom, tile_size);

        if let Some(tile) = cache.lookup(layer_id, source_coord) {
            let source = nest_rect(SourceRect::full(tile.width() as f64), overzoom, tile_size);
            surface.draw_tile(&tile, source, dest, layer.opacity);
            stats.tiles += 1;
            continue;
        }

        let key = TileKey::new(layer_id, source_coord);
        if !stats.missing.contains(&key) {
            stats.missing.push(key);
        }

        match cache.fallback(layer_id, source_coord) {
            Some(Fallback::Ancestor { tile, source, .. }) => {
                surface.draw_tile(&tile, nest_rect(source, overzoom, tile_size), dest, layer.opacity);
                stats.fallbacks += 1;
            }
            Some(Fallback::Children { composite }) => {
                let full = SourceRect::full(composite.width() as f64);
                surface.draw_tile(&composite, nest_rect(full, overzoom, tile_size), dest, layer.opacity);
                stats.fallbacks += 1;
            }
            None => {
                surface.draw_placeholder(dest);
                stats.placeholders += 1;
            }
        }
    }
}

fn paint_marker_layer(
    surface: &mut dyn Surface,
    viewport: &ViewportState,
    layer: &MarkerLayer,
    stats: &mut FrameStats,
) {
    let size = viewport.size();
    let center = Point::new(size.x / 2.0, size.y / 2.0);
    // Any point within the half-diagonal can rotate into view
    let reach = size.length() / 2.0 + MARKER_CULL_MARGIN_PX;

    for marker in &layer.markers {
        let position = marker.position();
        let at = geo_to_pixel(position.lat, position.lng, viewport, size, true);
        if at.distance_to(&center) > reach {
            continue;
        }
        surface.draw_marker(&layer.id, marker, at);
        stats.markers += 1;
    }
}
