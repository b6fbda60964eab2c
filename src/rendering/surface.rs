use crate::core::geo::Point;
use crate::layers::Marker;
use crate::rendering::bridge::Affine;
use crate::tiles::cache::{SourceRect, TileImage};

/// Destination rectangle in unrotated screen pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Drawing target of the paint path.
///
/// Tiles and markers arrive in the unrotated frame; the surface rotates
/// the whole frame by `bearing` about the viewport center.
pub trait Surface {
    fn begin_frame(&mut self, size: Point, bearing: f64);

    /// Draws `source` of `tile` scaled into `dest`
    fn draw_tile(&mut self, tile: &TileImage, source: SourceRect, dest: ScreenRect, opacity: f32);

    /// Empty placeholder where no tile or fallback is available
    fn draw_placeholder(&mut self, dest: ScreenRect);

    fn draw_marker(&mut self, layer_id: &str, marker: &Marker, at: Point);

    fn draw_attribution(&mut self, text: &str);

    fn draw_compass(&mut self, bearing: f64);

    fn end_frame(&mut self);

    /// Applies (or clears) a transform over the already painted frame
    fn set_transform(&mut self, _transform: Option<Affine>) {}
}

/// One call received by a [`RecordingSurface`]
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    BeginFrame { size: Point, bearing: f64 },
    Tile { width: u32, source: SourceRect, dest: ScreenRect, opacity: f32 },
    Placeholder { dest: ScreenRect },
    Marker { layer_id: String, marker_id: String, at: Point },
    Attribution(String),
    Compass(f64),
    EndFrame,
    Transform(Option<Affine>),
}

/// Surface that records every call instead of drawing. Handy for headless
/// hosts and for asserting on the paint plan.
#[derive(Debug, Default, Clone)]
pub struct RecordingSurface {
    pub commands: Vec<DrawCommand>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::BeginFrame { .. }))
            .count()
    }

    pub fn tiles(&self) -> impl Iterator<Item = &DrawCommand> {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Tile { .. }))
    }

    pub fn markers(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Marker { marker_id, .. } => Some(marker_id.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl Surface for RecordingSurface {
    fn begin_frame(&mut self, size: Point, bearing: f64) {
        self.commands.push(DrawCommand::BeginFrame { size, bearing });
    }

    fn draw_tile(&mut self, tile: &TileImage, source: SourceRect, dest: ScreenRect, opacity: f32) {
        self.commands.push(DrawCommand::Tile {
            width: tile.width(),
            source,
            dest,
            opacity,
        });
    }

    fn draw_placeholder(&mut self, dest: ScreenRect) {
        self.commands.push(DrawCommand::Placeholder { dest });
    }

    fn draw_marker(&mut self, layer_id: &str, marker: &Marker, at: Point) {
        self.commands.push(DrawCommand::Marker {
            layer_id: layer_id.to_string(),
            marker_id: marker.id.clone(),
            at,
        });
    }

    fn draw_attribution(&mut self, text: &str) {
        self.commands.push(DrawCommand::Attribution(text.to_string()));
    }

    fn draw_compass(&mut self, bearing: f64) {
        self.commands.push(DrawCommand::Compass(bearing));
    }

    fn end_frame(&mut self) {
        self.commands.push(DrawCommand::EndFrame);
    }

    fn set_transform(&mut self, transform: Option<Affine>) {
        self.commands.push(DrawCommand::Transform(transform));
    }
}
