use crate::core::geo::Point;
use crate::core::viewport::ViewportState;
use crate::layers::marker::{Marker, MarkerLayer};
use crate::layers::tile::TileLayer;
use crate::prelude::HashMap;
use crate::{MapError, Result};

/// One registered layer
#[derive(Debug)]
pub enum Overlay {
    Tiles(TileLayer),
    Markers(MarkerLayer),
}

impl Overlay {
    pub fn id(&self) -> &str {
        match self {
            Overlay::Tiles(layer) => layer.id(),
            Overlay::Markers(layer) => &layer.id,
        }
    }

    pub fn z_order(&self) -> i32 {
        match self {
            Overlay::Tiles(layer) => layer.z_order,
            Overlay::Markers(layer) => layer.z_order,
        }
    }

    pub fn is_visible(&self) -> bool {
        match self {
            Overlay::Tiles(layer) => layer.visible,
            Overlay::Markers(layer) => layer.visible,
        }
    }
}

/// A marker found under a screen position
#[derive(Debug, Clone, Copy)]
pub struct MarkerHit<'a> {
    pub layer: &'a MarkerLayer,
    pub marker: &'a Marker,
    pub distance: f64,
}

/// Registry of tile and marker layers, kept in z-order for compositing
#[derive(Debug, Default)]
pub struct OverlayRegistry {
    /// All layers indexed by ID
    layers: HashMap<String, Overlay>,
    /// Layer IDs sorted by z-order; equal z-orders keep insertion order
    render_order: Vec<String>,
}

impl OverlayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a layer, replacing any layer with the same id
    pub fn add(&mut self, layer: Overlay) {
        let layer_id = layer.id().to_string();
        let z_order = layer.z_order();
        self.remove(&layer_id);
        self.layers.insert(layer_id.clone(), layer);

        // Insert in sorted order by z-order
        let insert_pos = self
            .render_order
            .iter()
            .position(|id| {
                self.layers
                    .get(id)
                    .map(|l| l.z_order() > z_order)
                    .unwrap_or(false)
            })
            .unwrap_or(self.render_order.len());

        self.render_order.insert(insert_pos, layer_id);
    }

    pub fn add_tile_layer(&mut self, layer: TileLayer) {
        self.add(Overlay::Tiles(layer));
    }

    pub fn add_marker_layer(&mut self, layer: MarkerLayer) {
        self.add(Overlay::Markers(layer));
    }

    /// Removes a layer from the registry
    pub fn remove(&mut self, layer_id: &str) -> Option<Overlay> {
        self.render_order.retain(|id| id != layer_id);
        self.layers.remove(layer_id)
    }

    pub fn get(&self, layer_id: &str) -> Option<&Overlay> {
        self.layers.get(layer_id)
    }

    pub fn contains(&self, layer_id: &str) -> bool {
        self.layers.contains_key(layer_id)
    }

    pub fn marker_layer_mut(&mut self, layer_id: &str) -> Option<&mut MarkerLayer> {
        match self.layers.get_mut(layer_id) {
            Some(Overlay::Markers(layer)) => Some(layer),
            _ => None,
        }
    }

    pub fn set_opacity(&mut self, layer_id: &str, opacity: f32) -> Result<()> {
        match self.layers.get_mut(layer_id) {
            Some(Overlay::Tiles(layer)) => {
                layer.opacity = opacity.clamp(0.0, 1.0);
                Ok(())
            }
            _ => Err(MapError::UnknownLayer(layer_id.to_string())),
        }
    }

    pub fn set_visible(&mut self, layer_id: &str, visible: bool) -> Result<()> {
        match self.layers.get_mut(layer_id) {
            Some(Overlay::Tiles(layer)) => layer.visible = visible,
            Some(Overlay::Markers(layer)) => layer.visible = visible,
            None => return Err(MapError::UnknownLayer(layer_id.to_string())),
        }
        Ok(())
    }

    /// Gets all layers in render order, bottom first
    pub fn layers(&self) -> impl Iterator<Item = &Overlay> + '_ {
        self.render_order
            .iter()
            .filter_map(|id| self.layers.get(id))
    }

    pub fn tile_layers(&self) -> impl Iterator<Item = &TileLayer> + '_ {
        self.layers().filter_map(|layer| match layer {
            Overlay::Tiles(tiles) => Some(tiles),
            Overlay::Markers(_) => None,
        })
    }

    pub fn marker_layers(&self) -> impl Iterator<Item = &MarkerLayer> + '_ {
        self.layers().filter_map(|layer| match layer {
            Overlay::Markers(markers) => Some(markers),
            Overlay::Tiles(_) => None,
        })
    }

    /// Attribution of the visible tile layers, bottom first
    pub fn attribution(&self) -> String {
        let parts: Vec<&str> = self
            .tile_layers()
            .filter(|layer| layer.visible && !layer.provider.attribution.is_empty())
            .map(|layer| layer.provider.attribution.as_str())
            .collect();
        parts.join(" | ")
    }

    /// The nearest marker within `radius` pixels of `pixel`, searching the
    /// topmost visible marker layer that has a hit.
    pub fn hit_test(
        &self,
        pixel: Point,
        viewport: &ViewportState,
        radius: f64,
    ) -> Option<MarkerHit<'_>> {
        let mut ordered: Vec<&MarkerLayer> = self.marker_layers().filter(|l| l.visible).collect();
        ordered.reverse();

        for layer in ordered {
            let nearest = layer
                .markers
                .iter()
                .map(|marker| {
                    let at = viewport.lat_lng_to_pixel(&marker.position());
                    (marker, at.distance_to(&pixel))
                })
                .filter(|(_, distance)| *distance <= radius)
                .min_by(|a, b| a.1.total_cmp(&b.1));

            if let Some((marker, distance)) = nearest {
                return Some(MarkerHit {
                    layer,
                    marker,
                    distance,
                });
            }
        }
        None
    }

    /// Gets the number of layers
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Checks if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
