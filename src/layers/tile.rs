use crate::tiles::source::{LayerType, TileProvider};

/// A raster tile layer as composited by the paint path
#[derive(Debug, Clone, PartialEq)]
pub struct TileLayer {
    pub provider: TileProvider,
    pub opacity: f32,
    pub z_order: i32,
    pub visible: bool,
}

impl TileLayer {
    pub fn new(provider: TileProvider) -> Self {
        // Base maps sit below everything unless told otherwise
        let z_order = match provider.layer_type {
            LayerType::Base => 0,
            LayerType::Overlay => 100,
        };
        Self {
            provider,
            opacity: 1.0,
            z_order,
            visible: true,
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn with_z_order(mut self, z_order: i32) -> Self {
        self.z_order = z_order;
        self
    }

    pub fn id(&self) -> &str {
        &self.provider.id
    }

    pub fn is_base(&self) -> bool {
        self.provider.layer_type == LayerType::Base
    }
}
