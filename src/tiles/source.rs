use crate::core::geo::TileCoord;
use serde::{Deserialize, Serialize};

/// Whether a layer is a base map or something drawn over it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Base,
    Overlay,
}

/// Describes one raster tile layer: where its tiles come from and how deep
/// the provider goes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileProvider {
    pub id: String,
    /// URL with `{z}`, `{x}`, `{y}` and optionally `{s}` placeholders
    pub url_template: String,
    pub max_zoom: u8,
    pub layer_type: LayerType,
    #[serde(default)]
    pub attribution: String,
    #[serde(default)]
    pub subdomains: Vec<String>,
}

impl TileProvider {
    pub fn new(
        id: impl Into<String>,
        url_template: impl Into<String>,
        max_zoom: u8,
        layer_type: LayerType,
    ) -> Self {
        Self {
            id: id.into(),
            url_template: url_template.into(),
            max_zoom,
            layer_type,
            attribution: String::new(),
            subdomains: Vec::new(),
        }
    }

    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        self.attribution = attribution.into();
        self
    }

    pub fn with_subdomains<S: Into<String>>(mut self, subdomains: impl IntoIterator<Item = S>) -> Self {
        self.subdomains = subdomains.into_iter().map(Into::into).collect();
        self
    }

    /// OpenStreetMap standard tiles.
    pub fn openstreetmap() -> Self {
        Self::new(
            "osm",
            "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
            19,
            LayerType::Base,
        )
        .with_subdomains(["a", "b", "c"])
        .with_attribution("© OpenStreetMap contributors")
    }

    /// Build a URL for the requested `coord`.
    pub fn url(&self, coord: TileCoord) -> String {
        let mut url = self
            .url_template
            .replace("{z}", &coord.z.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string());

        if url.contains("{s}") {
            let sub = if self.subdomains.is_empty() {
                ""
            } else {
                let idx = ((coord.x as usize) + (coord.y as usize)) % self.subdomains.len();
                self.subdomains[idx].as_str()
            };
            url = url.replace("{s}", sub);
        }
        url
    }
}
