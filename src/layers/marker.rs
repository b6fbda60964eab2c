use crate::core::geo::LatLng;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A point feature supplied by a collaborator. Fields other than the
/// position, id and label are kept verbatim in `properties`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    #[serde(default)]
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl Marker {
    pub fn new(id: impl Into<String>, position: LatLng) -> Self {
        Self {
            id: id.into(),
            lat: position.lat,
            lon: position.lng,
            label: None,
            properties: serde_json::Map::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn position(&self) -> LatLng {
        LatLng::sanitized(self.lat, self.lon)
    }
}

pub type MarkerClickHandler = Box<dyn Fn(&Marker) + Send + Sync>;

/// A named set of markers drawn at one z-order
pub struct MarkerLayer {
    pub id: String,
    pub markers: Vec<Marker>,
    pub z_order: i32,
    pub visible: bool,
    /// Whether this layer belongs to the reduced subset painted mid-gesture
    pub show_during_gesture: bool,
    on_click: Option<MarkerClickHandler>,
}

impl MarkerLayer {
    pub fn new(id: impl Into<String>, markers: Vec<Marker>) -> Self {
        Self {
            id: id.into(),
            markers,
            z_order: 200,
            visible: true,
            show_during_gesture: false,
            on_click: None,
        }
    }

    /// Builds a layer from a JSON array of `{ "lat", "lon", ... }` objects.
    /// Markers without an id are numbered by position.
    pub fn from_json(id: impl Into<String>, json: &str) -> Result<Self> {
        let mut markers: Vec<Marker> = serde_json::from_str(json)?;
        for (index, marker) in markers.iter_mut().enumerate() {
            if marker.id.is_empty() {
                marker.id = index.to_string();
            }
        }
        Ok(Self::new(id, markers))
    }

    pub fn with_z_order(mut self, z_order: i32) -> Self {
        self.z_order = z_order;
        self
    }

    pub fn shown_during_gesture(mut self, show: bool) -> Self {
        self.show_during_gesture = show;
        self
    }

    pub fn on_click<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Marker) + Send + Sync + 'static,
    {
        self.on_click = Some(Box::new(handler));
        self
    }

    pub fn has_click_handler(&self) -> bool {
        self.on_click.is_some()
    }

    /// Runs the layer's click handler; false if it has none
    pub fn click(&self, marker: &Marker) -> bool {
        match &self.on_click {
            Some(handler) => {
                handler(marker);
                true
            }
            None => false,
        }
    }

    pub fn marker(&self, id: &str) -> Option<&Marker> {
        self.markers.iter().find(|m| m.id == id)
    }
}

impl fmt::Debug for MarkerLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkerLayer")
            .field("id", &self.id)
            .field("markers", &self.markers.len())
            .field("z_order", &self.z_order)
            .field("visible", &self.visible)
            .field("show_during_gesture", &self.show_during_gesture)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_markers_from_json_keep_extra_fields() {
        let layer = MarkerLayer::from_json(
            "peaks",
            r#"[
                { "lat": 37.74, "lon": -119.53, "label": "Half Dome", "elevation": 2694 },
                { "id": "clouds", "lat": 37.75, "lon": -119.52 }
            ]"#,
        )
        .unwrap();

        assert_eq!(layer.markers.len(), 2);
        assert_eq!(layer.markers[0].id, "0");
        assert_eq!(layer.markers[0].label.as_deref(), Some("Half Dome"));
        assert_eq!(layer.markers[0].properties["elevation"], 2694);
        assert!(layer.marker("clouds").is_some());
    }

    #[test]
    fn test_click_handler() {
        let clicks = Arc::new(AtomicUsize::new(0));
        let counter = clicks.clone();
        let layer = MarkerLayer::new("pins", vec![Marker::new("a", LatLng::new(1.0, 2.0))])
            .on_click(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        assert!(layer.click(&layer.markers[0]));
        assert_eq!(clicks.load(Ordering::SeqCst), 1);
        assert!(!MarkerLayer::new("plain", Vec::new()).click(&layer.markers[0]));
    }
}
