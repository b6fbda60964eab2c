//! Optional capability interfaces.
//!
//! Collaborators are plugged into a [`MapEngine`](crate::MapEngine) when it
//! is composed. The engine holds each one as an `Option` and simply skips
//! the capability when it is absent.

use crate::core::geo::{LatLng, Point};
use crate::core::viewport::{ViewSnapshot, ViewportState};
use crate::rendering::surface::Surface;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Paints extra content on top of every full repaint
pub trait OverlayRenderer: Send {
    fn name(&self) -> &str;

    fn render(&mut self, surface: &mut dyn Surface, viewport: &ViewportState);
}

/// Source of the device's current position
pub trait PositionProvider: Send {
    fn current_position(&self) -> Option<LatLng>;
}

/// Handles a long press on the map
pub trait ContextMenuHandler: Send {
    fn open(&mut self, lat_lng: LatLng, pixel: Point);
}

/// Storage for the last settled view
pub trait ViewStore: Send {
    fn load(&self) -> Result<Option<PersistedView>>;

    fn save(&mut self, view: &PersistedView) -> Result<()>;
}

/// View state as written to settings storage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersistedView {
    pub lat: f64,
    pub lon: f64,
    pub zoom: f64,
    #[serde(default)]
    pub bearing: f64,
}

impl PersistedView {
    pub fn from_viewport(viewport: &ViewportState) -> Self {
        let center = viewport.center();
        Self {
            lat: center.lat,
            lon: center.lng,
            zoom: viewport.zoom(),
            bearing: viewport.bearing(),
        }
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            center: LatLng::sanitized(self.lat, self.lon),
            zoom: self.zoom,
            bearing: self.bearing,
        }
    }
}

/// Keeps the view in a small JSON file
#[derive(Debug, Clone)]
pub struct JsonFileViewStore {
    path: PathBuf,
}

impl JsonFileViewStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ViewStore for JsonFileViewStore {
    fn load(&self) -> Result<Option<PersistedView>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    fn save(&mut self, view: &PersistedView) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(view)?)?;
        log::debug!("saved view to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("slipmap-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_json_store_round_trip() {
        let path = temp_path("view.json");
        let mut store = JsonFileViewStore::new(&path);
        assert!(store.load().unwrap().is_none());

        let view = PersistedView {
            lat: 37.4215,
            lon: -119.1892,
            zoom: 12.0,
            bearing: 15.0,
        };
        store.save(&view).unwrap();
        assert_eq!(store.load().unwrap(), Some(view));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_bearing_defaults_when_missing() {
        let view: PersistedView =
            serde_json::from_str(r#"{ "lat": 10.0, "lon": 20.0, "zoom": 5.0 }"#).unwrap();
        assert_eq!(view.bearing, 0.0);

        let path = temp_path("broken.json");
        fs::write(&path, "not json").unwrap();
        assert!(JsonFileViewStore::new(&path).load().is_err());
        let _ = fs::remove_file(&path);
    }
}
