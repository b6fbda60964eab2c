//! Custom overlay layers registered by collaborators.

pub mod manager;
pub mod marker;
pub mod tile;

pub use manager::{MarkerHit, Overlay, OverlayRegistry};
pub use marker::{Marker, MarkerClickHandler, MarkerLayer};
pub use tile::TileLayer;
