pub mod cache;
pub mod loader;
pub mod source;

// Re-exports for convenience
pub use cache::{overzoom_source, Fallback, SourceRect, TileCache, TileImage, TileKey};
pub use loader::{TileEvent, TileFetcher, TileLoader};
pub use source::{LayerType, TileProvider};
