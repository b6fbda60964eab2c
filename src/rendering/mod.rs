pub mod bridge;
pub mod scheduler;
pub mod surface;

// Re-export main types
pub use bridge::{Affine, CompositorBridge};
pub use scheduler::{
    placement_screen_rect, tile_screen_rect, FrameStats, RenderProfile, RenderScheduler,
};
pub use surface::{DrawCommand, RecordingSurface, ScreenRect, Surface};
