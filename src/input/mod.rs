pub mod events;
pub mod gestures;

pub use events::{EventManager, InputEvent, MapEvent, PointerEvent, PointerPhase};
pub use gestures::{GestureAction, GestureEngine, GesturePhase};
