use crate::core::geo::{LatLng, Point};
use crate::prelude::{HashMap, Instant, VecDeque};
use serde::{Deserialize, Serialize};

/// Lifecycle stage of one pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
    /// The platform took the pointer away (e.g. system gesture)
    Cancel,
}

/// A single pointer sample from the host
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub id: u64,
    pub phase: PointerPhase,
    pub position: Point,
    pub timestamp: Instant,
}

impl PointerEvent {
    pub fn new(id: u64, phase: PointerPhase, position: Point, timestamp: Instant) -> Self {
        Self {
            id,
            phase,
            position,
            timestamp,
        }
    }

    pub fn down(id: u64, x: f64, y: f64, timestamp: Instant) -> Self {
        Self::new(id, PointerPhase::Down, Point::new(x, y), timestamp)
    }

    pub fn moved(id: u64, x: f64, y: f64, timestamp: Instant) -> Self {
        Self::new(id, PointerPhase::Move, Point::new(x, y), timestamp)
    }

    pub fn up(id: u64, x: f64, y: f64, timestamp: Instant) -> Self {
        Self::new(id, PointerPhase::Up, Point::new(x, y), timestamp)
    }
}

/// Input events that can be handled by the map
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Pointer(PointerEvent),
    /// Scroll wheel; positive `notches` zoom in
    Wheel {
        notches: f64,
        position: Point,
        timestamp: Instant,
    },
    /// Viewport/window resize
    Resize { size: Point },
}

impl InputEvent {
    /// Gets the primary position associated with this event, if any
    pub fn position(&self) -> Option<Point> {
        match self {
            InputEvent::Pointer(pointer) => Some(pointer.position),
            InputEvent::Wheel { position, .. } => Some(*position),
            InputEvent::Resize { .. } => None,
        }
    }
}

impl From<PointerEvent> for InputEvent {
    fn from(event: PointerEvent) -> Self {
        InputEvent::Pointer(event)
    }
}

/// Map event types that can be emitted by the map
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    /// Single tap, dispatched once the double-tap window has passed
    Click { lat_lng: LatLng, pixel: Point },
    /// Tap while an interaction mode owns map clicks
    ModeClick { mode: String, lat_lng: LatLng },
    /// Long press without movement
    LongPress { lat_lng: LatLng, pixel: Point },
    /// Tap that hit a marker
    MarkerClick {
        layer_id: String,
        marker_id: String,
        lat_lng: LatLng,
    },
    /// Pan started
    MoveStart { center: LatLng },
    /// View settled after a gesture or animation
    MoveEnd {
        center: LatLng,
        zoom: f64,
        bearing: f64,
    },
    /// Zoom ended
    ZoomEnd { zoom: f64 },
    /// Layer was added to the map
    LayerAdd { layer_id: String },
    /// Layer was removed from the map
    LayerRemove { layer_id: String },
}

impl MapEvent {
    /// Listener key for this event
    pub fn event_type(&self) -> &'static str {
        match self {
            MapEvent::Click { .. } => "click",
            MapEvent::ModeClick { .. } => "modeclick",
            MapEvent::LongPress { .. } => "longpress",
            MapEvent::MarkerClick { .. } => "markerclick",
            MapEvent::MoveStart { .. } => "movestart",
            MapEvent::MoveEnd { .. } => "moveend",
            MapEvent::ZoomEnd { .. } => "zoomend",
            MapEvent::LayerAdd { .. } => "layeradd",
            MapEvent::LayerRemove { .. } => "layerremove",
        }
    }
}

/// Event listener callback type
pub type EventCallback = Box<dyn Fn(&MapEvent) + Send + Sync>;

/// Event management system for the map
#[derive(Default)]
pub struct EventManager {
    /// Event listeners by event type
    listeners: HashMap<&'static str, Vec<EventCallback>>,
    /// Event queue for processing
    event_queue: VecDeque<MapEvent>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event listener. `event_type` is one of the keys
    /// returned by [`MapEvent::event_type`].
    pub fn on<F>(&mut self, event_type: &'static str, callback: F)
    where
        F: Fn(&MapEvent) + Send + Sync + 'static,
    {
        self.listeners
            .entry(event_type)
            .or_default()
            .push(Box::new(callback));
    }

    /// Emit an event to the queue
    pub fn emit(&mut self, event: MapEvent) {
        self.event_queue.push_back(event);
    }

    /// Dispatches all queued events to their listeners and returns them
    pub fn process_events(&mut self) -> Vec<MapEvent> {
        let events: Vec<_> = self.event_queue.drain(..).collect();

        for event in &events {
            if let Some(callbacks) = self.listeners.get(event.event_type()) {
                for callback in callbacks {
                    callback(event);
                }
            }
        }

        events
    }

    /// Get number of pending events
    pub fn pending_events(&self) -> usize {
        self.event_queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_listeners_receive_matching_events() {
        let mut events = EventManager::new();
        let move_ends = Arc::new(AtomicUsize::new(0));
        let counter = move_ends.clone();
        events.on("moveend", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        events.emit(MapEvent::MoveEnd {
            center: LatLng::new(1.0, 2.0),
            zoom: 4.0,
            bearing: 0.0,
        });
        events.emit(MapEvent::ZoomEnd { zoom: 4.0 });
        assert_eq!(events.pending_events(), 2);

        let processed = events.process_events();
        assert_eq!(processed.len(), 2);
        assert_eq!(move_ends.load(Ordering::SeqCst), 1);
        assert_eq!(events.pending_events(), 0);
    }

    #[test]
    fn test_input_event_position() {
        let now = Instant::now();
        let pointer: InputEvent = PointerEvent::down(1, 3.0, 4.0, now).into();
        assert_eq!(pointer.position(), Some(Point::new(3.0, 4.0)));
        assert_eq!(
            InputEvent::Resize {
                size: Point::new(10.0, 10.0)
            }
            .position(),
            None
        );
    }
}
