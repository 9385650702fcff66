//! src/eventbus/mod.rs
//!
//! In-process fan-out of controller output (detection flips, context changes,
//! gesture transitions, telemetry) to any number of subscribers via bounded
//! MPSC queues. Publishing never waits: the controller tick must not stall on
//! a slow consumer, so a full subscriber queue drops the event instead.

use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::warn;

use figurine_common::models::{DetectionUpdate, TelemetryEvent};

use crate::motion::gestures::GestureTransition;
use crate::motion::MotionContext;

/// Everything the controller publishes.
#[derive(Debug, Clone)]
pub enum MotionEvent {
    /// The "person visible" flag flipped.
    Detection(DetectionUpdate),

    /// The source of the desired heading changed.
    ContextChanged {
        from: MotionContext,
        to: MotionContext,
        heading: f64,
    },

    Gesture(GestureTransition),

    /// Structured diagnostics from the controller or a joint driver.
    Telemetry(TelemetryEvent),
}

impl MotionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            MotionEvent::Detection(_) => "detection",
            MotionEvent::ContextChanged { .. } => "context_changed",
            MotionEvent::Gesture(_) => "gesture",
            MotionEvent::Telemetry(_) => "telemetry",
        }
    }
}

/// Each subscriber gets its own `mpsc::Sender<MotionEvent>`.
///
/// - If a subscriber's buffer is full, the event is dropped for that subscriber.
/// - If a subscriber has dropped its `Receiver`, it is pruned on the next publish.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<MotionEvent>>>>,
    shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Default size for each subscriber's buffer.
const DEFAULT_BUFFER_SIZE: usize = 1024;

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Returns a receiver on which events will be delivered.
    pub fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<MotionEvent> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE).max(1);
        let (tx, rx) = mpsc::channel(size);
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Publish an event to all subscribers without waiting.
    pub fn publish(&self, event: MotionEvent) {
        let mut subs = self.subscribers.lock();
        subs.retain(|s| match s.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("event bus: subscriber queue full, dropped '{}' event", event.event_type());
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    pub fn publish_telemetry(&self, event: TelemetryEvent) {
        self.publish(MotionEvent::Telemetry(event));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
