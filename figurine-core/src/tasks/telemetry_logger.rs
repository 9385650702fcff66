//! src/tasks/telemetry_logger.rs
//!
//! Spawns a task that subscribes to the EventBus and writes every
//! MotionEvent to the tracing log. Drains the queue on shutdown.

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::eventbus::{EventBus, MotionEvent};

/// Returns the number of events logged once the bus shuts down.
pub fn spawn_telemetry_logger(event_bus: &EventBus, buffer_size: usize) -> JoinHandle<usize> {
    let mut rx = event_bus.subscribe(Some(buffer_size));
    let mut shutdown_rx = event_bus.shutdown_rx.clone();

    tokio::spawn(async move {
        let mut logged = 0usize;
        info!("telemetry logger started (buffer={})", buffer_size);

        loop {
            tokio::select! {
                biased;
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => {
                            log_event(&event);
                            logged += 1;
                        }
                        None => break,
                    }
                },
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                },
            }
        }

        while let Ok(event) = rx.try_recv() {
            log_event(&event);
            logged += 1;
        }
        info!("telemetry logger exited after {} events", logged);
        logged
    })
}

fn log_event(event: &MotionEvent) {
    match event {
        MotionEvent::Detection(d) => info!(
            visible = d.person_visible,
            offset = ?d.offset,
            face_yaw = ?d.face_yaw,
            tracked_secs = d.tracking_duration_secs,
            "detection"
        ),
        MotionEvent::ContextChanged { from, to, heading } => {
            info!(%from, %to, heading = *heading, "context changed")
        }
        MotionEvent::Gesture(t) => debug!(
            hand = %t.hand,
            from = t.from,
            to = t.to,
            reason = t.reason,
            "gesture"
        ),
        MotionEvent::Telemetry(t) => {
            let fields = serde_json::Value::Object(t.fields.clone());
            debug!(source = %t.source, name = %t.name, %fields, "telemetry")
        }
    }
}
