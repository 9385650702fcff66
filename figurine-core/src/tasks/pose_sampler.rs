//! src/tasks/pose_sampler.rs
//!
//! Reads the controller's latest pose at a fixed rate (a UI refresh rate,
//! independent of the control tick) and hands each sample to a sink.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use figurine_common::models::Pose;

/// Runs until `shutdown_rx` turns true or the controller drops its pose sender.
pub fn spawn_pose_sampler<F>(
    pose_rx: watch::Receiver<Pose>,
    rate_hz: f64,
    mut shutdown_rx: watch::Receiver<bool>,
    mut sink: F,
) -> JoinHandle<()>
where
    F: FnMut(Pose) + Send + 'static,
{
    let period = Duration::from_secs_f64(1.0 / rate_hz.max(0.1));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if pose_rx.has_changed().is_err() {
                        break;
                    }
                    let pose = *pose_rx.borrow();
                    sink(pose);
                },
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                },
            }
        }
        info!("pose sampler stopped");
    })
}
