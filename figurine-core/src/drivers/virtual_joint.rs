//! src/drivers/virtual_joint.rs
//!
//! A simulated joint: moves towards its target at the velocity limit on a
//! fixed step, reports every step through the position observer and can be
//! told to stall against a hard stop, attach slowly or fail writes.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use figurine_common::models::{JointConfig, JointId, TelemetryEvent, ValueRange};
use figurine_common::traits::{JointDriver, PositionObserver, TelemetryLogger};
use figurine_common::Error;

const DEFAULT_VELOCITY: f64 = 180.0;

#[derive(Debug, Clone)]
pub struct VirtualJointOptions {
    /// How long `open` takes to attach.
    pub attach_delay: Duration,
    /// Logical limits tighter than the configured range; the joint stalls there.
    pub hard_stop: Option<ValueRange>,
    pub step: Duration,
    /// Targets closer than this to the current one are ignored.
    pub epsilon: f64,
    /// Accepted targets kept for `history`; older ones are dropped.
    pub history_limit: usize,
}

impl Default for VirtualJointOptions {
    fn default() -> Self {
        Self {
            attach_delay: Duration::from_millis(50),
            hard_stop: None,
            step: Duration::from_millis(10),
            epsilon: 0.01,
            history_limit: 4096,
        }
    }
}

struct Inner {
    attached: bool,
    /// Physical units; equal to logical unless the joint is reversed.
    position: f64,
    target: f64,
    last_logical_target: Option<f64>,
    velocity: f64,
    failing_writes: u32,
    history: VecDeque<f64>,
    shutdowns: u32,
    observer: Option<PositionObserver>,
    telemetry: Option<TelemetryLogger>,
    sim: Option<JoinHandle<()>>,
}

pub struct VirtualJoint {
    config: JointConfig,
    options: VirtualJointOptions,
    inner: Arc<Mutex<Inner>>,
}

impl VirtualJoint {
    pub fn new(config: JointConfig) -> Self {
        Self::with_options(config, VirtualJointOptions::default())
    }

    pub fn with_options(config: JointConfig, options: VirtualJointOptions) -> Self {
        let home = config.orientation.to_physical(config.home, &config.range);
        let velocity = config.velocity_limit.unwrap_or(DEFAULT_VELOCITY);
        Self {
            config,
            options,
            inner: Arc::new(Mutex::new(Inner {
                attached: false,
                position: home,
                target: home,
                last_logical_target: None,
                velocity,
                failing_writes: 0,
                history: VecDeque::new(),
                shutdowns: 0,
                observer: None,
                telemetry: None,
                sim: None,
            })),
        }
    }

    /// Current measured logical position.
    pub fn position(&self) -> f64 {
        let position = self.inner.lock().position;
        self.config.orientation.to_logical(position, &self.config.range)
    }

    pub fn is_attached(&self) -> bool {
        self.inner.lock().attached
    }

    /// The most recent logical targets accepted by `move_to_logical`, oldest first.
    pub fn history(&self) -> Vec<f64> {
        self.inner.lock().history.iter().copied().collect()
    }

    pub fn shutdown_count(&self) -> u32 {
        self.inner.lock().shutdowns
    }

    pub fn velocity(&self) -> f64 {
        self.inner.lock().velocity
    }

    /// The next `count` writes fail with a driver error.
    pub fn fail_next_writes(&self, count: u32) {
        self.inner.lock().failing_writes = count;
    }

    fn log(&self, event: TelemetryEvent) {
        let logger = self.inner.lock().telemetry.clone();
        if let Some(logger) = logger {
            logger(event);
        }
    }

    fn telemetry(&self, name: &str) -> TelemetryEvent {
        TelemetryEvent::new(self.config.id.to_string(), name)
    }

    /// Physical travel limits: the configured range, narrowed by the hard stop.
    fn physical_limits(&self) -> (f64, f64) {
        let logical = match self.options.hard_stop {
            Some(stop) => ValueRange::new(
                stop.lower.max(self.config.range.lower),
                stop.upper.min(self.config.range.upper),
            ),
            None => self.config.range,
        };
        let a = self.config.orientation.to_physical(logical.lower, &self.config.range);
        let b = self.config.orientation.to_physical(logical.upper, &self.config.range);
        (a.min(b), a.max(b))
    }

    fn spawn_sim(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let (low, high) = self.physical_limits();
        let orientation = self.config.orientation;
        let range = self.config.range;
        let step = self.options.step;
        let id = self.config.id;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(step);
            let dt = step.as_secs_f64();
            loop {
                interval.tick().await;
                let (logical, observer) = {
                    let mut s = inner.lock();
                    if !s.attached {
                        break;
                    }
                    let max_step = s.velocity.max(0.0) * dt;
                    let delta = (s.target - s.position).clamp(-max_step, max_step);
                    s.position = (s.position + delta).clamp(low, high);
                    (orientation.to_logical(s.position, &range), s.observer.clone())
                };
                if let Some(observer) = observer {
                    observer(logical);
                }
            }
            trace!("{} simulation stopped", id);
        })
    }
}

#[async_trait]
impl JointDriver for VirtualJoint {
    fn id(&self) -> JointId {
        self.config.id
    }

    async fn open(&self, timeout: Duration) -> Result<(), Error> {
        if self.options.attach_delay > timeout {
            tokio::time::sleep(timeout).await;
            self.log(self.telemetry("attach_timeout"));
            return Err(Error::AttachmentTimeout(self.config.id));
        }
        tokio::time::sleep(self.options.attach_delay).await;

        {
            let mut s = self.inner.lock();
            if s.attached {
                return Ok(());
            }
            s.attached = true;
        }
        let handle = self.spawn_sim();
        self.inner.lock().sim = Some(handle);

        debug!("{} (virtual) attached", self.config.id);
        self.log(self.telemetry("attached").with("position", self.position()));
        Ok(())
    }

    fn move_to_logical(&self, value: f64) -> Result<(), Error> {
        let id = self.config.id;
        let mut s = self.inner.lock();
        if !s.attached {
            return Err(Error::driver(id, "not attached"));
        }
        if s.failing_writes > 0 {
            s.failing_writes -= 1;
            return Err(Error::driver(id, "write failed"));
        }
        if !value.is_finite() {
            return Err(Error::driver(id, format!("non-finite target {}", value)));
        }
        let value = self.config.clamp(value);
        if let Some(last) = s.last_logical_target {
            if (value - last).abs() < self.options.epsilon {
                return Ok(());
            }
        }
        s.last_logical_target = Some(value);
        s.target = self.config.orientation.to_physical(value, &self.config.range);
        if self.options.history_limit > 0 {
            if s.history.len() == self.options.history_limit {
                s.history.pop_front();
            }
            s.history.push_back(value);
        }
        Ok(())
    }

    fn set_velocity(&self, limit: f64) -> Result<(), Error> {
        if !(limit.is_finite() && limit > 0.0) {
            return Err(Error::driver(self.config.id, format!("invalid velocity {}", limit)));
        }
        let mut s = self.inner.lock();
        if s.failing_writes > 0 {
            s.failing_writes -= 1;
            return Err(Error::driver(self.config.id, "write failed"));
        }
        s.velocity = limit;
        Ok(())
    }

    fn shutdown(&self) {
        let handle = {
            let mut s = self.inner.lock();
            s.shutdowns += 1;
            if !s.attached && s.sim.is_none() {
                return;
            }
            s.attached = false;
            s.last_logical_target = None;
            s.sim.take()
        };
        if let Some(h) = handle {
            h.abort();
        }
        debug!("{} (virtual) released", self.config.id);
        self.log(self.telemetry("released"));
    }

    fn set_position_observer(&self, observer: PositionObserver) {
        self.inner.lock().observer = Some(observer);
    }

    fn set_telemetry_logger(&self, logger: TelemetryLogger) {
        self.inner.lock().telemetry = Some(logger);
    }
}

impl Drop for VirtualJoint {
    fn drop(&mut self) {
        if let Some(h) = self.inner.lock().sim.take() {
            h.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figurine_common::models::{Orientation, Settings};

    fn hand() -> JointConfig {
        Settings::default().joints.left_hand
    }

    #[tokio::test(start_paused = true)]
    async fn test_moves_towards_target_at_velocity_limit() {
        let joint = VirtualJoint::new(hand().with_velocity_limit(100.0));
        joint.open(Duration::from_secs(1)).await.unwrap();
        joint.move_to_logical(80.0).unwrap();

        tokio::time::sleep(Duration::from_millis(405)).await;
        let p = joint.position();
        assert!(p > 30.0 && p < 50.0, "position after 0.4s: {}", p);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!((joint.position() - 80.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_stop_stalls_short_of_target() {
        let options = VirtualJointOptions { hard_stop: Some(ValueRange::new(0.0, 70.0)), ..Default::default() };
        let joint = VirtualJoint::with_options(hand(), options);
        joint.open(Duration::from_secs(1)).await.unwrap();
        joint.move_to_logical(100.0).unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!((joint.position() - 70.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attach_times_out() {
        let options = VirtualJointOptions { attach_delay: Duration::from_secs(10), ..Default::default() };
        let joint = VirtualJoint::with_options(hand(), options);
        let err = joint.open(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::AttachmentTimeout(JointId::LeftHand)));
        assert!(!joint.is_attached());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reversed_joint_reports_logical_position() {
        let mut config = hand();
        config.orientation = Orientation::Reversed;
        let joint = VirtualJoint::new(config);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        joint.set_position_observer(Arc::new(move |v| sink.lock().push(v)));

        joint.open(Duration::from_secs(1)).await.unwrap();
        joint.move_to_logical(25.0).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!((joint.position() - 25.0).abs() < 1e-6);
        assert!((seen.lock().last().copied().unwrap() - 25.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_are_idempotent_and_can_fail() {
        let joint = VirtualJoint::new(hand());
        assert!(joint.move_to_logical(10.0).is_err());

        joint.open(Duration::from_secs(1)).await.unwrap();
        joint.move_to_logical(10.0).unwrap();
        joint.move_to_logical(10.001).unwrap();
        joint.fail_next_writes(1);
        assert!(matches!(joint.move_to_logical(20.0), Err(Error::Driver { .. })));
        joint.move_to_logical(20.0).unwrap();
        assert_eq!(joint.history(), vec![10.0, 20.0]);

        joint.shutdown();
        assert!(!joint.is_attached());
        assert!(joint.move_to_logical(30.0).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_keeps_only_the_latest_targets() {
        let options = VirtualJointOptions { history_limit: 3, ..Default::default() };
        let joint = VirtualJoint::with_options(hand(), options);
        joint.open(Duration::from_secs(1)).await.unwrap();
        for target in [10.0, 20.0, 30.0, 40.0, 50.0] {
            joint.move_to_logical(target).unwrap();
        }
        assert_eq!(joint.history(), vec![30.0, 40.0, 50.0]);

        let silent = VirtualJoint::with_options(hand(), VirtualJointOptions { history_limit: 0, ..Default::default() });
        silent.open(Duration::from_secs(1)).await.unwrap();
        silent.move_to_logical(10.0).unwrap();
        assert!(silent.history().is_empty());
    }
}
