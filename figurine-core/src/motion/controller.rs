//! src/motion/controller.rs
//!
//! The motion controller is a single tokio task that owns the behaviour
//! state and the joint drivers. Everything else talks to it through
//! [`MotionController`], a cheap handle that posts commands onto an unbounded
//! channel; replies come back on oneshot channels. Driver position reports are
//! posted onto the same channel, so state is only ever touched by that task.

use std::sync::Arc;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use figurine_common::models::{Event, JointId, JointMap, Pose, Settings, TelemetryEvent};
use figurine_common::traits::{JointDriver, PositionObserver, TelemetryLogger};
use figurine_common::Error;

use crate::drivers::open_all;
use crate::eventbus::EventBus;
use crate::motion::state::BehaviorState;
use crate::motion::MotionContext;

/// Point-in-time view of the controller, taken on the controller task.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub running: bool,
    pub pose: Pose,
    pub context: MotionContext,
    pub target_heading: Option<f64>,
    pub focused: bool,
    pub idle: &'static str,
    pub wave: &'static str,
    pub point: &'static str,
    pub waving_suppressed: bool,
}

enum Command {
    Start { reply: oneshot::Sender<Result<(), Error>> },
    Stop { reply: oneshot::Sender<()> },
    Event(Event),
    Measured { joint: JointId, value: f64 },
    Status { reply: oneshot::Sender<ControllerStatus> },
}

/// Handle to the controller task. Clones share the same task; the task exits
/// (releasing the joints) once every handle is dropped.
#[derive(Clone)]
pub struct MotionController {
    cmd_tx: mpsc::UnboundedSender<Command>,
    pose_rx: watch::Receiver<Pose>,
    event_bus: Arc<EventBus>,
}

impl MotionController {
    /// Validates the settings and spawns the controller task (not yet running).
    /// Must be called from within a tokio runtime.
    pub fn new(
        settings: Settings,
        drivers: JointMap<Arc<dyn JointDriver>>,
        event_bus: Arc<EventBus>,
    ) -> Result<Self, Error> {
        settings.validate()?;
        for (id, driver) in drivers.iter() {
            if driver.id() != id {
                return Err(Error::InvalidConfig(format!(
                    "driver for {} reports itself as {}",
                    id,
                    driver.id()
                )));
            }
        }

        let now = tokio::time::Instant::now().into_std();
        let state = BehaviorState::new(&settings, now);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (pose_tx, pose_rx) = watch::channel(state.pose());

        let task = ControllerTask {
            settings: Arc::new(settings),
            drivers,
            state,
            event_bus: Arc::clone(&event_bus),
            pose_tx,
            self_tx: cmd_tx.downgrade(),
            running: false,
        };
        tokio::spawn(task.run(cmd_rx));

        Ok(Self {
            cmd_tx,
            pose_rx,
            event_bus,
        })
    }

    /// Open every joint and begin ticking. Fails with `AlreadyRunning` if started,
    /// or with the first attachment error after releasing every joint.
    pub async fn start(&self) -> Result<(), Error> {
        let (reply, rx) = oneshot::channel();
        self.post(Command::Start { reply })?;
        rx.await.map_err(|_| Error::ControllerGone)?
    }

    /// Stop ticking and release the joints. Once this returns, no further
    /// driver calls are made.
    pub async fn stop(&self) {
        let (reply, rx) = oneshot::channel();
        if self.post(Command::Stop { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Queue an event for the next tick. Never waits.
    pub fn send(&self, event: Event) -> Result<(), Error> {
        self.post(Command::Event(event))
    }

    pub async fn status(&self) -> Result<ControllerStatus, Error> {
        let (reply, rx) = oneshot::channel();
        self.post(Command::Status { reply })?;
        rx.await.map_err(|_| Error::ControllerGone)
    }

    pub async fn current_pose(&self) -> Result<Pose, Error> {
        Ok(self.status().await?.pose)
    }

    pub async fn camera_heading(&self) -> Result<f64, Error> {
        Ok(self.current_pose().await?.camera_heading())
    }

    /// Latest pose, updated every tick.
    pub fn subscribe_pose(&self) -> watch::Receiver<Pose> {
        self.pose_rx.clone()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    fn post(&self, cmd: Command) -> Result<(), Error> {
        self.cmd_tx.send(cmd).map_err(|_| Error::ControllerGone)
    }
}

struct ControllerTask {
    settings: Arc<Settings>,
    drivers: JointMap<Arc<dyn JointDriver>>,
    state: BehaviorState,
    event_bus: Arc<EventBus>,
    pose_tx: watch::Sender<Pose>,
    /// Weak, so the observers handed to drivers don't keep the task alive.
    self_tx: mpsc::WeakUnboundedSender<Command>,
    running: bool,
}

impl ControllerTask {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        let mut ticker: Option<Interval> = None;

        loop {
            tokio::select! {
                maybe_cmd = cmd_rx.recv() => {
                    let Some(cmd) = maybe_cmd else { break };
                    match cmd {
                        Command::Start { reply } => {
                            let result = self.start().await;
                            if result.is_ok() {
                                ticker = Some(self.new_ticker());
                            }
                            let _ = reply.send(result);
                        }
                        Command::Stop { reply } => {
                            ticker = None;
                            self.stop();
                            let _ = reply.send(());
                        }
                        Command::Event(event) => self.state.enqueue(event),
                        Command::Measured { joint, value } => self.state.observe(joint, value),
                        Command::Status { reply } => {
                            let _ = reply.send(self.status());
                        }
                    }
                },
                _ = next_tick(&mut ticker) => self.tick(),
            }
        }

        self.stop();
        debug!("controller task exited");
    }

    fn new_ticker(&self) -> Interval {
        let mut interval = tokio::time::interval(self.settings.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }

    async fn start(&mut self) -> Result<(), Error> {
        if self.running {
            return Err(Error::AlreadyRunning);
        }
        info!("starting motion controller at {} Hz", self.settings.tick_hz);

        for (id, driver) in self.drivers.iter() {
            driver.set_position_observer(self.observer(id));
            driver.set_telemetry_logger(self.telemetry_logger());
        }

        open_all(&self.drivers, self.settings.attach_timeout()).await?;

        for (id, joint) in self.settings.joints.iter() {
            if let Some(limit) = joint.velocity_limit {
                if let Err(e) = self.drivers.get(id).set_velocity(limit) {
                    self.report_driver_error(id, "set_velocity", &e);
                }
            }
        }

        self.state.resume(tokio::time::Instant::now().into_std());
        self.running = true;
        info!("motion controller running");
        Ok(())
    }

    fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        for (_, driver) in self.drivers.iter() {
            driver.shutdown();
        }
        info!("motion controller stopped");
    }

    fn tick(&mut self) {
        if !self.running {
            return;
        }
        let now = tokio::time::Instant::now().into_std();
        let report = self.state.tick(now);

        for event in report.published {
            self.event_bus.publish(event);
        }
        for (id, value) in JointMap::from(report.pose).iter() {
            if let Err(e) = self.drivers.get(id).move_to_logical(*value) {
                self.report_driver_error(id, "move_to_logical", &e);
            }
        }
        self.pose_tx.send_replace(report.pose);
    }

    fn status(&self) -> ControllerStatus {
        ControllerStatus {
            running: self.running,
            pose: self.state.pose(),
            context: self.state.context(),
            target_heading: self.state.schedule().map(|s| s.heading),
            focused: self.state.is_focused(),
            idle: self.state.idle_behavior().name(),
            wave: self.state.wave_state().name(),
            point: self.state.point_state().name(),
            waving_suppressed: self.state.waving_suppressed(),
        }
    }

    /// Transient driver failures are logged and published, never fatal.
    fn report_driver_error(&self, joint: JointId, op: &str, e: &Error) {
        warn!("{} {} failed: {}", joint, op, e);
        self.event_bus.publish_telemetry(
            TelemetryEvent::new("controller", "driver_error")
                .with("joint", joint.to_string())
                .with("op", op)
                .with("error", e.to_string()),
        );
    }

    fn observer(&self, joint: JointId) -> PositionObserver {
        let tx = self.self_tx.clone();
        Arc::new(move |value| {
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::Measured { joint, value });
            }
        })
    }

    fn telemetry_logger(&self) -> TelemetryLogger {
        let bus = Arc::clone(&self.event_bus);
        Arc::new(move |event| bus.publish_telemetry(event))
    }
}

impl Drop for ControllerTask {
    fn drop(&mut self) {
        if self.running {
            error!("controller task dropped while running; releasing joints");
            self.stop();
        }
    }
}

/// Resolves on the next tick, or never when there is no ticker.
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
