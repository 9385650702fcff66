//! src/motion/state.rs
//!
//! `BehaviorState` is everything the controller mutates: pending events, the
//! tracker, solver, idle generator and both autopilots, plus the latest
//! measured joint positions. It is owned by the controller task and never
//! shared; one call to [`BehaviorState::tick`] is one control-loop step.

use std::collections::VecDeque;
use std::time::Instant;
use chrono::Utc;
use tracing::{debug, trace, warn};

use figurine_common::models::{
    DetectionUpdate, Event, IdleBehavior, JointConfig, JointId, JointMap, Pose, Settings, TelemetryEvent,
    ValueRange,
};

use crate::eventbus::MotionEvent;
use crate::motion::gestures::{GestureTransition, PointAutopilot, PointState, WaveAutopilot, WaveInputs, WaveState};
use crate::motion::idle::{IdleGenerator, IdleTarget};
use crate::motion::solver::{HeadBodySolver, SolveInput};
use crate::motion::tracking::{OffsetTracker, SampleOutcome};
use crate::motion::MotionContext;

/// The heading the solver is currently working towards, and since when.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    pub heading: f64,
    pub context: MotionContext,
    pub since: Instant,
}

/// Output of one tick: the pose to command and whatever should be published.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub pose: Pose,
    pub published: Vec<MotionEvent>,
}

#[derive(Debug)]
pub struct BehaviorState {
    joints: JointMap<JointConfig>,
    camera_range: ValueRange,
    heading_change_threshold: f64,

    pending: VecDeque<Event>,
    context: MotionContext,
    schedule: Option<Schedule>,
    manual_heading: Option<f64>,

    tracker: OffsetTracker,
    focus_start: Option<Instant>,
    person_visible: bool,
    last_offset: Option<f64>,
    last_face_yaw: Option<f64>,

    solver: HeadBodySolver,
    idle: IdleGenerator,
    /// Restored by an `Idle` reset.
    configured_idle: IdleBehavior,
    wave: WaveAutopilot,
    point: PointAutopilot,
    waving_suppressed: bool,

    measured: JointMap<Option<f64>>,
    pose: Pose,
    last_tick: Option<Instant>,
}

impl BehaviorState {
    pub fn new(settings: &Settings, now: Instant) -> Self {
        Self::with_idle(settings, IdleGenerator::new(settings.idle.clone(), settings.camera_range(), home_heading(settings), now))
    }

    /// Build around an explicit idle generator (seeded RNG in tests).
    pub fn with_idle(settings: &Settings, idle: IdleGenerator) -> Self {
        let joints = settings.joints.clone();
        let pose = Pose::from(joints.map(|_, j| j.home));
        Self {
            solver: HeadBodySolver::new(
                settings.solver.clone(),
                settings.tracking.clone(),
                joints.head.clone(),
                joints.body.clone(),
            ),
            tracker: OffsetTracker::new(settings.tracking.clone()),
            wave: WaveAutopilot::new(settings.wave.clone()),
            point: PointAutopilot::new(settings.point.clone()),
            camera_range: settings.camera_range(),
            heading_change_threshold: settings.solver.heading_change_threshold,
            joints,
            pending: VecDeque::new(),
            context: MotionContext::Search,
            schedule: None,
            manual_heading: None,
            focus_start: None,
            person_visible: false,
            last_offset: None,
            last_face_yaw: None,
            idle,
            configured_idle: settings.idle.clone(),
            waving_suppressed: false,
            measured: JointMap::default(),
            pose,
            last_tick: None,
        }
    }

    pub fn enqueue(&mut self, event: Event) {
        self.pending.push_back(event);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Record a measured joint position reported by a driver.
    pub fn observe(&mut self, joint: JointId, value: f64) {
        if !value.is_finite() {
            return;
        }
        *self.measured.get_mut(joint) = Some(value);
        match joint {
            JointId::Head => self.solver.observe_head(value),
            JointId::Body => self.solver.observe_body(value),
            JointId::LeftHand => self.wave.observe(value),
            JointId::RightHand => self.point.observe(value),
        }
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Called when ticking starts again after a stop. The first tick then has
    /// no elapsed time, so the rate caps hold across the gap. Detections that
    /// queued up while stopped are dropped; other events are kept.
    pub fn resume(&mut self, now: Instant) {
        self.last_tick = None;
        self.solver.reset_guards();
        let anchor = self.measured_camera_heading();
        self.idle.reanchor(anchor, now);

        let before = self.pending.len();
        self.pending
            .retain(|e| !matches!(e, Event::PersonDetected { .. } | Event::PersonLost));
        if self.pending.len() != before {
            debug!("dropped {} stale detections on resume", before - self.pending.len());
        }
    }

    pub fn context(&self) -> MotionContext {
        self.context
    }

    pub fn schedule(&self) -> Option<Schedule> {
        self.schedule
    }

    pub fn focus_start(&self) -> Option<Instant> {
        self.focus_start
    }

    pub fn is_focused(&self) -> bool {
        self.focus_start.is_some()
    }

    pub fn wave_state(&self) -> WaveState {
        self.wave.state()
    }

    pub fn point_state(&self) -> PointState {
        self.point.state()
    }

    pub fn waving_suppressed(&self) -> bool {
        self.waving_suppressed
    }

    pub fn idle_behavior(&self) -> &IdleBehavior {
        self.idle.behavior()
    }

    /// Measured camera heading, falling back to the commanded one until both
    /// yaw joints have reported.
    pub fn measured_camera_heading(&self) -> f64 {
        match (self.measured.body, self.measured.head) {
            (Some(body), Some(head)) => body + head,
            _ => self.pose.camera_heading(),
        }
    }

    pub fn tick(&mut self, now: Instant) -> TickReport {
        let dt = self
            .last_tick
            .map(|t| now.saturating_duration_since(t).as_secs_f64())
            .unwrap_or(0.0);
        self.last_tick = Some(now);
        let mut out = Vec::new();

        // 1. events
        self.drain_events(now, &mut out);
        if self.tracker.expire(now) {
            self.end_focus(now, &mut out);
        }

        // 2. desired heading and context
        let context = self.resolve_context();
        if context != self.context {
            self.change_context(context, now, &mut out);
        }
        let (desired, idle_target) = match context {
            MotionContext::Manual => (self.camera_range.clamp(self.manual_heading.unwrap_or(0.0)), None),
            MotionContext::Tracking => (
                self.camera_range.clamp(self.tracker.target().unwrap_or_else(|| self.pose.camera_heading())),
                None,
            ),
            MotionContext::Search => {
                let t = self.idle.target(now);
                (self.camera_range.clamp(t.heading), Some(t))
            }
        };

        // 3. schedule
        let reschedule = match self.schedule {
            Some(s) => s.context != context || (s.heading - desired).abs() > self.heading_change_threshold,
            None => true,
        };
        if reschedule {
            trace!("schedule: {} heading {:.2}", context, desired);
            self.schedule = Some(Schedule { heading: desired, context, since: now });
        }

        // 4. head/body
        let frozen_before = self.guard_state();
        let solved = self.solver.solve(SolveInput {
            desired,
            context,
            offset: match context {
                MotionContext::Tracking => self.tracker.filtered_offset(),
                _ => None,
            },
            head_demand: idle_target.and_then(|t: IdleTarget| t.head),
            search_rates: idle_target.and_then(|t| t.rates),
            dt,
            now,
        });
        self.report_guard_changes(frozen_before, &mut out);

        // 5. gestures
        let tracking = self.focus_start.is_some();
        if let Some(t) = self.wave.update(WaveInputs { now, tracking, suppressed: self.waving_suppressed }) {
            out.push(MotionEvent::Gesture(t));
        }
        if let Some(t) = self.point.update(now) {
            out.push(MotionEvent::Gesture(t));
        }

        // 6. pose
        self.pose = Pose {
            body: self.joints.body.clamp(solved.body),
            head: self.joints.head.clamp(solved.head),
            left_hand: self.joints.left_hand.clamp(self.wave.target()),
            right_hand: self.joints.right_hand.clamp(self.point.target()),
        };

        TickReport { pose: self.pose, published: out }
    }

    fn drain_events(&mut self, now: Instant, out: &mut Vec<MotionEvent>) {
        // Detections in one tick collapse to the latest sample.
        let mut detection: Option<(f64, Option<f64>)> = None;

        while let Some(event) = self.pending.pop_front() {
            trace!("event: {}", event.event_type());
            match event {
                Event::Idle => {
                    detection = None;
                    self.reset_to_baseline(now, out);
                }
                Event::AimCamera { heading } => {
                    if heading.is_finite() {
                        self.manual_heading = Some(heading);
                    } else {
                        warn!("ignoring non-finite aim heading");
                    }
                }
                Event::ClearTarget => self.manual_heading = None,
                Event::SetLeftHandGesture { gesture } => {
                    push_transition(out, self.wave.force(gesture, now));
                }
                Event::SetRightHandGesture { gesture } => {
                    push_transition(out, self.point.force(gesture));
                }
                Event::SetIdleBehavior { behavior } => {
                    if let Err(e) = behavior.validate() {
                        warn!("ignoring idle behaviour {}: {}", behavior.name(), e);
                        continue;
                    }
                    debug!("idle behaviour -> {}", behavior.name());
                    let anchor = self.measured_camera_heading();
                    self.idle.set_behavior(behavior, anchor, now);
                }
                Event::PersonDetected { offset, face_yaw } => detection = Some((offset, face_yaw)),
                Event::PersonLost => detection = None,
                Event::StartPointingGesture => push_transition(out, self.point.start()),
                Event::PointingAttentionDone => push_transition(out, self.point.attention_done()),
                Event::PointingLectureDone => push_transition(out, self.point.lecture_done()),
                Event::SuppressWaving => self.waving_suppressed = true,
                Event::AllowWaving => self.waving_suppressed = false,
            }
        }

        if let Some((offset, face_yaw)) = detection {
            self.apply_detection(offset, face_yaw, now, out);
        }
    }

    fn apply_detection(&mut self, offset: f64, face_yaw: Option<f64>, now: Instant, out: &mut Vec<MotionEvent>) {
        if self.idle.behavior().is_minimal() {
            trace!("minimal idle: detection ignored");
            return;
        }

        let camera_heading = self.measured_camera_heading();
        let update = self.tracker.update(offset, camera_heading, now);
        match update.outcome {
            SampleOutcome::RejectedJump { delta } => {
                out.push(MotionEvent::Telemetry(
                    TelemetryEvent::new("tracking", "jump_rejected").with("delta_deg", delta),
                ));
            }
            SampleOutcome::Reacquired => {
                out.push(MotionEvent::Telemetry(
                    TelemetryEvent::new("tracking", "reacquired").with("target", update.target),
                ));
            }
            _ => {}
        }

        self.last_offset = Some(offset);
        self.last_face_yaw = face_yaw;

        if !self.person_visible {
            self.person_visible = true;
            self.focus_start = Some(now);
            let armed = self.wave.arm(now, self.waving_suppressed);
            debug!("person visible at offset {:.2} (wave armed: {})", offset, armed);
            out.push(self.detection_update(true, 0.0));
        }
    }

    /// Hold window ran out: forget the person.
    fn end_focus(&mut self, now: Instant, out: &mut Vec<MotionEvent>) {
        let duration = self
            .focus_start
            .map(|t| now.saturating_duration_since(t).as_secs_f64())
            .unwrap_or(0.0);
        self.focus_start = None;
        if self.person_visible {
            self.person_visible = false;
            debug!("person lost after {:.1}s", duration);
            out.push(self.detection_update(false, duration));
        }
    }

    fn detection_update(&self, person_visible: bool, tracking_duration_secs: f64) -> MotionEvent {
        MotionEvent::Detection(DetectionUpdate {
            person_visible,
            offset: self.last_offset,
            face_yaw: self.last_face_yaw,
            timestamp: Utc::now(),
            tracking_duration_secs,
        })
    }

    fn resolve_context(&self) -> MotionContext {
        if self.manual_heading.is_some() {
            MotionContext::Manual
        } else if self.focus_start.is_some() && self.tracker.target().is_some() {
            MotionContext::Tracking
        } else {
            MotionContext::Search
        }
    }

    fn change_context(&mut self, to: MotionContext, now: Instant, out: &mut Vec<MotionEvent>) {
        let from = self.context;
        let heading = self.measured_camera_heading();
        debug!("context {} -> {} at heading {:.1}", from, to, heading);
        self.solver.reset_guards();
        if to == MotionContext::Search {
            // resume idle motion from where the camera actually is
            self.idle.reanchor(heading, now);
        }
        self.context = to;
        out.push(MotionEvent::ContextChanged { from, to, heading });
    }

    fn reset_to_baseline(&mut self, now: Instant, out: &mut Vec<MotionEvent>) {
        debug!("resetting behaviour state to idle baseline");
        self.manual_heading = None;
        self.tracker.reset();
        self.end_focus(now, out);
        self.last_offset = None;
        self.last_face_yaw = None;
        self.waving_suppressed = false;
        push_transition(out, self.wave.abort("idle"));
        push_transition(out, self.point.abort("idle"));
        self.solver.reset_guards();
        let anchor = self.measured_camera_heading();
        self.idle.set_behavior(self.configured_idle.clone(), anchor, now);
    }

    fn guard_state(&self) -> (bool, bool) {
        (
            self.solver.head_guard().and_then(|g| g.frozen()).is_some(),
            self.solver.body_guard().and_then(|g| g.frozen()).is_some(),
        )
    }

    fn report_guard_changes(&self, before: (bool, bool), out: &mut Vec<MotionEvent>) {
        let after = self.guard_state();
        for (joint, was, is) in [(JointId::Head, before.0, after.0), (JointId::Body, before.1, after.1)] {
            if was == is {
                continue;
            }
            let name = if is { "frozen" } else { "thawed" };
            let value = match joint {
                JointId::Head => self.solver.head(),
                _ => self.solver.body(),
            };
            out.push(MotionEvent::Telemetry(
                TelemetryEvent::new("stall_guard", name)
                    .with("joint", joint.to_string())
                    .with("target", value),
            ));
        }
    }
}

fn push_transition(out: &mut Vec<MotionEvent>, transition: Option<GestureTransition>) {
    if let Some(t) = transition {
        out.push(MotionEvent::Gesture(t));
    }
}

fn home_heading(settings: &Settings) -> f64 {
    settings.joints.body.home + settings.joints.head.home
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use figurine_common::models::{HandGesture, PatrolConfig};

    const STEP_MS: u64 = 20;

    struct Rig {
        state: BehaviorState,
        now: Instant,
        published: Vec<MotionEvent>,
    }

    impl Rig {
        fn new(settings: Settings) -> Self {
            let now = Instant::now();
            let idle = IdleGenerator::with_rng(
                settings.idle.clone(),
                settings.camera_range(),
                0.0,
                now,
                StdRng::seed_from_u64(3),
            );
            Self { state: BehaviorState::with_idle(&settings, idle), now, published: vec![] }
        }

        fn idle_none() -> Self {
            Self::new(Settings { idle: IdleBehavior::None, ..Settings::default() })
        }

        /// One tick with perfect joints: every joint reports its commanded value.
        fn step(&mut self) -> Pose {
            self.now += Duration::from_millis(STEP_MS);
            let report = self.state.tick(self.now);
            for (id, v) in JointMap::from(report.pose).iter() {
                self.state.observe(id, *v);
            }
            self.published.extend(report.published);
            report.pose
        }

        fn run(&mut self, secs: f64) -> Pose {
            let mut pose = self.state.pose();
            for _ in 0..(secs * 1000.0 / STEP_MS as f64) as u64 {
                pose = self.step();
            }
            pose
        }

        fn detections(&self) -> Vec<bool> {
            self.published
                .iter()
                .filter_map(|e| match e {
                    MotionEvent::Detection(d) => Some(d.person_visible),
                    _ => None,
                })
                .collect()
        }
    }

    #[test]
    fn test_every_commanded_value_stays_in_range() {
        let mut rig = Rig::idle_none();
        let joints = Settings::default().joints;
        for heading in [500.0, -500.0, 75.0] {
            rig.state.enqueue(Event::AimCamera { heading });
            rig.state.enqueue(Event::SetLeftHandGesture { gesture: HandGesture::Up });
            for _ in 0..200 {
                let pose = rig.step();
                for (id, v) in JointMap::from(pose).iter() {
                    assert!(joints.get(id).range.contains(*v), "{} out of range: {}", id, v);
                }
            }
        }
    }

    #[test]
    fn test_manual_aim_wins_and_clear_returns_to_search() {
        let mut rig = Rig::idle_none();
        rig.state.enqueue(Event::AimCamera { heading: 40.0 });
        rig.state.enqueue(Event::person(0.3));
        let pose = rig.run(10.0);
        assert_eq!(rig.state.context(), MotionContext::Manual);
        assert!((pose.camera_heading() - 40.0).abs() < 1.0);

        rig.state.enqueue(Event::ClearTarget);
        rig.step();
        assert_eq!(rig.state.context(), MotionContext::Search);
        assert!(rig.published.iter().any(|e| matches!(
            e,
            MotionEvent::ContextChanged { from: MotionContext::Manual, to: MotionContext::Search, .. }
        )));
    }

    #[test]
    fn test_detections_in_one_tick_collapse_to_latest() {
        let mut rig = Rig::idle_none();
        rig.state.enqueue(Event::person(-0.8));
        rig.state.enqueue(Event::PersonDetected { offset: 0.4, face_yaw: Some(12.0) });
        rig.step();
        assert_eq!(rig.state.pending_len(), 0);
        match &rig.published[0] {
            MotionEvent::Detection(d) => {
                assert!(d.person_visible);
                assert_eq!(d.offset, Some(0.4));
                assert_eq!(d.face_yaw, Some(12.0));
            }
            other => panic!("expected a detection update, got {:?}", other),
        }
    }

    #[test]
    fn test_person_lost_within_tick_drops_pending_sample() {
        let mut rig = Rig::idle_none();
        rig.state.enqueue(Event::person(0.4));
        rig.state.enqueue(Event::PersonLost);
        rig.step();
        assert!(!rig.state.is_focused());
        assert!(rig.detections().is_empty());
    }

    #[test]
    fn test_focus_flips_are_published_once_each() {
        let mut rig = Rig::idle_none();
        for _ in 0..10 {
            rig.state.enqueue(Event::person(0.2));
            rig.step();
        }
        assert!(rig.state.focus_start().is_some());
        assert_eq!(rig.state.context(), MotionContext::Tracking);

        rig.run(2.0);
        assert!(rig.state.focus_start().is_none());
        assert_eq!(rig.detections(), vec![true, false]);
        assert_eq!(rig.state.context(), MotionContext::Search);
    }

    #[test]
    fn test_minimal_idle_ignores_detections() {
        let mut rig = Rig::idle_none();
        rig.state.enqueue(Event::SetIdleBehavior {
            behavior: IdleBehavior::MinimalIdle(Default::default()),
        });
        rig.step();
        rig.state.enqueue(Event::person(0.5));
        rig.step();
        assert!(!rig.state.is_focused());
        assert_eq!(rig.state.context(), MotionContext::Search);
    }

    #[test]
    fn test_idle_event_resets_to_baseline() {
        let mut rig = Rig::idle_none();
        rig.state.enqueue(Event::AimCamera { heading: 30.0 });
        rig.state.enqueue(Event::SuppressWaving);
        rig.state.enqueue(Event::StartPointingGesture);
        rig.run(1.0);
        assert_ne!(rig.state.point_state(), PointState::Lowered);

        rig.state.enqueue(Event::SetIdleBehavior {
            behavior: IdleBehavior::MinimalIdle(Default::default()),
        });
        rig.step();
        assert!(rig.state.idle_behavior().is_minimal());

        rig.state.enqueue(Event::Idle);
        rig.step();
        assert_eq!(rig.state.context(), MotionContext::Search);
        assert!(!rig.state.waving_suppressed());
        assert!(matches!(rig.state.point_state(), PointState::Lowering | PointState::Lowered));
        assert_eq!(rig.state.idle_behavior(), &IdleBehavior::None);

        // detections are followed again once the configured behaviour is back
        rig.state.enqueue(Event::person(0.3));
        rig.step();
        assert!(rig.state.is_focused());
    }

    #[test]
    fn test_invalid_idle_behaviour_at_runtime_is_ignored() {
        let mut rig = Rig::idle_none();
        let bad = PatrolConfig { dwell_secs: ValueRange::new(f64::NAN, f64::NAN), ..PatrolConfig::default() };
        rig.state.enqueue(Event::SetIdleBehavior { behavior: IdleBehavior::Patrol(bad) });
        rig.run(1.0);
        assert_eq!(rig.state.idle_behavior(), &IdleBehavior::None);
    }

    #[test]
    fn test_resume_caps_the_first_moves_after_a_gap() {
        let mut rig = Rig::idle_none();
        rig.step();

        rig.now += Duration::from_secs(60);
        rig.state.enqueue(Event::AimCamera { heading: 100.0 });
        rig.state.enqueue(Event::person(0.5));
        rig.state.resume(rig.now);
        assert_eq!(rig.state.pending_len(), 1);

        let first = rig.step();
        let second = rig.step();
        let solver = Settings::default().solver;
        let dt = STEP_MS as f64 / 1000.0;
        assert!(first.head.abs() <= solver.head_rate_cap * dt + 1e-9, "head jumped to {}", first.head);
        assert!(first.body.abs() <= solver.body_rate_cap * dt + 1e-9, "body jumped to {}", first.body);
        assert!((second.head - first.head).abs() <= solver.head_rate_cap * dt + 1e-9);
        assert!((second.body - first.body).abs() <= solver.body_rate_cap * dt + 1e-9);
        assert_eq!(rig.state.context(), MotionContext::Manual);
        assert!(rig.detections().is_empty());
    }

    #[test]
    fn test_detection_then_silence_returns_to_search_and_lowers_wave() {
        let mut settings = Settings { idle: IdleBehavior::None, ..Settings::default() };
        settings.wave.top_pause_secs = 5.0;
        let mut rig = Rig::new(settings);
        rig.state.enqueue(Event::person(0.5));
        rig.step();
        assert!(rig.state.is_focused());

        // hand rises while the person is still within the hold window
        rig.run(1.0);
        assert!(matches!(
            rig.state.wave_state(),
            WaveState::Raising | WaveState::Waving { .. } | WaveState::PausingAtTop { .. }
        ));

        rig.run(1.0);
        assert_eq!(rig.state.context(), MotionContext::Search);
        assert!(matches!(rig.state.wave_state(), WaveState::Lowering | WaveState::Lowered));
        assert!(rig.published.iter().any(|e| matches!(
            e,
            MotionEvent::Gesture(t) if t.to == "lowering" && t.reason == "tracking_lost"
        )));
    }

    #[test]
    fn test_suppressed_waving_does_not_arm() {
        let mut rig = Rig::idle_none();
        rig.state.enqueue(Event::SuppressWaving);
        rig.state.enqueue(Event::person(0.1));
        rig.run(0.5);
        assert_eq!(rig.state.wave_state(), WaveState::Lowered);
    }
}
