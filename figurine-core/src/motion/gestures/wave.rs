//! src/motion/gestures/wave.rs
//!
//! Left-hand greeting wave:
//! `Lowered -> Raising -> Waving(n) -> PausingAtTop -> Lowering -> Lowered`.

use std::time::{Duration, Instant};
use tracing::debug;

use figurine_common::models::{HandGesture, JointId, WaveConfig};

use super::{reached, GestureTransition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavePhase {
    MovingDown,
    MovingUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveState {
    Lowered,
    Raising,
    Waving { cycles_remaining: u32, phase: WavePhase },
    PausingAtTop { since: Instant },
    Lowering,
}

impl WaveState {
    pub fn name(&self) -> &'static str {
        match self {
            WaveState::Lowered => "lowered",
            WaveState::Raising => "raising",
            WaveState::Waving { phase: WavePhase::MovingDown, .. } => "waving_down",
            WaveState::Waving { phase: WavePhase::MovingUp, .. } => "waving_up",
            WaveState::PausingAtTop { .. } => "pausing_at_top",
            WaveState::Lowering => "lowering",
        }
    }

    fn is_raised(&self) -> bool {
        matches!(
            self,
            WaveState::Raising | WaveState::Waving { .. } | WaveState::PausingAtTop { .. }
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WaveInputs {
    pub now: Instant,
    /// A person is currently focused.
    pub tracking: bool,
    pub suppressed: bool,
}

#[derive(Debug, Clone)]
pub struct WaveAutopilot {
    config: WaveConfig,
    state: WaveState,
    armed: bool,
    /// Started by a manual request; tracking loss does not end it.
    manual: bool,
    cooldown_until: Option<Instant>,
    raised_at: Option<Instant>,
    measured: Option<f64>,
}

impl WaveAutopilot {
    pub fn new(config: WaveConfig) -> Self {
        Self {
            config,
            state: WaveState::Lowered,
            armed: false,
            manual: false,
            cooldown_until: None,
            raised_at: None,
            measured: None,
        }
    }

    pub fn state(&self) -> WaveState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.map(|until| now < until).unwrap_or(false)
    }

    pub fn observe(&mut self, measured: f64) {
        self.measured = Some(measured);
    }

    /// Commanded hand position for the current state.
    pub fn target(&self) -> f64 {
        match self.state {
            WaveState::Lowered | WaveState::Lowering => self.config.lowered,
            WaveState::Waving { phase: WavePhase::MovingDown, .. } => self.dip_position(),
            _ => self.config.raised,
        }
    }

    fn dip_position(&self) -> f64 {
        let towards_lowered = (self.config.lowered - self.config.raised).signum();
        self.config.raised + towards_lowered * self.config.pull_back
    }

    /// A person just became visible. Returns whether the wave was armed.
    pub fn arm(&mut self, now: Instant, suppressed: bool) -> bool {
        if suppressed || self.in_cooldown(now) {
            debug!("wave: arming refused (suppressed={}, cooldown={})", suppressed, self.in_cooldown(now));
            return false;
        }
        self.armed = true;
        true
    }

    /// Manual up/down request; interrupts whatever the autopilot is doing.
    pub fn force(&mut self, gesture: HandGesture, now: Instant) -> Option<GestureTransition> {
        match (gesture, self.state) {
            (HandGesture::Up, WaveState::Lowered | WaveState::Lowering) => {
                self.armed = false;
                self.manual = true;
                self.raised_at = Some(now);
                self.transition(WaveState::Raising, "manual_up")
            }
            (HandGesture::Down, s) if s.is_raised() => self.transition(WaveState::Lowering, "manual_down"),
            _ => None,
        }
    }

    /// Lower the hand if it is up, without touching the cooldown.
    pub fn abort(&mut self, reason: &'static str) -> Option<GestureTransition> {
        self.armed = false;
        if self.state.is_raised() {
            return self.transition(WaveState::Lowering, reason);
        }
        None
    }

    pub fn update(&mut self, inputs: WaveInputs) -> Option<GestureTransition> {
        let now = inputs.now;

        if self.state.is_raised() {
            if let Some(reason) = self.abort_reason(&inputs) {
                return self.transition(WaveState::Lowering, reason);
            }
        }

        match self.state {
            WaveState::Lowered => {
                if !self.armed {
                    return None;
                }
                self.armed = false;
                if inputs.suppressed || !inputs.tracking {
                    return None;
                }
                self.manual = false;
                self.raised_at = Some(now);
                self.transition(WaveState::Raising, "armed")
            }
            WaveState::Raising => {
                if !reached(self.measured, self.config.raised, self.config.tolerance) {
                    return None;
                }
                if self.config.cycles == 0 {
                    self.transition(WaveState::PausingAtTop { since: now }, "raised")
                } else {
                    self.transition(
                        WaveState::Waving { cycles_remaining: self.config.cycles, phase: WavePhase::MovingDown },
                        "raised",
                    )
                }
            }
            WaveState::Waving { cycles_remaining, phase: WavePhase::MovingDown } => {
                if !reached(self.measured, self.dip_position(), self.config.tolerance) {
                    return None;
                }
                self.transition(
                    WaveState::Waving { cycles_remaining, phase: WavePhase::MovingUp },
                    "dipped",
                )
            }
            WaveState::Waving { cycles_remaining, phase: WavePhase::MovingUp } => {
                if !reached(self.measured, self.config.raised, self.config.tolerance) {
                    return None;
                }
                if cycles_remaining <= 1 {
                    self.transition(WaveState::PausingAtTop { since: now }, "cycles_done")
                } else {
                    self.transition(
                        WaveState::Waving { cycles_remaining: cycles_remaining - 1, phase: WavePhase::MovingDown },
                        "cycle_done",
                    )
                }
            }
            WaveState::PausingAtTop { since } => {
                if now.saturating_duration_since(since) < Duration::from_secs_f64(self.config.top_pause_secs) {
                    return None;
                }
                self.transition(WaveState::Lowering, "pause_done")
            }
            WaveState::Lowering => {
                if !reached(self.measured, self.config.lowered, self.config.tolerance) {
                    return None;
                }
                self.raised_at = None;
                self.manual = false;
                self.cooldown_until = Some(now + Duration::from_secs_f64(self.config.effective_cooldown_secs()));
                self.transition(WaveState::Lowered, "lowered")
            }
        }
    }

    fn abort_reason(&self, inputs: &WaveInputs) -> Option<&'static str> {
        if inputs.suppressed {
            return Some("suppressed");
        }
        if !self.manual && !inputs.tracking {
            return Some("tracking_lost");
        }
        let raised_for = self
            .raised_at
            .map(|t| inputs.now.saturating_duration_since(t).as_secs_f64())
            .unwrap_or(0.0);
        if raised_for > self.config.max_raised_secs {
            return Some("max_raised");
        }
        None
    }

    fn transition(&mut self, to: WaveState, reason: &'static str) -> Option<GestureTransition> {
        let from = self.state;
        self.state = to;
        debug!("wave: {} -> {} ({})", from.name(), to.name(), reason);
        Some(GestureTransition {
            hand: JointId::LeftHand,
            from: from.name(),
            to: to.name(),
            reason,
        })
    }
}
