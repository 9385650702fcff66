//! src/motion/gestures/point.rs
//!
//! Right-hand pointing gesture, driven by the interaction layer's trigger
//! events: raise halfway for attention, all the way for the lecture, then lower.

use std::time::{Duration, Instant};
use tracing::debug;

use figurine_common::models::{HandGesture, JointId, PointConfig};

use super::{reached, GestureTransition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointState {
    Lowered,
    RaisingHalf,
    HoldingHalf { since: Instant },
    RaisingFull,
    HoldingFull { since: Instant },
    Lowering,
}

impl PointState {
    pub fn name(&self) -> &'static str {
        match self {
            PointState::Lowered => "lowered",
            PointState::RaisingHalf => "raising_half",
            PointState::HoldingHalf { .. } => "holding_half",
            PointState::RaisingFull => "raising_full",
            PointState::HoldingFull { .. } => "holding_full",
            PointState::Lowering => "lowering",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PointAutopilot {
    config: PointConfig,
    state: PointState,
    /// Attention-done arrived before the half raise finished.
    attention_pending: bool,
    measured: Option<f64>,
}

impl PointAutopilot {
    pub fn new(config: PointConfig) -> Self {
        Self {
            config,
            state: PointState::Lowered,
            attention_pending: false,
            measured: None,
        }
    }

    pub fn state(&self) -> PointState {
        self.state
    }

    pub fn observe(&mut self, measured: f64) {
        self.measured = Some(measured);
    }

    pub fn target(&self) -> f64 {
        match self.state {
            PointState::Lowered | PointState::Lowering => self.config.lowered,
            PointState::RaisingHalf | PointState::HoldingHalf { .. } => self.config.half,
            PointState::RaisingFull | PointState::HoldingFull { .. } => self.config.full,
        }
    }

    pub fn start(&mut self) -> Option<GestureTransition> {
        match self.state {
            PointState::Lowered => {
                self.attention_pending = false;
                self.transition(PointState::RaisingHalf, "start")
            }
            _ => None,
        }
    }

    pub fn attention_done(&mut self) -> Option<GestureTransition> {
        match self.state {
            PointState::HoldingHalf { .. } => self.transition(PointState::RaisingFull, "attention_done"),
            PointState::RaisingHalf => {
                self.attention_pending = true;
                None
            }
            _ => None,
        }
    }

    /// Ends the gesture from any raising or holding state; no-op when already down.
    pub fn lecture_done(&mut self) -> Option<GestureTransition> {
        self.lower("lecture_done")
    }

    pub fn force(&mut self, gesture: HandGesture) -> Option<GestureTransition> {
        match gesture {
            HandGesture::Up => self.start(),
            HandGesture::Down => self.lower("manual_down"),
        }
    }

    fn lower(&mut self, reason: &'static str) -> Option<GestureTransition> {
        match self.state {
            PointState::Lowered | PointState::Lowering => None,
            _ => {
                self.attention_pending = false;
                self.transition(PointState::Lowering, reason)
            }
        }
    }

    pub fn abort(&mut self, reason: &'static str) -> Option<GestureTransition> {
        self.lower(reason)
    }

    pub fn update(&mut self, now: Instant) -> Option<GestureTransition> {
        let tol = self.config.tolerance;
        match self.state {
            PointState::Lowered => None,
            PointState::RaisingHalf => {
                if !reached(self.measured, self.config.half, tol) {
                    return None;
                }
                if self.attention_pending {
                    self.attention_pending = false;
                    return self.transition(PointState::RaisingFull, "attention_done");
                }
                self.transition(PointState::HoldingHalf { since: now }, "half_reached")
            }
            PointState::RaisingFull => {
                if !reached(self.measured, self.config.full, tol) {
                    return None;
                }
                self.transition(PointState::HoldingFull { since: now }, "full_reached")
            }
            PointState::HoldingHalf { since } | PointState::HoldingFull { since } => {
                match self.config.max_hold_secs {
                    Some(max) if now.saturating_duration_since(since) >= Duration::from_secs_f64(max) => {
                        self.transition(PointState::Lowering, "max_hold")
                    }
                    _ => None,
                }
            }
            PointState::Lowering => {
                if !reached(self.measured, self.config.lowered, tol) {
                    return None;
                }
                self.transition(PointState::Lowered, "lowered")
            }
        }
    }

    fn transition(&mut self, to: PointState, reason: &'static str) -> Option<GestureTransition> {
        let from = self.state;
        self.state = to;
        debug!("point: {} -> {} ({})", from.name(), to.name(), reason);
        Some(GestureTransition {
            hand: JointId::RightHand,
            from: from.name(),
            to: to.name(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settle(p: &mut PointAutopilot, now: Instant) -> Option<GestureTransition> {
        let target = p.target();
        p.observe(target);
        p.update(now)
    }

    #[test]
    fn test_full_pointing_sequence() {
        let mut p = PointAutopilot::new(PointConfig::default());
        let now = Instant::now();
        assert_eq!(p.start().unwrap().to, "raising_half");
        assert_eq!(settle(&mut p, now).unwrap().to, "holding_half");
        assert_eq!(p.attention_done().unwrap().to, "raising_full");
        assert_eq!(settle(&mut p, now).unwrap().to, "holding_full");
        assert_eq!(p.lecture_done().unwrap().to, "lowering");
        assert_eq!(settle(&mut p, now).unwrap().to, "lowered");
    }

    #[test]
    fn test_lecture_done_while_holding_full_lowers() {
        let mut p = PointAutopilot::new(PointConfig::default());
        let now = Instant::now();
        p.start();
        settle(&mut p, now);
        p.attention_done();
        settle(&mut p, now);
        assert!(matches!(p.state(), PointState::HoldingFull { .. }));
        p.lecture_done();
        assert_eq!(p.state(), PointState::Lowering);
    }

    #[test]
    fn test_lecture_done_while_lowered_is_noop() {
        let mut p = PointAutopilot::new(PointConfig::default());
        assert!(p.lecture_done().is_none());
        assert_eq!(p.state(), PointState::Lowered);
    }

    #[test]
    fn test_lecture_done_aborts_any_raise() {
        let now = Instant::now();
        let mut p = PointAutopilot::new(PointConfig::default());
        p.start();
        assert_eq!(p.lecture_done().unwrap().from, "raising_half");

        let mut p = PointAutopilot::new(PointConfig::default());
        p.start();
        settle(&mut p, now);
        p.attention_done();
        assert_eq!(p.lecture_done().unwrap().from, "raising_full");
        assert!(p.lecture_done().is_none());
    }

    #[test]
    fn test_early_attention_done_is_applied_at_half() {
        let mut p = PointAutopilot::new(PointConfig::default());
        let now = Instant::now();
        p.start();
        assert!(p.attention_done().is_none());
        assert_eq!(settle(&mut p, now).unwrap().to, "raising_full");
    }

    #[test]
    fn test_holding_times_out() {
        let mut p = PointAutopilot::new(PointConfig { max_hold_secs: Some(2.0), ..PointConfig::default() });
        let now = Instant::now();
        p.start();
        settle(&mut p, now);
        assert!(p.update(now + Duration::from_secs(1)).is_none());
        assert_eq!(p.update(now + Duration::from_secs(2)).unwrap().reason, "max_hold");
    }

    #[test]
    fn test_no_progress_without_feedback() {
        let mut p = PointAutopilot::new(PointConfig::default());
        p.start();
        p.observe(10.0);
        assert!(p.update(Instant::now()).is_none());
        assert_eq!(p.state(), PointState::RaisingHalf);
    }
}
