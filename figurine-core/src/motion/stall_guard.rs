//! src/motion/stall_guard.rs
//!
//! Per-joint guard against pushing a joint into its mechanical stop. Freezing
//! only ever happens at a range edge; an unchanged target in the interior is
//! left alone.

use std::time::Instant;
use tracing::debug;

use figurine_common::models::{StallGuardConfig, ValueRange};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Edge {
    Lower,
    Upper,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frozen {
    pub edge: Edge,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct StallGuard {
    config: StallGuardConfig,
    range: ValueRange,
    frozen: Option<Frozen>,
    last_proposal: Option<f64>,
    unchanged_since: Option<Instant>,
    measured: Option<f64>,
}

impl StallGuard {
    pub fn new(config: StallGuardConfig, range: ValueRange) -> Self {
        Self {
            config,
            range,
            frozen: None,
            last_proposal: None,
            unchanged_since: None,
            measured: None,
        }
    }

    pub fn frozen(&self) -> Option<Frozen> {
        self.frozen
    }

    /// Record the latest measured position of the joint.
    pub fn observe(&mut self, measured: f64) {
        self.measured = Some(measured);
    }

    /// Context transitions call this so the joint can move freely straight away.
    pub fn reset(&mut self) {
        self.frozen = None;
        self.last_proposal = None;
        self.unchanged_since = None;
    }

    /// Filter a proposed target. Returns the target to command, which is the
    /// proposal itself unless the joint is frozen at an edge.
    pub fn filter(&mut self, proposed: f64, now: Instant) -> f64 {
        if let Some(frozen) = self.frozen {
            let retreating = match frozen.edge {
                Edge::Lower => proposed > frozen.value,
                Edge::Upper => proposed < frozen.value,
            };
            if !retreating {
                return frozen.value;
            }
            debug!("stall guard: thawed at {:?} edge, proposal {:.2}", frozen.edge, proposed);
            self.frozen = None;
            self.last_proposal = None;
            self.unchanged_since = None;
        }

        let unchanged = self
            .last_proposal
            .map(|last| (proposed - last).abs() <= self.config.min_movement)
            .unwrap_or(false);
        if !unchanged {
            self.last_proposal = Some(proposed);
            self.unchanged_since = Some(now);
            return proposed;
        }

        let held_for = self
            .unchanged_since
            .map(|since| now.saturating_duration_since(since).as_secs_f64())
            .unwrap_or(0.0);
        if held_for < self.config.hold_secs {
            return proposed;
        }

        let Some(measured) = self.measured else {
            return proposed;
        };
        let reachable = self.range.clamp(proposed);
        if (measured - reachable).abs() > self.config.tolerance {
            return proposed;
        }

        let edge = if (measured - self.range.lower).abs() <= self.config.tolerance {
            Edge::Lower
        } else if (measured - self.range.upper).abs() <= self.config.tolerance {
            Edge::Upper
        } else {
            // dwelling in the interior is not a stall
            return proposed;
        };

        let value = match edge {
            Edge::Lower => self.range.lower + self.config.backoff,
            Edge::Upper => self.range.upper - self.config.backoff,
        };
        debug!(
            "stall guard: froze at {:?} edge, measured {:.2}, parked at {:.2}",
            edge, measured, value
        );
        self.frozen = Some(Frozen { edge, value });
        value
    }
}
