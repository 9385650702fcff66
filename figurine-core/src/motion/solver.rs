//! src/motion/solver.rs
//!
//! Splits one desired camera heading into head and body targets. The head is
//! fast and takes the error first; the body follows the residual more slowly.

use std::time::Instant;

use figurine_common::models::{JointConfig, SolverConfig, TrackingBehavior};

use crate::motion::stall_guard::StallGuard;
use crate::motion::{approach, follow, MotionContext};

/// Per-call inputs to [`HeadBodySolver::solve`].
#[derive(Debug, Clone, Copy)]
pub struct SolveInput {
    pub desired: f64,
    pub context: MotionContext,
    /// Filtered person offset while tracking.
    pub offset: Option<f64>,
    /// Explicit head demand (minimal idle sway), bypassing the error split.
    pub head_demand: Option<f64>,
    /// Follow rates supplied by the idle generator (patrol), search context only.
    pub search_rates: Option<(f64, f64)>,
    pub dt: f64,
    pub now: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveOutput {
    pub head: f64,
    pub body: f64,
}

#[derive(Debug, Clone)]
pub struct HeadBodySolver {
    config: SolverConfig,
    tracking: TrackingBehavior,
    head_joint: JointConfig,
    body_joint: JointConfig,
    head_guard: Option<StallGuard>,
    body_guard: Option<StallGuard>,
    head: f64,
    body: f64,
}

impl HeadBodySolver {
    pub fn new(
        config: SolverConfig,
        tracking: TrackingBehavior,
        head_joint: JointConfig,
        body_joint: JointConfig,
    ) -> Self {
        let head_guard = head_joint.stall_guard.map(|g| StallGuard::new(g, head_joint.range));
        let body_guard = body_joint.stall_guard.map(|g| StallGuard::new(g, body_joint.range));
        Self {
            head: head_joint.home,
            body: body_joint.home,
            config,
            tracking,
            head_joint,
            body_joint,
            head_guard,
            body_guard,
        }
    }

    pub fn head(&self) -> f64 {
        self.head
    }

    pub fn body(&self) -> f64 {
        self.body
    }

    pub fn head_guard(&self) -> Option<&StallGuard> {
        self.head_guard.as_ref()
    }

    pub fn body_guard(&self) -> Option<&StallGuard> {
        self.body_guard.as_ref()
    }

    pub fn observe_head(&mut self, measured: f64) {
        if let Some(g) = self.head_guard.as_mut() {
            g.observe(measured);
        }
    }

    pub fn observe_body(&mut self, measured: f64) {
        if let Some(g) = self.body_guard.as_mut() {
            g.observe(measured);
        }
    }

    pub fn reset_guards(&mut self) {
        if let Some(g) = self.head_guard.as_mut() {
            g.reset();
        }
        if let Some(g) = self.body_guard.as_mut() {
            g.reset();
        }
    }

    fn rates(&self, input: &SolveInput) -> (f64, f64) {
        match input.context {
            MotionContext::Manual => (self.config.manual_head_follow_rate, self.config.manual_body_follow_rate),
            MotionContext::Tracking => {
                let body_rate = match input.offset {
                    Some(o) if o.abs() < self.tracking.body_hold_band => 0.0,
                    _ => self.tracking.body_follow_rate,
                };
                (self.tracking.head_follow_rate, body_rate)
            }
            MotionContext::Search => input
                .search_rates
                .unwrap_or((self.config.search_head_follow_rate, self.config.search_body_follow_rate)),
        }
    }

    pub fn solve(&mut self, input: SolveInput) -> SolveOutput {
        let dt = input.dt.max(0.0);
        let (head_rate, body_rate) = self.rates(&input);

        let remaining = input.desired - self.body;
        let demand = match (input.head_demand, input.context) {
            (Some(h), _) => h,
            (None, MotionContext::Search) => remaining * self.config.search_head_share,
            (None, _) => remaining,
        };
        let demand = self.head_joint.clamp(demand);

        let mut head = follow(self.head, demand, head_rate, dt);
        head = approach(self.head, head, self.config.head_rate_cap * dt);

        // While tracking, slowly hand head deflection over to the body so the
        // head trends back to centre without moving the camera.
        let shift = if input.context == MotionContext::Tracking {
            let range = self.body_joint.range;
            approach(0.0, head * self.tracking.recenter_rate * dt, self.config.body_rate_cap * dt)
                .clamp(range.lower - self.body, range.upper - self.body)
        } else {
            0.0
        };
        head -= shift;
        let head = self.guard_head(head, input.now);

        let body_demand = input.desired - head;
        let mut body = follow(self.body + shift, body_demand, body_rate, dt);
        body = approach(self.body, body, self.config.body_rate_cap * dt);
        let body = self.guard_body(body, input.now);

        self.head = head;
        self.body = body;
        SolveOutput { head, body }
    }

    fn guard_head(&mut self, proposed: f64, now: Instant) -> f64 {
        let guarded = match self.head_guard.as_mut() {
            Some(g) => g.filter(proposed, now),
            None => proposed,
        };
        self.head_joint.clamp(guarded)
    }

    fn guard_body(&mut self, proposed: f64, now: Instant) -> f64 {
        let guarded = match self.body_guard.as_mut() {
            Some(g) => g.filter(proposed, now),
            None => proposed,
        };
        self.body_joint.clamp(guarded)
    }
}
