//! src/motion/idle.rs
//!
//! Headings to follow when nobody is focused and no manual heading is set.

use std::f64::consts::TAU;
use std::time::{Duration, Instant};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use figurine_common::models::{IdleBehavior, PatrolConfig, ValueRange};

use crate::motion::follow;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdleTarget {
    pub heading: f64,
    /// Explicit head demand; the body then holds `heading - head`.
    pub head: Option<f64>,
    /// (head, body) follow rates overriding the solver's search defaults.
    pub rates: Option<(f64, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PatrolLeg {
    Dwell { at: f64, until: Instant, next: usize },
    Transit { from: f64, to: usize, start: Instant, duration: f64 },
}

#[derive(Debug, Clone)]
struct PatrolState {
    /// One heading, or the (low, high) pair.
    extremes: Vec<f64>,
    leg: PatrolLeg,
    jitter: f64,
}

#[derive(Debug)]
pub struct IdleGenerator {
    behavior: IdleBehavior,
    camera_range: ValueRange,
    rng: StdRng,
    sweep_origin: Instant,
    sweep_phase: f64,
    patrol: Option<PatrolState>,
    minimal_center: f64,
    hold_heading: f64,
    last_update: Option<Instant>,
}

impl IdleGenerator {
    pub fn new(behavior: IdleBehavior, camera_range: ValueRange, anchor: f64, now: Instant) -> Self {
        Self::with_rng(behavior, camera_range, anchor, now, StdRng::from_os_rng())
    }

    pub fn with_rng(
        behavior: IdleBehavior,
        camera_range: ValueRange,
        anchor: f64,
        now: Instant,
        rng: StdRng,
    ) -> Self {
        let mut generator = Self {
            behavior: IdleBehavior::None,
            camera_range,
            rng,
            sweep_origin: now,
            sweep_phase: 0.0,
            patrol: None,
            minimal_center: anchor,
            hold_heading: anchor,
            last_update: None,
        };
        generator.set_behavior(behavior, anchor, now);
        generator
    }

    pub fn behavior(&self) -> &IdleBehavior {
        &self.behavior
    }

    pub fn set_behavior(&mut self, behavior: IdleBehavior, anchor: f64, now: Instant) {
        self.behavior = behavior;
        self.patrol = None;
        self.reanchor(anchor, now);
    }

    /// Continue from `current` instead of jumping to wherever the idle motion would be.
    pub fn reanchor(&mut self, current: f64, now: Instant) {
        self.hold_heading = current;
        self.minimal_center = current;
        self.last_update = Some(now);
        match &self.behavior {
            IdleBehavior::Sweep(cfg) => {
                let amplitude = cfg.range.span() * 0.5;
                let s = if amplitude > 0.0 {
                    ((current - cfg.range.mid()) / amplitude).clamp(-1.0, 1.0)
                } else {
                    0.0
                };
                self.sweep_origin = now;
                self.sweep_phase = s.asin();
            }
            IdleBehavior::Patrol(cfg) => {
                let cfg = cfg.clone();
                let extremes = patrol_extremes(&cfg, self.camera_range);
                let next = farthest_index(&extremes, current);
                let jitter = self.roll(cfg.head_jitter);
                self.patrol = Some(PatrolState {
                    extremes,
                    leg: PatrolLeg::Dwell {
                        at: current,
                        until: now + secs(cfg.resume_dwell_secs),
                        next,
                    },
                    jitter,
                });
            }
            IdleBehavior::MinimalIdle(_) | IdleBehavior::None => {}
        }
    }

    pub fn target(&mut self, now: Instant) -> IdleTarget {
        let dt = self
            .last_update
            .map(|t| now.saturating_duration_since(t).as_secs_f64())
            .unwrap_or(0.0);
        self.last_update = Some(now);

        match self.behavior.clone() {
            IdleBehavior::None => IdleTarget { heading: self.hold_heading, head: None, rates: None },
            IdleBehavior::Sweep(cfg) => {
                let t = now.saturating_duration_since(self.sweep_origin).as_secs_f64();
                let amplitude = cfg.range.span() * 0.5;
                let heading = cfg.range.mid() + amplitude * (self.sweep_phase + TAU * t / cfg.period_secs).sin();
                IdleTarget { heading, head: None, rates: None }
            }
            IdleBehavior::Patrol(cfg) => {
                let heading = self.patrol_heading(&cfg, now);
                IdleTarget {
                    heading,
                    head: None,
                    rates: Some((cfg.head_follow_rate, cfg.body_follow_rate)),
                }
            }
            IdleBehavior::MinimalIdle(cfg) => {
                self.minimal_center = follow(self.minimal_center, cfg.center, cfg.center_drift_rate, dt);
                let t = now.saturating_duration_since(self.sweep_origin).as_secs_f64();
                let sway = cfg.head_sway_amplitude * (TAU * t / cfg.head_sway_period_secs).sin();
                IdleTarget {
                    heading: self.minimal_center + sway,
                    head: if cfg.body_still { Some(sway) } else { None },
                    rates: None,
                }
            }
        }
    }

    fn patrol_heading(&mut self, cfg: &PatrolConfig, now: Instant) -> f64 {
        let Some(mut state) = self.patrol.take() else {
            return self.hold_heading;
        };

        let heading = loop {
            match state.leg {
                PatrolLeg::Dwell { at, until, next } => {
                    let parked = state.extremes.len() < 2 && (at - state.extremes[0]).abs() <= cfg.dedup_epsilon;
                    if now < until || parked {
                        break at + state.jitter;
                    }
                    let duration = self.roll(cfg.transition_secs).max(0.0);
                    trace!("patrol: leaving {:.1} for {:.1} over {:.1}s", at, state.extremes[next], duration);
                    state.leg = PatrolLeg::Transit { from: at, to: next, start: until.min(now), duration };
                }
                PatrolLeg::Transit { from, to, start, duration } => {
                    let target = state.extremes[to];
                    let elapsed = now.saturating_duration_since(start).as_secs_f64();
                    if duration > 0.0 && elapsed < duration {
                        break from + (target - from) * (elapsed / duration) + state.jitter;
                    }
                    let dwell = self.roll(cfg.dwell_secs).max(0.0);
                    state.jitter = self.roll(cfg.head_jitter);
                    state.leg = PatrolLeg::Dwell {
                        at: target,
                        until: now + secs(dwell),
                        next: (to + 1) % state.extremes.len(),
                    };
                    break target + state.jitter;
                }
            }
        };

        self.patrol = Some(state);
        heading
    }

    fn roll(&mut self, range: ValueRange) -> f64 {
        if !range.is_valid() {
            return 0.0;
        }
        if range.span() <= 0.0 {
            return range.lower;
        }
        self.rng.random_range(range.lower..=range.upper)
    }
}

fn secs(s: f64) -> Duration {
    if !s.is_finite() {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(s.max(0.0))
}

/// Lowest and highest candidate headings, collapsed to one when they coincide.
fn patrol_extremes(cfg: &PatrolConfig, camera_range: ValueRange) -> Vec<f64> {
    let mut candidates = cfg.headings.clone();
    if cfg.include_camera_bounds {
        candidates.push(camera_range.lower);
        candidates.push(camera_range.upper);
    }
    let candidates: Vec<f64> = candidates
        .into_iter()
        .filter(|h| h.is_finite())
        .map(|h| camera_range.clamp(h))
        .collect();
    if candidates.is_empty() {
        return vec![camera_range.mid()];
    }
    let low = candidates.iter().cloned().fold(f64::INFINITY, f64::min);
    let high = candidates.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if high - low <= cfg.dedup_epsilon {
        vec![low]
    } else {
        vec![low, high]
    }
}

fn farthest_index(extremes: &[f64], from: f64) -> usize {
    if extremes.len() < 2 {
        return 0;
    }
    if (extremes[1] - from).abs() >= (extremes[0] - from).abs() {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figurine_common::models::{MinimalIdleConfig, SweepConfig};

    const CAMERA: ValueRange = ValueRange::new(-150.0, 150.0);

    fn patrol(headings: Vec<f64>, include_camera_bounds: bool) -> IdleBehavior {
        IdleBehavior::Patrol(PatrolConfig {
            headings,
            dwell_secs: ValueRange::new(0.5, 1.5),
            transition_secs: ValueRange::new(1.0, 2.0),
            head_jitter: ValueRange::new(0.0, 0.0),
            include_camera_bounds,
            ..PatrolConfig::default()
        })
    }

    fn sample(g: &mut IdleGenerator, base: Instant, secs: f64) -> Vec<f64> {
        let steps = (secs / 0.02) as u64;
        (0..steps)
            .map(|i| g.target(base + Duration::from_millis(i * 20)).heading)
            .collect()
    }

    #[test]
    fn test_patrol_alternates_between_extremes_only() {
        let base = Instant::now();
        let mut g = IdleGenerator::with_rng(patrol(vec![-90.0, 90.0], false), CAMERA, 0.0, base, StdRng::seed_from_u64(7));
        let headings = sample(&mut g, base, 60.0);

        // collapse runs of identical values: those are the dwells
        let mut dwells: Vec<f64> = Vec::new();
        for w in headings.windows(2) {
            if w[0] == w[1] && dwells.last() != Some(&w[0]) {
                dwells.push(w[0]);
            }
        }
        // the first dwell is the resume point; after that only the extremes
        assert_eq!(dwells[0], 0.0);
        assert!(dwells.len() > 4);
        for pair in dwells[1..].windows(2) {
            assert!(pair[0] == -90.0 || pair[0] == 90.0, "unexpected dwell at {}", pair[0]);
            assert_ne!(pair[0], pair[1]);
        }
        assert!(headings.iter().all(|h| *h >= -90.0 && *h <= 90.0));
    }

    #[test]
    fn test_patrol_can_widen_to_camera_bounds() {
        let cfg = PatrolConfig { headings: vec![-10.0, 10.0], include_camera_bounds: true, ..PatrolConfig::default() };
        assert_eq!(patrol_extremes(&cfg, CAMERA), vec![-150.0, 150.0]);
    }

    #[test]
    fn test_patrol_dedups_close_headings() {
        let cfg = PatrolConfig { headings: vec![20.0, 20.2], dedup_epsilon: 0.5, ..PatrolConfig::default() };
        assert_eq!(patrol_extremes(&cfg, CAMERA), vec![20.0]);
    }

    #[test]
    fn test_reanchor_resumes_from_current_heading() {
        let base = Instant::now();
        let mut g = IdleGenerator::with_rng(patrol(vec![-90.0, 90.0], false), CAMERA, 0.0, base, StdRng::seed_from_u64(1));
        sample(&mut g, base, 10.0);
        let t = base + Duration::from_secs(10);
        g.reanchor(37.0, t);
        assert_eq!(g.target(t).heading, 37.0);
        // resume dwell is short, then it heads for the farther extreme
        let later = g.target(t + Duration::from_millis(1500)).heading;
        assert!(later < 37.0);
    }

    #[test]
    fn test_sweep_stays_in_range_and_reanchors_smoothly() {
        let base = Instant::now();
        let sweep = IdleBehavior::Sweep(SweepConfig { range: ValueRange::new(-40.0, 40.0), period_secs: 8.0 });
        let mut g = IdleGenerator::new(sweep, CAMERA, 0.0, base);
        let hs = sample(&mut g, base, 16.0);
        assert!(hs.iter().all(|h| *h >= -40.0 - 1e-9 && *h <= 40.0 + 1e-9));
        assert!(hs.iter().cloned().fold(f64::NEG_INFINITY, f64::max) > 39.0);

        let t = base + Duration::from_secs(20);
        g.reanchor(25.0, t);
        assert!((g.target(t).heading - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_minimal_idle_drifts_to_center_and_sways_head_only() {
        let base = Instant::now();
        let cfg = MinimalIdleConfig { center_drift_rate: 1.0, ..MinimalIdleConfig::default() };
        let mut g = IdleGenerator::new(IdleBehavior::MinimalIdle(cfg.clone()), CAMERA, 50.0, base);
        let mut last = g.target(base);
        for i in 1..1000u64 {
            last = g.target(base + Duration::from_millis(i * 20));
        }
        let head = last.head.expect("body_still pins the head demand");
        assert!(head.abs() <= cfg.head_sway_amplitude + 1e-9);
        // body part of the heading has drifted back to the centre
        assert!((last.heading - head).abs() < 0.1);
    }
}
