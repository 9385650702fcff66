// File: figurine-common/src/models/behavior.rs
//
// Tunables for tracking, the head/body solver, idle motion and the two hand
// autopilots. Angles are degrees, durations are seconds, follow rates are 1/s
// (first-order blend constants) and rate caps are degrees per second.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::joint::ValueRange;

/// What the figurine does when nobody is focused and no manual heading is set.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdleBehavior {
    /// Hold the last heading.
    #[default]
    None,
    Sweep(SweepConfig),
    Patrol(PatrolConfig),
    MinimalIdle(MinimalIdleConfig),
}

impl IdleBehavior {
    pub fn name(&self) -> &'static str {
        match self {
            IdleBehavior::None => "none",
            IdleBehavior::Sweep(_) => "sweep",
            IdleBehavior::Patrol(_) => "patrol",
            IdleBehavior::MinimalIdle(_) => "minimal_idle",
        }
    }

    pub fn is_minimal(&self) -> bool {
        matches!(self, IdleBehavior::MinimalIdle(_))
    }

    /// Checked both when settings load and when a behaviour arrives at runtime.
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            IdleBehavior::None => {}
            IdleBehavior::Sweep(s) => {
                if !(s.period_secs.is_finite() && s.period_secs > 0.0) || !s.range.is_valid() {
                    return Err(Error::InvalidConfig("sweep needs a valid range and positive period".into()));
                }
            }
            IdleBehavior::Patrol(p) => {
                if p.headings.is_empty() && !p.include_camera_bounds {
                    return Err(Error::InvalidConfig("patrol needs at least one heading".into()));
                }
                if p.headings.iter().any(|h| !h.is_finite()) {
                    return Err(Error::InvalidConfig("patrol headings must be finite".into()));
                }
                if !p.dwell_secs.is_valid()
                    || !p.transition_secs.is_valid()
                    || p.dwell_secs.lower < 0.0
                    || p.transition_secs.lower < 0.0
                {
                    return Err(Error::InvalidConfig("patrol dwell/transition ranges are invalid".into()));
                }
                if !p.head_jitter.is_valid() {
                    return Err(Error::InvalidConfig("patrol head_jitter range is invalid".into()));
                }
                for (name, v) in [
                    ("resume_dwell_secs", p.resume_dwell_secs),
                    ("head_follow_rate", p.head_follow_rate),
                    ("body_follow_rate", p.body_follow_rate),
                    ("dedup_epsilon", p.dedup_epsilon),
                ] {
                    if !(v.is_finite() && v >= 0.0) {
                        return Err(Error::InvalidConfig(format!("patrol.{} must be finite and non-negative", name)));
                    }
                }
            }
            IdleBehavior::MinimalIdle(m) => {
                if !(m.head_sway_period_secs.is_finite() && m.head_sway_period_secs > 0.0) {
                    return Err(Error::InvalidConfig("minimal idle sway period must be positive".into()));
                }
                if !m.center.is_finite()
                    || !m.head_sway_amplitude.is_finite()
                    || !(m.center_drift_rate.is_finite() && m.center_drift_rate >= 0.0)
                {
                    return Err(Error::InvalidConfig("minimal idle values must be finite".into()));
                }
            }
        }
        Ok(())
    }
}

/// Sinusoidal oscillation between the bounds of `range`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SweepConfig {
    pub range: ValueRange,
    pub period_secs: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            range: ValueRange::new(-60.0, 60.0),
            period_secs: 16.0,
        }
    }
}

/// Alternates between the lowest and highest of `headings`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PatrolConfig {
    pub headings: Vec<f64>,
    /// Random dwell at each extreme.
    pub dwell_secs: ValueRange,
    /// Random duration of each extreme-to-extreme move.
    pub transition_secs: ValueRange,
    pub head_follow_rate: f64,
    pub body_follow_rate: f64,
    /// Random heading offset re-rolled at every dwell.
    pub head_jitter: ValueRange,
    /// Widen the extremes to the full camera range (body + head limits).
    pub include_camera_bounds: bool,
    /// Dwell used right after resuming from tracking.
    pub resume_dwell_secs: f64,
    /// Headings closer than this are treated as the same heading.
    pub dedup_epsilon: f64,
}

impl Default for PatrolConfig {
    fn default() -> Self {
        Self {
            headings: vec![-70.0, 70.0],
            dwell_secs: ValueRange::new(2.0, 5.0),
            transition_secs: ValueRange::new(3.0, 6.0),
            head_follow_rate: 2.5,
            body_follow_rate: 1.2,
            head_jitter: ValueRange::new(-4.0, 4.0),
            include_camera_bounds: false,
            resume_dwell_secs: 0.8,
            dedup_epsilon: 0.5,
        }
    }
}

/// Near-motionless posture for when there is nothing to do.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MinimalIdleConfig {
    pub center: f64,
    pub head_sway_amplitude: f64,
    pub head_sway_period_secs: f64,
    pub body_still: bool,
    /// Rate at which the held centre drifts back towards `center`.
    pub center_drift_rate: f64,
}

impl Default for MinimalIdleConfig {
    fn default() -> Self {
        Self {
            center: 0.0,
            head_sway_amplitude: 3.0,
            head_sway_period_secs: 12.0,
            body_still: true,
            center_drift_rate: 0.05,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TrackingBehavior {
    /// Keep focus this long after the last detection.
    pub hold_secs: f64,
    pub head_follow_rate: f64,
    pub body_follow_rate: f64,
    pub camera_hfov_deg: f64,
    /// |offset| below this sustains the previous target.
    pub deadband: f64,
    /// Smoothing factor (0..1) for the camera-space angular velocity estimate.
    pub prediction_smoothing: f64,
    /// EMA factor (0..1) for the raw offset.
    pub offset_smoothing: f64,
    pub max_angular_velocity: f64,
    /// Samples jumping further than this from the accepted heading are rejected.
    pub max_jump_deg: f64,
    /// After this many consecutive rejections the next sample is accepted.
    pub reacquire_after: u32,
    pub max_lead_secs: f64,
    pub max_lead_deg: f64,
    pub center_hold_offset: f64,
    pub center_hold_velocity: f64,
    pub center_hold_dwell_secs: f64,
    /// While |offset| is inside this band the body stops following.
    pub body_hold_band: f64,
    /// Fraction of head deflection per second handed over to the body.
    pub recenter_rate: f64,
}

impl Default for TrackingBehavior {
    fn default() -> Self {
        Self {
            hold_secs: 1.5,
            head_follow_rate: 6.0,
            body_follow_rate: 1.5,
            camera_hfov_deg: 60.0,
            deadband: 0.04,
            prediction_smoothing: 0.3,
            offset_smoothing: 0.35,
            max_angular_velocity: 90.0,
            max_jump_deg: 25.0,
            reacquire_after: 6,
            max_lead_secs: 0.25,
            max_lead_deg: 6.0,
            center_hold_offset: 0.06,
            center_hold_velocity: 4.0,
            center_hold_dwell_secs: 0.6,
            body_hold_band: 0.12,
            recenter_rate: 0.4,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SolverConfig {
    pub head_rate_cap: f64,
    pub body_rate_cap: f64,
    /// Share of the remaining error the head takes while searching.
    pub search_head_share: f64,
    pub search_head_follow_rate: f64,
    pub search_body_follow_rate: f64,
    pub manual_head_follow_rate: f64,
    pub manual_body_follow_rate: f64,
    /// Desired-heading change that counts as a new schedule.
    pub heading_change_threshold: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            head_rate_cap: 120.0,
            body_rate_cap: 45.0,
            search_head_share: 0.35,
            search_head_follow_rate: 2.0,
            search_body_follow_rate: 1.0,
            manual_head_follow_rate: 5.0,
            manual_body_follow_rate: 2.0,
            heading_change_threshold: 0.5,
        }
    }
}

/// Left-hand wave autopilot.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WaveConfig {
    pub raised: f64,
    pub lowered: f64,
    /// How far each wave cycle drops back towards `lowered`.
    pub pull_back: f64,
    pub cycles: u32,
    /// Measured position within this of the target counts as reached.
    pub tolerance: f64,
    pub top_pause_secs: f64,
    pub cooldown_secs: f64,
    /// Floor applied to `cooldown_secs`.
    pub min_cooldown_secs: f64,
    pub max_raised_secs: f64,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            raised: 90.0,
            lowered: 0.0,
            pull_back: 30.0,
            cycles: 3,
            tolerance: 4.0,
            top_pause_secs: 0.8,
            cooldown_secs: 20.0,
            min_cooldown_secs: 5.0,
            max_raised_secs: 12.0,
        }
    }
}

impl WaveConfig {
    pub fn effective_cooldown_secs(&self) -> f64 {
        self.cooldown_secs.max(self.min_cooldown_secs)
    }
}

/// Right-hand pointing autopilot.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PointConfig {
    pub lowered: f64,
    pub half: f64,
    pub full: f64,
    pub tolerance: f64,
    /// Lower automatically after holding this long without a lecture-done signal.
    pub max_hold_secs: Option<f64>,
}

impl Default for PointConfig {
    fn default() -> Self {
        Self {
            lowered: 0.0,
            half: 50.0,
            full: 100.0,
            tolerance: 4.0,
            max_hold_secs: Some(30.0),
        }
    }
}
