// File: figurine-common/src/models/settings.rs

use std::fs;
use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::behavior::{
    IdleBehavior, PatrolConfig, PointConfig, SolverConfig, TrackingBehavior, WaveConfig,
};
use crate::models::joint::{JointConfig, JointId, JointMap, StallGuardConfig, ValueRange};

/// Every tunable of the controller. Built once at startup, never mutated afterwards.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub tick_hz: f64,
    /// Per-joint bound on `open()` during start.
    pub attach_timeout_secs: f64,
    pub joints: JointMap<JointConfig>,
    pub tracking: TrackingBehavior,
    pub solver: SolverConfig,
    /// Idle behaviour in effect at construction and after an `Idle` reset.
    pub idle: IdleBehavior,
    pub wave: WaveConfig,
    pub point: PointConfig,
}

impl Default for Settings {
    fn default() -> Self {
        let body = JointConfig::new(JointId::Body, ValueRange::new(-90.0, 90.0), 0.0)
            .with_velocity_limit(60.0)
            .with_stall_guard(StallGuardConfig::default());
        let head = JointConfig::new(JointId::Head, ValueRange::new(-60.0, 60.0), 0.0)
            .with_velocity_limit(150.0)
            .with_stall_guard(StallGuardConfig::default());
        let left_hand = JointConfig::new(JointId::LeftHand, ValueRange::new(0.0, 100.0), 0.0)
            .with_velocity_limit(160.0);
        let right_hand = JointConfig::new(JointId::RightHand, ValueRange::new(0.0, 100.0), 0.0)
            .with_velocity_limit(120.0);

        Self {
            tick_hz: 50.0,
            attach_timeout_secs: 5.0,
            joints: JointMap {
                body,
                head,
                left_hand,
                right_hand,
            },
            tracking: TrackingBehavior::default(),
            solver: SolverConfig::default(),
            idle: IdleBehavior::Patrol(PatrolConfig::default()),
            wave: WaveConfig::default(),
            point: PointConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, Error> {
        let de = &mut serde_json::Deserializer::from_str(text);
        let settings: Settings = serde_path_to_error::deserialize(de)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz)
    }

    pub fn attach_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.attach_timeout_secs)
    }

    /// Range of reachable camera headings (body limits + head limits).
    pub fn camera_range(&self) -> ValueRange {
        let b = self.joints.body.range;
        let h = self.joints.head.range;
        ValueRange::new(b.lower + h.lower, b.upper + h.upper)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !(self.tick_hz.is_finite() && self.tick_hz > 0.0) {
            return Err(Error::InvalidConfig(format!("tick_hz must be positive, got {}", self.tick_hz)));
        }
        if self.tick_interval().is_zero() {
            return Err(Error::InvalidConfig(format!("tick_hz {} is too high", self.tick_hz)));
        }
        if !(self.attach_timeout_secs.is_finite() && self.attach_timeout_secs > 0.0) {
            return Err(Error::InvalidConfig("attach_timeout_secs must be finite and positive".into()));
        }

        for (id, joint) in self.joints.iter() {
            if joint.id != id {
                return Err(Error::InvalidConfig(format!(
                    "joint entry '{}' declares id '{}'", id, joint.id
                )));
            }
            if !joint.range.is_valid() {
                return Err(Error::InvalidConfig(format!("joint '{}' has an empty range", id)));
            }
            if !joint.range.contains(joint.home) {
                return Err(Error::InvalidConfig(format!(
                    "joint '{}' home {} lies outside [{}, {}]",
                    id, joint.home, joint.range.lower, joint.range.upper
                )));
            }
            if let Some(limit) = joint.velocity_limit {
                if !(limit > 0.0) {
                    return Err(Error::InvalidConfig(format!("joint '{}' velocity limit must be positive", id)));
                }
            }
            if let Some(guard) = &joint.stall_guard {
                if guard.tolerance < 0.0 || guard.hold_secs <= 0.0 || guard.min_movement < 0.0 {
                    return Err(Error::InvalidConfig(format!("joint '{}' stall guard has negative values", id)));
                }
                if guard.backoff <= guard.tolerance {
                    return Err(Error::InvalidConfig(format!(
                        "joint '{}' stall guard backoff must exceed its tolerance", id
                    )));
                }
                if guard.backoff * 2.0 >= joint.range.span() {
                    return Err(Error::InvalidConfig(format!(
                        "joint '{}' stall guard backoff does not fit in its range", id
                    )));
                }
            }
        }

        let t = &self.tracking;
        if !(t.camera_hfov_deg > 0.0) || !(t.hold_secs > 0.0) {
            return Err(Error::InvalidConfig("tracking hfov and hold must be positive".into()));
        }
        if !(0.0..=1.0).contains(&t.offset_smoothing) || !(0.0..=1.0).contains(&t.prediction_smoothing) {
            return Err(Error::InvalidConfig("tracking smoothing factors must lie in 0..=1".into()));
        }
        if !(0.0..=1.0).contains(&self.solver.search_head_share) {
            return Err(Error::InvalidConfig("solver.search_head_share must lie in 0..=1".into()));
        }

        self.idle.validate()?;

        if !(self.wave.tolerance > 0.0) || !(self.point.tolerance > 0.0) {
            return Err(Error::InvalidConfig("gesture tolerances must be positive".into()));
        }
        for (name, v) in [
            ("wave.top_pause_secs", self.wave.top_pause_secs),
            ("wave.cooldown_secs", self.wave.cooldown_secs),
            ("wave.min_cooldown_secs", self.wave.min_cooldown_secs),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(Error::InvalidConfig(format!("{} must be finite and non-negative, got {}", name, v)));
            }
        }
        if !(self.wave.max_raised_secs.is_finite() && self.wave.max_raised_secs > 0.0) {
            return Err(Error::InvalidConfig("wave.max_raised_secs must be finite and positive".into()));
        }
        if let Some(max) = self.point.max_hold_secs {
            if !(max.is_finite() && max > 0.0) {
                return Err(Error::InvalidConfig("point.max_hold_secs must be finite and positive".into()));
            }
        }
        for (name, v) in [("wave.raised", self.wave.raised), ("wave.lowered", self.wave.lowered)] {
            if !self.joints.left_hand.range.contains(v) {
                return Err(Error::InvalidConfig(format!("{} is outside the left hand range", name)));
            }
        }
        for (name, v) in [
            ("point.lowered", self.point.lowered),
            ("point.half", self.point.half),
            ("point.full", self.point.full),
        ] {
            if !self.joints.right_hand.range.contains(v) {
                return Err(Error::InvalidConfig(format!("{} is outside the right hand range", name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let s = Settings::from_json_str(r#"{ "tick_hz": 25.0 }"#).unwrap();
        assert_eq!(s.tick_hz, 25.0);
        assert_eq!(s.wave, WaveConfig::default());
        assert_eq!(s.tick_interval(), Duration::from_millis(40));
    }

    #[test]
    fn test_bad_field_reports_its_path() {
        let err = Settings::from_json_str(r#"{ "tracking": { "deadband": "wide" } }"#).unwrap_err();
        match err {
            Error::Config { path, .. } => assert_eq!(path, "tracking.deadband"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_home_outside_range_is_rejected() {
        let mut s = Settings::default();
        s.joints.head.home = 500.0;
        assert!(matches!(s.validate(), Err(Error::InvalidConfig(_))));
    }

    fn rejects(json: &str) -> bool {
        matches!(Settings::from_json_str(json), Err(Error::InvalidConfig(_)))
    }

    #[test]
    fn test_negative_gesture_timings_are_rejected() {
        assert!(rejects(r#"{ "wave": { "top_pause_secs": -1.0 } }"#));
        assert!(rejects(r#"{ "wave": { "cooldown_secs": -0.5 } }"#));
        assert!(rejects(r#"{ "wave": { "min_cooldown_secs": -2.0 } }"#));
        assert!(rejects(r#"{ "wave": { "max_raised_secs": 0.0 } }"#));
        assert!(rejects(r#"{ "point": { "max_hold_secs": -3.0 } }"#));
        assert!(Settings::from_json_str(r#"{ "point": { "max_hold_secs": null } }"#).is_ok());
    }

    #[test]
    fn test_non_finite_timings_are_rejected() {
        let mut s = Settings::default();
        s.wave.top_pause_secs = f64::INFINITY;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.wave.cooldown_secs = f64::NAN;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.attach_timeout_secs = f64::INFINITY;
        assert!(matches!(s.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_tick_rate_that_rounds_to_zero_is_rejected() {
        assert!(rejects(r#"{ "tick_hz": 1e12 }"#));
        assert!(Settings::from_json_str(r#"{ "tick_hz": 1000.0 }"#).is_ok());
    }

    #[test]
    fn test_invalid_idle_behaviour_is_rejected() {
        assert!(rejects(r#"{ "idle": { "kind": "sweep", "period_secs": 0.0 } }"#));
        assert!(rejects(r#"{ "idle": { "kind": "patrol", "headings": [] } }"#));
    }

    #[test]
    fn test_camera_range_sums_body_and_head() {
        let s = Settings::default();
        let r = s.camera_range();
        assert_eq!(r.lower, -150.0);
        assert_eq!(r.upper, 150.0);
    }
}
