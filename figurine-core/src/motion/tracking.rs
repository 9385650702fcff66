//! src/motion/tracking.rs
//!
//! Turns the noisy stream of normalised person offsets into an absolute
//! heading to follow. Samples go through, in order: the centre deadband, the
//! jump gate, an EMA low-pass, an angular-velocity estimate, a bounded
//! predictive lead and finally the centre-hold.

use std::time::Instant;
use tracing::trace;

use figurine_common::models::TrackingBehavior;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// Inside the centre deadband; previous target sustained.
    Deadband,
    Accepted,
    /// Offset and velocity have been near zero long enough; target frozen.
    CenterHold,
    /// Measurement jumped further than allowed from the accepted heading.
    RejectedJump { delta: f64 },
    /// Accepted after too many consecutive rejections; filter restarted.
    Reacquired,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerUpdate {
    pub target: f64,
    pub outcome: SampleOutcome,
}

#[derive(Debug, Clone)]
pub struct OffsetTracker {
    config: TrackingBehavior,
    filtered_offset: Option<f64>,
    /// Camera-space angular velocity, degrees per second.
    angular_velocity: f64,
    last_sample_at: Option<Instant>,
    accepted_heading: Option<f64>,
    target: Option<f64>,
    center_since: Option<Instant>,
    consecutive_rejections: u32,
}

impl OffsetTracker {
    pub fn new(config: TrackingBehavior) -> Self {
        Self {
            config,
            filtered_offset: None,
            angular_velocity: 0.0,
            last_sample_at: None,
            accepted_heading: None,
            target: None,
            center_since: None,
            consecutive_rejections: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    pub fn target(&self) -> Option<f64> {
        self.target
    }

    pub fn accepted_heading(&self) -> Option<f64> {
        self.accepted_heading
    }

    pub fn filtered_offset(&self) -> Option<f64> {
        self.filtered_offset
    }

    pub fn angular_velocity(&self) -> f64 {
        self.angular_velocity
    }

    pub fn is_center_held(&self, now: Instant) -> bool {
        self.center_since
            .map(|since| now.saturating_duration_since(since).as_secs_f64() >= self.config.center_hold_dwell_secs)
            .unwrap_or(false)
    }

    /// True while the last sample is younger than the tracking hold.
    pub fn is_focused(&self, now: Instant) -> bool {
        match self.last_sample_at {
            Some(t) => {
                self.target.is_some()
                    && now.saturating_duration_since(t).as_secs_f64() < self.config.hold_secs
            }
            None => false,
        }
    }

    /// Clears all state once the hold has run out. Returns true if it did.
    pub fn expire(&mut self, now: Instant) -> bool {
        if self.last_sample_at.is_some() && !self.is_focused(now) {
            self.reset();
            return true;
        }
        false
    }

    fn half_fov(&self) -> f64 {
        self.config.camera_hfov_deg * 0.5
    }

    /// Feed one detection sample taken while the camera pointed at `camera_heading`.
    pub fn update(&mut self, offset: f64, camera_heading: f64, now: Instant) -> TrackerUpdate {
        let raw = if offset.is_finite() { offset.clamp(-1.0, 1.0) } else { 0.0 };
        let half_fov = self.half_fov();
        let raw_heading = camera_heading + raw * half_fov;

        if raw.abs() < self.config.deadband {
            self.run_filter(raw, now);
            self.accepted_heading = Some(raw_heading);
            self.consecutive_rejections = 0;
            self.track_center_hold(now);
            let target = *self.target.get_or_insert(camera_heading);
            return TrackerUpdate { target, outcome: SampleOutcome::Deadband };
        }

        let mut outcome = SampleOutcome::Accepted;
        if let Some(previous) = self.accepted_heading {
            let delta = raw_heading - previous;
            if delta.abs() > self.config.max_jump_deg {
                self.consecutive_rejections += 1;
                if self.consecutive_rejections < self.config.reacquire_after.max(1) {
                    trace!("tracking: rejected jump of {:.1} deg", delta);
                    let target = self.target.unwrap_or(previous);
                    return TrackerUpdate { target, outcome: SampleOutcome::RejectedJump { delta } };
                }
                // Persistent jump: someone else, or the same person really moved.
                self.filtered_offset = None;
                self.angular_velocity = 0.0;
                self.center_since = None;
                outcome = SampleOutcome::Reacquired;
            }
        }
        self.consecutive_rejections = 0;
        self.accepted_heading = Some(raw_heading);

        let filtered = self.run_filter(raw, now);
        let measured = camera_heading + filtered * half_fov;

        let magnitude = filtered.abs().min(1.0);
        let lead_secs = self.config.max_lead_secs * magnitude;
        let lead_deg = (self.angular_velocity * lead_secs)
            .clamp(-self.config.max_lead_deg, self.config.max_lead_deg);
        // near centre trust the measurement, towards the edges lean on the prediction
        let blended = measured + magnitude * lead_deg;

        self.track_center_hold(now);
        if outcome == SampleOutcome::Accepted && self.is_center_held(now) {
            if let Some(held) = self.target {
                return TrackerUpdate { target: held, outcome: SampleOutcome::CenterHold };
            }
        }

        self.target = Some(blended);
        TrackerUpdate { target: blended, outcome }
    }

    /// EMA on the offset plus the smoothed, clamped angular velocity. Returns the filtered offset.
    fn run_filter(&mut self, raw: f64, now: Instant) -> f64 {
        let dt = self
            .last_sample_at
            .map(|t| now.saturating_duration_since(t).as_secs_f64())
            .unwrap_or(0.0);

        let filtered = match self.filtered_offset {
            Some(prev) => {
                let f = prev + self.config.offset_smoothing * (raw - prev);
                if dt > 1e-4 {
                    let raw_velocity = (f - prev) * self.half_fov() / dt;
                    let v = self.angular_velocity
                        + self.config.prediction_smoothing * (raw_velocity - self.angular_velocity);
                    self.angular_velocity =
                        v.clamp(-self.config.max_angular_velocity, self.config.max_angular_velocity);
                }
                f
            }
            None => raw,
        };

        self.filtered_offset = Some(filtered);
        self.last_sample_at = Some(now);
        filtered
    }

    fn track_center_hold(&mut self, now: Instant) {
        let filtered = self.filtered_offset.unwrap_or(0.0);
        if filtered.abs() < self.config.center_hold_offset
            && self.angular_velocity.abs() < self.config.center_hold_velocity
        {
            self.center_since.get_or_insert(now);
        } else {
            self.center_since = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tracker() -> OffsetTracker {
        OffsetTracker::new(TrackingBehavior::default())
    }

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn test_zero_offset_freezes_heading_after_center_dwell() {
        let mut t = tracker();
        let base = Instant::now();
        let mut targets = Vec::new();
        // camera keeps wandering; a centred person must not drag the target along
        for i in 0..60u64 {
            let camera = 10.0 + (i as f64) * 0.1;
            let up = t.update(0.0, camera, at(base, i * 20));
            targets.push(up.target);
        }
        assert!(t.is_center_held(at(base, 59 * 20)));
        let first = targets[0];
        assert!(targets.iter().all(|&x| x == first));
    }

    #[test]
    fn test_small_offset_outside_deadband_freezes_after_dwell() {
        let mut t = tracker();
        let base = Instant::now();
        let mut last = None;
        let mut held_target = None;
        for i in 0..100u64 {
            let camera = (i as f64) * 0.05;
            let up = t.update(0.05, camera, at(base, i * 20));
            if up.outcome == SampleOutcome::CenterHold {
                let h = *held_target.get_or_insert(up.target);
                assert_eq!(up.target, h);
            }
            last = Some(up);
        }
        assert_eq!(last.unwrap().outcome, SampleOutcome::CenterHold);
    }

    #[test]
    fn test_single_jump_is_rejected() {
        let mut t = tracker();
        let base = Instant::now();
        for i in 0..10u64 {
            t.update(0.3, 0.0, at(base, i * 20));
        }
        let before_heading = t.accepted_heading();
        let before_target = t.target();

        // 0.3 -> -0.9 at 30 deg half-fov is a 36 deg jump
        let up = t.update(-0.9, 0.0, at(base, 220));
        assert!(matches!(up.outcome, SampleOutcome::RejectedJump { .. }));
        assert_eq!(t.accepted_heading(), before_heading);
        assert_eq!(t.target(), before_target);
        assert_eq!(Some(up.target), before_target);
    }

    #[test]
    fn test_persistent_jump_is_reacquired() {
        let mut t = tracker();
        let base = Instant::now();
        for i in 0..5u64 {
            t.update(0.3, 0.0, at(base, i * 20));
        }
        let mut outcomes = Vec::new();
        for i in 5..12u64 {
            outcomes.push(t.update(-0.9, 0.0, at(base, i * 20)).outcome);
        }
        assert!(outcomes.contains(&SampleOutcome::Reacquired));
        assert!((t.accepted_heading().unwrap() + 27.0).abs() < 1e-9);
    }

    #[test]
    fn test_offset_maps_to_absolute_heading() {
        let mut t = tracker();
        let base = Instant::now();
        let up = t.update(0.5, 20.0, base);
        // first sample: no velocity yet, so no lead
        assert!((up.target - 35.0).abs() < 1e-9);
        assert_eq!(up.outcome, SampleOutcome::Accepted);
    }

    #[test]
    fn test_lead_is_bounded() {
        let mut t = tracker();
        let base = Instant::now();
        let mut offset = -0.6;
        let mut last = None;
        for i in 0..30u64 {
            offset += 0.04;
            last = Some(t.update(offset, 0.0, at(base, i * 20)));
        }
        let up = last.unwrap();
        let measured = t.filtered_offset().unwrap() * 30.0;
        assert!((up.target - measured).abs() <= TrackingBehavior::default().max_lead_deg + 1e-9);
        assert!(t.angular_velocity().abs() <= TrackingBehavior::default().max_angular_velocity);
    }

    #[test]
    fn test_expire_clears_state_after_hold() {
        let mut t = tracker();
        let base = Instant::now();
        t.update(0.4, 0.0, base);
        assert!(t.is_focused(at(base, 1000)));
        assert!(!t.expire(at(base, 1000)));
        assert!(t.expire(at(base, 1600)));
        assert_eq!(t.target(), None);
        assert_eq!(t.accepted_heading(), None);
    }
}
