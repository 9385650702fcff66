// File: figurine-common/src/models/joint.rs

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// One controllable axis of the figurine.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JointId {
    Body,
    Head,
    LeftHand,
    RightHand,
}

impl JointId {
    pub const ALL: [JointId; 4] = [
        JointId::Body,
        JointId::Head,
        JointId::LeftHand,
        JointId::RightHand,
    ];
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JointId::Body => write!(f, "body"),
            JointId::Head => write!(f, "head"),
            JointId::LeftHand => write!(f, "left-hand"),
            JointId::RightHand => write!(f, "right-hand"),
        }
    }
}

impl FromStr for JointId {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "body" => Ok(JointId::Body),
            "head" => Ok(JointId::Head),
            "left-hand" | "left_hand" | "left" => Ok(JointId::LeftHand),
            "right-hand" | "right_hand" | "right" => Ok(JointId::RightHand),
            _ => Err(format!("Unknown joint: {}", s)),
        }
    }
}

/// Closed interval `[lower, upper]`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct ValueRange {
    pub lower: f64,
    pub upper: f64,
}

impl ValueRange {
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.mid();
        }
        value.max(self.lower).min(self.upper)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    pub fn mid(&self) -> f64 {
        (self.lower + self.upper) * 0.5
    }

    pub fn span(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn is_valid(&self) -> bool {
        self.lower.is_finite() && self.upper.is_finite() && self.lower <= self.upper
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Normal,
    Reversed,
}

impl Orientation {
    /// Maps a logical value onto the physical axis, mirrored around the range centre when reversed.
    pub fn to_physical(&self, logical: f64, range: &ValueRange) -> f64 {
        match self {
            Orientation::Normal => logical,
            Orientation::Reversed => range.lower + range.upper - logical,
        }
    }

    pub fn to_logical(&self, physical: f64, range: &ValueRange) -> f64 {
        // mirroring is its own inverse
        self.to_physical(physical, range)
    }
}

/// Parameters for the per-joint guard that relieves load against a mechanical stop.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct StallGuardConfig {
    /// How close (logical units) the measured position must be to the proposal and to an edge.
    pub tolerance: f64,
    /// How long the proposal must stay unchanged before freezing.
    pub hold_secs: f64,
    /// Proposals closer than this to the previous one count as unchanged.
    pub min_movement: f64,
    /// Distance from the edge at which a frozen target is parked.
    pub backoff: f64,
}

impl Default for StallGuardConfig {
    fn default() -> Self {
        Self {
            tolerance: 2.0,
            hold_secs: 1.5,
            min_movement: 0.5,
            backoff: 4.0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct JointConfig {
    pub id: JointId,
    pub range: ValueRange,
    pub home: f64,
    #[serde(default)]
    pub orientation: Orientation,
    /// Maximum speed in logical units per second, pushed to the driver on start.
    #[serde(default)]
    pub velocity_limit: Option<f64>,
    #[serde(default)]
    pub stall_guard: Option<StallGuardConfig>,
}

impl JointConfig {
    pub fn new(id: JointId, range: ValueRange, home: f64) -> Self {
        Self {
            id,
            range,
            home,
            orientation: Orientation::Normal,
            velocity_limit: None,
            stall_guard: None,
        }
    }

    pub fn with_velocity_limit(mut self, limit: f64) -> Self {
        self.velocity_limit = Some(limit);
        self
    }

    pub fn with_stall_guard(mut self, guard: StallGuardConfig) -> Self {
        self.stall_guard = Some(guard);
        self
    }

    pub fn clamp(&self, value: f64) -> f64 {
        self.range.clamp(value)
    }
}

/// One value per joint. Used for configs, drivers, measurements and targets alike.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct JointMap<T> {
    pub body: T,
    pub head: T,
    pub left_hand: T,
    pub right_hand: T,
}

impl<T> JointMap<T> {
    pub fn from_fn(mut f: impl FnMut(JointId) -> T) -> Self {
        Self {
            body: f(JointId::Body),
            head: f(JointId::Head),
            left_hand: f(JointId::LeftHand),
            right_hand: f(JointId::RightHand),
        }
    }

    pub fn get(&self, id: JointId) -> &T {
        match id {
            JointId::Body => &self.body,
            JointId::Head => &self.head,
            JointId::LeftHand => &self.left_hand,
            JointId::RightHand => &self.right_hand,
        }
    }

    pub fn get_mut(&mut self, id: JointId) -> &mut T {
        match id {
            JointId::Body => &mut self.body,
            JointId::Head => &mut self.head,
            JointId::LeftHand => &mut self.left_hand,
            JointId::RightHand => &mut self.right_hand,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (JointId, &T)> {
        JointId::ALL.into_iter().map(move |id| (id, self.get(id)))
    }

    pub fn map<U>(&self, mut f: impl FnMut(JointId, &T) -> U) -> JointMap<U> {
        JointMap::from_fn(|id| f(id, self.get(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_id_round_trips_through_display() {
        for id in JointId::ALL {
            assert_eq!(id.to_string().parse::<JointId>().unwrap(), id);
        }
        assert!("elbow".parse::<JointId>().is_err());
    }

    #[test]
    fn test_range_clamp_handles_out_of_range_and_nan() {
        let r = ValueRange::new(-90.0, 90.0);
        assert_eq!(r.clamp(120.0), 90.0);
        assert_eq!(r.clamp(-400.0), -90.0);
        assert_eq!(r.clamp(12.5), 12.5);
        assert_eq!(r.clamp(f64::NAN), 0.0);
    }

    #[test]
    fn test_reversed_orientation_mirrors_inside_range() {
        let r = ValueRange::new(0.0, 100.0);
        let o = Orientation::Reversed;
        assert_eq!(o.to_physical(10.0, &r), 90.0);
        assert_eq!(o.to_logical(90.0, &r), 10.0);
        assert_eq!(Orientation::Normal.to_physical(10.0, &r), 10.0);
    }

    #[test]
    fn test_joint_map_iterates_in_fixed_order() {
        let m = JointMap::from_fn(|id| id.to_string());
        let ids: Vec<JointId> = m.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, JointId::ALL.to_vec());
        assert_eq!(m.get(JointId::Head), "head");
    }
}
