// File: figurine-common/src/models/detection.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Published whenever the "person visible" flag flips.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DetectionUpdate {
    pub person_visible: bool,
    pub offset: Option<f64>,
    pub face_yaw: Option<f64>,
    pub timestamp: DateTime<Utc>,
    /// Seconds since focus started; on the "not visible" flip, how long the focus lasted.
    pub tracking_duration_secs: f64,
}
