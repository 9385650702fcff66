// tests/test_utils/mod.rs
#![allow(dead_code)]

use std::sync::Arc;

use figurine_common::models::{IdleBehavior, JointMap, Settings};
use figurine_core::drivers::{as_drivers, virtual_joints, VirtualJoint, VirtualJointOptions};
use figurine_core::eventbus::{EventBus, MotionEvent};
use figurine_core::MotionController;
use tokio::sync::mpsc;

/// Default settings with idle motion switched off, so headings only change
/// when a test asks them to.
pub fn quiet_settings() -> Settings {
    Settings {
        idle: IdleBehavior::None,
        ..Settings::default()
    }
}

pub struct Rig {
    pub controller: MotionController,
    pub joints: JointMap<Arc<VirtualJoint>>,
    pub bus: Arc<EventBus>,
    pub events: mpsc::Receiver<MotionEvent>,
}

pub fn rig(settings: Settings) -> Rig {
    rig_with_joints(virtual_joints(&settings, VirtualJointOptions::default()), settings)
}

pub fn rig_with_joints(joints: JointMap<Arc<VirtualJoint>>, settings: Settings) -> Rig {
    let bus = Arc::new(EventBus::new());
    let events = bus.subscribe(Some(16 * 1024));
    let controller = MotionController::new(settings, as_drivers(&joints), Arc::clone(&bus))
        .expect("controller should accept the settings");
    Rig { controller, joints, bus, events }
}

/// Everything published so far.
pub fn drain(rx: &mut mpsc::Receiver<MotionEvent>) -> Vec<MotionEvent> {
    let mut out = Vec::new();
    while let Ok(e) = rx.try_recv() {
        out.push(e);
    }
    out
}
