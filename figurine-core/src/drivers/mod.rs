//! src/drivers/mod.rs
//!
//! Joint bring-up and the simulated joint backend. Hardware backends live
//! outside this crate and only need to implement [`JointDriver`].

pub mod attach;
pub mod virtual_joint;

use std::sync::Arc;

use figurine_common::models::{JointMap, Settings};
use figurine_common::traits::JointDriver;

pub use attach::{open_all, AttachGuard};
pub use virtual_joint::{VirtualJoint, VirtualJointOptions};

/// One simulated joint per configured joint, sharing the same options.
pub fn virtual_joints(settings: &Settings, options: VirtualJointOptions) -> JointMap<Arc<VirtualJoint>> {
    settings
        .joints
        .map(|_, cfg| Arc::new(VirtualJoint::with_options(cfg.clone(), options.clone())))
}

/// Erase the concrete driver type for the controller.
pub fn as_drivers<D: JointDriver + 'static>(joints: &JointMap<Arc<D>>) -> JointMap<Arc<dyn JointDriver>> {
    joints.map(|_, j| Arc::clone(j) as Arc<dyn JointDriver>)
}
