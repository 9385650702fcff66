//! src/drivers/attach.rs
//!
//! Bring all four joints online, or none of them.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use figurine_common::models::{JointId, JointMap};
use figurine_common::traits::JointDriver;
use figurine_common::Error;

/// Shuts down every joint it has seen unless [`AttachGuard::commit`] is called.
pub struct AttachGuard<'a> {
    drivers: &'a JointMap<Arc<dyn JointDriver>>,
    touched: Vec<JointId>,
    committed: bool,
}

impl<'a> AttachGuard<'a> {
    pub fn new(drivers: &'a JointMap<Arc<dyn JointDriver>>) -> Self {
        Self {
            drivers,
            touched: Vec::with_capacity(4),
            committed: false,
        }
    }

    /// The joint is (or may be partly) attached and must be released on rollback.
    pub fn track(&mut self, id: JointId) {
        self.touched.push(id);
    }

    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for AttachGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for id in self.touched.iter().rev() {
            warn!("attach rollback: shutting down {}", id);
            self.drivers.get(*id).shutdown();
        }
    }
}

/// Open every driver in joint order, each bounded by `timeout`.
///
/// The first failure shuts down every driver opened so far (including the one
/// that failed) and is returned unchanged; a driver that overruns the timeout
/// yields [`Error::AttachmentTimeout`].
pub async fn open_all(drivers: &JointMap<Arc<dyn JointDriver>>, timeout: Duration) -> Result<(), Error> {
    let mut guard = AttachGuard::new(drivers);
    for (id, driver) in drivers.iter() {
        guard.track(id);
        match tokio::time::timeout(timeout, driver.open(timeout)).await {
            Ok(Ok(())) => info!("{} attached", id),
            Ok(Err(e)) => {
                warn!("{} failed to attach: {}", id, e);
                return Err(e);
            }
            Err(_) => {
                warn!("{} did not attach within {:?}", id, timeout);
                return Err(Error::AttachmentTimeout(id));
            }
        }
    }
    guard.commit();
    Ok(())
}
