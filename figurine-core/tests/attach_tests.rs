// tests/attach_tests.rs

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use mockall::mock;
use tokio_test::assert_err;

use figurine_common::models::{JointId, JointMap, Settings};
use figurine_common::traits::{JointDriver, PositionObserver, TelemetryLogger};
use figurine_core::drivers::{open_all, VirtualJoint};
use figurine_core::eventbus::EventBus;
use figurine_core::{Error, MotionController};

mock! {
    Joint {}
    #[async_trait]
    impl JointDriver for Joint {
        fn id(&self) -> JointId;
        async fn open(&self, timeout: Duration) -> Result<(), Error>;
        fn move_to_logical(&self, value: f64) -> Result<(), Error>;
        fn set_velocity(&self, limit: f64) -> Result<(), Error>;
        fn shutdown(&self);
        fn set_position_observer(&self, observer: PositionObserver);
        fn set_telemetry_logger(&self, logger: TelemetryLogger);
    }
}

fn virtual_driver(settings: &Settings, id: JointId) -> Arc<VirtualJoint> {
    Arc::new(VirtualJoint::new(settings.joints.get(id).clone()))
}

#[tokio::test(start_paused = true)]
async fn test_failing_open_releases_opened_and_failed_joints() {
    let settings = Settings::default();
    let body = virtual_driver(&settings, JointId::Body);
    let head = virtual_driver(&settings, JointId::Head);
    let left = virtual_driver(&settings, JointId::LeftHand);

    let mut right = MockJoint::new();
    right.expect_id().return_const(JointId::RightHand);
    right
        .expect_open()
        .times(1)
        .returning(|_| Err(Error::AttachmentTimeout(JointId::RightHand)));
    right.expect_shutdown().times(1).return_const(());
    right.expect_move_to_logical().never();

    let drivers: JointMap<Arc<dyn JointDriver>> = JointMap {
        body: body.clone(),
        head: head.clone(),
        left_hand: left.clone(),
        right_hand: Arc::new(right),
    };

    let err = assert_err!(open_all(&drivers, Duration::from_secs(1)).await);
    assert!(matches!(err, Error::AttachmentTimeout(JointId::RightHand)));
    for joint in [&body, &head, &left] {
        assert!(!joint.is_attached());
        assert_eq!(joint.shutdown_count(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_controller_start_propagates_driver_open_error() {
    let settings = Settings::default();
    let mut body = MockJoint::new();
    body.expect_id().return_const(JointId::Body);
    body.expect_set_position_observer().times(1).return_const(());
    body.expect_set_telemetry_logger().times(1).return_const(());
    body.expect_open()
        .returning(|_| Err(Error::driver(JointId::Body, "bus offline")));
    body.expect_shutdown().times(1).return_const(());
    body.expect_set_velocity().never();

    let head = virtual_driver(&settings, JointId::Head);
    let drivers: JointMap<Arc<dyn JointDriver>> = JointMap {
        body: Arc::new(body),
        head: head.clone(),
        left_hand: virtual_driver(&settings, JointId::LeftHand),
        right_hand: virtual_driver(&settings, JointId::RightHand),
    };

    let controller = MotionController::new(settings, drivers, Arc::new(EventBus::new())).unwrap();
    let err = controller.start().await.unwrap_err();
    assert!(matches!(err, Error::Driver { joint: JointId::Body, .. }));
    // never reached, never opened
    assert_eq!(head.shutdown_count(), 0);
    assert!(!head.is_attached());
}

#[tokio::test]
async fn test_mismatched_driver_ids_are_rejected() {
    let settings = Settings::default();
    let drivers: JointMap<Arc<dyn JointDriver>> = JointMap {
        body: virtual_driver(&settings, JointId::Head),
        head: virtual_driver(&settings, JointId::Head),
        left_hand: virtual_driver(&settings, JointId::LeftHand),
        right_hand: virtual_driver(&settings, JointId::RightHand),
    };
    let result = MotionController::new(settings, drivers, Arc::new(EventBus::new()));
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}
