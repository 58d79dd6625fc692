//! Tests for the capture session controller

use super::*;
use crate::config::TimeoutConfig;
use crate::errors::{CaptureError, ConfigureError, DisconnectError, HardwareError, OpenError};
use crate::hardware::HardwareEvent;
use crate::testing::{unique_camera_id, HardwareCall, SimulatedCamera, SimulatedSink};
use crate::types::Size;
use std::sync::Arc;
use std::time::Duration;

fn options(camera_id: &str) -> ControllerOptions {
    ControllerOptions::new(camera_id).with_photo_size(Size::new(64, 48))
}

fn short_timeouts(camera_id: &str) -> ControllerOptions {
    options(camera_id).with_timeouts(TimeoutConfig {
        open_ms: 50,
        configure_ms: 50,
        capture_ms: 50,
    })
}

async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition was never reached");
}

/// Open and configure preview plus still capture
async fn running(
    camera: &SimulatedCamera,
    options: ControllerOptions,
) -> (CaptureSessionController, Arc<SimulatedSink>) {
    let controller = CaptureSessionController::spawn(camera.clone(), options);
    controller.open().await.unwrap();
    let still = controller.still_target().await.unwrap();
    let preview = SimulatedSink::new(Size::new(64, 48));
    let config = default_configuration(Some(OutputTarget::preview(preview.clone())), Some(still))
        .unwrap();
    controller.configure(config).await.unwrap();
    (controller, preview)
}

fn preview_only(preview: &Arc<SimulatedSink>) -> SessionConfiguration {
    SessionConfiguration::builder()
        .target(OutputTarget::preview(preview.clone()))
        .build()
        .unwrap()
}

fn assert_clean(camera: &SimulatedCamera) {
    assert!(camera.order_violations().is_empty(), "{:?}", camera.order_violations());
    assert!(camera.invalid_closes().is_empty(), "{:?}", camera.invalid_closes());
    assert_eq!(camera.open_devices(), 0);
    assert_eq!(camera.live_sessions(), 0);
    assert_eq!(camera.live_image_sinks(), 0);
}

#[tokio::test]
async fn test_lifecycle_open_configure_close() {
    let camera = SimulatedCamera::new();
    let id = unique_camera_id();
    let controller = CaptureSessionController::spawn(camera.clone(), options(&id));
    assert_eq!(controller.state(), SessionState::Closed);

    controller.open().await.unwrap();
    assert_eq!(controller.state(), SessionState::Opened);
    assert_eq!(camera.open_devices(), 1);

    let still = controller.still_target().await.unwrap();
    let preview = SimulatedSink::new(Size::new(64, 48));
    let config =
        default_configuration(Some(OutputTarget::preview(preview)), Some(still)).unwrap();
    controller.configure(config).await.unwrap();

    assert_eq!(controller.state(), SessionState::Running);
    assert_eq!(camera.live_sessions(), 1);
    assert!(camera.streaming_session().is_some());
    let active = controller.active_configuration().unwrap();
    assert_eq!(active.kinds(), vec![OutputKind::Preview, OutputKind::StillCapture]);

    controller.close().await;
    assert_eq!(controller.state(), SessionState::Closed);
    assert!(controller.is_terminated());
    assert!(controller.status().fatal.is_none());
    assert_clean(&camera);
}

#[tokio::test]
async fn test_session_closed_before_device() {
    let camera = SimulatedCamera::new();
    let (controller, _preview) = running(&camera, options(&unique_camera_id())).await;
    controller.close().await;

    let calls = camera.calls();
    let session_closed = calls
        .iter()
        .position(|c| matches!(c, HardwareCall::CloseSession { .. }))
        .unwrap();
    let device_closed = calls
        .iter()
        .position(|c| matches!(c, HardwareCall::CloseDevice { .. }))
        .unwrap();
    assert!(session_closed < device_closed);
    assert_clean(&camera);
}

#[tokio::test]
async fn test_closed_controller_rejects_open() {
    let camera = SimulatedCamera::new();
    let controller = CaptureSessionController::spawn(camera, options(&unique_camera_id()));
    controller.close().await;
    controller.close().await;

    assert_eq!(controller.open().await, Err(OpenError::Closed));
}

#[tokio::test]
async fn test_open_twice_is_invalid_state() {
    let camera = SimulatedCamera::new();
    let controller = CaptureSessionController::spawn(camera, options(&unique_camera_id()));
    controller.open().await.unwrap();

    assert_eq!(
        controller.open().await,
        Err(OpenError::InvalidState(SessionState::Opened))
    );
    controller.close().await;
}

#[tokio::test]
async fn test_second_controller_for_same_camera_is_busy() {
    let id = unique_camera_id();
    let first = CaptureSessionController::spawn(SimulatedCamera::new(), options(&id));
    first.open().await.unwrap();

    let second = CaptureSessionController::spawn(SimulatedCamera::new(), options(&id));
    assert!(matches!(second.open().await, Err(OpenError::DeviceBusy(_))));
    assert_eq!(second.state(), SessionState::Closed);

    first.close().await;
    second.open().await.unwrap();
    second.close().await;
}

#[tokio::test]
async fn test_absent_device() {
    let camera = SimulatedCamera::new();
    camera.set_absent(true);
    let controller = CaptureSessionController::spawn(camera, options(&unique_camera_id()));

    assert!(matches!(controller.open().await, Err(OpenError::DeviceAbsent(_))));
    assert_eq!(controller.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_open_failure_allows_retry() {
    let camera = SimulatedCamera::new();
    camera.fail_next_open(HardwareError::PermissionDenied("camera".into()));
    let controller = CaptureSessionController::spawn(camera.clone(), options(&unique_camera_id()));

    assert!(matches!(
        controller.open().await,
        Err(OpenError::PermissionDenied(_))
    ));
    assert_eq!(controller.state(), SessionState::Closed);
    assert!(!controller.is_terminated());

    controller.open().await.unwrap();
    assert_eq!(controller.state(), SessionState::Opened);
    controller.close().await;
    assert_clean(&camera);
}

#[tokio::test]
async fn test_open_timeout_closes_late_device() {
    let camera = SimulatedCamera::new();
    camera.hold_opens(true);
    let controller =
        CaptureSessionController::spawn(camera.clone(), short_timeouts(&unique_camera_id()));

    assert_eq!(controller.open().await, Err(OpenError::Timeout(50)));
    assert_eq!(controller.state(), SessionState::Closed);

    assert!(camera.complete_open());
    eventually(|| camera.open_devices() == 0).await;
    assert!(camera
        .calls()
        .iter()
        .any(|c| matches!(c, HardwareCall::CloseDevice { .. })));
    assert!(camera.invalid_closes().is_empty());
}

#[tokio::test]
async fn test_configure_requires_opened() {
    let camera = SimulatedCamera::new();
    let controller = CaptureSessionController::spawn(camera.clone(), options(&unique_camera_id()));
    let preview = SimulatedSink::new(Size::new(64, 48));

    assert_eq!(
        controller.configure(preview_only(&preview)).await,
        Err(ConfigureError::InvalidState(SessionState::Closed))
    );
    assert_eq!(camera.hardware_commands(), 0);
}

#[tokio::test]
async fn test_configure_failure_returns_to_opened() {
    let camera = SimulatedCamera::new();
    let controller = CaptureSessionController::spawn(camera.clone(), options(&unique_camera_id()));
    controller.open().await.unwrap();

    camera.fail_next_configure(HardwareError::Busy("too many streams".into()));
    let preview = SimulatedSink::new(Size::new(64, 48));
    assert!(matches!(
        controller.configure(preview_only(&preview)).await,
        Err(ConfigureError::ResourceExhausted(_))
    ));
    assert_eq!(controller.state(), SessionState::Opened);
    assert!(controller.active_configuration().is_none());

    controller.configure(preview_only(&preview)).await.unwrap();
    assert_eq!(controller.state(), SessionState::Running);
    controller.close().await;
}

#[tokio::test]
async fn test_invalid_target_is_rejected_before_hardware() {
    let camera = SimulatedCamera::new();
    let controller = CaptureSessionController::spawn(camera.clone(), options(&unique_camera_id()));
    controller.open().await.unwrap();
    let before = camera.hardware_commands();

    let preview = SimulatedSink::new(Size::new(64, 48));
    preview.invalidate();
    assert!(matches!(
        controller.configure(preview_only(&preview)).await,
        Err(ConfigureError::InvalidTarget(_))
    ));
    assert_eq!(camera.hardware_commands(), before);
    controller.close().await;
}

#[tokio::test]
async fn test_capture_still_delivers_image() {
    let camera = SimulatedCamera::new();
    let (controller, _preview) = running(&camera, options(&unique_camera_id())).await;

    let image = controller.capture_still().await.unwrap();
    assert!(!image.data.is_empty());
    assert_eq!(image.reported_size, Size::new(64, 48));
    assert_eq!(controller.state(), SessionState::Running);
    controller.close().await;
}

#[tokio::test]
async fn test_capture_without_still_target_is_not_configured() {
    let camera = SimulatedCamera::new();
    let controller = CaptureSessionController::spawn(camera.clone(), options(&unique_camera_id()));
    controller.open().await.unwrap();
    let before = camera.hardware_commands();
    assert!(matches!(
        controller.capture_still().await,
        Err(CaptureError::NotConfigured)
    ));

    let preview = SimulatedSink::new(Size::new(64, 48));
    controller.configure(preview_only(&preview)).await.unwrap();
    let configured = camera.hardware_commands();
    assert!(configured > before);
    assert!(matches!(
        controller.capture_still().await,
        Err(CaptureError::NotConfigured)
    ));
    assert_eq!(camera.hardware_commands(), configured);
    controller.close().await;
}

#[tokio::test]
async fn test_capture_timeout_discards_late_result() {
    let camera = SimulatedCamera::new();
    let (controller, _preview) = running(&camera, short_timeouts(&unique_camera_id())).await;

    camera.hold_captures(true);
    assert!(matches!(
        controller.capture_still().await,
        Err(CaptureError::Timeout(50))
    ));

    let stale = camera.pending_captures();
    assert_eq!(stale.len(), 1);
    camera.hold_captures(false);
    assert!(camera.complete_capture(stale[0]));

    let image = controller.capture_still().await.unwrap();
    assert!(!image.data.is_empty());
    assert_eq!(controller.state(), SessionState::Running);
    controller.close().await;
}

#[tokio::test]
async fn test_stale_capture_leaves_newer_capture_pending() {
    let camera = SimulatedCamera::new();
    let timeouts = options(&unique_camera_id()).with_timeouts(TimeoutConfig {
        open_ms: 50,
        configure_ms: 50,
        capture_ms: 300,
    });
    let (controller, _preview) = running(&camera, timeouts).await;

    camera.hold_captures(true);
    assert!(matches!(
        controller.capture_still().await,
        Err(CaptureError::Timeout(300))
    ));
    let stale = camera.pending_captures()[0];

    let second = tokio::spawn({
        let controller = controller.clone();
        async move { controller.capture_still().await }
    });
    eventually(|| camera.pending_captures().len() == 2).await;
    let newer = *camera.pending_captures().last().unwrap();
    assert!(newer > stale);

    assert!(camera.complete_capture(stale));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!second.is_finished(), "stale image resolved the newer capture");

    assert!(camera.complete_capture(newer));
    assert!(second.await.unwrap().is_ok());
    assert_eq!(controller.state(), SessionState::Running);
    controller.close().await;
    assert_clean(&camera);
}

#[tokio::test]
async fn test_duplicate_configure_completion_is_ignored() {
    let camera = SimulatedCamera::new();
    let (controller, _preview) = running(&camera, options(&unique_camera_id())).await;

    let request = camera
        .calls()
        .iter()
        .find_map(|c| match c {
            HardwareCall::CreateSession { request, .. } => Some(*request),
            _ => None,
        })
        .unwrap();
    let session = camera.streaming_session().unwrap();
    camera.deliver(HardwareEvent::SessionConfigured { request, session });

    // still usable after the duplicate
    controller.capture_still().await.unwrap();
    assert_eq!(controller.state(), SessionState::Running);
    assert_eq!(camera.live_sessions(), 1);
    controller.close().await;
    assert_clean(&camera);
}

#[tokio::test]
async fn test_reconfigure_keeps_old_session_until_new_one_streams() {
    let camera = SimulatedCamera::new();
    let (controller, preview) = running(&camera, options(&unique_camera_id())).await;
    let old = camera.streaming_session().unwrap();

    controller.reconfigure(preview_only(&preview)).await.unwrap();
    let new = camera.streaming_session().unwrap();
    assert_ne!(old, new);
    assert_eq!(camera.live_sessions(), 1);
    assert_eq!(camera.max_live_sessions(), 2);
    assert_eq!(
        controller.active_configuration().unwrap().kinds(),
        vec![OutputKind::Preview]
    );

    let calls = camera.calls();
    let armed = calls
        .iter()
        .position(|c| matches!(c, HardwareCall::SetRepeating { session, .. } if *session == new))
        .unwrap();
    let retired = calls
        .iter()
        .position(|c| matches!(c, HardwareCall::CloseSession { session } if *session == old))
        .unwrap();
    assert!(armed < retired);

    controller.close().await;
    assert_clean(&camera);
}

#[tokio::test]
async fn test_reconfigure_to_same_outputs_is_noop() {
    let camera = SimulatedCamera::new();
    let (controller, _preview) = running(&camera, options(&unique_camera_id())).await;
    let before = camera.hardware_commands();

    let active = controller.active_configuration().unwrap();
    controller.reconfigure(active).await.unwrap();
    assert_eq!(camera.hardware_commands(), before);
    controller.close().await;
}

#[tokio::test]
async fn test_reconfigure_failure_restores_previous() {
    let camera = SimulatedCamera::new();
    let (controller, preview) = running(&camera, options(&unique_camera_id())).await;
    let old = camera.streaming_session().unwrap();
    let before = controller.active_configuration().unwrap();

    camera.fail_next_configure(HardwareError::Failed("rejected".into()));
    assert!(matches!(
        controller.reconfigure(preview_only(&preview)).await,
        Err(ConfigureError::Hardware(_))
    ));

    assert_eq!(controller.state(), SessionState::Running);
    assert!(controller.active_configuration().unwrap().same_outputs(&before));
    assert_eq!(camera.streaming_session(), Some(old));
    controller.capture_still().await.unwrap();
    controller.close().await;
    assert_clean(&camera);
}

#[tokio::test]
async fn test_reconfigure_timeout_restores_and_closes_late_session() {
    let camera = SimulatedCamera::new();
    let (controller, preview) = running(&camera, short_timeouts(&unique_camera_id())).await;
    let old = camera.streaming_session().unwrap();

    camera.hold_configures(true);
    assert_eq!(
        controller.reconfigure(preview_only(&preview)).await,
        Err(ConfigureError::Timeout(50))
    );
    assert_eq!(controller.state(), SessionState::Running);
    assert_eq!(camera.streaming_session(), Some(old));

    assert!(camera.complete_configure());
    eventually(|| camera.live_sessions() == 1).await;
    controller.close().await;
    assert_clean(&camera);
}

#[tokio::test]
async fn test_failed_restore_is_fatal() {
    let camera = SimulatedCamera::new();
    let (controller, preview) = running(&camera, options(&unique_camera_id())).await;

    // one for the new session, one for re-arming the old one
    camera.fail_repeating_requests(2);
    assert!(matches!(
        controller.reconfigure(preview_only(&preview)).await,
        Err(ConfigureError::RestoreFailed(_))
    ));

    let status = controller.wait_for(|s| s.terminated).await;
    assert_eq!(status.state, SessionState::Closed);
    assert!(matches!(status.fatal, Some(DisconnectError::SessionFailed(_))));
    assert_clean(&camera);
}

#[tokio::test]
async fn test_commands_queue_behind_in_flight_operation() {
    let camera = SimulatedCamera::new();
    let (controller, preview) = running(&camera, options(&unique_camera_id())).await;

    camera.hold_configures(true);
    let reconfiguring = {
        let controller = controller.clone();
        let config = preview_only(&preview);
        tokio::spawn(async move { controller.reconfigure(config).await })
    };
    controller
        .wait_for(|s| s.state == SessionState::Reconfiguring)
        .await;

    let deconfiguring = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.deconfigure().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(controller.state(), SessionState::Reconfiguring);

    assert!(camera.complete_configure());
    reconfiguring.await.unwrap().unwrap();
    deconfiguring.await.unwrap().unwrap();

    assert_eq!(controller.state(), SessionState::Opened);
    assert_eq!(camera.live_sessions(), 0);
    controller.close().await;
    assert_clean(&camera);
}

#[tokio::test]
async fn test_deconfigure_returns_to_opened() {
    let camera = SimulatedCamera::new();
    let (controller, _preview) = running(&camera, options(&unique_camera_id())).await;

    controller.deconfigure().await.unwrap();
    assert_eq!(controller.state(), SessionState::Opened);
    assert!(controller.active_configuration().is_none());
    assert_eq!(camera.live_sessions(), 0);
    assert_eq!(camera.open_devices(), 1);

    assert!(matches!(
        controller.capture_still().await,
        Err(CaptureError::NotConfigured)
    ));
    controller.close().await;
    assert_clean(&camera);
}

#[tokio::test]
async fn test_still_target_is_reused() {
    let camera = SimulatedCamera::new();
    let controller = CaptureSessionController::spawn(camera.clone(), options(&unique_camera_id()));
    controller.open().await.unwrap();

    let first = controller.still_target().await.unwrap();
    let second = controller.still_target().await.unwrap();
    assert_eq!(first.sink_id(), second.sink_id());
    assert_eq!(first.owner(), SinkOwner::Controller);
    assert_eq!(camera.live_image_sinks(), 1);
    controller.close().await;
    assert_eq!(camera.live_image_sinks(), 0);
}

#[tokio::test]
async fn test_disconnect_is_fatal() {
    let id = unique_camera_id();
    let camera = SimulatedCamera::new();
    let (controller, _preview) = running(&camera, options(&id)).await;

    camera.disconnect();
    let status = controller.wait_for(|s| s.terminated).await;
    assert_eq!(status.fatal, Some(DisconnectError::Disconnected(id.clone())));
    assert_eq!(status.state, SessionState::Closed);
    assert!(status.active.is_none());

    match controller.capture_still().await {
        Err(CaptureError::Disconnected(cause)) => {
            assert_eq!(cause, DisconnectError::Disconnected(id))
        }
        other => panic!("unexpected capture outcome: {:?}", other.map(|i| i.data.len())),
    }
    controller.close().await;
    assert_clean(&camera);
}

#[tokio::test]
async fn test_device_error_is_fatal() {
    let camera = SimulatedCamera::new();
    let (controller, _preview) = running(&camera, options(&unique_camera_id())).await;

    camera.device_error(4);
    let status = controller.wait_for(|s| s.terminated).await;
    assert!(matches!(
        status.fatal,
        Some(DisconnectError::DeviceError { code: 4, .. })
    ));
    assert_clean(&camera);
}

#[tokio::test]
async fn test_close_during_open_resolves_request() {
    let camera = SimulatedCamera::new();
    camera.hold_opens(true);
    let controller = CaptureSessionController::spawn(camera.clone(), options(&unique_camera_id()));

    let opening = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.open().await })
    };
    controller.wait_for(|s| s.state == SessionState::Opening).await;
    controller.close().await;

    assert_eq!(
        opening.await.unwrap(),
        Err(OpenError::Disconnected(DisconnectError::Closed))
    );

    assert!(camera.complete_open());
    eventually(|| camera.open_devices() == 0).await;
    assert!(camera.invalid_closes().is_empty());
}

#[tokio::test]
async fn test_close_during_capture_resolves_request() {
    let camera = SimulatedCamera::new();
    let (controller, _preview) = running(&camera, options(&unique_camera_id())).await;
    camera.hold_captures(true);

    let capturing = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.capture_still().await })
    };
    eventually(|| !camera.pending_captures().is_empty()).await;
    controller.close().await;

    assert!(matches!(
        capturing.await.unwrap(),
        Err(CaptureError::Disconnected(DisconnectError::Closed))
    ));
    assert_clean(&camera);
}

#[tokio::test]
async fn test_teardown_continues_past_failed_steps() {
    let camera = SimulatedCamera::new();
    let (controller, _preview) = running(&camera, options(&unique_camera_id())).await;
    camera.fail_session_close(true);
    camera.fail_device_close(true);

    controller.close().await;
    assert!(controller.is_terminated());
    assert_clean(&camera);
}

#[tokio::test]
async fn test_dropping_last_handle_releases_hardware() {
    let camera = SimulatedCamera::new();
    let (controller, _preview) = running(&camera, options(&unique_camera_id())).await;
    drop(controller);

    eventually(|| camera.open_devices() == 0).await;
    assert_clean(&camera);
}

#[tokio::test]
async fn test_concurrent_captures_are_serialized() {
    let camera = SimulatedCamera::new();
    let (controller, _preview) = running(&camera, options(&unique_camera_id())).await;

    let captures = (0..4).map(|_| controller.capture_still());
    let results = futures::future::join_all(captures).await;
    assert!(results.iter().all(|r| r.is_ok()));

    let sequences: Vec<_> = camera
        .calls()
        .iter()
        .filter_map(|c| match c {
            HardwareCall::Capture { sequence, .. } => Some(*sequence),
            _ => None,
        })
        .collect();
    assert_eq!(sequences.len(), 4);
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));
    controller.close().await;
}
