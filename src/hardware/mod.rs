//! Narrow seam to the camera hardware
//!
//! Every call on [`CameraHardware`] only *submits* work. The outcome arrives later
//! through [`HardwareCallbacks`], which forwards it onto the controller's worker so
//! that submissions and completions are observed in one total order.

mod handle;

pub use handle::{HardwareHandle, ReleaseOutcome};

use crate::errors::HardwareError;
use crate::session::CaptureIntent;
use crate::types::{CapturedImage, ImageFormat, Size};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Monotonically increasing id correlating a submission with its completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An open device as known to the hardware layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceToken(pub u64);

/// A configured capture session as known to the hardware layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionToken(pub u64);

/// Identity of a frame sink (surface, image buffer, encoder input)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SinkId(pub u64);

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink-{}", self.0)
    }
}

/// A destination that can receive frames from the capture pipeline.
///
/// Whoever created the sink is responsible for destroying it. Holders of an
/// `Arc<dyn SinkResource>` only keep a reference.
pub trait SinkResource: Send + Sync + fmt::Debug {
    fn id(&self) -> SinkId;
    fn size(&self) -> Size;
    /// False once the creator has destroyed the underlying resource
    fn is_valid(&self) -> bool;
}

/// Completion and out-of-band notifications raised by the hardware
#[derive(Debug)]
pub enum HardwareEvent {
    DeviceOpened {
        request: RequestId,
        device: DeviceToken,
    },
    DeviceOpenFailed {
        request: RequestId,
        error: HardwareError,
    },
    SessionConfigured {
        request: RequestId,
        session: SessionToken,
    },
    SessionConfigureFailed {
        request: RequestId,
        error: HardwareError,
    },
    CaptureCompleted {
        sequence: RequestId,
        image: CapturedImage,
    },
    CaptureFailed {
        sequence: RequestId,
        error: HardwareError,
    },
    DeviceDisconnected {
        device: DeviceToken,
    },
    DeviceError {
        device: DeviceToken,
        code: i32,
    },
    SessionError {
        session: SessionToken,
        reason: String,
    },
}

/// Registered handler set the hardware reports through.
///
/// Cloneable and callable from any thread; events are queued for the worker.
#[derive(Debug, Clone)]
pub struct HardwareCallbacks {
    tx: mpsc::UnboundedSender<HardwareEvent>,
}

impl HardwareCallbacks {
    /// Create a callback set and the receiving end the worker drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<HardwareEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn deliver(&self, event: HardwareEvent) {
        if let Err(e) = self.tx.send(event) {
            log::debug!("Controller is gone, dropping hardware callback: {:?}", e.0);
        }
    }

    pub fn on_opened(&self, request: RequestId, device: DeviceToken) {
        self.deliver(HardwareEvent::DeviceOpened { request, device });
    }

    pub fn on_open_failed(&self, request: RequestId, error: HardwareError) {
        self.deliver(HardwareEvent::DeviceOpenFailed { request, error });
    }

    pub fn on_configured(&self, request: RequestId, session: SessionToken) {
        self.deliver(HardwareEvent::SessionConfigured { request, session });
    }

    pub fn on_configure_failed(&self, request: RequestId, error: HardwareError) {
        self.deliver(HardwareEvent::SessionConfigureFailed { request, error });
    }

    pub fn on_capture_completed(&self, sequence: RequestId, image: CapturedImage) {
        self.deliver(HardwareEvent::CaptureCompleted { sequence, image });
    }

    pub fn on_capture_failed(&self, sequence: RequestId, error: HardwareError) {
        self.deliver(HardwareEvent::CaptureFailed { sequence, error });
    }

    pub fn on_disconnected(&self, device: DeviceToken) {
        self.deliver(HardwareEvent::DeviceDisconnected { device });
    }

    pub fn on_device_error(&self, device: DeviceToken, code: i32) {
        self.deliver(HardwareEvent::DeviceError { device, code });
    }

    pub fn on_session_error(&self, session: SessionToken, reason: impl Into<String>) {
        self.deliver(HardwareEvent::SessionError {
            session,
            reason: reason.into(),
        });
    }
}

/// Callback-driven camera API for one physical device.
///
/// Implementations must not block. An `Err` return means the submission was
/// rejected outright and no callback will follow for it.
pub trait CameraHardware: Send + 'static {
    /// Register the handlers every later completion is reported through
    fn attach(&mut self, callbacks: HardwareCallbacks);

    /// Completes with `on_opened` or `on_open_failed`
    fn open_device(&mut self, camera_id: &str, request: RequestId) -> Result<(), HardwareError>;

    /// Build a session from the complete output set. Completes with `on_configured`
    /// or `on_configure_failed`; partial configuration is never reported.
    fn create_capture_session(
        &mut self,
        device: DeviceToken,
        outputs: &[SinkId],
        request: RequestId,
    ) -> Result<(), HardwareError>;

    /// Arm the repeating request that keeps preview/recording sinks fed
    fn set_repeating_request(
        &mut self,
        session: SessionToken,
        intent: CaptureIntent,
        targets: &[SinkId],
    ) -> Result<(), HardwareError>;

    /// One-shot still capture. Completes with `on_capture_completed` or
    /// `on_capture_failed` carrying the same sequence number.
    fn capture(
        &mut self,
        session: SessionToken,
        target: SinkId,
        sequence: RequestId,
    ) -> Result<(), HardwareError>;

    fn close_session(&mut self, session: SessionToken) -> Result<(), HardwareError>;

    fn close_device(&mut self, device: DeviceToken) -> Result<(), HardwareError>;

    /// Allocate a still-image sink owned by the caller
    fn create_image_sink(
        &mut self,
        size: Size,
        format: ImageFormat,
        max_images: u32,
    ) -> Result<Arc<dyn SinkResource>, HardwareError>;

    fn release_image_sink(&mut self, sink: SinkId) -> Result<(), HardwareError>;
}
