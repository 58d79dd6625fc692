//! Error taxonomy for the capture stack
//!
//! Each asynchronous hardware operation resolves onto one of the typed errors below.
//! All of them are `Clone` so a session-wide failure can be handed to every
//! outstanding request at once.

use crate::session::SessionState;
use thiserror::Error;

/// The device went away, or the whole session became unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisconnectError {
    #[error("camera {0} was disconnected")]
    Disconnected(String),
    #[error("camera {camera_id} reported fatal error code {code}")]
    DeviceError { camera_id: String, code: i32 },
    #[error("capture session failed: {0}")]
    SessionFailed(String),
    #[error("camera session was closed")]
    Closed,
}

/// Failures while acquiring the physical device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpenError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera device not found: {0}")]
    DeviceAbsent(String),
    #[error("camera device busy: {0}")]
    DeviceBusy(String),
    #[error("camera open was not acknowledged within {0} ms")]
    Timeout(u64),
    #[error("cannot open camera while controller is {0}")]
    InvalidState(SessionState),
    #[error("controller has been closed and must be rebuilt")]
    Closed,
    #[error("hardware error during open: {0}")]
    Hardware(String),
    #[error(transparent)]
    Disconnected(#[from] DisconnectError),
}

/// Failures while building or replacing a capture session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigureError {
    #[error("output set rejected by hardware: {0}")]
    Rejected(String),
    #[error("hardware resources exhausted: {0}")]
    ResourceExhausted(String),
    #[error("output target is no longer valid: {0}")]
    InvalidTarget(String),
    #[error("session configuration has no output targets")]
    EmptyConfiguration,
    #[error("cannot configure while controller is {0}")]
    InvalidState(SessionState),
    #[error("session configuration was not acknowledged within {0} ms")]
    Timeout(u64),
    #[error("reconfiguration failed and previous configuration could not be restored: {0}")]
    RestoreFailed(String),
    #[error("hardware error during configure: {0}")]
    Hardware(String),
    #[error(transparent)]
    Disconnected(#[from] DisconnectError),
}

/// Failures of a single still capture.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("no running session with a still-capture target")]
    NotConfigured,
    #[error("camera device busy")]
    DeviceBusy,
    #[error("capture aborted: {0}")]
    Aborted(String),
    #[error("failed to encode or save image: {0}")]
    EncodeFailure(String),
    #[error("capture was not acknowledged within {0} ms")]
    Timeout(u64),
    #[error("failed to write photo: {0}")]
    Io(String),
    #[error(transparent)]
    Disconnected(#[from] DisconnectError),
}

/// Failures of the recording lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordingError {
    #[error("a recording is already in progress")]
    AlreadyRecording,
    #[error("no recording is in progress")]
    NotRecording,
    #[error("failed to configure session for recording: {0}")]
    RecordingConfigFailed(ConfigureError),
    #[error("failed to initialize encoder: {0}")]
    EncoderInit(String),
    #[error("recording interrupted: {0}")]
    Interrupted(String),
    #[error("failed to finalize recording: {0}")]
    FinalizeFailed(String),
}

/// Synchronous rejection of a hardware submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HardwareError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device unavailable: {0}")]
    Unavailable(String),
    #[error("device busy: {0}")]
    Busy(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Failed(String),
}

impl From<HardwareError> for OpenError {
    fn from(error: HardwareError) -> Self {
        match error {
            HardwareError::PermissionDenied(msg) => OpenError::PermissionDenied(msg),
            HardwareError::Unavailable(msg) => OpenError::DeviceAbsent(msg),
            HardwareError::Busy(msg) => OpenError::DeviceBusy(msg),
            other => OpenError::Hardware(other.to_string()),
        }
    }
}

impl From<HardwareError> for ConfigureError {
    fn from(error: HardwareError) -> Self {
        match error {
            HardwareError::Busy(msg) => ConfigureError::ResourceExhausted(msg),
            HardwareError::InvalidArgument(msg) => ConfigureError::Rejected(msg),
            other => ConfigureError::Hardware(other.to_string()),
        }
    }
}

impl From<HardwareError> for CaptureError {
    fn from(error: HardwareError) -> Self {
        match error {
            HardwareError::Busy(_) => CaptureError::DeviceBusy,
            other => CaptureError::Aborted(other.to_string()),
        }
    }
}

/// Crate-wide error wrapping every part of the taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("open failed: {0}")]
    Open(#[from] OpenError),
    #[error("configure failed: {0}")]
    Configure(#[from] ConfigureError),
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("recording failed: {0}")]
    Recording(#[from] RecordingError),
    #[error("device lost: {0}")]
    Disconnect(#[from] DisconnectError),
    #[error("configuration error: {0}")]
    Settings(String),
}
