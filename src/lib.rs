//! CrabCapture: capture session state machine for a single camera device
//!
//! This crate opens one physical camera, binds output sinks (live preview, still
//! capture, video recording) into hardware capture sessions, and moves between
//! configurations without leaking or double-closing hardware resources.
//!
//! # Features
//! - Callback-driven hardware seam serialized on one worker task
//! - Gapless reconfiguration: the old session stays live until its replacement is confirmed
//! - Exactly-once resolution of every in-flight request, including on disconnect
//! - Best-effort, ordered teardown that never fails from the caller's point of view
//! - Photo capture with all-or-nothing file writes
//! - Recording that only arms the encoder once the hardware accepted the new output set
//!
//! # Usage
//! ```rust,ignore
//! use crabcapture::testing::{SimulatedCamera, SimulatedEncoder, StaticCapabilities, StaticSurfaceProvider, back_camera};
//! use crabcapture::{CameraSession, CaptureSettings, TakePhotoOptions};
//! use std::sync::Arc;
//!
//! let session = CameraSession::new(
//!     "0",
//!     SimulatedCamera::new(),
//!     &StaticCapabilities::new(back_camera("0")),
//!     Arc::new(StaticSurfaceProvider::new()),
//!     Box::new(SimulatedEncoder::new()),
//!     CaptureSettings::default(),
//! )?;
//! session.initialize().await?;
//! let photo = session.take_photo(TakePhotoOptions::new("photo.jpg")).await?;
//! session.close().await;
//! ```
pub mod camera;
pub mod config;
pub mod device;
pub mod errors;
pub mod hardware;
pub mod invariants;
pub mod photo;
pub mod presentation;
pub mod recording;
pub mod session;
pub mod types;

// Testing utilities - simulated hardware for offline runs
pub mod testing;

// Re-exports for convenience
pub use camera::{CameraSession, Ready};
pub use config::CaptureSettings;
pub use errors::{
    CameraError, CaptureError, ConfigureError, DisconnectError, HardwareError, OpenError,
    RecordingError,
};
pub use hardware::{CameraHardware, HardwareCallbacks, HardwareEvent};
pub use photo::{Photo, PhotoCaptureCoordinator, TakePhotoOptions};
pub use recording::{RecordVideoOptions, RecordingCoordinator, RecordingState, Video};
pub use session::{
    CaptureSessionController, ControllerOptions, OutputKind, OutputTarget, SessionConfiguration,
    SessionState,
};
pub use types::{CapturedImage, ImageFormat, Orientation, Size};

/// Initialize logging for the capture stack
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "crabcapture=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}
