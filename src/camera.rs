//! High-level session bundling the controller with its coordinators

use crate::config::CaptureSettings;
use crate::device::{CapabilitySource, DeviceDetails};
use crate::errors::{CameraError, CaptureError, ConfigureError, RecordingError};
use crate::hardware::CameraHardware;
use crate::photo::{Photo, PhotoCaptureCoordinator, TakePhotoOptions};
use crate::presentation::SurfaceProvider;
use crate::recording::{
    RecordVideoOptions, RecordingCallbacks, RecordingCoordinator, RecordingState, Video,
    VideoEncoder,
};
use crate::session::{
    default_configuration, CaptureSessionController, ControllerOptions, OutputKind, OutputTarget,
    SessionConfiguration, SessionState,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Returned once the camera is open and streaming its default configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ready {
    /// Correlates log lines of one session
    pub session_id: Uuid,
    pub camera_id: String,
    pub configuration: Vec<OutputKind>,
}

/// One camera with preview, photo and video capture
pub struct CameraSession {
    session_id: Uuid,
    settings: CaptureSettings,
    details: DeviceDetails,
    surfaces: Arc<dyn SurfaceProvider>,
    controller: CaptureSessionController,
    photos: PhotoCaptureCoordinator,
    recorder: RecordingCoordinator,
}

impl CameraSession {
    /// Describe the device and spawn its controller. Nothing is opened yet.
    pub fn new<H: CameraHardware>(
        camera_id: &str,
        hardware: H,
        capabilities: &dyn CapabilitySource,
        surfaces: Arc<dyn SurfaceProvider>,
        encoder: Box<dyn VideoEncoder>,
        settings: CaptureSettings,
    ) -> Result<Self, CameraError> {
        settings.validate().map_err(CameraError::Settings)?;
        let details = capabilities.describe(camera_id)?;

        let options = ControllerOptions::from_settings(camera_id, &settings)
            .with_photo_size(details.photo_size(settings.photo_size()));
        let controller = CaptureSessionController::spawn(hardware, options);
        let photos = PhotoCaptureCoordinator::new(controller.clone(), &details);
        let recorder =
            RecordingCoordinator::new(controller.clone(), encoder, details.max_concurrent_outputs);

        let session_id = Uuid::new_v4();
        log::debug!("Created session {} for camera {}", session_id, camera_id);
        Ok(Self {
            session_id,
            settings,
            details,
            surfaces,
            controller,
            photos,
            recorder,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn details(&self) -> &DeviceDetails {
        &self.details
    }

    pub fn controller(&self) -> &CaptureSessionController {
        &self.controller
    }

    pub fn state(&self) -> SessionState {
        self.controller.state()
    }

    pub fn recording_state(&self) -> RecordingState {
        self.recorder.state()
    }

    /// Open the device and start streaming the default configuration
    pub async fn initialize(&self) -> Result<Ready, CameraError> {
        log::info!(
            "Initializing camera {} (session {})",
            self.details.id,
            self.session_id
        );
        self.controller.open().await?;

        let preview = match self
            .surfaces
            .request_output_surface(self.settings.preview_size())
        {
            Ok(surface) => Some(OutputTarget::preview(surface)),
            Err(e) => {
                log::warn!("No preview surface available: {}", e);
                None
            }
        };
        let still = if self.settings.photo.keep_warm {
            Some(self.controller.still_target().await?)
        } else {
            None
        };

        let config = default_configuration(preview, still)?;
        let configuration = config.kinds();
        self.controller.configure(config).await?;

        log::info!("Camera {} ready with {:?}", self.details.id, configuration);
        Ok(Ready {
            session_id: self.session_id,
            camera_id: self.details.id.clone(),
            configuration,
        })
    }

    /// Capture one photo to `options.path`
    pub async fn take_photo(&self, options: TakePhotoOptions) -> Result<Photo, CaptureError> {
        let added = !self.settings.photo.keep_warm && self.add_still_target().await?;
        let photo = self.photos.capture(options).await;
        if added {
            self.drop_still_target().await;
        }
        photo
    }

    /// Bind the still sink on demand when it is not kept warm; true if it was added
    async fn add_still_target(&self) -> Result<bool, CaptureError> {
        let Some(active) = self.controller.active_configuration() else {
            return Ok(false);
        };
        if active.has(OutputKind::StillCapture) || self.recorder.state() != RecordingState::Idle {
            return Ok(false);
        }

        let still = self
            .controller
            .still_target()
            .await
            .map_err(|e| CaptureError::Aborted(e.to_string()))?;
        let config = active
            .targets()
            .iter()
            .cloned()
            .chain(std::iter::once(still))
            .fold(SessionConfiguration::builder(), |b, t| b.target(t))
            .intent(active.intent())
            .build()
            .map_err(|e| CaptureError::Aborted(e.to_string()))?;

        self.controller
            .reconfigure(config)
            .await
            .map(|()| true)
            .map_err(|e| CaptureError::Aborted(e.to_string()))
    }

    /// Return to the default output set once an on-demand capture is done
    async fn drop_still_target(&self) {
        let Some(active) = self.controller.active_configuration() else {
            return;
        };
        if !active.has(OutputKind::StillCapture) || self.recorder.state() != RecordingState::Idle {
            return;
        }
        let result = match active.without(OutputKind::StillCapture) {
            Ok(config) => self.controller.reconfigure(config).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            log::warn!("Failed to drop on-demand still sink: {}", e);
        }
    }

    /// Recording options for `path` using the configured defaults the device supports
    pub fn video_options(&self, path: impl Into<PathBuf>) -> RecordVideoOptions {
        RecordVideoOptions::new(path, &self.settings)
            .with_size(self.details.video_size(self.settings.video_size()))
    }

    /// Start recording in the background.
    ///
    /// A recording already in progress is rejected immediately. Every other outcome
    /// is reported through exactly one of `on_finished` or `on_error`.
    pub fn start_recording<F, E>(
        &self,
        options: RecordVideoOptions,
        on_finished: F,
        on_error: E,
    ) -> Result<(), RecordingError>
    where
        F: FnOnce(Video) + Send + 'static,
        E: FnOnce(RecordingError) + Send + 'static,
    {
        let generation = self.recorder.begin()?;
        let recorder = self.recorder.clone();
        let callbacks = RecordingCallbacks::new(on_finished, on_error);

        tokio::spawn(async move {
            let _ = recorder.complete_start(generation, options, callbacks).await;
        });
        Ok(())
    }

    pub async fn stop_recording(&self) -> Result<Video, RecordingError> {
        self.recorder.stop().await
    }

    /// Drop the preview binding; with nothing left the session is released
    pub async fn surface_no_longer_needed(&self) -> Result<(), ConfigureError> {
        let Some(active) = self.controller.active_configuration() else {
            return Ok(());
        };
        if !active.has(OutputKind::Preview) {
            return Ok(());
        }

        log::info!("Preview surface released by presentation layer");
        match active.without(OutputKind::Preview) {
            Ok(config) => self.controller.reconfigure(config).await,
            Err(ConfigureError::EmptyConfiguration) => self.controller.deconfigure().await,
            Err(e) => Err(e),
        }
    }

    /// Stop any recording, then release every hardware resource. Never fails.
    pub async fn close(&self) {
        if self.recorder.state() == RecordingState::Recording {
            if let Err(e) = self.recorder.stop().await {
                log::warn!("Failed to stop recording while closing: {}", e);
            }
        }
        self.controller.close().await;
        log::info!("Session {} closed", self.session_id);
    }
}
