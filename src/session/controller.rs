use super::output::{OutputKind, OutputTarget, SessionConfiguration};
use super::pending::Responder;
use super::state::SessionState;
use super::worker::{Command, Mailboxes, Worker};
use crate::config::{CaptureSettings, TimeoutConfig};
use crate::errors::{CaptureError, ConfigureError, DisconnectError, OpenError};
use crate::hardware::{CameraHardware, HardwareCallbacks};
use crate::types::{CapturedImage, ImageFormat, Size};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// Parameters a controller is spawned with
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub camera_id: String,
    pub photo_size: Size,
    pub photo_format: ImageFormat,
    pub max_images: u32,
    pub timeouts: TimeoutConfig,
}

impl ControllerOptions {
    pub fn new(camera_id: impl Into<String>) -> Self {
        Self::from_settings(camera_id, &CaptureSettings::default())
    }

    pub fn from_settings(camera_id: impl Into<String>, settings: &CaptureSettings) -> Self {
        Self {
            camera_id: camera_id.into(),
            photo_size: settings.photo_size(),
            photo_format: settings.photo.format,
            max_images: settings.photo.max_images,
            timeouts: settings.timeouts.clone(),
        }
    }

    pub fn with_photo_size(mut self, size: Size) -> Self {
        self.photo_size = size;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }
}

/// Snapshot published by the worker after every change
#[derive(Debug, Clone)]
pub struct ControllerStatus {
    pub state: SessionState,
    pub active: Option<SessionConfiguration>,
    /// Cause of the fatal error that ended the controller, if any
    pub fatal: Option<DisconnectError>,
    /// Set once the controller has been closed and can no longer be used
    pub terminated: bool,
}

impl ControllerStatus {
    fn initial() -> Self {
        Self {
            state: SessionState::Closed,
            active: None,
            fatal: None,
            terminated: false,
        }
    }
}

/// Handle to the state machine driving one physical camera.
///
/// Cloning the handle is cheap; every clone talks to the same worker task. The
/// worker shuts the camera down once the last handle is dropped.
#[derive(Clone)]
pub struct CaptureSessionController {
    camera_id: Arc<str>,
    commands: mpsc::UnboundedSender<Command>,
    control: mpsc::UnboundedSender<oneshot::Sender<()>>,
    status: watch::Receiver<ControllerStatus>,
}

impl CaptureSessionController {
    /// Attach to `hardware` and start the worker on the current tokio runtime
    pub fn spawn<H: CameraHardware>(mut hardware: H, options: ControllerOptions) -> Self {
        let (callbacks, events) = HardwareCallbacks::channel();
        hardware.attach(callbacks);

        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (control_tx, control) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(ControllerStatus::initial());

        let camera_id: Arc<str> = Arc::from(options.camera_id.as_str());
        let worker = Worker::new(camera_id.clone(), hardware, options, status_tx);
        tokio::spawn(worker.run(Mailboxes {
            commands,
            control,
            events,
        }));

        log::debug!("Spawned controller for camera {}", camera_id);
        Self {
            camera_id,
            commands: commands_tx,
            control: control_tx,
            status,
        }
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn state(&self) -> SessionState {
        self.status.borrow().state
    }

    pub fn status(&self) -> ControllerStatus {
        self.status.borrow().clone()
    }

    pub fn active_configuration(&self) -> Option<SessionConfiguration> {
        self.status.borrow().active.clone()
    }

    pub fn is_terminated(&self) -> bool {
        self.status.borrow().terminated
    }

    /// Receiver that observes every published status
    pub fn subscribe(&self) -> watch::Receiver<ControllerStatus> {
        self.status.clone()
    }

    /// Wait until the published status satisfies `predicate`
    pub async fn wait_for<F>(&self, predicate: F) -> ControllerStatus
    where
        F: FnMut(&ControllerStatus) -> bool,
    {
        let mut status = self.status.clone();
        let snapshot = match status.wait_for(predicate).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.status(),
        };
        snapshot
    }

    async fn request<T, E, F>(&self, build: F, closed: E) -> Result<T, E>
    where
        F: FnOnce(Responder<T, E>) -> Command,
    {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(build(tx)).is_err() {
            return Err(closed);
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(closed),
        }
    }

    /// Acquire exclusive access to the device
    pub async fn open(&self) -> Result<(), OpenError> {
        self.request(|respond_to| Command::Open { respond_to }, OpenError::Closed)
            .await
    }

    /// Build the first session from `config`; the controller must be `Opened`
    pub async fn configure(&self, config: SessionConfiguration) -> Result<(), ConfigureError> {
        self.request(
            |respond_to| Command::Configure { config, respond_to },
            ConfigureError::Disconnected(DisconnectError::Closed),
        )
        .await
    }

    /// Replace the running session with one built from `config`.
    ///
    /// The current session keeps streaming until the new one is confirmed. On
    /// failure the previous configuration stays active.
    pub async fn reconfigure(&self, config: SessionConfiguration) -> Result<(), ConfigureError> {
        self.request(
            |respond_to| Command::Reconfigure { config, respond_to },
            ConfigureError::Disconnected(DisconnectError::Closed),
        )
        .await
    }

    /// Close the running session and return to `Opened`
    pub async fn deconfigure(&self) -> Result<(), ConfigureError> {
        self.request(
            |respond_to| Command::Deconfigure { respond_to },
            ConfigureError::Disconnected(DisconnectError::Closed),
        )
        .await
    }

    /// The controller-owned still-image target, created on first use
    pub async fn still_target(&self) -> Result<OutputTarget, ConfigureError> {
        self.request(
            |respond_to| Command::StillTarget { respond_to },
            ConfigureError::Disconnected(DisconnectError::Closed),
        )
        .await
    }

    /// Capture one still image through the active still-capture target
    pub async fn capture_still(&self) -> Result<CapturedImage, CaptureError> {
        let unavailable = {
            let status = self.status.borrow();
            match status.state {
                SessionState::Opened => true,
                SessionState::Running => status
                    .active
                    .as_ref()
                    .map_or(true, |active| !active.has(OutputKind::StillCapture)),
                _ => false,
            }
        };
        if unavailable {
            return Err(CaptureError::NotConfigured);
        }

        self.request(
            |respond_to| Command::CaptureStill { respond_to },
            CaptureError::Disconnected(DisconnectError::Closed),
        )
        .await
    }

    /// Tear everything down. Safe to call from any state and more than once.
    pub async fn close(&self) {
        let (ack, done) = oneshot::channel();
        if self.control.send(ack).is_err() {
            return;
        }
        let _ = done.await;
    }
}

impl std::fmt::Debug for CaptureSessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSessionController")
            .field("camera_id", &self.camera_id)
            .field("state", &self.state())
            .finish()
    }
}
