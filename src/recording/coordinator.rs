//! Recording lifecycle on top of the session controller

use super::encoder::VideoEncoder;
use super::options::{RecordVideoOptions, Video};
use crate::errors::{ConfigureError, RecordingError};
use crate::session::{
    recording_configuration, CaptureSessionController, ControllerStatus, OutputTarget,
    SessionConfiguration, SessionState,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{oneshot, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    Idle,
    Starting,
    Recording,
    Stopping,
}

type FinishedCallback = Box<dyn FnOnce(Video) + Send>;
type ErrorCallback = Box<dyn FnOnce(RecordingError) + Send>;

/// Terminal outcome handlers of one recording; exactly one of them is called
pub struct RecordingCallbacks {
    on_finished: FinishedCallback,
    on_error: ErrorCallback,
}

impl RecordingCallbacks {
    pub fn new<F, E>(on_finished: F, on_error: E) -> Self
    where
        F: FnOnce(Video) + Send + 'static,
        E: FnOnce(RecordingError) + Send + 'static,
    {
        Self {
            on_finished: Box::new(on_finished),
            on_error: Box::new(on_error),
        }
    }

    /// Handlers that only log the outcome
    pub fn logging() -> Self {
        Self::new(
            |video| log::info!("Recording saved to {:?}", video.path),
            |e| log::warn!("Recording failed: {}", e),
        )
    }

    fn finished(self, video: Video) {
        (self.on_finished)(video)
    }

    fn failed(self, error: RecordingError) {
        (self.on_error)(error)
    }
}

impl fmt::Debug for RecordingCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecordingCallbacks")
    }
}

#[derive(Debug)]
struct Inner {
    state: RecordingState,
    generation: u64,
    callbacks: Option<RecordingCallbacks>,
    /// Output set to return to when the recording ends
    previous: Option<SessionConfiguration>,
    stop_monitor: Option<oneshot::Sender<()>>,
    interrupted: Option<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

type SharedEncoder = Arc<Mutex<Box<dyn VideoEncoder>>>;

/// Adds a recording sink to the running session, drives the encoder, and
/// reconfigures back once the recording ends
#[derive(Clone)]
pub struct RecordingCoordinator {
    controller: CaptureSessionController,
    encoder: SharedEncoder,
    inner: Arc<Mutex<Inner>>,
    max_concurrent_outputs: u32,
}

impl RecordingCoordinator {
    pub fn new(
        controller: CaptureSessionController,
        encoder: Box<dyn VideoEncoder>,
        max_concurrent_outputs: u32,
    ) -> Self {
        Self {
            controller,
            encoder: Arc::new(Mutex::new(encoder)),
            inner: Arc::new(Mutex::new(Inner {
                state: RecordingState::Idle,
                generation: 0,
                callbacks: None,
                previous: None,
                stop_monitor: None,
                interrupted: None,
            })),
            max_concurrent_outputs,
        }
    }

    pub fn state(&self) -> RecordingState {
        lock(&self.inner).state
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecordingState::Recording
    }

    /// Reserve the coordinator for a new recording.
    ///
    /// Returns the generation that [`RecordingCoordinator::complete_start`] must be
    /// called with.
    pub fn begin(&self) -> Result<u64, RecordingError> {
        let mut inner = lock(&self.inner);
        if inner.state != RecordingState::Idle {
            return Err(RecordingError::AlreadyRecording);
        }
        inner.state = RecordingState::Starting;
        inner.generation += 1;
        inner.interrupted = None;
        Ok(inner.generation)
    }

    /// Start recording; rejected with `AlreadyRecording` unless idle
    pub async fn start(
        &self,
        options: RecordVideoOptions,
        callbacks: RecordingCallbacks,
    ) -> Result<(), RecordingError> {
        let generation = self.begin()?;
        self.complete_start(generation, options, callbacks).await
    }

    /// Second half of a start reserved with [`RecordingCoordinator::begin`].
    ///
    /// On failure the coordinator is idle again, `callbacks` has received the error,
    /// and the error is also returned.
    pub async fn complete_start(
        &self,
        generation: u64,
        options: RecordVideoOptions,
        callbacks: RecordingCallbacks,
    ) -> Result<(), RecordingError> {
        match self.arm(&options).await {
            Ok(previous) => {
                let stop_monitor = {
                    let mut inner = lock(&self.inner);
                    let (tx, rx) = oneshot::channel();
                    inner.state = RecordingState::Recording;
                    inner.callbacks = Some(callbacks);
                    inner.previous = Some(previous);
                    inner.stop_monitor = Some(tx);
                    rx
                };
                log::info!("Recording to {:?}", options.path);
                self.watch_session(generation, stop_monitor);
                Ok(())
            }
            Err(e) => {
                log::warn!("Failed to start recording: {}", e);
                lock(&self.inner).state = RecordingState::Idle;
                callbacks.failed(e.clone());
                Err(e)
            }
        }
    }

    /// Bind the encoder sink into the session and start the encoder.
    ///
    /// Returns the configuration that was active before recording.
    async fn arm(&self, options: &RecordVideoOptions) -> Result<SessionConfiguration, RecordingError> {
        let status = self.controller.status();
        let previous = match (status.state, status.active) {
            (SessionState::Running, Some(active)) => active,
            (state, _) => {
                return Err(RecordingError::RecordingConfigFailed(
                    ConfigureError::InvalidState(state),
                ))
            }
        };

        let sink = lock(&self.encoder).prepare(options)?;
        let config = match recording_configuration(
            &previous,
            OutputTarget::recording(sink),
            self.max_concurrent_outputs,
        ) {
            Ok(config) => config,
            Err(e) => {
                lock(&self.encoder).release();
                return Err(RecordingError::RecordingConfigFailed(e));
            }
        };

        if let Err(e) = self.controller.reconfigure(config).await {
            lock(&self.encoder).release();
            return Err(RecordingError::RecordingConfigFailed(e));
        }

        let started = lock(&self.encoder).start();
        if let Err(e) = started {
            self.return_to(&previous).await;
            lock(&self.encoder).release();
            return Err(e);
        }
        Ok(previous)
    }

    /// Finalize the recording, then drop the recording sink from the session
    pub async fn stop(&self) -> Result<Video, RecordingError> {
        let (callbacks, previous) = {
            let mut inner = lock(&self.inner);
            if inner.state != RecordingState::Recording {
                return Err(match inner.interrupted.take() {
                    Some(reason) => RecordingError::Interrupted(reason),
                    None => RecordingError::NotRecording,
                });
            }
            inner.state = RecordingState::Stopping;
            if let Some(stop_monitor) = inner.stop_monitor.take() {
                let _ = stop_monitor.send(());
            }
            (inner.callbacks.take(), inner.previous.take())
        };

        let finished = lock(&self.encoder).finish(false);
        if let Some(previous) = previous {
            self.return_to(&previous).await;
        }
        lock(&self.encoder).release();
        lock(&self.inner).state = RecordingState::Idle;

        match finished {
            Ok(video) => {
                log::info!(
                    "Recording finished: {:?} ({:.1}s, {} bytes)",
                    video.path,
                    video.duration_secs,
                    video.size_bytes
                );
                if let Some(callbacks) = callbacks {
                    callbacks.finished(video.clone());
                }
                Ok(video)
            }
            Err(e) => {
                log::error!("Failed to finalize recording: {}", e);
                if let Some(callbacks) = callbacks {
                    callbacks.failed(e.clone());
                }
                Err(e)
            }
        }
    }

    /// Best-effort return to the pre-recording output set
    async fn return_to(&self, previous: &SessionConfiguration) {
        if self.controller.state() != SessionState::Running {
            log::debug!("Session no longer running, nothing to reconfigure");
            return;
        }

        let result = match previous.retain_reusable() {
            Ok(config) => self.controller.reconfigure(config).await,
            Err(ConfigureError::EmptyConfiguration) => self.controller.deconfigure().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            log::warn!("Failed to restore pre-recording configuration: {}", e);
        }
    }

    fn watch_session(&self, generation: u64, stop_monitor: oneshot::Receiver<()>) {
        let inner = self.inner.clone();
        let encoder = self.encoder.clone();
        let mut status = self.controller.subscribe();

        tokio::spawn(async move {
            let reason = tokio::select! {
                _ = stop_monitor => return,
                lost = session_lost(&mut status) => lost,
            };
            interrupt(&inner, &encoder, generation, reason);
        });
    }
}

async fn session_lost(status: &mut watch::Receiver<ControllerStatus>) -> String {
    let lost = status
        .wait_for(|s| s.terminated || matches!(s.state, SessionState::Closing | SessionState::Closed))
        .await;
    match lost {
        Ok(snapshot) => match &snapshot.fatal {
            Some(cause) => cause.to_string(),
            None => "camera session was closed".to_string(),
        },
        Err(_) => "camera controller stopped".to_string(),
    }
}

/// Finalize a recording whose session died, keeping whatever was written
fn interrupt(inner: &Mutex<Inner>, encoder: &SharedEncoder, generation: u64, reason: String) {
    let callbacks = {
        let mut guard = lock(inner);
        if guard.state != RecordingState::Recording || guard.generation != generation {
            return;
        }
        guard.state = RecordingState::Stopping;
        guard.stop_monitor = None;
        guard.previous = None;
        guard.callbacks.take()
    };

    log::warn!("Recording interrupted: {}", reason);
    {
        let mut encoder = lock(encoder);
        match encoder.finish(true) {
            Ok(video) => log::info!("Kept truncated recording at {:?}", video.path),
            Err(e) => log::warn!("Could not finalize interrupted recording: {}", e),
        }
        encoder.release();
    }

    {
        let mut guard = lock(inner);
        guard.state = RecordingState::Idle;
        guard.interrupted = Some(reason.clone());
    }
    if let Some(callbacks) = callbacks {
        callbacks.failed(RecordingError::Interrupted(reason));
    }
}
