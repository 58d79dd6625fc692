use super::surfaces::SimulatedSink;
use crate::errors::RecordingError;
use crate::hardware::SinkResource;
use crate::recording::{RecordVideoOptions, Video, VideoEncoder};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

#[derive(Debug, Default)]
struct EncoderState {
    options: Option<RecordVideoOptions>,
    sink: Option<Arc<SimulatedSink>>,
    started_at: Option<Instant>,
    fail_prepare: Option<String>,
    fail_start: Option<String>,
    fail_finish: Option<String>,
    prepared: usize,
    started: usize,
    released: usize,
    finished: Vec<Video>,
}

/// Encoder that writes a small placeholder container instead of real video
#[derive(Debug, Clone, Default)]
pub struct SimulatedEncoder {
    state: Arc<Mutex<EncoderState>>,
}

impl SimulatedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, EncoderState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fail_next_prepare(&self, reason: &str) {
        self.lock().fail_prepare = Some(reason.to_string());
    }

    pub fn fail_next_start(&self, reason: &str) {
        self.lock().fail_start = Some(reason.to_string());
    }

    pub fn fail_next_finish(&self, reason: &str) {
        self.lock().fail_finish = Some(reason.to_string());
    }

    pub fn prepared(&self) -> usize {
        self.lock().prepared
    }

    pub fn started(&self) -> usize {
        self.lock().started
    }

    pub fn released(&self) -> usize {
        self.lock().released
    }

    /// Whether an input sink is allocated right now
    pub fn holds_sink(&self) -> bool {
        self.lock().sink.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.lock().started_at.is_some()
    }

    pub fn finished(&self) -> Vec<Video> {
        self.lock().finished.clone()
    }
}

impl VideoEncoder for SimulatedEncoder {
    fn prepare(&mut self, options: &RecordVideoOptions) -> Result<Arc<dyn SinkResource>, RecordingError> {
        let mut state = self.lock();
        if let Some(reason) = state.fail_prepare.take() {
            return Err(RecordingError::EncoderInit(reason));
        }
        if state.sink.is_some() {
            return Err(RecordingError::EncoderInit("encoder already prepared".to_string()));
        }

        let sink = SimulatedSink::new(options.size());
        state.options = Some(options.clone());
        state.sink = Some(sink.clone());
        state.prepared += 1;
        Ok(sink)
    }

    fn start(&mut self) -> Result<(), RecordingError> {
        let mut state = self.lock();
        if let Some(reason) = state.fail_start.take() {
            return Err(RecordingError::EncoderInit(reason));
        }
        if state.sink.is_none() {
            return Err(RecordingError::EncoderInit("encoder not prepared".to_string()));
        }
        state.started_at = Some(Instant::now());
        state.started += 1;
        Ok(())
    }

    fn finish(&mut self, truncated: bool) -> Result<Video, RecordingError> {
        let mut state = self.lock();
        let started_at = state
            .started_at
            .take()
            .ok_or_else(|| RecordingError::FinalizeFailed("encoder was not running".to_string()))?;
        if let Some(reason) = state.fail_finish.take() {
            return Err(RecordingError::FinalizeFailed(reason));
        }
        let options = state
            .options
            .clone()
            .ok_or_else(|| RecordingError::FinalizeFailed("encoder not prepared".to_string()))?;

        let duration_secs = started_at.elapsed().as_secs_f64();
        let frames = (duration_secs * options.fps as f64).ceil() as usize;
        let mut contents = b"\0\0\0\x18ftypisom".to_vec();
        contents.resize(contents.len() + 64 + frames * 16, 0);

        std::fs::write(&options.path, &contents)
            .map_err(|e| RecordingError::FinalizeFailed(e.to_string()))?;

        let video = Video {
            path: options.path.clone(),
            duration_secs,
            width: options.width,
            height: options.height,
            size_bytes: contents.len() as u64,
            truncated,
        };
        state.finished.push(video.clone());
        Ok(video)
    }

    fn release(&mut self) {
        let mut state = self.lock();
        if let Some(sink) = state.sink.take() {
            sink.invalidate();
            state.released += 1;
        }
        state.started_at = None;
        state.options = None;
    }
}
