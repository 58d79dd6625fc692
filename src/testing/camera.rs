//! Scriptable in-memory camera hardware
//!
//! By default every submission completes on its own, immediately. Tests can hold
//! completions back and deliver them by hand, inject failures, and inspect the
//! full call timeline afterwards.

use super::surfaces::SimulatedSink;
use super::synthetic_data::synthetic_jpeg;
use crate::errors::HardwareError;
use crate::hardware::{
    CameraHardware, DeviceToken, HardwareCallbacks, HardwareEvent, RequestId, SessionToken,
    SinkId, SinkResource,
};
use crate::session::CaptureIntent;
use crate::types::{CapturedImage, ImageFormat, Size};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// One observable interaction with the simulated hardware
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareCall {
    OpenDevice {
        request: RequestId,
    },
    DeviceReady {
        device: DeviceToken,
    },
    CreateSession {
        outputs: Vec<SinkId>,
        request: RequestId,
    },
    SessionReady {
        session: SessionToken,
    },
    SetRepeating {
        session: SessionToken,
        intent: CaptureIntent,
        targets: Vec<SinkId>,
    },
    Capture {
        session: SessionToken,
        target: SinkId,
        sequence: RequestId,
    },
    CloseSession {
        session: SessionToken,
    },
    CloseDevice {
        device: DeviceToken,
    },
    CreateImageSink {
        sink: SinkId,
    },
    ReleaseImageSink {
        sink: SinkId,
    },
}

#[derive(Debug, Default)]
struct Script {
    absent: bool,
    hold_opens: bool,
    hold_configures: bool,
    hold_captures: bool,
    fail_open: Option<HardwareError>,
    fail_configure: Option<HardwareError>,
    fail_repeating: usize,
    fail_capture: Option<HardwareError>,
    fail_session_close: bool,
    fail_device_close: bool,
}

#[derive(Debug, Default)]
struct SimState {
    callbacks: Option<HardwareCallbacks>,
    script: Script,
    next_token: u64,
    pending_opens: VecDeque<(RequestId, DeviceToken)>,
    pending_configures: VecDeque<(RequestId, SessionToken)>,
    pending_captures: BTreeMap<RequestId, SinkId>,
    open_devices: BTreeSet<DeviceToken>,
    live_sessions: BTreeSet<SessionToken>,
    max_live_sessions: usize,
    repeating: Option<SessionToken>,
    image_sinks: BTreeMap<SinkId, Arc<SimulatedSink>>,
    calls: Vec<HardwareCall>,
    invalid_closes: Vec<String>,
    order_violations: Vec<String>,
}

impl SimState {
    fn token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn send(&self, event: HardwareEvent) {
        match &self.callbacks {
            Some(callbacks) => callbacks.deliver(event),
            None => log::warn!("Simulated camera has no callbacks attached"),
        }
    }

    fn finish_open(&mut self, request: RequestId, device: DeviceToken) {
        self.open_devices.insert(device);
        self.calls.push(HardwareCall::DeviceReady { device });
        self.send(HardwareEvent::DeviceOpened { request, device });
    }

    fn finish_configure(&mut self, request: RequestId, session: SessionToken) {
        if let Some(error) = self.script.fail_configure.take() {
            self.send(HardwareEvent::SessionConfigureFailed { request, error });
            return;
        }
        self.live_sessions.insert(session);
        self.max_live_sessions = self.max_live_sessions.max(self.live_sessions.len());
        self.calls.push(HardwareCall::SessionReady { session });
        self.send(HardwareEvent::SessionConfigured { request, session });
    }

    fn finish_capture(&mut self, sequence: RequestId, sink: SinkId) {
        let size = self
            .image_sinks
            .get(&sink)
            .map(|s| s.size())
            .unwrap_or(Size::new(64, 48));
        let image = CapturedImage {
            data: synthetic_jpeg(size, sequence.0).into(),
            format: ImageFormat::Jpeg,
            reported_size: size,
        };
        self.send(HardwareEvent::CaptureCompleted { sequence, image });
    }
}

/// Simulated device; clones share the same hardware
#[derive(Debug, Clone, Default)]
pub struct SimulatedCamera {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedCamera {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---- scripting ----

    /// Report the device as absent on the next open
    pub fn set_absent(&self, absent: bool) {
        self.lock().script.absent = absent;
    }

    pub fn fail_next_open(&self, error: HardwareError) {
        self.lock().script.fail_open = Some(error);
    }

    /// The next session build completes with a configure failure
    pub fn fail_next_configure(&self, error: HardwareError) {
        self.lock().script.fail_configure = Some(error);
    }

    /// The next `count` repeating-request submissions are rejected
    pub fn fail_repeating_requests(&self, count: usize) {
        self.lock().script.fail_repeating = count;
    }

    pub fn fail_next_capture(&self, error: HardwareError) {
        self.lock().script.fail_capture = Some(error);
    }

    pub fn hold_opens(&self, hold: bool) {
        self.lock().script.hold_opens = hold;
    }

    pub fn hold_configures(&self, hold: bool) {
        self.lock().script.hold_configures = hold;
    }

    pub fn hold_captures(&self, hold: bool) {
        self.lock().script.hold_captures = hold;
    }

    pub fn fail_session_close(&self, fail: bool) {
        self.lock().script.fail_session_close = fail;
    }

    pub fn fail_device_close(&self, fail: bool) {
        self.lock().script.fail_device_close = fail;
    }

    // ---- manual delivery ----

    /// Complete the oldest held open; false if none was held
    pub fn complete_open(&self) -> bool {
        let mut state = self.lock();
        match state.pending_opens.pop_front() {
            Some((request, device)) => {
                state.finish_open(request, device);
                true
            }
            None => false,
        }
    }

    /// Complete the oldest held session build; false if none was held
    pub fn complete_configure(&self) -> bool {
        let mut state = self.lock();
        match state.pending_configures.pop_front() {
            Some((request, session)) => {
                state.finish_configure(request, session);
                true
            }
            None => false,
        }
    }

    pub fn pending_captures(&self) -> Vec<RequestId> {
        self.lock().pending_captures.keys().copied().collect()
    }

    /// Deliver the image for a held capture; false if `sequence` was not held
    pub fn complete_capture(&self, sequence: RequestId) -> bool {
        let mut state = self.lock();
        match state.pending_captures.remove(&sequence) {
            Some(sink) => {
                state.finish_capture(sequence, sink);
                true
            }
            None => false,
        }
    }

    /// Push an arbitrary event, e.g. a duplicate or stale completion
    pub fn deliver(&self, event: HardwareEvent) {
        self.lock().send(event);
    }

    /// Platform notification that the device went away
    pub fn disconnect(&self) {
        let state = self.lock();
        if let Some(device) = state.open_devices.iter().next().copied() {
            state.send(HardwareEvent::DeviceDisconnected { device });
        } else if let Some((_, device)) = state.pending_opens.front().copied() {
            state.send(HardwareEvent::DeviceDisconnected { device });
        }
    }

    pub fn device_error(&self, code: i32) {
        let state = self.lock();
        if let Some(device) = state.open_devices.iter().next().copied() {
            state.send(HardwareEvent::DeviceError { device, code });
        }
    }

    /// Fail the session that currently carries the repeating request
    pub fn session_error(&self, reason: &str) {
        let state = self.lock();
        if let Some(session) = state.repeating {
            state.send(HardwareEvent::SessionError {
                session,
                reason: reason.to_string(),
            });
        }
    }

    // ---- inspection ----

    pub fn calls(&self) -> Vec<HardwareCall> {
        self.lock().calls.clone()
    }

    pub fn open_devices(&self) -> usize {
        self.lock().open_devices.len()
    }

    pub fn live_sessions(&self) -> usize {
        self.lock().live_sessions.len()
    }

    /// Most sessions that were ever alive at the same time
    pub fn max_live_sessions(&self) -> usize {
        self.lock().max_live_sessions
    }

    pub fn live_image_sinks(&self) -> usize {
        self.lock().image_sinks.len()
    }

    /// Session currently carrying the repeating request
    pub fn streaming_session(&self) -> Option<SessionToken> {
        self.lock().repeating
    }

    /// Closes of resources that were not open (double closes, unknown tokens)
    pub fn invalid_closes(&self) -> Vec<String> {
        self.lock().invalid_closes.clone()
    }

    /// Calls that broke hardware ordering rules
    pub fn order_violations(&self) -> Vec<String> {
        self.lock().order_violations.clone()
    }

    pub fn hardware_commands(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| {
                !matches!(
                    call,
                    HardwareCall::DeviceReady { .. } | HardwareCall::SessionReady { .. }
                )
            })
            .count()
    }
}

impl CameraHardware for SimulatedCamera {
    fn attach(&mut self, callbacks: HardwareCallbacks) {
        self.lock().callbacks = Some(callbacks);
    }

    fn open_device(&mut self, camera_id: &str, request: RequestId) -> Result<(), HardwareError> {
        let mut state = self.lock();
        state.calls.push(HardwareCall::OpenDevice { request });

        if state.script.absent {
            return Err(HardwareError::Unavailable(camera_id.to_string()));
        }
        if let Some(error) = state.script.fail_open.take() {
            state.send(HardwareEvent::DeviceOpenFailed { request, error });
            return Ok(());
        }

        let device = DeviceToken(state.token());
        if state.script.hold_opens {
            state.pending_opens.push_back((request, device));
        } else {
            state.finish_open(request, device);
        }
        Ok(())
    }

    fn create_capture_session(
        &mut self,
        device: DeviceToken,
        outputs: &[SinkId],
        request: RequestId,
    ) -> Result<(), HardwareError> {
        let mut state = self.lock();
        state.calls.push(HardwareCall::CreateSession {
            outputs: outputs.to_vec(),
            request,
        });

        if !state.open_devices.contains(&device) {
            state
                .order_violations
                .push(format!("session built on closed device {:?}", device));
            return Err(HardwareError::InvalidArgument("device is not open".to_string()));
        }
        if outputs.is_empty() {
            return Err(HardwareError::InvalidArgument("no outputs".to_string()));
        }

        let session = SessionToken(state.token());
        if state.script.hold_configures {
            state.pending_configures.push_back((request, session));
        } else {
            state.finish_configure(request, session);
        }
        Ok(())
    }

    fn set_repeating_request(
        &mut self,
        session: SessionToken,
        intent: CaptureIntent,
        targets: &[SinkId],
    ) -> Result<(), HardwareError> {
        let mut state = self.lock();
        state.calls.push(HardwareCall::SetRepeating {
            session,
            intent,
            targets: targets.to_vec(),
        });

        if state.script.fail_repeating > 0 {
            state.script.fail_repeating -= 1;
            return Err(HardwareError::Failed("repeating request rejected".to_string()));
        }
        if !state.live_sessions.contains(&session) {
            state
                .order_violations
                .push(format!("repeating request on dead session {:?}", session));
            return Err(HardwareError::InvalidArgument("session is closed".to_string()));
        }
        state.repeating = Some(session);
        Ok(())
    }

    fn capture(
        &mut self,
        session: SessionToken,
        target: SinkId,
        sequence: RequestId,
    ) -> Result<(), HardwareError> {
        let mut state = self.lock();
        state.calls.push(HardwareCall::Capture {
            session,
            target,
            sequence,
        });

        if !state.live_sessions.contains(&session) {
            state
                .order_violations
                .push(format!("capture on dead session {:?}", session));
            return Err(HardwareError::InvalidArgument("session is closed".to_string()));
        }
        if let Some(error) = state.script.fail_capture.take() {
            state.send(HardwareEvent::CaptureFailed { sequence, error });
            return Ok(());
        }

        if state.script.hold_captures {
            state.pending_captures.insert(sequence, target);
        } else {
            state.finish_capture(sequence, target);
        }
        Ok(())
    }

    fn close_session(&mut self, session: SessionToken) -> Result<(), HardwareError> {
        let mut state = self.lock();
        state.calls.push(HardwareCall::CloseSession { session });

        if !state.live_sessions.remove(&session) {
            state
                .invalid_closes
                .push(format!("session {:?} closed twice or never opened", session));
        }
        if state.repeating == Some(session) {
            state.repeating = None;
        }
        if state.script.fail_session_close {
            return Err(HardwareError::Failed("session close failed".to_string()));
        }
        Ok(())
    }

    fn close_device(&mut self, device: DeviceToken) -> Result<(), HardwareError> {
        let mut state = self.lock();
        state.calls.push(HardwareCall::CloseDevice { device });

        if !state.live_sessions.is_empty() {
            let live = state.live_sessions.len();
            state.order_violations.push(format!(
                "device {:?} closed with {} live sessions",
                device, live
            ));
        }
        if !state.open_devices.remove(&device) {
            state
                .invalid_closes
                .push(format!("device {:?} closed twice or never opened", device));
        }
        if state.script.fail_device_close {
            return Err(HardwareError::Failed("device close failed".to_string()));
        }
        Ok(())
    }

    fn create_image_sink(
        &mut self,
        size: Size,
        _format: ImageFormat,
        _max_images: u32,
    ) -> Result<Arc<dyn SinkResource>, HardwareError> {
        let mut state = self.lock();
        let sink = SimulatedSink::new(size);
        state.calls.push(HardwareCall::CreateImageSink { sink: sink.id() });
        state.image_sinks.insert(sink.id(), sink.clone());
        Ok(sink)
    }

    fn release_image_sink(&mut self, sink: SinkId) -> Result<(), HardwareError> {
        let mut state = self.lock();
        state.calls.push(HardwareCall::ReleaseImageSink { sink });
        match state.image_sinks.remove(&sink) {
            Some(released) => {
                released.invalidate();
                Ok(())
            }
            None => {
                state
                    .invalid_closes
                    .push(format!("image sink {} released twice", sink));
                Err(HardwareError::InvalidArgument(format!("unknown sink {}", sink)))
            }
        }
    }
}
