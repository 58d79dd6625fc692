//! The task that owns the device and serializes every hardware interaction.
//!
//! Commands, hardware callbacks, deadlines and close requests all arrive on the
//! same task, so a submission and its completion can never race. Only one
//! open, configure or capture is outstanding at a time; further commands wait in
//! the channel until it resolves.

use super::controller::{ControllerOptions, ControllerStatus};
use super::output::{OutputKind, OutputTarget, SessionConfiguration};
use super::pending::{PendingTable, RequestSequence, Responder};
use super::state::SessionState;
use crate::check_invariant;
use crate::device::DeviceClaim;
use crate::errors::{CaptureError, ConfigureError, DisconnectError, HardwareError, OpenError};
use crate::hardware::{
    CameraHardware, DeviceToken, HardwareEvent, HardwareHandle, RequestId, SessionToken,
    SinkResource,
};
use crate::invariants;
use crate::types::CapturedImage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};

pub(crate) enum Command {
    Open {
        respond_to: Responder<(), OpenError>,
    },
    Configure {
        config: SessionConfiguration,
        respond_to: Responder<(), ConfigureError>,
    },
    Reconfigure {
        config: SessionConfiguration,
        respond_to: Responder<(), ConfigureError>,
    },
    Deconfigure {
        respond_to: Responder<(), ConfigureError>,
    },
    StillTarget {
        respond_to: Responder<OutputTarget, ConfigureError>,
    },
    CaptureStill {
        respond_to: Responder<CapturedImage, CaptureError>,
    },
}

pub(crate) struct Mailboxes {
    pub commands: mpsc::UnboundedReceiver<Command>,
    pub control: mpsc::UnboundedReceiver<oneshot::Sender<()>>,
    pub events: mpsc::UnboundedReceiver<HardwareEvent>,
}

enum Operation {
    Open,
    Configure(SessionConfiguration),
    Reconfigure(SessionConfiguration),
    Capture,
}

struct InFlight {
    request: RequestId,
    deadline: Instant,
    operation: Operation,
}

fn respond<T, E>(respond_to: Responder<T, E>, result: Result<T, E>) {
    if respond_to.send(result).is_err() {
        log::debug!("Caller stopped waiting before the reply was ready");
    }
}

pub(crate) struct Worker<H: CameraHardware> {
    camera_id: Arc<str>,
    hardware: H,
    options: ControllerOptions,
    state: SessionState,
    status: watch::Sender<ControllerStatus>,
    requests: RequestSequence,
    claim: Option<DeviceClaim>,
    device: HardwareHandle<DeviceToken>,
    session: HardwareHandle<SessionToken>,
    still_sink: HardwareHandle<Arc<dyn SinkResource>>,
    active: Option<SessionConfiguration>,
    in_flight: Option<InFlight>,
    opens: PendingTable<(), OpenError>,
    configures: PendingTable<(), ConfigureError>,
    captures: PendingTable<CapturedImage, CaptureError>,
    fatal: Option<DisconnectError>,
    terminated: bool,
}

impl<H: CameraHardware> Worker<H> {
    pub(crate) fn new(
        camera_id: Arc<str>,
        hardware: H,
        options: ControllerOptions,
        status: watch::Sender<ControllerStatus>,
    ) -> Self {
        Self {
            camera_id,
            hardware,
            options,
            state: SessionState::Closed,
            status,
            requests: RequestSequence::default(),
            claim: None,
            device: HardwareHandle::vacant("device"),
            session: HardwareHandle::vacant("capture session"),
            still_sink: HardwareHandle::vacant("still-image sink"),
            active: None,
            in_flight: None,
            opens: PendingTable::new("open"),
            configures: PendingTable::new("configure"),
            captures: PendingTable::new("capture"),
            fatal: None,
            terminated: false,
        }
    }

    pub(crate) async fn run(mut self, mut mailboxes: Mailboxes) {
        log::debug!("Controller worker for camera {} started", self.camera_id);

        loop {
            let deadline = self.in_flight.as_ref().map(|f| f.deadline);

            tokio::select! {
                biased;

                ack = mailboxes.control.recv() => match ack {
                    Some(ack) => {
                        self.close();
                        let _ = ack.send(());
                    }
                    None => break,
                },
                Some(event) = mailboxes.events.recv() => self.handle_event(event),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.handle_timeout();
                }
                command = mailboxes.commands.recv(), if self.in_flight.is_none() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }

        if !self.terminated {
            log::info!("All handles to camera {} dropped, closing", self.camera_id);
            self.teardown(DisconnectError::Closed);
        }
        log::debug!("Controller worker for camera {} stopped", self.camera_id);
    }

    // ---- commands ----

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Open { respond_to } => self.open(respond_to),
            Command::Configure { config, respond_to } => {
                self.build_session(config, respond_to, false)
            }
            Command::Reconfigure { config, respond_to } => {
                self.build_session(config, respond_to, true)
            }
            Command::Deconfigure { respond_to } => {
                let result = self.deconfigure();
                respond(respond_to, result);
            }
            Command::StillTarget { respond_to } => {
                let result = self.still_target();
                respond(respond_to, result);
            }
            Command::CaptureStill { respond_to } => self.capture_still(respond_to),
        }
    }

    fn usable(&self) -> Result<(), DisconnectError> {
        if self.terminated {
            return Err(self.fatal.clone().unwrap_or(DisconnectError::Closed));
        }
        Ok(())
    }

    fn open(&mut self, respond_to: Responder<(), OpenError>) {
        if self.terminated {
            return respond(respond_to, Err(OpenError::Closed));
        }
        if self.state != SessionState::Closed {
            return respond(respond_to, Err(OpenError::InvalidState(self.state)));
        }

        let claim = match DeviceClaim::acquire(&self.camera_id) {
            Ok(claim) => claim,
            Err(e) => return respond(respond_to, Err(e)),
        };

        let request = self.requests.next();
        log::info!("Opening camera {} ({})", self.camera_id, request);
        if let Err(e) = self.hardware.open_device(&self.camera_id, request) {
            log::warn!("Open of camera {} rejected: {}", self.camera_id, e);
            return respond(respond_to, Err(e.into()));
        }

        self.claim = Some(claim);
        self.opens.register(request, respond_to);
        self.begin(request, self.options.timeouts.open(), Operation::Open);
        self.transition(SessionState::Opening);
    }

    fn build_session(
        &mut self,
        config: SessionConfiguration,
        respond_to: Responder<(), ConfigureError>,
        replace_active: bool,
    ) {
        if let Err(e) = self.usable() {
            return respond(respond_to, Err(e.into()));
        }

        let required = if replace_active {
            SessionState::Running
        } else {
            SessionState::Opened
        };
        if self.state != required {
            return respond(respond_to, Err(ConfigureError::InvalidState(self.state)));
        }
        if let Err(e) = config.ensure_reusable() {
            return respond(respond_to, Err(e));
        }
        if replace_active {
            if let Some(active) = &self.active {
                if active.same_outputs(&config) {
                    log::debug!("Requested configuration is already active");
                    return respond(respond_to, Ok(()));
                }
            }
        }
        let Some(device) = self.device.get().copied() else {
            return respond(respond_to, Err(ConfigureError::InvalidState(self.state)));
        };

        let request = self.requests.next();
        log::info!(
            "Configuring camera {} with {:?} ({})",
            self.camera_id,
            config.kinds(),
            request
        );
        if let Err(e) = self
            .hardware
            .create_capture_session(device, &config.sink_ids(), request)
        {
            log::warn!("Session configuration rejected: {}", e);
            return respond(respond_to, Err(e.into()));
        }

        self.configures.register(request, respond_to);
        let timeout = self.options.timeouts.configure();
        if replace_active {
            self.begin(request, timeout, Operation::Reconfigure(config));
            self.transition(SessionState::Reconfiguring);
        } else {
            self.begin(request, timeout, Operation::Configure(config));
            self.transition(SessionState::Configuring);
        }
    }

    fn deconfigure(&mut self) -> Result<(), ConfigureError> {
        self.usable()?;
        match self.state {
            SessionState::Opened => Ok(()),
            SessionState::Running => {
                log::info!("Releasing capture session of camera {}", self.camera_id);
                self.close_active_session();
                self.active = None;
                self.transition(SessionState::Opened);
                Ok(())
            }
            other => Err(ConfigureError::InvalidState(other)),
        }
    }

    fn still_target(&mut self) -> Result<OutputTarget, ConfigureError> {
        self.usable()?;
        if self.state == SessionState::Closed {
            return Err(ConfigureError::InvalidState(self.state));
        }

        if let Some(sink) = self.still_sink.get() {
            if sink.is_valid() {
                return Ok(OutputTarget::still_capture(sink.clone()));
            }
        }
        self.release_still_sink();

        let sink = self.hardware.create_image_sink(
            self.options.photo_size,
            self.options.photo_format,
            self.options.max_images,
        )?;
        log::debug!(
            "Created still-image sink {} at {}",
            sink.id(),
            self.options.photo_size
        );
        self.still_sink.acquire(sink.clone());
        Ok(OutputTarget::still_capture(sink))
    }

    fn capture_still(&mut self, respond_to: Responder<CapturedImage, CaptureError>) {
        if let Err(e) = self.usable() {
            return respond(respond_to, Err(e.into()));
        }

        let target = match (self.state, &self.active) {
            (SessionState::Running, Some(active)) => active
                .target(OutputKind::StillCapture)
                .map(OutputTarget::sink_id),
            _ => None,
        };
        let (Some(sink), Some(session)) = (target, self.session.get().copied()) else {
            return respond(respond_to, Err(CaptureError::NotConfigured));
        };
        check_invariant!(
            self.state == SessionState::Running,
            invariants::COMMANDS_REQUIRE_RUNNING
        );

        let sequence = self.requests.next();
        log::debug!("Submitting still capture {} to {}", sequence, sink);
        if let Err(e) = self.hardware.capture(session, sink, sequence) {
            log::warn!("Still capture rejected: {}", e);
            return respond(respond_to, Err(e.into()));
        }

        self.captures.register(sequence, respond_to);
        self.begin(sequence, self.options.timeouts.capture(), Operation::Capture);
    }

    fn begin(&mut self, request: RequestId, timeout: Duration, operation: Operation) {
        self.in_flight = Some(InFlight {
            request,
            deadline: Instant::now() + timeout,
            operation,
        });
    }

    fn take_in_flight<F>(&mut self, request: RequestId, expected: F) -> Option<Operation>
    where
        F: Fn(&Operation) -> bool,
    {
        match &self.in_flight {
            Some(f) if f.request == request && expected(&f.operation) => {
                self.in_flight.take().map(|f| f.operation)
            }
            _ => None,
        }
    }

    // ---- hardware callbacks ----

    fn handle_event(&mut self, event: HardwareEvent) {
        match event {
            HardwareEvent::DeviceOpened { request, device } => self.on_opened(request, device),
            HardwareEvent::DeviceOpenFailed { request, error } => {
                self.on_open_failed(request, error)
            }
            HardwareEvent::SessionConfigured { request, session } => {
                self.on_configured(request, session)
            }
            HardwareEvent::SessionConfigureFailed { request, error } => {
                self.on_configure_failed(request, error)
            }
            HardwareEvent::CaptureCompleted { sequence, image } => {
                self.on_capture_result(sequence, Ok(image))
            }
            HardwareEvent::CaptureFailed { sequence, error } => {
                self.on_capture_result(sequence, Err(error.into()))
            }
            HardwareEvent::DeviceDisconnected { device } => {
                if self.owns_device(device) {
                    self.fail(DisconnectError::Disconnected(self.camera_id.to_string()));
                } else {
                    log::debug!("Ignoring disconnect of unowned device {:?}", device);
                }
            }
            HardwareEvent::DeviceError { device, code } => {
                if self.owns_device(device) {
                    self.fail(DisconnectError::DeviceError {
                        camera_id: self.camera_id.to_string(),
                        code,
                    });
                } else {
                    log::debug!("Ignoring error {} from unowned device {:?}", code, device);
                }
            }
            HardwareEvent::SessionError { session, reason } => {
                if self.session.get() == Some(&session) {
                    self.fail(DisconnectError::SessionFailed(reason));
                } else {
                    log::debug!("Ignoring error from retired session {:?}: {}", session, reason);
                }
            }
        }
    }

    /// A disconnect while opening cannot be correlated by token yet
    fn owns_device(&self, device: DeviceToken) -> bool {
        if self.terminated {
            return false;
        }
        self.device.get() == Some(&device) || self.state == SessionState::Opening
    }

    fn on_opened(&mut self, request: RequestId, device: DeviceToken) {
        if self
            .take_in_flight(request, |op| matches!(op, Operation::Open))
            .is_none()
        {
            if self.device.get() == Some(&device) {
                log::warn!("Duplicate open completion {} ignored", request);
            } else {
                log::warn!(
                    "Open {} completed after it was abandoned, closing stray device",
                    request
                );
                if let Err(e) = self.hardware.close_device(device) {
                    log::warn!("Failed to close stray device {:?}: {}", device, e);
                }
            }
            return;
        }

        self.device.acquire(device);
        log::info!("Camera {} opened", self.camera_id);
        self.transition(SessionState::Opened);
        self.opens.resolve(request, Ok(()));
    }

    fn on_open_failed(&mut self, request: RequestId, error: HardwareError) {
        if self
            .take_in_flight(request, |op| matches!(op, Operation::Open))
            .is_none()
        {
            log::warn!("Ignoring open failure for {}: {}", request, error);
            return;
        }

        log::warn!("Camera {} failed to open: {}", self.camera_id, error);
        self.claim = None;
        self.transition(SessionState::Closed);
        self.opens.resolve(request, Err(error.into()));
    }

    fn on_configured(&mut self, request: RequestId, session: SessionToken) {
        let operation = self.take_in_flight(request, |op| {
            matches!(op, Operation::Configure(_) | Operation::Reconfigure(_))
        });

        match operation {
            Some(Operation::Configure(config)) => self.activate(request, session, config),
            Some(Operation::Reconfigure(config)) => self.replace(request, session, config),
            _ if self.session.get() == Some(&session) => {
                log::warn!("Duplicate configure completion {} ignored", request);
            }
            _ => {
                log::warn!(
                    "Configure {} completed after it was abandoned, closing stray session",
                    request
                );
                self.close_stray_session(session);
            }
        }
    }

    fn activate(&mut self, request: RequestId, session: SessionToken, config: SessionConfiguration) {
        check_invariant!(!self.session.is_held(), invariants::SINGLE_ACTIVE_SESSION);

        if let Err(e) = self.arm(session, &config) {
            log::warn!("Failed to start streaming on new session: {}", e);
            self.close_stray_session(session);
            self.transition(SessionState::Opened);
            self.configures.resolve(request, Err(e.into()));
            return;
        }

        self.session.acquire(session);
        self.active = Some(config);
        log::info!("Camera {} running", self.camera_id);
        self.transition(SessionState::Running);
        self.configures.resolve(request, Ok(()));
    }

    /// Retire the old session only once the new one is confirmed and streaming
    fn replace(&mut self, request: RequestId, session: SessionToken, config: SessionConfiguration) {
        if let Err(e) = self.arm(session, &config) {
            log::warn!("Failed to start streaming on replacement session: {}", e);
            self.close_stray_session(session);
            self.restore_previous(request, e.into());
            return;
        }

        self.close_active_session();
        let displaced = self.session.acquire(session);
        check_invariant!(displaced.is_none(), invariants::SINGLE_ACTIVE_SESSION);

        self.active = Some(config);
        log::info!("Camera {} reconfigured", self.camera_id);
        self.transition(SessionState::Running);
        self.configures.resolve(request, Ok(()));
    }

    fn on_configure_failed(&mut self, request: RequestId, error: HardwareError) {
        let operation = self.take_in_flight(request, |op| {
            matches!(op, Operation::Configure(_) | Operation::Reconfigure(_))
        });

        match operation {
            Some(Operation::Configure(_)) => {
                log::warn!("Session configuration failed: {}", error);
                self.transition(SessionState::Opened);
                self.configures.resolve(request, Err(error.into()));
            }
            Some(Operation::Reconfigure(_)) => {
                log::warn!("Reconfiguration failed: {}", error);
                self.restore_previous(request, error.into());
            }
            _ => log::warn!("Ignoring configure failure for {}: {}", request, error),
        }
    }

    /// Keep the previous session streaming after a failed reconfiguration.
    ///
    /// If the previous session cannot be re-armed either, the camera is unusable.
    fn restore_previous(&mut self, request: RequestId, error: ConfigureError) {
        let restored = match (self.session.get().copied(), self.active.clone()) {
            (Some(session), Some(active)) => {
                self.arm(session, &active).map_err(|e| e.to_string())
            }
            _ => Err("no previous session".to_string()),
        };

        match restored {
            Ok(()) => {
                log::info!("Previous configuration of camera {} restored", self.camera_id);
                self.transition(SessionState::Running);
                self.configures.resolve(request, Err(error));
            }
            Err(reason) => {
                let detail = format!("{}; restore failed: {}", error, reason);
                self.configures
                    .resolve(request, Err(ConfigureError::RestoreFailed(detail.clone())));
                self.fail(DisconnectError::SessionFailed(detail));
            }
        }
    }

    fn on_capture_result(&mut self, sequence: RequestId, result: Result<CapturedImage, CaptureError>) {
        if self
            .take_in_flight(sequence, |op| matches!(op, Operation::Capture))
            .is_none()
        {
            log::warn!(
                "Discarding stale capture result {} (latest issued {:?})",
                sequence,
                self.requests.last()
            );
            return;
        }

        match &result {
            Ok(image) => log::debug!("Capture {} delivered {} bytes", sequence, image.data.len()),
            Err(e) => log::warn!("Capture {} failed: {}", sequence, e),
        }
        self.captures.resolve(sequence, result);
    }

    fn handle_timeout(&mut self) {
        let Some(in_flight) = self.in_flight.take() else {
            return;
        };
        let request = in_flight.request;
        let timeouts = self.options.timeouts.clone();

        match in_flight.operation {
            Operation::Open => {
                log::warn!("Open {} not acknowledged within {} ms", request, timeouts.open_ms);
                self.claim = None;
                self.transition(SessionState::Closed);
                self.opens
                    .resolve(request, Err(OpenError::Timeout(timeouts.open_ms)));
            }
            Operation::Configure(_) => {
                log::warn!(
                    "Configure {} not acknowledged within {} ms",
                    request,
                    timeouts.configure_ms
                );
                self.transition(SessionState::Opened);
                self.configures
                    .resolve(request, Err(ConfigureError::Timeout(timeouts.configure_ms)));
            }
            Operation::Reconfigure(_) => {
                log::warn!(
                    "Reconfigure {} not acknowledged within {} ms",
                    request,
                    timeouts.configure_ms
                );
                self.restore_previous(request, ConfigureError::Timeout(timeouts.configure_ms));
            }
            Operation::Capture => {
                log::warn!(
                    "Capture {} not acknowledged within {} ms",
                    request,
                    timeouts.capture_ms
                );
                self.captures
                    .resolve(request, Err(CaptureError::Timeout(timeouts.capture_ms)));
            }
        }
    }

    // ---- resources ----

    fn arm(&mut self, session: SessionToken, config: &SessionConfiguration) -> Result<(), HardwareError> {
        let streaming = config.streaming_sinks();
        if streaming.is_empty() {
            return Ok(());
        }
        self.hardware
            .set_repeating_request(session, config.intent(), &streaming)
    }

    fn close_active_session(&mut self) {
        let hardware = &mut self.hardware;
        self.session.release_with(|s| hardware.close_session(s));
    }

    fn close_stray_session(&mut self, session: SessionToken) {
        if let Err(e) = self.hardware.close_session(session) {
            log::warn!("Failed to close stray session {:?}: {}", session, e);
        }
    }

    fn release_still_sink(&mut self) {
        let hardware = &mut self.hardware;
        self.still_sink
            .release_with(|sink| hardware.release_image_sink(sink.id()));
    }

    fn transition(&mut self, next: SessionState) {
        check_invariant!(
            self.state.can_transition_to(next),
            invariants::LEGAL_TRANSITION
        );
        log::debug!("Camera {}: {} -> {}", self.camera_id, self.state, next);
        self.state = next;
        self.publish();
    }

    fn publish(&self) {
        self.status.send_replace(ControllerStatus {
            state: self.state,
            active: self.active.clone(),
            fatal: self.fatal.clone(),
            terminated: self.terminated,
        });
    }

    // ---- teardown ----

    fn close(&mut self) {
        if self.terminated {
            log::debug!("Camera {} already closed", self.camera_id);
            return;
        }
        log::info!("Closing camera {}", self.camera_id);
        self.teardown(DisconnectError::Closed);
    }

    fn fail(&mut self, cause: DisconnectError) {
        if self.terminated {
            return;
        }
        log::error!("Camera {} lost: {}", self.camera_id, cause);
        self.fatal = Some(cause.clone());
        self.teardown(cause);
    }

    /// Fixed sequence of independent release steps; a failing step never stops the rest
    fn teardown(&mut self, cause: DisconnectError) {
        if self.state != SessionState::Closed {
            self.transition(SessionState::Closing);
        }
        self.in_flight = None;

        let resolved = self.opens.fail_all(OpenError::Disconnected(cause.clone()))
            + self
                .configures
                .fail_all(ConfigureError::Disconnected(cause.clone()))
            + self.captures.fail_all(CaptureError::Disconnected(cause.clone()));
        if resolved > 0 {
            log::info!("Resolved {} pending requests: {}", resolved, cause);
        }

        let hardware = &mut self.hardware;
        let session = self.session.release_with(|s| hardware.close_session(s));
        check_invariant!(!self.session.is_held(), invariants::SESSION_BEFORE_DEVICE);
        let device = self.device.release_with(|d| hardware.close_device(d));
        let still = self
            .still_sink
            .release_with(|sink| hardware.release_image_sink(sink.id()));

        // preview and recording sinks belong to their creators
        self.active = None;
        self.claim = None;

        let failed = [session, device, still]
            .iter()
            .filter(|outcome| outcome.is_failure())
            .count();
        if failed > 0 {
            log::warn!(
                "{} release steps failed while closing camera {}",
                failed,
                self.camera_id
            );
        }

        self.terminated = true;
        if self.state == SessionState::Closing {
            self.transition(SessionState::Closed);
        } else {
            self.publish();
        }
    }
}
