//! Capture session state machine
//!
//! [`CaptureSessionController`] owns the device and the active capture session and
//! drives them through `Closed → Opening → Opened → Configuring → Running →
//! Reconfiguring → Running → Closing → Closed`.

mod controller;
mod output;
mod pending;
mod state;
mod worker;

pub use controller::{CaptureSessionController, ControllerOptions, ControllerStatus};
pub use output::{
    default_configuration, recording_configuration, CaptureIntent, OutputKind, OutputTarget,
    SessionConfiguration, SessionConfigurationBuilder, SinkOwner,
};
pub use pending::{PendingTable, RequestSequence, Resolution, Responder};
pub use state::SessionState;

#[cfg(test)]
mod tests;
