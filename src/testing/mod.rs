//! Testing utilities for CrabCapture
//!
//! In-memory stand-ins for every external collaborator, so the full capture stack
//! runs offline: a scriptable camera, an encoder, a presentation layer, and
//! synthetic image data.

mod camera;
mod encoder;
mod surfaces;
pub mod synthetic_data;

pub use camera::{HardwareCall, SimulatedCamera};
pub use encoder::SimulatedEncoder;
pub use surfaces::{SimulatedSink, StaticSurfaceProvider};
pub use synthetic_data::{back_camera, synthetic_jpeg, unique_camera_id, StaticCapabilities};
