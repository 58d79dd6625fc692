//! Presentation layer seam

use crate::errors::HardwareError;
use crate::hardware::SinkResource;
use crate::types::Size;
use std::sync::Arc;

/// Surface handed out by the presentation layer; it stays owned by the provider
pub type Surface = Arc<dyn SinkResource>;

/// Supplies the sink bound as the preview target.
///
/// The provider destroys its surfaces on its own schedule. Once it no longer needs
/// preview frames it tells the session through
/// [`CameraSession::surface_no_longer_needed`](crate::CameraSession::surface_no_longer_needed).
pub trait SurfaceProvider: Send + Sync {
    fn request_output_surface(&self, size: Size) -> Result<Surface, HardwareError>;
}
