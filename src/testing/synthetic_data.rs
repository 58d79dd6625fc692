//! Synthetic image data and device descriptions for offline runs

use crate::device::{CapabilitySource, DeviceDetails};
use crate::errors::OpenError;
use crate::types::{Orientation, Size};
use std::io::Cursor;

/// Encode a JPEG of exactly `size` pixels.
///
/// The gradient shifts with `seed` so consecutive captures differ.
pub fn synthetic_jpeg(size: Size, seed: u64) -> Vec<u8> {
    let base = (seed % 256) as u8;
    let img = image::RgbImage::from_fn(size.width, size.height, |x, y| {
        image::Rgb([
            base.wrapping_add((x % 256) as u8),
            base.wrapping_add((y % 256) as u8),
            base.wrapping_add(((x + y) % 256) as u8),
        ])
    });

    let mut out = Cursor::new(Vec::new());
    if let Err(e) = image::DynamicImage::ImageRgb8(img).write_to(&mut out, image::ImageFormat::Jpeg)
    {
        log::error!("Failed to encode synthetic JPEG: {}", e);
    }
    out.into_inner()
}

/// A camera id no other test in the process will use
pub fn unique_camera_id() -> String {
    format!("sim-{}", uuid::Uuid::new_v4().simple())
}

/// Description of a typical phone back camera
pub fn back_camera(id: impl Into<String>) -> DeviceDetails {
    DeviceDetails {
        id: id.into(),
        sensor_orientation: Orientation::from_rotation_degrees(90),
        photo_sizes: vec![Size::new(4032, 3024), Size::new(1920, 1440), Size::new(640, 480)],
        video_sizes: vec![Size::new(1920, 1080), Size::new(1280, 720)],
        max_fps: 60,
        supports_stabilization: true,
        max_concurrent_outputs: 3,
        is_mirrored: false,
    }
}

/// Capability source returning one fixed description for any id
#[derive(Debug, Clone)]
pub struct StaticCapabilities {
    details: DeviceDetails,
    absent: bool,
}

impl StaticCapabilities {
    pub fn new(details: DeviceDetails) -> Self {
        Self {
            details,
            absent: false,
        }
    }

    /// Source that knows no cameras
    pub fn absent() -> Self {
        Self {
            details: DeviceDetails::unconstrained(""),
            absent: true,
        }
    }

    pub fn with_max_outputs(mut self, max_concurrent_outputs: u32) -> Self {
        self.details.max_concurrent_outputs = max_concurrent_outputs;
        self
    }
}

impl CapabilitySource for StaticCapabilities {
    fn describe(&self, camera_id: &str) -> Result<DeviceDetails, OpenError> {
        if self.absent {
            return Err(OpenError::DeviceAbsent(camera_id.to_string()));
        }
        Ok(DeviceDetails {
            id: camera_id.to_string(),
            ..self.details.clone()
        })
    }
}
