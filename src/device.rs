//! Device description and the process-wide claim registry

use crate::errors::OpenError;
use crate::types::{Orientation, Size};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;

lazy_static! {
    static ref CLAIMED_DEVICES: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
}

/// Static capabilities of one physical camera, queried once at session setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDetails {
    pub id: String,
    pub sensor_orientation: Orientation,
    pub photo_sizes: Vec<Size>,
    pub video_sizes: Vec<Size>,
    pub max_fps: u32,
    pub supports_stabilization: bool,
    /// How many output targets one capture session may bind at once
    pub max_concurrent_outputs: u32,
    pub is_mirrored: bool,
}

impl DeviceDetails {
    /// A description that accepts any size the caller asks for
    pub fn unconstrained(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sensor_orientation: Orientation::LandscapeLeft,
            photo_sizes: Vec::new(),
            video_sizes: Vec::new(),
            max_fps: 60,
            supports_stabilization: false,
            max_concurrent_outputs: 3,
            is_mirrored: false,
        }
    }

    pub fn photo_size(&self, preferred: Size) -> Size {
        pick_size(preferred, &self.photo_sizes)
    }

    pub fn video_size(&self, preferred: Size) -> Size {
        pick_size(preferred, &self.video_sizes)
    }
}

/// Read-only source of [`DeviceDetails`]
pub trait CapabilitySource: Send + Sync {
    fn describe(&self, camera_id: &str) -> Result<DeviceDetails, OpenError>;
}

/// The preferred size when supported (or nothing is listed), otherwise the first supported size
pub fn pick_size(preferred: Size, supported: &[Size]) -> Size {
    if supported.is_empty() || supported.contains(&preferred) {
        return preferred;
    }
    log::debug!(
        "Size {} not supported, falling back to {}",
        preferred,
        supported[0]
    );
    supported[0]
}

/// Exclusive claim on a camera id, released on drop
#[derive(Debug)]
pub struct DeviceClaim {
    camera_id: String,
}

impl DeviceClaim {
    pub fn acquire(camera_id: &str) -> Result<Self, OpenError> {
        let mut claimed = CLAIMED_DEVICES.lock().unwrap_or_else(|e| e.into_inner());
        if !claimed.insert(camera_id.to_string()) {
            return Err(OpenError::DeviceBusy(format!(
                "camera {} is already held by another controller",
                camera_id
            )));
        }
        log::debug!("Claimed camera {}", camera_id);
        Ok(Self {
            camera_id: camera_id.to_string(),
        })
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }
}

impl Drop for DeviceClaim {
    fn drop(&mut self) {
        CLAIMED_DEVICES
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.camera_id);
        log::debug!("Released claim on camera {}", self.camera_id);
    }
}

pub fn is_claimed(camera_id: &str) -> bool {
    CLAIMED_DEVICES
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .contains(camera_id)
}
