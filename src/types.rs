use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel dimensions of a sink or image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<[u32; 2]> for Size {
    fn from(value: [u32; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

/// Encoding produced by a still-image sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

/// Image orientation relative to the natural device orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    Portrait,
    LandscapeRight,
    PortraitUpsideDown,
    LandscapeLeft,
}

impl Orientation {
    /// Map a sensor rotation in degrees onto the nearest orientation
    pub fn from_rotation_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            45..=134 => Orientation::LandscapeRight,
            135..=224 => Orientation::PortraitUpsideDown,
            225..=314 => Orientation::LandscapeLeft,
            _ => Orientation::Portrait,
        }
    }

    pub fn rotation_degrees(&self) -> i32 {
        match self {
            Orientation::Portrait => 0,
            Orientation::LandscapeRight => 90,
            Orientation::PortraitUpsideDown => 180,
            Orientation::LandscapeLeft => 270,
        }
    }
}

/// Raw still image handed back by the hardware for one capture request
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub data: Bytes,
    pub format: ImageFormat,
    /// Dimensions as reported by the hardware; the decoded header wins when they disagree
    pub reported_size: Size,
}
