//! Recording request and result types

use crate::config::CaptureSettings;
use crate::types::Size;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Quality presets for video recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordingQuality {
    /// 720p, lower bitrate
    Low,
    /// 1080p, standard bitrate
    Medium,
    /// 1080p at the full 10 Mbit/s
    High,
    /// Caller-supplied size and bitrate
    Custom,
}

impl RecordingQuality {
    /// Recommended bitrate in bits per second
    pub fn bitrate(&self) -> u32 {
        match self {
            RecordingQuality::Low => 2_500_000,
            RecordingQuality::Medium => 5_000_000,
            RecordingQuality::High => 10_000_000,
            RecordingQuality::Custom => 5_000_000,
        }
    }

    pub fn resolution(&self) -> Size {
        match self {
            RecordingQuality::Low => Size::new(1280, 720),
            _ => Size::new(1920, 1080),
        }
    }
}

impl Default for RecordingQuality {
    fn default() -> Self {
        RecordingQuality::High
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    H265,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFileType {
    Mp4,
    Mov,
}

impl VideoFileType {
    pub fn extension(&self) -> &'static str {
        match self {
            VideoFileType::Mp4 => "mp4",
            VideoFileType::Mov => "mov",
        }
    }
}

/// Parameters of one recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordVideoOptions {
    /// Destination file
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Target bitrate in bits per second
    pub bitrate: u32,
    pub codec: VideoCodec,
    pub file_type: VideoFileType,
    pub quality: RecordingQuality,
}

impl RecordVideoOptions {
    /// Recording to `path` with the configured video defaults
    pub fn new(path: impl Into<PathBuf>, settings: &CaptureSettings) -> Self {
        let size = settings.video_size();
        Self {
            path: path.into(),
            width: size.width,
            height: size.height,
            fps: settings.video.fps,
            bitrate: settings.video.bitrate,
            codec: settings.video.codec,
            file_type: settings.video.file_type,
            quality: RecordingQuality::Custom,
        }
    }

    pub fn from_quality(path: impl Into<PathBuf>, quality: RecordingQuality) -> Self {
        let size = quality.resolution();
        Self {
            path: path.into(),
            width: size.width,
            height: size.height,
            fps: 30,
            bitrate: quality.bitrate(),
            codec: VideoCodec::H264,
            file_type: VideoFileType::Mp4,
            quality,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn with_size(mut self, size: Size) -> Self {
        self.width = size.width;
        self.height = size.height;
        self
    }

    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }
}

/// Descriptor of a finished recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub path: PathBuf,
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub size_bytes: u64,
    /// Set when the recording was finalized after the session failed
    pub truncated: bool,
}

impl Video {
    /// Average bitrate achieved, in bits per second
    pub fn avg_bitrate(&self) -> f64 {
        if self.duration_secs > 0.0 {
            (self.size_bytes as f64 * 8.0) / self.duration_secs
        } else {
            0.0
        }
    }
}
