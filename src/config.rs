//! Configuration management for CrabCapture
//!
//! Provides loading, saving and validation of the default session parameters:
//! preview size, still-capture sink, video recording defaults, and how long the
//! controller waits for a hardware acknowledgement.

use crate::errors::CameraError;
use crate::recording::{VideoCodec, VideoFileType};
use crate::types::{ImageFormat, Size};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSettings {
    pub preview: PreviewConfig,
    pub photo: PhotoConfig,
    pub video: VideoConfig,
    pub timeouts: TimeoutConfig,
}

/// Live preview configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Surface size requested from the presentation layer [width, height]
    pub resolution: [u32; 2],
}

/// Still-capture sink configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoConfig {
    /// Still image resolution [width, height]
    pub resolution: [u32; 2],
    /// Encoding of the still sink
    pub format: ImageFormat,
    /// Number of images the sink may buffer
    pub max_images: u32,
    /// Keep the still sink in the default configuration
    pub keep_warm: bool,
}

/// Recording defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Video resolution [width, height]
    pub resolution: [u32; 2],
    /// Frames per second
    pub fps: u32,
    /// Target bitrate in bits per second
    pub bitrate: u32,
    pub codec: VideoCodec,
    pub file_type: VideoFileType,
}

/// Bounds on how long a hardware acknowledgement may take
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub open_ms: u64,
    pub configure_ms: u64,
    pub capture_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            preview: PreviewConfig {
                resolution: [1920, 1080],
            },
            photo: PhotoConfig {
                resolution: [4032, 3024],
                format: ImageFormat::Jpeg,
                max_images: 2,
                keep_warm: true,
            },
            video: VideoConfig {
                resolution: [1920, 1080],
                fps: 30,
                bitrate: 10_000_000,
                codec: VideoCodec::H264,
                file_type: VideoFileType::Mp4,
            },
            timeouts: TimeoutConfig {
                open_ms: 5_000,
                configure_ms: 5_000,
                capture_ms: 10_000,
            },
        }
    }
}

impl TimeoutConfig {
    pub fn open(&self) -> Duration {
        Duration::from_millis(self.open_ms)
    }

    pub fn configure(&self) -> Duration {
        Duration::from_millis(self.configure_ms)
    }

    pub fn capture(&self) -> Duration {
        Duration::from_millis(self.capture_ms)
    }
}

impl CaptureSettings {
    pub fn preview_size(&self) -> Size {
        self.preview.resolution.into()
    }

    pub fn photo_size(&self) -> Size {
        self.photo.resolution.into()
    }

    pub fn video_size(&self) -> Size {
        self.video.resolution.into()
    }

    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CameraError::Settings(format!("Failed to read config file: {}", e)))?;

        let config: CaptureSettings = toml::from_str(&contents)
            .map_err(|e| CameraError::Settings(format!("Failed to parse config file: {}", e)))?;

        config.validate().map_err(CameraError::Settings)?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    CameraError::Settings(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| CameraError::Settings(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| CameraError::Settings(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("crabcapture.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.preview_size().is_empty() {
            return Err("Invalid preview resolution".to_string());
        }
        if self.photo_size().is_empty() {
            return Err("Invalid photo resolution".to_string());
        }
        if self.photo.max_images == 0 || self.photo.max_images > 8 {
            return Err("Photo sink must buffer between 1 and 8 images".to_string());
        }
        if self.video_size().is_empty() {
            return Err("Invalid video resolution".to_string());
        }
        if self.video.fps == 0 || self.video.fps > 240 {
            return Err("Invalid video FPS (must be 1-240)".to_string());
        }
        if self.video.bitrate == 0 {
            return Err("Video bitrate must be non-zero".to_string());
        }
        if self.timeouts.open_ms == 0
            || self.timeouts.configure_ms == 0
            || self.timeouts.capture_ms == 0
        {
            return Err("Hardware timeouts must be non-zero".to_string());
        }
        Ok(())
    }
}
