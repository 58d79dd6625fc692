//! One-shot still capture and persistence of the result

use crate::device::DeviceDetails;
use crate::errors::CaptureError;
use crate::session::CaptureSessionController;
use crate::types::{Orientation, Size};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakePhotoOptions {
    /// Destination file; written only if the capture succeeds
    pub path: PathBuf,
}

impl TakePhotoOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Descriptor of a saved still image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub orientation: Orientation,
    pub is_mirrored: bool,
    pub captured_at: DateTime<Utc>,
}

/// Issues still captures against the running session and saves the results
#[derive(Debug, Clone)]
pub struct PhotoCaptureCoordinator {
    controller: CaptureSessionController,
    orientation: Orientation,
    is_mirrored: bool,
}

impl PhotoCaptureCoordinator {
    pub fn new(controller: CaptureSessionController, details: &DeviceDetails) -> Self {
        Self {
            controller,
            orientation: details.sensor_orientation,
            is_mirrored: details.is_mirrored,
        }
    }

    /// Capture one image and write it to `options.path`
    pub async fn capture(&self, options: TakePhotoOptions) -> Result<Photo, CaptureError> {
        let image = self.controller.capture_still().await?;
        let captured_at = Utc::now();

        let path = options.path.clone();
        let data = image.data.clone();
        let size = match tokio::task::spawn_blocking(move || save_image(&path, &data)).await {
            Ok(Ok(size)) => size,
            Ok(Err(e)) => {
                log::error!("Failed to save photo to {:?}: {}", options.path, e);
                return Err(e);
            }
            Err(e) => {
                log::error!("Task join error: {}", e);
                return Err(CaptureError::Io("failed to execute save task".to_string()));
            }
        };

        if size != image.reported_size {
            log::debug!(
                "Hardware reported {} but image decodes as {}",
                image.reported_size,
                size
            );
        }
        log::info!("Photo saved to {:?} ({})", options.path, size);

        Ok(Photo {
            path: options.path,
            width: size.width,
            height: size.height,
            orientation: self.orientation,
            is_mirrored: self.is_mirrored,
            captured_at,
        })
    }
}

/// Read the pixel dimensions from an encoded image header
pub fn decode_dimensions(data: &[u8]) -> Result<Size, CaptureError> {
    if data.is_empty() {
        return Err(CaptureError::EncodeFailure("image buffer is empty".to_string()));
    }
    let (width, height) = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| CaptureError::EncodeFailure(e.to_string()))?
        .into_dimensions()
        .map_err(|e| CaptureError::EncodeFailure(e.to_string()))?;
    Ok(Size::new(width, height))
}

/// Validate `data` and write it to `path` in a single rename.
///
/// The bytes go to a temporary file next to `path` first; on any failure that file
/// is removed and `path` is left untouched.
pub fn save_image(path: &Path, data: &[u8]) -> Result<Size, CaptureError> {
    let size = decode_dimensions(data)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| CaptureError::Io(e.to_string()))?;

    let mut staging =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| CaptureError::Io(e.to_string()))?;
    staging
        .write_all(data)
        .and_then(|_| staging.as_file().sync_all())
        .map_err(|e| CaptureError::Io(e.to_string()))?;
    staging
        .persist(path)
        .map_err(|e| CaptureError::Io(e.error.to_string()))?;

    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::synthetic_jpeg;

    #[test]
    fn test_decode_dimensions() {
        let jpeg = synthetic_jpeg(Size::new(64, 48), 1);
        assert_eq!(decode_dimensions(&jpeg).unwrap(), Size::new(64, 48));
    }

    #[test]
    fn test_empty_image_is_encode_failure() {
        assert!(matches!(
            decode_dimensions(&[]),
            Err(CaptureError::EncodeFailure(_))
        ));
    }

    #[test]
    fn test_save_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shots").join("a.jpg");
        let jpeg = synthetic_jpeg(Size::new(32, 24), 2);

        let size = save_image(&path, &jpeg).unwrap();
        assert_eq!(size, Size::new(32, 24));
        assert_eq!(fs::read(&path).unwrap(), jpeg.to_vec());
    }

    #[test]
    fn test_failed_save_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");

        let result = save_image(&path, b"definitely not an image");
        assert!(matches!(result, Err(CaptureError::EncodeFailure(_))));
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
