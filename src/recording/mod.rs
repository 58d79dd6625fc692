//! Video recording on top of the capture session
//!
//! Recording adds an encoder-owned sink to the running session by rebuilding the
//! complete output set, arms the encoder only after the hardware accepted that set,
//! and reconfigures back once the encoder has been finalized.
//!
//! # Example
//! ```rust,ignore
//! use crabcapture::recording::{RecordVideoOptions, RecordingCallbacks, RecordingQuality};
//!
//! let options = RecordVideoOptions::from_quality("clip.mp4", RecordingQuality::High);
//! recorder.start(options, RecordingCallbacks::logging()).await?;
//!
//! // later:
//! let video = recorder.stop().await?;
//! ```

mod coordinator;
mod encoder;
mod options;

pub use coordinator::{RecordingCallbacks, RecordingCoordinator, RecordingState};
pub use encoder::VideoEncoder;
pub use options::{RecordVideoOptions, RecordingQuality, Video, VideoCodec, VideoFileType};
