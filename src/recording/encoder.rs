//! Encoder seam used by the recording coordinator

use super::options::{RecordVideoOptions, Video};
use crate::errors::RecordingError;
use crate::hardware::SinkResource;
use std::sync::Arc;

/// A video encoder fed by a sink bound into the capture session.
///
/// The encoder owns its input sink: [`VideoEncoder::release`] destroys it. Calls are
/// short and synchronous; frames flow on the encoder's own threads.
pub trait VideoEncoder: Send {
    /// Allocate the input sink for `options`. No frames are consumed yet.
    fn prepare(&mut self, options: &RecordVideoOptions) -> Result<Arc<dyn SinkResource>, RecordingError>;

    /// Begin consuming frames from the prepared sink
    fn start(&mut self) -> Result<(), RecordingError>;

    /// Flush pending frames and finalize the output file.
    ///
    /// `truncated` is set when the capture session died mid-recording and the output
    /// may end early.
    fn finish(&mut self, truncated: bool) -> Result<Video, RecordingError>;

    /// Destroy the input sink and drop any unfinished output. Idempotent.
    fn release(&mut self);
}
