use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::{
    error::TransformError,
    frame::{InterleavedFrame, PixelBuffer},
};

/// An external per-frame image operation.
///
/// Receives an NV21 frame and produces an RGBA image of the same size. Implementations may be slow,
/// they run on the capture thread and hold up the next frame while they work.
pub trait FrameTransform: Send {
    fn transform(&mut self, frame: &InterleavedFrame) -> Result<PixelBuffer, TransformError>;
}

impl<F> FrameTransform for F
where
    F: FnMut(&InterleavedFrame) -> Result<PixelBuffer, TransformError> + Send,
{
    fn transform(&mut self, frame: &InterleavedFrame) -> Result<PixelBuffer, TransformError> {
        self(frame)
    }
}

/// Runs the transform, turning a panic inside it into [`TransformError::Panicked`].
pub(crate) fn run_guarded(
    transform: &mut dyn FrameTransform,
    frame: &InterleavedFrame,
) -> Result<PixelBuffer, TransformError> {
    match catch_unwind(AssertUnwindSafe(|| transform.transform(frame))) {
        Ok(result) => result,
        Err(payload) => {
            let message = if let Some(message) = payload.downcast_ref::<&str>() {
                message.to_string()
            } else if let Some(message) = payload.downcast_ref::<String>() {
                message.clone()
            } else {
                "<non-string panic payload>".to_string()
            };
            Err(TransformError::Panicked(message))
        }
    }
}
