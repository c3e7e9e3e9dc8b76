use thiserror::Error;

use crate::frame::{FrameSize, PlaneKind};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame size {}x{} is not valid for 4:2:0 data", .0.width, .0.height)]
    BadDimensions(FrameSize),
    #[error("{plane} plane has invalid strides (row {row_stride}, pixel {pixel_stride})")]
    BadStride {
        plane: PlaneKind,
        row_stride: usize,
        pixel_stride: usize,
    },
    #[error("{plane} plane holds {actual} bytes, but its strides require {required}")]
    ShortPlane {
        plane: PlaneKind,
        required: usize,
        actual: usize,
    },
    #[error("buffer for a {}x{} frame must be {expected} bytes, got {actual}", .size.width, .size.height)]
    BufferLength {
        size: FrameSize,
        expected: usize,
        actual: usize,
    },
    #[error(
        "transform produced a {}x{} frame for a {}x{} input",
        .actual.width, .actual.height, .expected.width, .expected.height
    )]
    OutputSizeMismatch {
        expected: FrameSize,
        actual: FrameSize,
    },
}

impl FrameError {
    /// Fatal errors mean the pipeline can no longer be trusted and capture must stop.
    ///
    /// Everything else only affects the frame that caused it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FrameError::OutputSizeMismatch { .. })
    }
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("transform rejected its input: {0}")]
    InvalidInput(String),
    #[error("transform failed: {0}")]
    Failed(String),
    #[error("transform panicked: {0}")]
    Panicked(String),
    #[error(transparent)]
    Frame(#[from] FrameError),
}
