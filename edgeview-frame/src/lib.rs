//! The GPU-free half of edgeview: frame layouts, planar to semi-planar conversion,
//! the transform contract and the single-slot hand-off between the capture and render threads.

pub mod capture;
pub mod convert;
pub mod error;
pub mod frame;
pub mod mailbox;
pub mod pipeline;
pub mod throughput;
pub mod transform;
pub mod view_mode;

pub use error::{FrameError, TransformError};
pub use frame::{FrameSize, InterleavedFrame, PixelBuffer, Plane, PlaneKind, RawFrame};
