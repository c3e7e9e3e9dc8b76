pub mod init;
pub mod offscreen;
pub mod preview;
pub mod program;
pub mod quad;
pub mod texture;

pub use init::{GpuContext, MAX_TEXTURE_DIMENSION, WindowSurface, init_wgpu};
pub use preview::{DrawOutcome, DrawReport, PreviewRenderer};
