use std::{num::NonZeroU32, path::PathBuf};

use clap::{Parser, ValueEnum};
use edgeview_frame::view_mode::ViewMode;

#[derive(ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// Animated color bars generated in memory
    TestPattern,
    /// A YUV4MPEG2 file
    Y4m,
}

#[derive(ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransformKind {
    /// Canny-style edge detection
    Edges,
    /// Plain color conversion, the processed view looks like the raw one
    Identity,
}

#[derive(ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ViewArg {
    Processed,
    Raw,
}

impl From<ViewArg> for ViewMode {
    fn from(value: ViewArg) -> Self {
        match value {
            ViewArg::Processed => ViewMode::Processed,
            ViewArg::Raw => ViewMode::Raw,
        }
    }
}

/// Live camera preview with a pluggable frame transform.
///
/// Space or Tab switches between the processed and the raw view, Escape quits.
#[derive(Parser, Debug)]
#[clap(version)]
pub struct Cli {
    #[clap(long, value_enum, default_value_t = SourceKind::TestPattern)]
    pub source: SourceKind,
    /// File to read frames from when using the y4m source
    #[clap(short, long, required_if_eq("source", "y4m"))]
    pub input: Option<PathBuf>,
    /// Restart the y4m file when it ends
    #[clap(long = "loop")]
    pub looping: bool,

    #[clap(long, default_value = "640")]
    pub width: u32,
    #[clap(long, default_value = "480")]
    pub height: u32,
    /// Frame rate of the source. Defaults to 30 for the test pattern and to the header rate for y4m files
    #[clap(long)]
    pub fps: Option<u32>,
    /// Extra bytes at the end of each test pattern row
    #[clap(long, default_value = "0")]
    pub padding: usize,
    /// Emit test pattern chroma as interleaved U/V with a pixel stride of 2
    #[clap(long)]
    pub semi_planar: bool,

    #[clap(long, value_enum, default_value_t = TransformKind::Edges)]
    pub transform: TransformKind,
    /// Make every Nth transform call fail, to exercise frame skipping
    #[clap(long)]
    pub fail_every: Option<NonZeroU32>,
    #[clap(long, value_enum, default_value_t = ViewArg::Processed)]
    pub view: ViewArg,

    /// Render offscreen instead of opening a window
    #[clap(long)]
    pub headless: bool,
    /// Number of frames to render in headless mode
    #[clap(long, default_value = "300")]
    pub frames: u64,
    /// Write the last rendered frame to this PNG file (headless mode only)
    #[clap(long, requires = "headless")]
    pub dump: Option<PathBuf>,
}
