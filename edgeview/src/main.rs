mod app;
mod cli;
mod headless;
mod source;
mod transform;

use clap::Parser;
use edgeview_frame::{
    FrameSize,
    capture::FrameSource,
    mailbox::{FrameReceiver, frame_mailbox},
    pipeline::FramePipeline,
    view_mode::{ViewMode, ViewModeSelector},
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

/// Both halves of a preview session, wired together but not started yet.
pub struct PreviewParams {
    pub source: Box<dyn FrameSource>,
    pub pipeline: FramePipeline,
    pub receiver: FrameReceiver,
    pub view_mode: ViewModeSelector,
    pub frame_size: FrameSize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    let cli = Cli::parse();
    debug!("Parsed command line: {:?}", cli);

    let source = source::open(&cli)?;
    let frame_size = source.frame_size();

    let view_mode = ViewModeSelector::new(ViewMode::from(cli.view));
    let (publisher, receiver) = frame_mailbox();
    let pipeline = FramePipeline::with_boxed(transform::build(&cli), view_mode.clone(), publisher);

    let params = PreviewParams {
        source,
        pipeline,
        receiver,
        view_mode,
        frame_size,
    };

    if cli.headless {
        headless::run(params, cli.frames, cli.dump.as_deref())
    } else {
        app::run(params)
    }
}
