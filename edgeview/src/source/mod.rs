mod test_pattern;
mod y4m_file;

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use edgeview_frame::{FrameSize, capture::FrameSource};
use edgeview_render::MAX_TEXTURE_DIMENSION;
use tracing::info;

pub use self::{test_pattern::TestPatternSource, y4m_file::Y4mSource};
use crate::cli::{Cli, SourceKind};

const DEFAULT_FPS: u32 = 30;

pub fn open(cli: &Cli) -> Result<Box<dyn FrameSource>> {
    Ok(match cli.source {
        SourceKind::TestPattern => {
            let size = FrameSize::new(cli.width, cli.height);
            check_frame_size(size).context("Invalid test pattern size")?;
            let fps = cli.fps.unwrap_or(DEFAULT_FPS);
            info!(
                width = size.width,
                height = size.height,
                fps,
                padding = cli.padding,
                semi_planar = cli.semi_planar,
                "Opened test pattern source"
            );
            Box::new(TestPatternSource::new(
                size,
                cli.padding,
                cli.semi_planar,
                FramePacer::new(fps),
            ))
        }
        SourceKind::Y4m => {
            let path = cli
                .input
                .as_deref()
                .context("The y4m source needs an input file")?;
            Box::new(Y4mSource::open(path, cli.fps, cli.looping)?)
        }
    })
}

/// Frames have to be 4:2:0 friendly and fit in a texture on the preview device.
fn check_frame_size(size: FrameSize) -> Result<()> {
    if size.width == 0 || size.height == 0 || size.width % 2 != 0 || size.height % 2 != 0 {
        bail!(
            "Frame size must be even and non-zero, got {}x{}",
            size.width,
            size.height
        );
    }
    if size.width > MAX_TEXTURE_DIMENSION || size.height > MAX_TEXTURE_DIMENSION {
        bail!(
            "Frame size {}x{} exceeds the {} pixel texture limit",
            size.width,
            size.height,
            MAX_TEXTURE_DIMENSION
        );
    }
    Ok(())
}

/// Sleeps so that frames come out at a steady rate, like a camera would deliver them.
pub struct FramePacer {
    interval: Duration,
    next_deadline: Option<Instant>,
}

impl FramePacer {
    pub fn new(fps: u32) -> Self {
        Self::with_interval(Duration::from_secs(1) / fps.max(1))
    }

    /// Paces at `num / den` frames per second, e.g. 30000/1001 for NTSC rates.
    ///
    /// A zero ratio falls back to [`DEFAULT_FPS`].
    pub fn from_ratio(num: u64, den: u64) -> Self {
        if num == 0 || den == 0 {
            return Self::new(DEFAULT_FPS);
        }
        let nanos = u128::from(den) * 1_000_000_000 / u128::from(num);
        Self::with_interval(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            next_deadline: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn unpaced() -> Self {
        Self::with_interval(Duration::ZERO)
    }

    pub fn wait(&mut self) {
        if self.interval.is_zero() {
            return;
        }

        let now = Instant::now();
        let deadline = match self.next_deadline {
            // more than a frame behind: don't try to catch up with a burst
            Some(deadline) if deadline + self.interval >= now => deadline,
            _ => now,
        };
        if let Some(remaining) = deadline.checked_duration_since(now) {
            std::thread::sleep(remaining);
        }
        self.next_deadline = Some(deadline + self.interval);
    }
}
