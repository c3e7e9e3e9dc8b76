use tracing::{trace, warn};

use crate::{
    convert::{ColorSpaceConverter, nv21_to_rgba},
    error::FrameError,
    frame::{PixelBuffer, RawFrame},
    mailbox::FramePublisher,
    transform::{FrameTransform, run_guarded},
    view_mode::{ViewMode, ViewModeSelector},
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A new image is in the mailbox, the renderer should be asked to draw.
    Published(ViewMode),
    /// The transform failed. Nothing was published.
    Skipped,
}

/// Per-frame work of the capture thread: convert, transform or raw-convert, publish.
pub struct FramePipeline {
    converter: ColorSpaceConverter,
    transform: Box<dyn FrameTransform>,
    view_mode: ViewModeSelector,
    publisher: FramePublisher,
    raw_view: PixelBuffer,
}

impl FramePipeline {
    pub fn new(
        transform: impl FrameTransform + 'static,
        view_mode: ViewModeSelector,
        publisher: FramePublisher,
    ) -> Self {
        Self::with_boxed(Box::new(transform), view_mode, publisher)
    }

    pub fn with_boxed(
        transform: Box<dyn FrameTransform>,
        view_mode: ViewModeSelector,
        publisher: FramePublisher,
    ) -> Self {
        Self {
            converter: ColorSpaceConverter::new(),
            transform,
            view_mode,
            publisher,
            raw_view: PixelBuffer::default(),
        }
    }

    /// Processes one captured frame.
    ///
    /// The raw frame is fully consumed before this returns. The transform is only invoked in
    /// [`ViewMode::Processed`], the raw view is produced by a plain color conversion.
    ///
    /// Malformed input is reported as an error and leaves the mailbox untouched.
    /// A transform that changes the frame size yields [`FrameError::OutputSizeMismatch`], which is fatal.
    pub fn process(&mut self, raw: &RawFrame) -> Result<FrameOutcome, FrameError> {
        let frame = self.converter.convert(raw)?;
        let mode = self.view_mode.get();

        match mode {
            ViewMode::Processed => {
                let output = match run_guarded(self.transform.as_mut(), frame) {
                    Ok(output) => output,
                    Err(err) => {
                        warn!("Skipping frame: {}", err);
                        return Ok(FrameOutcome::Skipped);
                    }
                };

                if output.size() != frame.size() {
                    return Err(FrameError::OutputSizeMismatch {
                        expected: frame.size(),
                        actual: output.size(),
                    });
                }

                self.publisher.publish_buffer(&output);
            }
            ViewMode::Raw => {
                nv21_to_rgba(frame, &mut self.raw_view);
                self.publisher.publish_buffer(&self.raw_view);
            }
        }

        trace!(
            width = raw.size.width,
            height = raw.size.height,
            %mode,
            "Published frame"
        );

        Ok(FrameOutcome::Published(mode))
    }

    pub fn view_mode(&self) -> &ViewModeSelector {
        &self.view_mode
    }

    pub fn publisher(&self) -> &FramePublisher {
        &self.publisher
    }
}
