use dpi::PhysicalSize;
use edgeview_frame::{mailbox::FrameReceiver, throughput::ThroughputCounter};
use tracing::{debug, info, trace};

use crate::{
    program::{ProgramError, QuadProgram},
    quad::QuadRenderer,
    texture::TextureStreamer,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DrawOutcome {
    /// A frame was taken from the mailbox and drawn.
    NewFrame,
    /// Nothing new was published, the last frame was drawn again (e.g. after a resize).
    Repeated,
    /// No frame has arrived yet, only the clear color was drawn.
    Empty,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DrawReport {
    pub outcome: DrawOutcome,
    /// Frames per second, reported about once a second.
    pub fps: Option<u32>,
}

/// The consumer side of the preview: takes frames out of the mailbox and draws them.
///
/// Created once the display surface exists, and dropped before the GPU device goes away.
pub struct PreviewRenderer {
    program: QuadProgram,
    quad: QuadRenderer,
    texture: TextureStreamer,
    receiver: FrameReceiver,
    viewport: PhysicalSize<u32>,
    throughput: ThroughputCounter,
    has_frame: bool,
}

impl PreviewRenderer {
    /// Builds the shader program, vertex data and texture. A shader that fails to build aborts start-up.
    pub fn on_surface_created(
        device: &wgpu::Device,
        target_format: wgpu::TextureFormat,
        receiver: FrameReceiver,
    ) -> Result<Self, ProgramError> {
        let program = QuadProgram::new(device, target_format)?;
        let quad = QuadRenderer::new(device);
        let texture = TextureStreamer::new(device, program.bind_group_layout());

        info!("Preview renderer ready");

        Ok(Self {
            program,
            quad,
            texture,
            receiver,
            viewport: PhysicalSize::new(1, 1),
            throughput: ThroughputCounter::new(),
            has_frame: false,
        })
    }

    pub fn on_surface_changed(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        debug!("Viewport set to {}x{}", size.width, size.height);
        self.viewport = size;
    }

    pub fn on_draw_frame(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
    ) -> DrawReport {
        let uploaded = match self.receiver.take_if_available() {
            Some(frame) => self.texture.upload(device, queue, frame),
            None => false,
        };
        let outcome = if uploaded {
            self.has_frame = true;
            DrawOutcome::NewFrame
        } else if self.has_frame {
            DrawOutcome::Repeated
        } else {
            DrawOutcome::Empty
        };

        self.quad.draw(
            encoder,
            target,
            self.viewport,
            &self.program,
            &self.texture,
        );

        let fps = match outcome {
            DrawOutcome::NewFrame => self.throughput.tick(),
            _ => None,
        };
        trace!(?outcome, "Drew preview");

        DrawReport { outcome, fps }
    }

    pub fn texture(&self) -> &TextureStreamer {
        &self.texture
    }
}
