use std::{path::Path, sync::mpsc, time::Instant};

use anyhow::{Context, Result, anyhow};
use edgeview_frame::{
    PixelBuffer,
    capture::{CaptureEvent, CaptureWorker},
};
use edgeview_render::{
    DrawOutcome, GpuContext, PreviewRenderer, offscreen::OffscreenTarget,
};
use tracing::{debug, info};

use crate::PreviewParams;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct HeadlessStats {
    pub draws: u64,
    pub new_frames: u64,
}

/// Renders frames into an offscreen texture the same way the window would, one draw per published frame.
pub fn run(params: PreviewParams, frames: u64, dump: Option<&Path>) -> Result<()> {
    let gpu = pollster::block_on(GpuContext::new_headless())?;
    let target = OffscreenTarget::new(&gpu.device, params.frame_size)?;

    let (stats, last) = render(&gpu, &target, params, frames)?;
    info!(
        draws = stats.draws,
        new_frames = stats.new_frames,
        "Headless rendering finished"
    );

    if let Some(path) = dump {
        let last = last.context("No frame was rendered, nothing to dump")?;
        save_png(&last, path)?;
        info!("Wrote the last frame to {}", path.display());
    }

    Ok(())
}

fn render(
    gpu: &GpuContext,
    target: &OffscreenTarget,
    params: PreviewParams,
    frames: u64,
) -> Result<(HeadlessStats, Option<PixelBuffer>)> {
    let mut preview =
        PreviewRenderer::on_surface_created(&gpu.device, OffscreenTarget::FORMAT, params.receiver)
            .context("Creating the preview renderer")?;
    preview.on_surface_changed(target.size());

    let (sender, events) = mpsc::channel();
    let worker = CaptureWorker::spawn(params.source, params.pipeline, move |event| {
        let _ = sender.send(event);
    })?;

    let mut stats = HeadlessStats::default();
    let start = Instant::now();

    while stats.new_frames < frames {
        match events.recv() {
            Ok(CaptureEvent::FrameReady) => {}
            Ok(CaptureEvent::Finished) | Err(_) => {
                debug!("Capture finished after {} frames", stats.new_frames);
                break;
            }
        }

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("headless preview"),
            });
        let report = preview.on_draw_frame(&gpu.device, &gpu.queue, &mut encoder, target.view());
        gpu.queue.submit(std::iter::once(encoder.finish()));

        stats.draws += 1;
        if report.outcome == DrawOutcome::NewFrame {
            stats.new_frames += 1;
        }
        if let Some(fps) = report.fps {
            info!(
                "{} fps, {} view",
                fps,
                params.view_mode.get()
            );
        }
    }

    // the capture thread has to be gone before the renderer and the device are dropped
    worker.stop()?;

    let elapsed = start.elapsed();
    debug!(
        "Rendered {} frames in {:.2?}",
        stats.new_frames, elapsed
    );

    let last = if stats.draws > 0 {
        Some(target.read_pixels(&gpu.device, &gpu.queue)?)
    } else {
        None
    };

    Ok((stats, last))
}

fn save_png(frame: &PixelBuffer, path: &Path) -> Result<()> {
    let size = frame.size();
    let image = image::RgbaImage::from_raw(size.width, size.height, frame.data().to_vec())
        .ok_or_else(|| anyhow!("Frame buffer does not match its {}x{} size", size.width, size.height))?;
    image
        .save(path)
        .with_context(|| format!("Saving {}", path.display()))
}

#[cfg(test)]
mod tests {
    use edgeview_frame::{
        FrameSize, InterleavedFrame, TransformError,
        mailbox::frame_mailbox,
        pipeline::FramePipeline,
        view_mode::{ViewMode, ViewModeSelector},
    };
    use tracing::info;

    use super::*;
    use crate::source::{FramePacer, TestPatternSource};

    fn init_test_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn params(size: FrameSize, mode: ViewMode) -> PreviewParams {
        let view_mode = ViewModeSelector::new(mode);
        let (publisher, receiver) = frame_mailbox();
        let white = |frame: &InterleavedFrame| -> Result<PixelBuffer, TransformError> {
            Ok(PixelBuffer::filled(frame.size(), [255, 255, 255, 255]))
        };

        PreviewParams {
            source: Box::new(TestPatternSource::new(size, 4, true, FramePacer::unpaced())),
            pipeline: FramePipeline::new(white, view_mode.clone(), publisher),
            receiver,
            view_mode,
            frame_size: size,
        }
    }

    fn test_gpu() -> Option<GpuContext> {
        match pollster::block_on(GpuContext::new_headless()) {
            Ok(gpu) => Some(gpu),
            Err(err) => {
                info!("Skipping GPU test, no adapter: {:#}", err);
                None
            }
        }
    }

    #[test]
    fn test_renders_requested_frames() {
        init_test_tracing();
        let Some(gpu) = test_gpu() else {
            return;
        };
        let size = FrameSize::new(32, 16);
        let target = OffscreenTarget::new(&gpu.device, size).unwrap();

        let (stats, last) = render(&gpu, &target, params(size, ViewMode::Processed), 5).unwrap();

        assert_eq!(stats.new_frames, 5);
        let last = last.unwrap();
        assert_eq!(last.size(), size);
        assert_eq!(last.pixel(16, 8), [255, 255, 255, 255]);
    }

    #[test]
    fn test_raw_view_shows_the_pattern() {
        init_test_tracing();
        let Some(gpu) = test_gpu() else {
            return;
        };
        let size = FrameSize::new(32, 16);
        let target = OffscreenTarget::new(&gpu.device, size).unwrap();

        let (_, last) = render(&gpu, &target, params(size, ViewMode::Raw), 3).unwrap();

        // the transform paints everything white, the bars are not
        let last = last.unwrap();
        assert!((0..32).any(|x| last.pixel(x, 8) != [255, 255, 255, 255]));
    }

    #[test]
    fn test_save_png() {
        let path = std::env::temp_dir().join(format!("edgeview-dump-{}.png", std::process::id()));
        let frame = PixelBuffer::filled(FrameSize::new(4, 2), [10, 20, 30, 255]);

        save_png(&frame, &path).unwrap();
        let loaded = image::open(&path).unwrap().to_rgba8();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.dimensions(), (4, 2));
        assert_eq!(loaded.get_pixel(3, 1).0, [10, 20, 30, 255]);
    }
}
