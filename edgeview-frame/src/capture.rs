use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, info};

use crate::{
    frame::{FrameSize, RawFrame},
    pipeline::{FrameOutcome, FramePipeline},
    throughput::ThroughputCounter,
};

/// Where frames come from.
///
/// The returned frame borrows the source; it is consumed before the next call.
pub trait FrameSource: Send {
    /// Size of the frames this source produces.
    fn frame_size(&self) -> FrameSize;

    /// Blocks until the next frame is available. `Ok(None)` signals the end of the stream.
    fn next_frame(&mut self) -> Result<Option<RawFrame<'_>>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn frame_size(&self) -> FrameSize {
        (**self).frame_size()
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame<'_>>> {
        (**self).next_frame()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// A frame was published, the renderer should draw.
    FrameReady,
    /// The capture thread is about to exit, either on its own or because it was asked to.
    Finished,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct CaptureStats {
    pub captured: u64,
    pub published: u64,
    pub skipped: u64,
    pub malformed: u64,
}

/// Owns the capture thread. Stopping (or dropping) the worker joins it.
pub struct CaptureWorker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<CaptureStats>>>,
}

impl CaptureWorker {
    pub fn spawn<S, N>(source: S, pipeline: FramePipeline, notify: N) -> Result<Self>
    where
        S: FrameSource + 'static,
        N: FnMut(CaptureEvent) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));

        let handle = std::thread::Builder::new()
            .name("capture".to_string())
            .spawn({
                let stop = stop.clone();
                move || capture_loop(source, pipeline, notify, &stop)
            })
            .context("Spawning the capture thread")?;

        info!("Capture started");

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Asks the capture thread to stop and waits for it.
    ///
    /// A transform call that is already running is allowed to finish.
    pub fn stop(mut self) -> Result<CaptureStats> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<CaptureStats> {
        self.stop.store(true, Ordering::Release);

        let Some(handle) = self.handle.take() else {
            return Ok(CaptureStats::default());
        };

        let stats = handle
            .join()
            .map_err(|_| anyhow!("Capture thread panicked"))??;

        info!(
            captured = stats.captured,
            published = stats.published,
            skipped = stats.skipped,
            malformed = stats.malformed,
            "Capture stopped"
        );

        Ok(stats)
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            error!("Capture failed: {:#}", err);
        }
    }
}

fn capture_loop<S, N>(
    mut source: S,
    mut pipeline: FramePipeline,
    mut notify: N,
    stop: &AtomicBool,
) -> Result<CaptureStats>
where
    S: FrameSource,
    N: FnMut(CaptureEvent),
{
    let result = run_frames(&mut source, &mut pipeline, &mut notify, stop);
    notify(CaptureEvent::Finished);
    result
}

fn run_frames<S, N>(
    source: &mut S,
    pipeline: &mut FramePipeline,
    notify: &mut N,
    stop: &AtomicBool,
) -> Result<CaptureStats>
where
    S: FrameSource,
    N: FnMut(CaptureEvent),
{
    let mut stats = CaptureStats::default();
    let mut throughput = ThroughputCounter::new();

    while !stop.load(Ordering::Acquire) {
        let Some(frame) = source
            .next_frame()
            .context("Reading a frame from the capture source")?
        else {
            debug!("Capture source reached the end of the stream");
            break;
        };
        stats.captured += 1;

        match pipeline.process(&frame) {
            Ok(FrameOutcome::Published(_)) => {
                stats.published += 1;
                notify(CaptureEvent::FrameReady);
            }
            Ok(FrameOutcome::Skipped) => stats.skipped += 1,
            Err(err) if err.is_fatal() => {
                error!("Frame integrity check failed, stopping capture: {}", err);
                return Err(err).context("Processing a captured frame");
            }
            Err(err) => {
                error!("Dropping malformed frame: {}", err);
                stats.malformed += 1;
            }
        }

        if let Some(fps) = throughput.tick() {
            let mailbox = pipeline.publisher().stats();
            debug!(
                fps,
                skipped = stats.skipped,
                overwritten = mailbox.overwritten,
                "Capture throughput"
            );
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::{
        sync::mpsc,
        time::{Duration, Instant},
    };

    use super::*;
    use crate::{
        error::TransformError,
        frame::{FrameSize, InterleavedFrame, PixelBuffer, Plane},
        mailbox::frame_mailbox,
        view_mode::{ViewMode, ViewModeSelector},
    };

    fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    }

    /// Yields `remaining` gray 4x4 frames, or an unending stream when `None`.
    struct GraySource {
        remaining: Option<usize>,
        luma: Vec<u8>,
        chroma: Vec<u8>,
        size: FrameSize,
    }

    impl GraySource {
        fn new(remaining: Option<usize>, size: FrameSize) -> Self {
            let pixels = size.width as usize * size.height as usize;
            Self {
                remaining,
                luma: vec![128; pixels],
                chroma: vec![128; pixels / 4],
                size,
            }
        }
    }

    impl FrameSource for GraySource {
        fn frame_size(&self) -> FrameSize {
            self.size
        }

        fn next_frame(&mut self) -> Result<Option<RawFrame<'_>>> {
            match &mut self.remaining {
                Some(0) => return Ok(None),
                Some(n) => *n -= 1,
                None => std::thread::sleep(Duration::from_millis(1)),
            }

            let width = self.size.width as usize;
            Ok(Some(RawFrame {
                size: self.size,
                y: Plane::packed(&self.luma, width),
                u: Plane::packed(&self.chroma, width / 2),
                v: Plane::packed(&self.chroma, width / 2),
            }))
        }
    }

    fn identity(frame: &InterleavedFrame) -> Result<PixelBuffer, TransformError> {
        Ok(PixelBuffer::new(frame.size()))
    }

    #[test]
    fn test_finite_source_runs_to_completion() {
        init_test_tracing();

        let (publisher, mut receiver) = frame_mailbox();
        let pipeline =
            FramePipeline::new(identity, ViewModeSelector::new(ViewMode::Processed), publisher);
        let (events_tx, events_rx) = mpsc::channel();

        let worker = CaptureWorker::spawn(
            GraySource::new(Some(5), FrameSize::new(4, 4)),
            pipeline,
            move |event| {
                let _ = events_tx.send(event);
            },
        )
        .unwrap();

        let mut ready = 0;
        loop {
            match events_rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                CaptureEvent::FrameReady => ready += 1,
                CaptureEvent::Finished => break,
            }
        }

        let stats = worker.stop().unwrap();
        assert_eq!(ready, 5);
        assert_eq!(stats.captured, 5);
        assert_eq!(stats.published, 5);
        assert!(receiver.take_if_available().is_some());
    }

    #[test]
    fn test_stop_joins_endless_source() {
        init_test_tracing();

        let (publisher, _receiver) = frame_mailbox();
        let pipeline =
            FramePipeline::new(identity, ViewModeSelector::new(ViewMode::Raw), publisher);

        let worker = CaptureWorker::spawn(
            GraySource::new(None, FrameSize::new(4, 4)),
            pipeline,
            |_| {},
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        let stats = worker.stop().unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(stats.captured > 0);
        assert_eq!(stats.captured, stats.published);
    }

    #[test]
    fn test_size_mismatch_stops_capture() {
        init_test_tracing();

        let (publisher, _receiver) = frame_mailbox();
        let shrink = |_: &InterleavedFrame| -> Result<PixelBuffer, TransformError> {
            Ok(PixelBuffer::new(FrameSize::new(2, 2)))
        };
        let pipeline =
            FramePipeline::new(shrink, ViewModeSelector::new(ViewMode::Processed), publisher);
        let (events_tx, events_rx) = mpsc::channel();

        let worker = CaptureWorker::spawn(
            GraySource::new(None, FrameSize::new(4, 4)),
            pipeline,
            move |event| {
                let _ = events_tx.send(event);
            },
        )
        .unwrap();

        assert_eq!(
            events_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            CaptureEvent::Finished
        );
        assert!(worker.stop().is_err());
    }
}
