mod edges;

use std::num::NonZeroU32;

use edgeview_frame::{
    InterleavedFrame, PixelBuffer, TransformError, convert::nv21_to_rgba, transform::FrameTransform,
};
use tracing::info;

pub use self::edges::EdgeTransform;
use crate::cli::{Cli, TransformKind};

pub fn build(cli: &Cli) -> Box<dyn FrameTransform> {
    let transform: Box<dyn FrameTransform> = match cli.transform {
        TransformKind::Edges => Box::new(EdgeTransform::new()),
        TransformKind::Identity => Box::new(IdentityTransform::default()),
    };
    info!("Using the {:?} transform", cli.transform);

    match cli.fail_every {
        Some(every) => {
            info!("Every {} transform call will fail", every);
            Box::new(FlakyTransform::new(transform, every))
        }
        None => transform,
    }
}

/// Produces the same image as the raw view.
#[derive(Default)]
pub struct IdentityTransform;

impl FrameTransform for IdentityTransform {
    fn transform(&mut self, frame: &InterleavedFrame) -> Result<PixelBuffer, TransformError> {
        let mut output = PixelBuffer::default();
        nv21_to_rgba(frame, &mut output);
        Ok(output)
    }
}

/// Fails every `every`-th call instead of running the inner transform.
pub struct FlakyTransform {
    inner: Box<dyn FrameTransform>,
    every: NonZeroU32,
    calls: u32,
}

impl FlakyTransform {
    pub fn new(inner: Box<dyn FrameTransform>, every: NonZeroU32) -> Self {
        Self {
            inner,
            every,
            calls: 0,
        }
    }
}

impl FrameTransform for FlakyTransform {
    fn transform(&mut self, frame: &InterleavedFrame) -> Result<PixelBuffer, TransformError> {
        self.calls = self.calls.wrapping_add(1);
        if self.calls % self.every.get() == 0 {
            return Err(TransformError::Failed(format!(
                "injected failure on call {}",
                self.calls
            )));
        }
        self.inner.transform(frame)
    }
}

#[cfg(test)]
mod tests {
    use edgeview_frame::FrameSize;

    use super::*;

    fn gray(size: FrameSize, luma: u8) -> InterleavedFrame {
        let pixels = (size.width * size.height) as usize;
        let mut data = vec![luma; pixels];
        data.resize(pixels + pixels / 2, 128);
        InterleavedFrame::from_vec(size, data).unwrap()
    }

    #[test]
    fn test_identity_matches_raw_conversion() {
        let frame = gray(FrameSize::new(4, 2), 235);
        let output = IdentityTransform.transform(&frame).unwrap();

        assert_eq!(output, PixelBuffer::filled(frame.size(), [255, 255, 255, 255]));
    }

    #[test]
    fn test_flaky_fails_every_nth_call() {
        let mut flaky = FlakyTransform::new(
            Box::new(IdentityTransform),
            NonZeroU32::new(3).unwrap(),
        );
        let frame = gray(FrameSize::new(2, 2), 16);

        let failed: Vec<bool> = (0..7)
            .map(|_| flaky.transform(&frame).is_err())
            .collect();
        assert_eq!(failed, [false, false, true, false, false, true, false]);
    }

    #[test]
    fn test_build_wraps_when_failures_requested() {
        use clap::Parser;

        let cli = Cli::try_parse_from(["edgeview", "--transform", "identity", "--fail-every", "1"]).unwrap();
        let mut transform = build(&cli);

        assert!(matches!(
            transform.transform(&gray(FrameSize::new(2, 2), 16)),
            Err(TransformError::Failed(_))
        ));
    }
}
