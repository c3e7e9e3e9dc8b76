use anyhow::Result;
use edgeview_frame::{FrameSize, Plane, RawFrame, capture::FrameSource};

use super::FramePacer;

// SMPTE-ish color bars, in studio-range RGB
const BARS: [[u8; 3]; 8] = [
    [235, 235, 235],
    [235, 235, 16],
    [16, 235, 235],
    [16, 235, 16],
    [235, 16, 235],
    [235, 16, 16],
    [16, 16, 235],
    [16, 16, 16],
];
const SCROLL_PER_FRAME: usize = 4;
// written into row padding so that reading it by mistake is visible
const PADDING_BYTE: u8 = 0xAA;

fn bar_yuv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    [y, u, v].map(|c| c.clamp(0, 255) as u8)
}

enum Chroma {
    /// Separate U and V planes with a pixel stride of 1.
    Planar { u: Vec<u8>, v: Vec<u8>, stride: usize },
    /// One `UVUV..` buffer, exposed as two planes with a pixel stride of 2.
    SemiPlanar { uv: Vec<u8>, stride: usize },
}

/// Scrolling color bars, laid out the way camera stacks deliver planar 4:2:0 frames.
pub struct TestPatternSource {
    size: FrameSize,
    luma: Vec<u8>,
    luma_stride: usize,
    chroma: Chroma,
    bars: [[u8; 3]; 8],
    frame_index: usize,
    pacer: FramePacer,
}

impl TestPatternSource {
    /// `size` must be even in both dimensions.
    pub fn new(size: FrameSize, padding: usize, semi_planar: bool, pacer: FramePacer) -> Self {
        let width = size.width as usize;
        let height = size.height as usize;

        let luma_stride = width + padding;
        let chroma = if semi_planar {
            let stride = width + padding;
            Chroma::SemiPlanar {
                uv: vec![PADDING_BYTE; stride * height / 2],
                stride,
            }
        } else {
            let stride = width / 2 + padding;
            Chroma::Planar {
                u: vec![PADDING_BYTE; stride * height / 2],
                v: vec![PADDING_BYTE; stride * height / 2],
                stride,
            }
        };

        Self {
            size,
            luma: vec![PADDING_BYTE; luma_stride * height],
            luma_stride,
            chroma,
            bars: BARS.map(bar_yuv),
            frame_index: 0,
            pacer,
        }
    }

    fn bar_at(&self, col: usize) -> [u8; 3] {
        let bar_width = (self.size.width as usize / BARS.len()).max(1);
        let shifted = col + self.frame_index * SCROLL_PER_FRAME;
        self.bars[(shifted / bar_width) % BARS.len()]
    }

    fn paint(&mut self) {
        let width = self.size.width as usize;
        let height = self.size.height as usize;

        let row: Vec<[u8; 3]> = (0..width).map(|col| self.bar_at(col)).collect();

        for y in 0..height {
            let start = y * self.luma_stride;
            for (dst, yuv) in self.luma[start..start + width].iter_mut().zip(&row) {
                *dst = yuv[0];
            }
        }

        // chroma is sampled at the left pixel of each pair
        for y in 0..height / 2 {
            match &mut self.chroma {
                Chroma::Planar { u, v, stride } => {
                    let start = y * *stride;
                    for col in 0..width / 2 {
                        let [_, cb, cr] = row[col * 2];
                        u[start + col] = cb;
                        v[start + col] = cr;
                    }
                }
                Chroma::SemiPlanar { uv, stride } => {
                    let start = y * *stride;
                    for col in 0..width / 2 {
                        let [_, cb, cr] = row[col * 2];
                        uv[start + col * 2] = cb;
                        uv[start + col * 2 + 1] = cr;
                    }
                }
            }
        }
    }
}

impl FrameSource for TestPatternSource {
    fn frame_size(&self) -> FrameSize {
        self.size
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame<'_>>> {
        self.pacer.wait();
        self.paint();
        self.frame_index += 1;

        let (u, v) = match &self.chroma {
            Chroma::Planar { u, v, stride } => (Plane::new(u, *stride, 1), Plane::new(v, *stride, 1)),
            Chroma::SemiPlanar { uv, stride } => {
                (Plane::new(uv, *stride, 2), Plane::new(&uv[1..], *stride, 2))
            }
        };

        Ok(Some(RawFrame {
            size: self.size,
            y: Plane::new(&self.luma, self.luma_stride, 1),
            u,
            v,
        }))
    }
}
