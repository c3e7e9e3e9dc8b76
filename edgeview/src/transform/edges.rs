use edgeview_frame::{FrameSize, InterleavedFrame, PixelBuffer, TransformError, transform::FrameTransform};
use rayon::prelude::*;
use tracing::debug;

const KERNEL_RADIUS: usize = 2;
const KERNEL_SIZE: usize = KERNEL_RADIUS * 2 + 1;
const SIGMA: f32 = 1.5;

pub const LOW_THRESHOLD: f32 = 50.0;
pub const HIGH_THRESHOLD: f32 = 150.0;

const EDGE: [u8; 4] = [255, 255, 255, 255];
const BACKGROUND: [u8; 4] = [0, 0, 0, 255];

const TAN_22_5: f32 = 0.414_213_57;
const TAN_67_5: f32 = 2.414_213_6;

fn gaussian_kernel() -> [f32; KERNEL_SIZE] {
    let mut kernel = [0.0; KERNEL_SIZE];
    for (i, weight) in kernel.iter_mut().enumerate() {
        let x = i as f32 - KERNEL_RADIUS as f32;
        *weight = (-(x * x) / (2.0 * SIGMA * SIGMA)).exp();
    }
    let sum: f32 = kernel.iter().sum();
    kernel.map(|weight| weight / sum)
}

/// Replicates the border pixel for out-of-range taps.
fn clamp_index(index: isize, len: usize) -> usize {
    index.clamp(0, len as isize - 1) as usize
}

/// Gradient direction, quantized to the four axes non-maximum suppression looks along.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
enum Direction {
    #[default]
    Horizontal,
    Vertical,
    /// Top-left to bottom-right.
    Diagonal,
    /// Top-right to bottom-left.
    AntiDiagonal,
}

impl Direction {
    fn of(gx: f32, gy: f32) -> Self {
        let (ax, ay) = (gx.abs(), gy.abs());
        if ay <= ax * TAN_22_5 {
            Direction::Horizontal
        } else if ay >= ax * TAN_67_5 {
            Direction::Vertical
        } else if (gx > 0.0) == (gy > 0.0) {
            Direction::Diagonal
        } else {
            Direction::AntiDiagonal
        }
    }

    /// Offsets of the two neighbors along the gradient.
    fn neighbors(self) -> [(isize, isize); 2] {
        match self {
            Direction::Horizontal => [(-1, 0), (1, 0)],
            Direction::Vertical => [(0, -1), (0, 1)],
            Direction::Diagonal => [(-1, -1), (1, 1)],
            Direction::AntiDiagonal => [(1, -1), (-1, 1)],
        }
    }
}

#[derive(Debug, Copy, Clone, Default)]
struct Gradient {
    magnitude: f32,
    direction: Direction,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
enum Class {
    #[default]
    Suppressed,
    Weak,
    Strong,
}

/// Canny edge detector working on the luma plane.
///
/// The frame is smoothed with a 5x5 gaussian (sigma 1.5), then Sobel gradients go through
/// non-maximum suppression and hysteresis thresholding. Edges come out white on black.
///
/// Scratch buffers are kept between frames and only reallocated when the frame size changes.
pub struct EdgeTransform {
    low: f32,
    high: f32,
    kernel: [f32; KERNEL_SIZE],
    size: FrameSize,
    horizontal: Vec<f32>,
    blurred: Vec<f32>,
    gradients: Vec<Gradient>,
    classes: Vec<Class>,
    stack: Vec<usize>,
}

impl EdgeTransform {
    pub fn new() -> Self {
        Self::with_thresholds(LOW_THRESHOLD, HIGH_THRESHOLD)
    }

    pub fn with_thresholds(low: f32, high: f32) -> Self {
        Self {
            low,
            high,
            kernel: gaussian_kernel(),
            size: FrameSize::default(),
            horizontal: Vec::new(),
            blurred: Vec::new(),
            gradients: Vec::new(),
            classes: Vec::new(),
            stack: Vec::new(),
        }
    }

    fn prepare(&mut self, size: FrameSize) {
        if self.size == size {
            return;
        }
        debug!(
            "Allocating edge detector scratch for {}x{}",
            size.width, size.height
        );

        let pixels = size.width as usize * size.height as usize;
        self.size = size;
        self.horizontal = vec![0.0; pixels];
        self.blurred = vec![0.0; pixels];
        self.gradients = vec![Gradient::default(); pixels];
        self.classes = vec![Class::default(); pixels];
    }

    fn blur(&mut self, luma: &[u8], width: usize, height: usize) {
        let kernel = self.kernel;

        self.horizontal
            .par_chunks_mut(width)
            .zip(luma.par_chunks(width))
            .for_each(|(out, row)| {
                for (x, value) in out.iter_mut().enumerate() {
                    *value = kernel
                        .iter()
                        .enumerate()
                        .map(|(k, weight)| {
                            let tap = x as isize + k as isize - KERNEL_RADIUS as isize;
                            weight * row[clamp_index(tap, width)] as f32
                        })
                        .sum();
                }
            });

        let horizontal = &self.horizontal;
        self.blurred
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, out)| {
                out.fill(0.0);
                for (k, weight) in kernel.iter().enumerate() {
                    let tap = clamp_index(y as isize + k as isize - KERNEL_RADIUS as isize, height);
                    let src = &horizontal[tap * width..][..width];
                    for (value, &sample) in out.iter_mut().zip(src) {
                        *value += weight * sample;
                    }
                }
            });
    }

    fn compute_gradients(&mut self, width: usize, height: usize) {
        let blurred = &self.blurred;

        self.gradients
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, out)| {
                let [top, middle, bottom] = [-1, 0, 1].map(|offset: isize| {
                    let index = clamp_index(y as isize + offset, height);
                    &blurred[index * width..][..width]
                });

                for (x, gradient) in out.iter_mut().enumerate() {
                    let l = x.saturating_sub(1);
                    let r = (x + 1).min(width - 1);

                    let gx = (top[r] + 2.0 * middle[r] + bottom[r]) - (top[l] + 2.0 * middle[l] + bottom[l]);
                    let gy = (bottom[l] + 2.0 * bottom[x] + bottom[r]) - (top[l] + 2.0 * top[x] + top[r]);

                    *gradient = Gradient {
                        magnitude: gx.abs() + gy.abs(),
                        direction: Direction::of(gx, gy),
                    };
                }
            });
    }

    fn suppress(&mut self, width: usize, height: usize) {
        let gradients = &self.gradients;
        let (low, high) = (self.low, self.high);

        self.classes
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, out)| {
                for (x, class) in out.iter_mut().enumerate() {
                    *class = Class::Suppressed;
                    // the outermost ring never holds edges
                    if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
                        continue;
                    }

                    let Gradient {
                        magnitude,
                        direction,
                    } = gradients[y * width + x];
                    if magnitude <= low {
                        continue;
                    }

                    let [before, after] = direction.neighbors().map(|(dx, dy)| {
                        let nx = (x as isize + dx) as usize;
                        let ny = (y as isize + dy) as usize;
                        gradients[ny * width + nx].magnitude
                    });

                    if magnitude > before && magnitude >= after {
                        *class = if magnitude > high {
                            Class::Strong
                        } else {
                            Class::Weak
                        };
                    }
                }
            });
    }

    /// Promotes weak pixels 8-connected to a strong one.
    fn link(&mut self, width: usize, height: usize) {
        self.stack.clear();
        self.stack.extend(
            self.classes
                .iter()
                .enumerate()
                .filter(|(_, class)| **class == Class::Strong)
                .map(|(index, _)| index),
        );

        while let Some(index) = self.stack.pop() {
            let (x, y) = (index % width, index / width);
            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    let neighbor = ny * width + nx;
                    if self.classes[neighbor] == Class::Weak {
                        self.classes[neighbor] = Class::Strong;
                        self.stack.push(neighbor);
                    }
                }
            }
        }
    }
}

impl Default for EdgeTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTransform for EdgeTransform {
    fn transform(&mut self, frame: &InterleavedFrame) -> Result<PixelBuffer, TransformError> {
        let size = frame.size();
        if size.width == 0 || size.height == 0 {
            return Err(TransformError::InvalidInput(format!(
                "Cannot detect edges in a {}x{} frame",
                size.width, size.height
            )));
        }
        let width = size.width as usize;
        let height = size.height as usize;

        self.prepare(size);
        self.blur(frame.luma(), width, height);
        self.compute_gradients(width, height);
        self.suppress(width, height);
        self.link(width, height);

        let mut output = PixelBuffer::new(size);
        output
            .data_mut()
            .par_chunks_mut(4)
            .zip(self.classes.par_iter())
            .for_each(|(pixel, class)| {
                pixel.copy_from_slice(if *class == Class::Strong {
                    &EDGE
                } else {
                    &BACKGROUND
                })
            });

        Ok(output)
    }
}
