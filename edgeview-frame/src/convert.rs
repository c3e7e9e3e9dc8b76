use tracing::debug;

use crate::{
    error::FrameError,
    frame::{InterleavedFrame, PixelBuffer, RawFrame},
};

/// Turns planar camera frames into NV21, reusing the output buffer while the frame size stays the same.
pub struct ColorSpaceConverter {
    output: InterleavedFrame,
}

impl ColorSpaceConverter {
    pub fn new() -> Self {
        Self {
            output: InterleavedFrame::default(),
        }
    }

    /// Copies `raw` into the internal NV21 buffer and returns it.
    ///
    /// Malformed frames are rejected before anything is written, so the previous output stays intact.
    pub fn convert(&mut self, raw: &RawFrame) -> Result<&InterleavedFrame, FrameError> {
        raw.validate()?;

        if self.output.resize(raw.size) {
            debug!(
                width = raw.size.width,
                height = raw.size.height,
                "Allocated NV21 conversion buffer"
            );
        }

        planar_to_nv21(raw, self.output.data_mut());

        Ok(&self.output)
    }
}

/// `raw` must already be validated and `out` must be exactly `nv21_len(raw.size)` bytes.
fn planar_to_nv21(raw: &RawFrame, out: &mut [u8]) {
    let width = raw.size.width as usize;
    let height = raw.size.height as usize;
    let (luma_out, chroma_out) = out.split_at_mut(width * height);

    if raw.y.row_stride == width {
        luma_out.copy_from_slice(&raw.y.data[..width * height]);
    } else {
        for (row, dst) in luma_out.chunks_exact_mut(width).enumerate() {
            let start = row * raw.y.row_stride;
            dst.copy_from_slice(&raw.y.data[start..start + width]);
        }
    }

    let chroma_width = width / 2;
    for (row, dst) in chroma_out.chunks_exact_mut(chroma_width * 2).enumerate() {
        let u_row = &raw.u.data[row * raw.u.row_stride..];
        let v_row = &raw.v.data[row * raw.v.row_stride..];

        for (col, pair) in dst.chunks_exact_mut(2).enumerate() {
            pair[0] = v_row[col * raw.v.pixel_stride];
            pair[1] = u_row[col * raw.u.pixel_stride];
        }
    }
}

fn clamp_to_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Converts an NV21 frame to RGBA using BT.601 limited-range coefficients.
///
/// `out` is resized to the frame size, reallocating only when the size changes.
pub fn nv21_to_rgba(frame: &InterleavedFrame, out: &mut PixelBuffer) {
    let size = frame.size();
    out.resize(size);

    let width = size.width as usize;
    let luma = frame.luma();
    let chroma = frame.chroma();

    for (y, (luma_row, out_row)) in luma
        .chunks_exact(width)
        .zip(out.data_mut().chunks_exact_mut(width * 4))
        .enumerate()
    {
        let chroma_row = &chroma[(y / 2) * width..];

        for (x, (&luma, pixel)) in luma_row.iter().zip(out_row.chunks_exact_mut(4)).enumerate() {
            let pair = (x / 2) * 2;
            let v = chroma_row[pair] as i32 - 128;
            let u = chroma_row[pair + 1] as i32 - 128;
            let c = 298 * (luma as i32 - 16);

            pixel[0] = clamp_to_u8((c + 409 * v + 128) >> 8);
            pixel[1] = clamp_to_u8((c - 100 * u - 208 * v + 128) >> 8);
            pixel[2] = clamp_to_u8((c + 516 * u + 128) >> 8);
            pixel[3] = 255;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameSize, Plane, nv21_len};

    fn frame_4x4<'a>(y: &'a [u8], u: &'a [u8], v: &'a [u8]) -> RawFrame<'a> {
        RawFrame {
            size: FrameSize::new(4, 4),
            y: Plane::packed(y, 4),
            u: Plane::packed(u, 2),
            v: Plane::packed(v, 2),
        }
    }

    #[test]
    fn test_4x4_known_output() {
        let y: Vec<u8> = (0..16).collect();
        let u = [100, 101, 102, 103];
        let v = [200, 201, 202, 203];

        let mut converter = ColorSpaceConverter::new();
        let out = converter.convert(&frame_4x4(&y, &u, &v)).unwrap();

        assert_eq!(out.luma(), y.as_slice());
        assert_eq!(out.chroma(), &[200, 100, 201, 101, 202, 102, 203, 103]);
    }

    #[test]
    fn test_output_length() {
        let mut converter = ColorSpaceConverter::new();

        for (width, height) in [(2, 2), (4, 4), (640, 480), (6, 2), (2, 10)] {
            let (w, h) = (width as usize, height as usize);
            let y = vec![0u8; w * h];
            let c = vec![0u8; w * h / 4];
            let frame = RawFrame {
                size: FrameSize::new(width, height),
                y: Plane::packed(&y, w),
                u: Plane::packed(&c, w / 2),
                v: Plane::packed(&c, w / 2),
            };

            let out = converter.convert(&frame).unwrap();
            assert_eq!(out.data().len(), w * h * 3 / 2);
            assert_eq!(out.data().len(), nv21_len(frame.size));
        }
    }

    #[test]
    fn test_semi_planar_chroma_with_padding() {
        // what camera stacks usually hand out: U and V are offset views into one `UVUV..` buffer
        // rows are padded to 8 bytes, luma rows to 6
        let mut y = vec![0xEEu8; 6 * 4];
        for row in 0..4 {
            for col in 0..4 {
                y[row * 6 + col] = (row * 4 + col) as u8;
            }
        }
        let mut uv = vec![0xEEu8; 8 * 2];
        for row in 0..2 {
            for col in 0..2 {
                uv[row * 8 + col * 2] = 10 + (row * 2 + col) as u8;
                uv[row * 8 + col * 2 + 1] = 20 + (row * 2 + col) as u8;
            }
        }

        let frame = RawFrame {
            size: FrameSize::new(4, 4),
            y: Plane::new(&y, 6, 1),
            u: Plane::new(&uv, 8, 2),
            v: Plane::new(&uv[1..], 8, 2),
        };

        let mut converter = ColorSpaceConverter::new();
        let out = converter.convert(&frame).unwrap();

        let expected_luma: Vec<u8> = (0..16).collect();
        assert_eq!(out.luma(), expected_luma.as_slice());
        assert_eq!(out.chroma(), &[20, 10, 21, 11, 22, 12, 23, 13]);
    }

    #[test]
    fn test_malformed_frame_keeps_previous_output() {
        let y: Vec<u8> = (0..16).collect();
        let c = [128u8; 4];

        let mut converter = ColorSpaceConverter::new();
        let before = converter.convert(&frame_4x4(&y, &c, &c)).unwrap().clone();

        let short = [0u8; 2];
        assert!(converter.convert(&frame_4x4(&y, &short, &c)).is_err());
        assert_eq!(converter.output, before);
    }

    #[test]
    fn test_gray_converts_to_gray() {
        let size = FrameSize::new(2, 2);
        let mut data = vec![235u8; 4];
        data.extend_from_slice(&[128, 128]);
        let frame = InterleavedFrame::from_vec(size, data).unwrap();

        let mut out = PixelBuffer::default();
        nv21_to_rgba(&frame, &mut out);

        assert_eq!(out.size(), size);
        for y in 0..2 {
            for x in 0..2 {
                assert_eq!(out.pixel(x, y), [255, 255, 255, 255]);
            }
        }

        let black = InterleavedFrame::from_vec(size, vec![16, 16, 16, 16, 128, 128]).unwrap();
        nv21_to_rgba(&black, &mut out);
        assert_eq!(out.pixel(1, 1), [0, 0, 0, 255]);
    }

    #[test]
    fn test_chroma_is_shared_by_2x2_blocks() {
        // 4x2: two chroma pairs, pure red-ish on the left and blue-ish on the right
        let size = FrameSize::new(4, 2);
        let mut data = vec![81u8; 8];
        data.extend_from_slice(&[240, 90, 110, 240]);
        let frame = InterleavedFrame::from_vec(size, data).unwrap();

        let mut out = PixelBuffer::default();
        nv21_to_rgba(&frame, &mut out);

        let left = out.pixel(0, 0);
        assert_eq!(left, out.pixel(1, 1));
        assert!(left[0] > 200 && left[2] < 60, "expected red, got {:?}", left);

        let right = out.pixel(3, 0);
        assert_eq!(right, out.pixel(2, 1));
        assert!(right[2] > 200 && right[0] < 60, "expected blue, got {:?}", right);
    }
}
