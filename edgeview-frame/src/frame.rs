use std::fmt;

use dpi::PhysicalSize;

use crate::error::FrameError;

pub type FrameSize = PhysicalSize<u32>;

pub const RGBA_BYTES_PER_PIXEL: usize = 4;

fn pixel_count(size: FrameSize) -> usize {
    size.width as usize * size.height as usize
}

/// Byte length of a 4:2:0 semi-planar frame: a full luma plane plus a half-height plane of chroma pairs.
pub fn nv21_len(size: FrameSize) -> usize {
    pixel_count(size) * 3 / 2
}

pub fn rgba_len(size: FrameSize) -> usize {
    pixel_count(size) * RGBA_BYTES_PER_PIXEL
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PlaneKind {
    Luma,
    U,
    V,
}

impl fmt::Display for PlaneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaneKind::Luma => write!(f, "luma"),
            PlaneKind::U => write!(f, "U"),
            PlaneKind::V => write!(f, "V"),
        }
    }
}

/// One plane of a planar image, borrowed from whoever captured it.
///
/// A sample at `(row, col)` lives at `row * row_stride + col * pixel_stride`.
/// Rows may carry padding past the last sample, and chroma samples may be spaced out
/// (camera stacks commonly hand out U and V as two views into one interleaved buffer with a pixel stride of 2).
#[derive(Debug, Copy, Clone)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    pub row_stride: usize,
    pub pixel_stride: usize,
}

impl<'a> Plane<'a> {
    pub fn new(data: &'a [u8], row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    /// A tightly packed plane `width` samples wide.
    pub fn packed(data: &'a [u8], width: usize) -> Self {
        Self::new(data, width, 1)
    }

    /// The minimal number of bytes needed to address `rows` rows of `cols` samples.
    ///
    /// The last row doesn't have to be padded to the full stride.
    fn required_len(&self, cols: usize, rows: usize) -> usize {
        if cols == 0 || rows == 0 {
            return 0;
        }
        (rows - 1) * self.row_stride + (cols - 1) * self.pixel_stride + 1
    }

    fn validate(&self, kind: PlaneKind, cols: usize, rows: usize) -> Result<(), FrameError> {
        let bad_stride = self.pixel_stride == 0
            || (kind == PlaneKind::Luma && self.pixel_stride != 1)
            || self.row_stride < (cols - 1) * self.pixel_stride + 1;
        if bad_stride {
            return Err(FrameError::BadStride {
                plane: kind,
                row_stride: self.row_stride,
                pixel_stride: self.pixel_stride,
            });
        }

        let required = self.required_len(cols, rows);
        if self.data.len() < required {
            return Err(FrameError::ShortPlane {
                plane: kind,
                required,
                actual: self.data.len(),
            });
        }

        Ok(())
    }
}

/// A planar YUV 4:2:0 frame as delivered by the capture source.
///
/// The planes are only valid while the source's callback runs, so anything that needs the
/// pixels later must copy them out (see [`crate::convert::ColorSpaceConverter`]).
#[derive(Debug, Copy, Clone)]
pub struct RawFrame<'a> {
    pub size: FrameSize,
    pub y: Plane<'a>,
    pub u: Plane<'a>,
    pub v: Plane<'a>,
}

impl RawFrame<'_> {
    pub fn validate(&self) -> Result<(), FrameError> {
        let FrameSize { width, height } = self.size;
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(FrameError::BadDimensions(self.size));
        }

        let (width, height) = (width as usize, height as usize);
        self.y.validate(PlaneKind::Luma, width, height)?;
        self.u.validate(PlaneKind::U, width / 2, height / 2)?;
        self.v.validate(PlaneKind::V, width / 2, height / 2)?;

        Ok(())
    }
}

/// Semi-planar 4:2:0 frame in NV21 order: the luma plane followed by interleaved `(V, U)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterleavedFrame {
    size: FrameSize,
    data: Vec<u8>,
}

impl InterleavedFrame {
    pub fn new(size: FrameSize) -> Self {
        Self {
            size,
            data: vec![0; nv21_len(size)],
        }
    }

    pub fn from_vec(size: FrameSize, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = nv21_len(size);
        if data.len() != expected {
            return Err(FrameError::BufferLength {
                size,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { size, data })
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn luma(&self) -> &[u8] {
        &self.data[..pixel_count(self.size)]
    }

    /// Interleaved `(V, U)` pairs, `width / 2` of them per chroma row.
    pub fn chroma(&self) -> &[u8] {
        &self.data[pixel_count(self.size)..]
    }

    /// Returns `true` when the backing storage had to be reallocated.
    pub(crate) fn resize(&mut self, size: FrameSize) -> bool {
        if self.size == size && self.data.len() == nv21_len(size) {
            return false;
        }
        *self = Self::new(size);
        true
    }
}

/// An RGBA image with 8 bits per channel, rows tightly packed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PixelBuffer {
    size: FrameSize,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(size: FrameSize) -> Self {
        Self {
            size,
            data: vec![0; rgba_len(size)],
        }
    }

    pub fn filled(size: FrameSize, rgba: [u8; 4]) -> Self {
        Self {
            size,
            data: rgba.repeat(pixel_count(size)),
        }
    }

    pub fn from_vec(size: FrameSize, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = rgba_len(size);
        if data.len() != expected {
            return Err(FrameError::BufferLength {
                size,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { size, data })
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = (y as usize * self.size.width as usize + x as usize) * RGBA_BYTES_PER_PIXEL;
        let mut pixel = [0; 4];
        pixel.copy_from_slice(&self.data[offset..offset + RGBA_BYTES_PER_PIXEL]);
        pixel
    }

    /// Makes the buffer hold a `size` image, keeping the storage when the dimensions match.
    ///
    /// Returns `true` when the backing storage had to be reallocated. The contents are unspecified afterwards.
    pub fn resize(&mut self, size: FrameSize) -> bool {
        if self.size == size && self.data.len() == rgba_len(size) {
            return false;
        }
        *self = Self::new(size);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(width: u32, height: u32) -> FrameSize {
        FrameSize::new(width, height)
    }

    #[test]
    fn test_packed_frame_is_valid() {
        let y = [0u8; 16];
        let u = [0u8; 4];
        let v = [0u8; 4];
        let frame = RawFrame {
            size: size(4, 4),
            y: Plane::packed(&y, 4),
            u: Plane::packed(&u, 2),
            v: Plane::packed(&v, 2),
        };

        assert!(frame.validate().is_ok());
    }

    #[test]
    fn test_odd_dimensions_rejected() {
        let y = [0u8; 15];
        let c = [0u8; 2];
        let frame = RawFrame {
            size: size(5, 3),
            y: Plane::packed(&y, 5),
            u: Plane::packed(&c, 2),
            v: Plane::packed(&c, 2),
        };

        assert!(matches!(
            frame.validate(),
            Err(FrameError::BadDimensions(_))
        ));
    }

    #[test]
    fn test_short_chroma_plane_rejected() {
        let y = [0u8; 16];
        let u = [0u8; 4];
        let v = [0u8; 3];
        let frame = RawFrame {
            size: size(4, 4),
            y: Plane::packed(&y, 4),
            u: Plane::packed(&u, 2),
            v: Plane::packed(&v, 2),
        };

        match frame.validate() {
            Err(FrameError::ShortPlane {
                plane,
                required,
                actual,
            }) => {
                assert_eq!(plane, PlaneKind::V);
                assert_eq!(required, 4);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected validation result: {:?}", other),
        }
    }

    #[test]
    fn test_unpadded_last_row_is_accepted() {
        // row stride 8 for a 4-wide plane, but the final row stops right after its last sample
        let y = [0u8; 8 * 3 + 4];
        let c = [0u8; 4];
        let frame = RawFrame {
            size: size(4, 4),
            y: Plane::new(&y, 8, 1),
            u: Plane::packed(&c, 2),
            v: Plane::packed(&c, 2),
        };

        assert!(frame.validate().is_ok());
    }

    #[test]
    fn test_stride_shorter_than_row_rejected() {
        let y = [0u8; 16];
        let c = [0u8; 8];
        let frame = RawFrame {
            size: size(4, 4),
            y: Plane::packed(&y, 4),
            // two samples with pixel stride 2 need at least 3 bytes per row
            u: Plane::new(&c, 2, 2),
            v: Plane::packed(&c, 2),
        };

        assert!(matches!(
            frame.validate(),
            Err(FrameError::BadStride {
                plane: PlaneKind::U,
                ..
            })
        ));
    }

    #[test]
    fn test_pixel_buffer_resize_keeps_storage() {
        let mut buffer = PixelBuffer::new(size(8, 8));
        let ptr = buffer.data().as_ptr();

        assert!(!buffer.resize(size(8, 8)));
        assert_eq!(buffer.data().as_ptr(), ptr);

        assert!(buffer.resize(size(4, 2)));
        assert_eq!(buffer.data().len(), 4 * 2 * 4);
    }

    #[test]
    fn test_pixel_buffer_rejects_wrong_length() {
        assert!(PixelBuffer::from_vec(size(2, 2), vec![0; 15]).is_err());
        assert!(PixelBuffer::from_vec(size(2, 2), vec![0; 16]).is_ok());
    }

    #[test]
    fn test_pixel_lookup() {
        let mut buffer = PixelBuffer::new(size(2, 2));
        buffer.data_mut()[12..16].copy_from_slice(&[1, 2, 3, 4]);

        assert_eq!(buffer.pixel(1, 1), [1, 2, 3, 4]);
        assert_eq!(buffer.pixel(0, 0), [0, 0, 0, 0]);
    }
}
