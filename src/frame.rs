use arrayvec::ArrayVec;

use crate::error::Error;
use crate::layout::{self, PLANE_COUNT};
use crate::types::{PixelFormat, Size};

/// A single plane of image data.
#[derive(Debug)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    pub bytes_per_row: usize,
}

/// A borrowed packed planar YUV 4:2:0 frame, exactly
/// `width * height * 3 / 2` bytes. Lifetime tied to the frame source's
/// internal buffer (zero-copy); consumed once by the exchange cycle.
#[derive(Debug)]
pub struct FrameBuffer<'a> {
    data: &'a [u8],
    size: Size,
    pixel_format: PixelFormat,
}

impl<'a> FrameBuffer<'a> {
    /// Wrap `data` as one packed frame. `size` is rounded up to even
    /// dimensions; `data` must be exactly the packed frame size.
    pub fn new(data: &'a [u8], size: Size, pixel_format: PixelFormat) -> Result<Self, Error> {
        let size = size.aligned_even();
        let expected = layout::packed_frame_size(size);
        if data.len() != expected {
            return Err(Error::LayoutMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(FrameBuffer {
            data,
            size,
            pixel_format,
        })
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Source plane views in this frame's native plane order.
    pub fn planes(&self) -> ArrayVec<Plane<'a>, PLANE_COUNT> {
        layout::packed_plane_layouts(self.size)
            .iter()
            .map(|p| Plane {
                data: &self.data[p.offset..p.offset + p.size()],
                bytes_per_row: p.stride,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length() {
        let data = [0u8; 100];
        let err = FrameBuffer::new(
            &data,
            Size {
                width: 240,
                height: 320,
            },
            PixelFormat::Yv12,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::LayoutMismatch {
                expected: 115200,
                actual: 100
            }
        ));
    }

    #[test]
    fn plane_views_partition_the_frame() {
        let size = Size {
            width: 16,
            height: 8,
        };
        let mut data = vec![0u8; 16 * 8 * 3 / 2];
        // Tag each plane region so the views can be told apart.
        data[..128].fill(1);
        data[128..160].fill(2);
        data[160..].fill(3);
        let frame = FrameBuffer::new(&data, size, PixelFormat::Yuv420Planar).unwrap();
        let planes = frame.planes();
        assert_eq!(planes.len(), 3);
        assert_eq!(planes[0].data.len(), 128);
        assert_eq!(planes[0].bytes_per_row, 16);
        assert!(planes[0].data.iter().all(|&b| b == 1));
        assert_eq!(planes[1].data.len(), 32);
        assert_eq!(planes[1].bytes_per_row, 8);
        assert!(planes[1].data.iter().all(|&b| b == 2));
        assert!(planes[2].data.iter().all(|&b| b == 3));
    }
}
