//! Buffer layout computation for planar YUV 4:2:0 surfaces.
//!
//! The display subsystem hands out buffers whose row stride may exceed the
//! logical frame width, and requires the chroma planes to start on an aligned
//! stride of their own. Everything the copy step needs to know about the
//! mapped buffer is derived here, once, from the logical dimensions and the
//! platform-reported stride.

use arrayvec::ArrayVec;

use crate::error::Error;
use crate::types::{PixelFormat, Size, SurfaceFormat};

/// Alignment unit for chroma-plane strides.
pub const CHROMA_ALIGN: usize = 16;

/// Number of planes in a planar 4:2:0 frame.
pub const PLANE_COUNT: usize = 3;

/// Round `x` up to a multiple of `to`. `to` must be a power of two.
pub fn align(x: usize, to: usize) -> usize {
    debug_assert!(to.is_power_of_two());
    (x + to - 1) & !(to - 1)
}

/// Map a source pixel format to the display subsystem's native buffer format.
///
/// This is an explicit table: formats without a display-compatible mapping
/// are rejected rather than passed through.
pub fn translate_format(format: PixelFormat) -> Result<SurfaceFormat, Error> {
    match format {
        // Planar 4:2:0 maps onto YV12; for Yuv420Planar the chroma planes
        // are swapped during the copy (YV12 stores Cr first).
        PixelFormat::Yuv420Planar | PixelFormat::Yv12 => Ok(SurfaceFormat::Yv12),
        // The row-wise planar copy cannot feed interleaved chroma.
        PixelFormat::Nv12 => Err(Error::UnsupportedFormat),
        #[allow(unreachable_patterns)]
        _ => Err(Error::UnsupportedFormat),
    }
}

/// Position and shape of one plane within a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Byte offset of the plane from the start of the buffer.
    pub offset: usize,
    /// Byte distance between the start of consecutive rows.
    pub stride: usize,
    /// Number of rows in the plane.
    pub rows: usize,
    /// Meaningful bytes per row (excluding stride padding).
    pub row_bytes: usize,
}

impl PlaneLayout {
    /// Total bytes the plane occupies, including stride padding.
    pub fn size(&self) -> usize {
        self.stride * self.rows
    }
}

/// Derived geometry of the mapped destination buffer for one session.
///
/// Invariants: `stride >= size.width`, `chroma_stride` is a multiple of
/// [`CHROMA_ALIGN`], `luma_size = stride * size.height` and
/// `chroma_size = chroma_stride * size.height / 2` per chroma plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceGeometry {
    /// Frame dimensions, rounded up to even.
    pub size: Size,
    pub pixel_format: PixelFormat,
    pub surface_format: SurfaceFormat,
    /// Platform-reported row stride of the luma plane, in bytes.
    pub stride: usize,
    pub chroma_stride: usize,
    pub luma_size: usize,
    pub chroma_size: usize,
}

impl SurfaceGeometry {
    /// Compute the geometry for a buffer of `stride` bytes per luma row.
    ///
    /// `size` is rounded up to even dimensions first. Fails with
    /// [`Error::UnsupportedFormat`] if `format` has no display mapping, and
    /// with [`Error::LayoutMismatch`] if the reported stride is narrower
    /// than the frame.
    pub fn new(size: Size, format: PixelFormat, stride: u32) -> Result<Self, Error> {
        let surface_format = translate_format(format)?;
        let size = size.aligned_even();
        let stride = stride as usize;
        if stride < size.width as usize {
            return Err(Error::LayoutMismatch {
                expected: size.width as usize,
                actual: stride,
            });
        }
        let height = size.height as usize;
        let chroma_stride = align(stride / 2, CHROMA_ALIGN);
        Ok(SurfaceGeometry {
            size,
            pixel_format: format,
            surface_format,
            stride,
            chroma_stride,
            luma_size: stride * height,
            chroma_size: chroma_stride * height / 2,
        })
    }

    /// Bytes of one packed source frame (`width * height * 3 / 2`).
    pub fn packed_frame_size(&self) -> usize {
        packed_frame_size(self.size)
    }

    /// Bytes the copy step writes into the mapped buffer
    /// (`luma_size + 2 * chroma_size`); may exceed
    /// [`packed_frame_size`](Self::packed_frame_size) due to stride padding.
    pub fn mapped_size(&self) -> usize {
        self.luma_size + 2 * self.chroma_size
    }

    /// Destination plane layouts, in buffer memory order (Y, then the two
    /// chroma planes).
    pub fn dest_planes(&self) -> ArrayVec<PlaneLayout, PLANE_COUNT> {
        let w = self.size.width as usize;
        let h = self.size.height as usize;
        let mut planes = ArrayVec::new();
        planes.push(PlaneLayout {
            offset: 0,
            stride: self.stride,
            rows: h,
            row_bytes: w,
        });
        for i in 0..2 {
            planes.push(PlaneLayout {
                offset: self.luma_size + i * self.chroma_size,
                stride: self.chroma_stride,
                rows: h / 2,
                row_bytes: w / 2,
            });
        }
        planes
    }

    /// For each destination plane (in memory order), the index of the source
    /// plane that feeds it.
    ///
    /// YV12 stores Cr before Cb, so `Yuv420Planar` sources (Y, Cb, Cr) have
    /// their chroma planes swapped on the way in.
    pub fn source_plane_order(&self) -> [usize; PLANE_COUNT] {
        match self.pixel_format {
            PixelFormat::Yuv420Planar => [0, 2, 1],
            // Identity for formats already in destination order; geometry
            // construction already rejected anything non-planar.
            _ => [0, 1, 2],
        }
    }
}

/// Bytes of one packed planar 4:2:0 frame at even-aligned `size`.
pub fn packed_frame_size(size: Size) -> usize {
    let size = size.aligned_even();
    size.width as usize * size.height as usize * 3 / 2
}

/// Plane layouts of a packed source frame (no stride padding), in source
/// plane order.
pub fn packed_plane_layouts(size: Size) -> ArrayVec<PlaneLayout, PLANE_COUNT> {
    let size = size.aligned_even();
    let w = size.width as usize;
    let h = size.height as usize;
    let luma = w * h;
    let chroma = (w / 2) * (h / 2);
    let mut planes = ArrayVec::new();
    planes.push(PlaneLayout {
        offset: 0,
        stride: w,
        rows: h,
        row_bytes: w,
    });
    for i in 0..2 {
        planes.push(PlaneLayout {
            offset: luma + i * chroma,
            stride: w / 2,
            rows: h / 2,
            row_bytes: w / 2,
        });
    }
    planes
}
