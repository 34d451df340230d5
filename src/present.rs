//! The buffer exchange cycle: acquire, map, copy, unmap, submit.
//!
//! One frame is in flight at a time. A dequeued buffer always reaches
//! exactly one terminal call (submit or cancel) before the next frame is
//! acquired, on success and on every error path alike.

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, trace, warn};

use crate::error::Error;
use crate::frame::FrameBuffer;
use crate::layout::SurfaceGeometry;
use crate::session::SurfaceSession;
use crate::source::FrameSource;
use crate::surface::{BufferQueue, Compositor, HardwareBuffer};
use crate::types::{PixelFormat, Rect, Size};

/// Cooperative stop flag, checked before each frame's acquire step.
///
/// Raising the token never interrupts a frame already in flight; the frame
/// is completed (submitted or cancelled) and the loop stops at the next
/// frame boundary. Handles are cheap to clone and safe to share across
/// threads, including a signal handler that only calls [`raise`](Self::raise).
#[derive(Clone, Debug, Default)]
pub struct StopToken {
    raised: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}

/// Terminal-call accounting for a presentation run.
///
/// `acquired == submitted + cancelled` holds at every frame boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresentStats {
    /// Frames successfully displayed.
    pub presented: u64,
    /// Buffers dequeued from the producer queue.
    pub acquired: u64,
    /// Buffers handed back via submit (including failed submits; ownership
    /// transfers either way).
    pub submitted: u64,
    /// Buffers handed back via cancel.
    pub cancelled: u64,
}

/// Drives frames from a [`FrameSource`] into a configured
/// [`SurfaceSession`], one buffer at a time.
pub struct Presenter<'a, C: Compositor> {
    session: &'a mut SurfaceSession<C>,
    video_size: Size,
    pixel_format: PixelFormat,
    /// Geometry derived from the first dequeued buffer's stride; later
    /// buffers must report the same stride.
    geometry: Option<SurfaceGeometry>,
    stats: PresentStats,
}

impl<'a, C: Compositor> Presenter<'a, C> {
    pub fn new(session: &'a mut SurfaceSession<C>) -> Self {
        let video_size = session.video_size();
        let pixel_format = session.config().pixel_format;
        Presenter {
            session,
            video_size,
            pixel_format,
            geometry: None,
            stats: PresentStats::default(),
        }
    }

    /// Drain `source` through the exchange cycle until it is exhausted,
    /// `stop` is raised, or a step fails.
    ///
    /// The first error aborts the remaining frames (there is no per-frame
    /// retry); the in-flight buffer has been returned to the queue by the
    /// time this returns.
    pub fn run<R: Read>(
        &mut self,
        source: &mut FrameSource<R>,
        stop: &StopToken,
    ) -> Result<PresentStats, Error> {
        loop {
            if stop.is_raised() {
                info!(
                    "stop requested after {} frame(s); ending stream",
                    self.stats.presented
                );
                break;
            }
            let Some(frame) = source.next_frame()? else {
                debug!("end of stream after {} frame(s)", self.stats.presented);
                break;
            };
            self.present_frame(&frame)?;
        }
        Ok(self.stats)
    }

    /// Push one frame through acquire, map, copy, unmap, submit.
    pub fn present_frame(&mut self, frame: &FrameBuffer<'_>) -> Result<(), Error> {
        let queue = self.session.queue_mut()?;

        let mut buffer = queue.dequeue().map_err(Error::Dequeue)?;
        self.stats.acquired += 1;

        match fill_buffer(
            &mut self.geometry,
            self.video_size,
            self.pixel_format,
            &mut buffer,
            frame,
        ) {
            Ok(()) => {
                self.stats.submitted += 1;
                queue.queue(buffer).map_err(Error::Submit)?;
                self.stats.presented += 1;
                trace!("presented frame {}", self.stats.presented);
                Ok(())
            }
            Err(err) => {
                // The acquire must still be matched by a terminal call; a
                // failed cancel is logged and the original error surfaced.
                self.stats.cancelled += 1;
                if let Err(e) = queue.cancel(buffer) {
                    warn!("cancel after failed present: {e}");
                }
                Err(err)
            }
        }
    }

    pub fn stats(&self) -> PresentStats {
        self.stats
    }
}

/// Map the buffer, copy the frame's planes into it, and unmap.
///
/// The buffer is left unlocked on every path; the caller decides between
/// submit and cancel based on the result.
fn fill_buffer<B: HardwareBuffer>(
    cached: &mut Option<SurfaceGeometry>,
    video_size: Size,
    pixel_format: PixelFormat,
    buffer: &mut B,
    frame: &FrameBuffer<'_>,
) -> Result<(), Error> {
    let geometry = geometry_for(cached, video_size, pixel_format, buffer)?;
    let bounds = Rect::from_size(geometry.size);

    let dst = buffer.lock(bounds).map_err(Error::Map)?;
    let copied = copy_planes(dst, &geometry, frame);
    let unlocked = buffer.unlock().map_err(Error::Unmap);
    if copied.is_err() {
        // The copy failure is what the caller acts on; an unlock failure on
        // this path is only logged.
        if let Err(e) = &unlocked {
            warn!("unlock after failed copy: {e}");
        }
        return copied;
    }
    unlocked
}

/// Geometry for this session's buffers, derived from the first buffer's
/// platform-reported stride and reused afterwards.
fn geometry_for<B: HardwareBuffer>(
    cached: &mut Option<SurfaceGeometry>,
    video_size: Size,
    pixel_format: PixelFormat,
    buffer: &B,
) -> Result<SurfaceGeometry, Error> {
    let stride = buffer.stride();
    match cached {
        Some(geometry) => {
            if geometry.stride != stride as usize {
                // A stride change mid-session means the queue was
                // reallocated under us; the cached plane offsets no longer
                // describe the mapped memory.
                return Err(Error::LayoutMismatch {
                    expected: geometry.stride,
                    actual: stride as usize,
                });
            }
            Ok(*geometry)
        }
        None => {
            let geometry = SurfaceGeometry::new(video_size, pixel_format, stride)?;
            debug!(
                "buffer geometry: {}x{} stride={} chroma_stride={} mapped={}",
                geometry.size.width,
                geometry.size.height,
                geometry.stride,
                geometry.chroma_stride,
                geometry.mapped_size()
            );
            *cached = Some(geometry);
            Ok(geometry)
        }
    }
}

/// Copy a packed source frame into the mapped destination, row by row per
/// plane.
///
/// Row lengths come from the destination layout but never exceed the source
/// rows, so the copy reads only the packed frame and writes only within
/// `geometry.mapped_size()`; stride padding is left untouched.
fn copy_planes(dst: &mut [u8], geometry: &SurfaceGeometry, frame: &FrameBuffer<'_>) -> Result<(), Error> {
    if frame.size() != geometry.size {
        return Err(Error::LayoutMismatch {
            expected: geometry.packed_frame_size(),
            actual: frame.data().len(),
        });
    }
    if dst.len() < geometry.mapped_size() {
        return Err(Error::LayoutMismatch {
            expected: geometry.mapped_size(),
            actual: dst.len(),
        });
    }

    let src_planes = frame.planes();
    let order = geometry.source_plane_order();
    for (dst_plane, &src_index) in geometry.dest_planes().iter().zip(order.iter()) {
        let src = &src_planes[src_index];
        for row in 0..dst_plane.rows {
            let src_row = &src.data[row * src.bytes_per_row..][..dst_plane.row_bytes];
            let dst_row =
                &mut dst[dst_plane.offset + row * dst_plane.stride..][..dst_plane.row_bytes];
            dst_row.copy_from_slice(src_row);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::packed_frame_size;

    const W: u32 = 16;
    const H: u32 = 8;

    fn size() -> Size {
        Size {
            width: W,
            height: H,
        }
    }

    /// Packed frame with plane regions tagged 1 (Y), 2 (second plane),
    /// 3 (third plane).
    fn tagged_frame_data() -> Vec<u8> {
        let luma = (W * H) as usize;
        let chroma = luma / 4;
        let mut data = vec![1u8; packed_frame_size(size())];
        data[luma..luma + chroma].fill(2);
        data[luma + chroma..].fill(3);
        data
    }

    #[test]
    fn copy_respects_destination_stride() {
        let geometry = SurfaceGeometry::new(size(), PixelFormat::Yv12, 32).unwrap();
        let data = tagged_frame_data();
        let frame = FrameBuffer::new(&data, size(), PixelFormat::Yv12).unwrap();
        let mut dst = vec![0u8; geometry.mapped_size()];
        copy_planes(&mut dst, &geometry, &frame).unwrap();

        // Each luma row: 16 payload bytes then 16 bytes of untouched padding.
        for row in 0..H as usize {
            let start = row * geometry.stride;
            assert!(dst[start..start + W as usize].iter().all(|&b| b == 1));
            assert!(dst[start + W as usize..start + geometry.stride]
                .iter()
                .all(|&b| b == 0));
        }
    }

    #[test]
    fn copy_swaps_chroma_for_planar_source() {
        // Source plane order is Y, Cb (tag 2), Cr (tag 3); YV12 destination
        // wants Cr first.
        let geometry = SurfaceGeometry::new(size(), PixelFormat::Yuv420Planar, W).unwrap();
        let data = tagged_frame_data();
        let frame = FrameBuffer::new(&data, size(), PixelFormat::Yuv420Planar).unwrap();
        let mut dst = vec![0u8; geometry.mapped_size()];
        copy_planes(&mut dst, &geometry, &frame).unwrap();

        let planes = geometry.dest_planes();
        let first_chroma_row = &dst[planes[1].offset..planes[1].offset + planes[1].row_bytes];
        assert!(first_chroma_row.iter().all(|&b| b == 3));
        let second_chroma_row = &dst[planes[2].offset..planes[2].offset + planes[2].row_bytes];
        assert!(second_chroma_row.iter().all(|&b| b == 2));
    }

    #[test]
    fn copy_never_writes_past_mapped_size() {
        let geometry = SurfaceGeometry::new(size(), PixelFormat::Yv12, 32).unwrap();
        let data = tagged_frame_data();
        let frame = FrameBuffer::new(&data, size(), PixelFormat::Yv12).unwrap();
        // Destination larger than needed, with a sentinel tail.
        let mut dst = vec![0xEE; geometry.mapped_size() + 64];
        copy_planes(&mut dst, &geometry, &frame).unwrap();
        assert!(dst[geometry.mapped_size()..].iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn copy_rejects_undersized_destination() {
        let geometry = SurfaceGeometry::new(size(), PixelFormat::Yv12, 32).unwrap();
        let data = tagged_frame_data();
        let frame = FrameBuffer::new(&data, size(), PixelFormat::Yv12).unwrap();
        let mut dst = vec![0u8; geometry.mapped_size() - 1];
        let err = copy_planes(&mut dst, &geometry, &frame).unwrap_err();
        assert!(matches!(err, Error::LayoutMismatch { .. }));
    }

    #[test]
    fn copy_rejects_mismatched_frame_dimensions() {
        let geometry = SurfaceGeometry::new(size(), PixelFormat::Yv12, 32).unwrap();
        let other = Size {
            width: 8,
            height: 8,
        };
        let data = vec![0u8; packed_frame_size(other)];
        let frame = FrameBuffer::new(&data, other, PixelFormat::Yv12).unwrap();
        let mut dst = vec![0u8; geometry.mapped_size()];
        let err = copy_planes(&mut dst, &geometry, &frame).unwrap_err();
        assert!(matches!(err, Error::LayoutMismatch { .. }));
    }

    #[test]
    fn copy_failure_wins_over_unlock_failure() {
        use crate::error::PlatformError;

        // Lock succeeds but hands out too little memory; unlock fails too.
        // The copy failure is the one the caller must see.
        struct ShortBuffer {
            data: Vec<u8>,
        }
        impl HardwareBuffer for ShortBuffer {
            fn stride(&self) -> u32 {
                32
            }
            fn height(&self) -> u32 {
                H
            }
            fn lock(&mut self, _bounds: Rect) -> Result<&mut [u8], PlatformError> {
                Ok(&mut self.data)
            }
            fn unlock(&mut self) -> Result<(), PlatformError> {
                Err(PlatformError::Message("unlock failed"))
            }
        }

        let data = tagged_frame_data();
        let frame = FrameBuffer::new(&data, size(), PixelFormat::Yv12).unwrap();
        let mut buffer = ShortBuffer { data: vec![0; 100] };
        let mut cached = None;
        let err = fill_buffer(&mut cached, size(), PixelFormat::Yv12, &mut buffer, &frame)
            .unwrap_err();
        assert!(matches!(err, Error::LayoutMismatch { .. }));
    }

    #[test]
    fn stop_token_round_trip() {
        let token = StopToken::new();
        let clone = token.clone();
        assert!(!clone.is_raised());
        token.raise();
        assert!(clone.is_raised());
    }
}
