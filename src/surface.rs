//! Trait seam over the display/surface service.
//!
//! The pipeline depends on a compositor capability but does not implement
//! one: surface creation, placement transactions and the producer side of
//! the buffer queue are all behind these traits. The [`headless`]
//! implementation backs the tests and the demo binary.
//!
//! [`headless`]: crate::headless

use bitflags::bitflags;

use crate::error::PlatformError;
use crate::types::{DisplayMode, Rect, Size, SurfaceFormat};

bitflags! {
    /// Buffer usage flags negotiated with the allocator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Usage: u32 {
        /// The producer never reads the buffer through software.
        const SW_READ_NEVER = 1 << 0;
        /// The producer writes the buffer through software every frame.
        const SW_WRITE_OFTEN = 1 << 1;
        /// The consumer may sample the buffer as a texture.
        const HW_TEXTURE = 1 << 2;
        /// The buffer may be scanned out to a display.
        const EXTERNAL_DISPLAY = 1 << 3;
    }
}

impl Usage {
    /// Flags for a software-written, display-bound video surface.
    pub fn video_producer() -> Usage {
        Usage::SW_READ_NEVER | Usage::SW_WRITE_OFTEN | Usage::HW_TEXTURE | Usage::EXTERNAL_DISPLAY
    }
}

/// How the consumer maps buffer contents onto the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScalingMode {
    /// Buffer dimensions must match the surface exactly.
    Freeze,
    /// Buffer contents are scaled to fill the surface.
    ScaleToWindow,
}

/// The producer API a queue is connected under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProducerApi {
    Media,
}

/// A handle to one layer of the compositor's scene.
///
/// Placement changes are staged locally and become visible only when
/// [`Compositor::commit`] applies them, so layering, position and size land
/// together, never partially.
pub trait SurfaceControl {
    fn stage_layer(&mut self, layer: i32);
    fn stage_position(&mut self, x: i32, y: i32);
    fn stage_size(&mut self, size: Size);
    fn stage_visible(&mut self, visible: bool);
}

/// One slot in a surface's buffer queue, exclusively owned while dequeued.
///
/// A buffer must not be locked twice without an intervening unlock; the
/// implementation reports such misuse as a platform error rather than
/// handing out aliased mappings.
pub trait HardwareBuffer {
    /// Row stride of the luma plane in bytes, as allocated. May exceed the
    /// requested width.
    fn stride(&self) -> u32;
    fn height(&self) -> u32;
    /// Lock the buffer for software writing within `bounds`, yielding the
    /// mapped backing memory.
    fn lock(&mut self, bounds: Rect) -> Result<&mut [u8], PlatformError>;
    fn unlock(&mut self) -> Result<(), PlatformError>;
}

/// Producer side of a surface's buffer queue.
///
/// `queue` and `cancel` consume the buffer, so every dequeued buffer has
/// exactly one terminal call by construction.
pub trait BufferQueue {
    type Buffer: HardwareBuffer;

    fn connect(&mut self, api: ProducerApi) -> Result<(), PlatformError>;
    fn disconnect(&mut self) -> Result<(), PlatformError>;
    fn set_scaling_mode(&mut self, mode: ScalingMode) -> Result<(), PlatformError>;
    fn set_crop(&mut self, crop: Rect) -> Result<(), PlatformError>;
    fn set_buffer_geometry(
        &mut self,
        size: Size,
        format: SurfaceFormat,
    ) -> Result<(), PlatformError>;
    fn set_usage(&mut self, usage: Usage) -> Result<(), PlatformError>;

    /// Dequeue the next free buffer, blocking the calling thread until the
    /// consumer has recycled one.
    fn dequeue(&mut self) -> Result<Self::Buffer, PlatformError>;
    /// Submit a filled buffer for presentation (no presentation-time
    /// override; displayed as soon as the consumer picks it up).
    fn queue(&mut self, buffer: Self::Buffer) -> Result<(), PlatformError>;
    /// Return a buffer to the queue without displaying it.
    fn cancel(&mut self, buffer: Self::Buffer) -> Result<(), PlatformError>;
}

/// Connection to the display/surface service.
pub trait Compositor {
    type Control: SurfaceControl;
    type Queue: BufferQueue;

    /// Parameters of the main display.
    fn display_mode(&self) -> Result<DisplayMode, PlatformError>;
    /// Create a new layer. Placement is staged via [`SurfaceControl`] and
    /// applied by [`commit`](Compositor::commit).
    fn create_control(
        &mut self,
        name: &str,
        size: Size,
        format: SurfaceFormat,
    ) -> Result<Self::Control, PlatformError>;
    /// Atomically apply the staged placement of every control in `controls`:
    /// either all changes become visible or none do.
    fn commit(&mut self, controls: &mut [&mut Self::Control]) -> Result<(), PlatformError>;
    /// The producer buffer queue feeding `control`'s surface.
    fn queue_for(&mut self, control: &Self::Control) -> Result<Self::Queue, PlatformError>;
}
