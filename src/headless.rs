//! In-memory compositor for tests and the demo binary.
//!
//! Implements the [`surface`](crate::surface) traits over plain `Vec<u8>`
//! buffers, tracking lock state, buffer ownership and connect state so
//! misuse of the buffer lifecycle surfaces as platform errors instead of
//! silently working. The consumer side recycles a submitted buffer
//! immediately, so `dequeue` never actually blocks.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::PlatformError;
use crate::layout::{CHROMA_ALIGN, align};
use crate::surface::{
    BufferQueue, Compositor, HardwareBuffer, ProducerApi, ScalingMode, SurfaceControl, Usage,
};
use crate::types::{DisplayMode, Rect, Size, SurfaceFormat};

/// Depth of the simulated buffer queue.
const BUFFER_COUNT: usize = 2;

/// Status code used for injected failures.
const INJECTED_STATUS: i32 = -5;

/// Operations that can be made to fail for testing error paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    DisplayMode,
    CreateControl,
    Commit,
    Connect,
    ScalingMode,
    Crop,
    Geometry,
    Usage,
    Dequeue,
    Lock,
    Unlock,
    Queue,
    Cancel,
}

const FAIL_POINTS: usize = 13;

fn point_index(point: FailPoint) -> usize {
    match point {
        FailPoint::DisplayMode => 0,
        FailPoint::CreateControl => 1,
        FailPoint::Commit => 2,
        FailPoint::Connect => 3,
        FailPoint::ScalingMode => 4,
        FailPoint::Crop => 5,
        FailPoint::Geometry => 6,
        FailPoint::Usage => 7,
        FailPoint::Dequeue => 8,
        FailPoint::Lock => 9,
        FailPoint::Unlock => 10,
        FailPoint::Queue => 11,
        FailPoint::Cancel => 12,
    }
}

#[derive(Default)]
struct State {
    fail: Vec<(FailPoint, u64)>,
    calls: [u64; FAIL_POINTS],
    connected: bool,
    disconnects: u64,
    commits: u64,
    dequeued: u64,
    queued: u64,
    cancelled: u64,
    scaling_mode: Option<ScalingMode>,
    crop: Option<Rect>,
    usage: Option<Usage>,
    buffer_size: Option<Size>,
    buffer_format: Option<SurfaceFormat>,
    last_frame: Option<Vec<u8>>,
}

impl State {
    /// Count a call at `point` and fail it if an injection matches.
    fn check(&mut self, point: FailPoint) -> Result<(), PlatformError> {
        let idx = point_index(point);
        let n = self.calls[idx];
        self.calls[idx] += 1;
        if self.fail.iter().any(|&(p, at)| p == point && at == n) {
            return Err(PlatformError::Status(INJECTED_STATUS));
        }
        Ok(())
    }
}

fn locked(state: &Arc<Mutex<State>>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Staged-vs-committed placement of a headless layer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Placement {
    layer: i32,
    position: (i32, i32),
    size: Option<Size>,
    visible: bool,
}

/// A headless compositor layer.
pub struct HeadlessControl {
    name: String,
    format: SurfaceFormat,
    staged: Placement,
    committed: Placement,
}

impl HeadlessControl {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> SurfaceFormat {
        self.format
    }

    pub fn committed_layer(&self) -> i32 {
        self.committed.layer
    }

    pub fn committed_position(&self) -> (i32, i32) {
        self.committed.position
    }

    pub fn committed_size(&self) -> Option<Size> {
        self.committed.size
    }

    pub fn committed_visible(&self) -> bool {
        self.committed.visible
    }
}

impl SurfaceControl for HeadlessControl {
    fn stage_layer(&mut self, layer: i32) {
        self.staged.layer = layer;
    }

    fn stage_position(&mut self, x: i32, y: i32) {
        self.staged.position = (x, y);
    }

    fn stage_size(&mut self, size: Size) {
        self.staged.size = Some(size);
    }

    fn stage_visible(&mut self, visible: bool) {
        self.staged.visible = visible;
    }
}

/// One simulated graphics buffer.
pub struct HeadlessBuffer {
    stride: u32,
    height: u32,
    data: Vec<u8>,
    is_locked: bool,
    state: Arc<Mutex<State>>,
}

impl HardwareBuffer for HeadlessBuffer {
    fn stride(&self) -> u32 {
        self.stride
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn lock(&mut self, bounds: Rect) -> Result<&mut [u8], PlatformError> {
        locked(&self.state).check(FailPoint::Lock)?;
        if self.is_locked {
            return Err(PlatformError::Message("buffer already locked"));
        }
        if bounds.width() > self.stride || bounds.height() > self.height {
            return Err(PlatformError::Message("lock bounds exceed buffer"));
        }
        self.is_locked = true;
        Ok(&mut self.data)
    }

    fn unlock(&mut self) -> Result<(), PlatformError> {
        locked(&self.state).check(FailPoint::Unlock)?;
        if !self.is_locked {
            return Err(PlatformError::Message("unlock without a lock"));
        }
        self.is_locked = false;
        Ok(())
    }
}

/// Producer queue of a headless surface.
pub struct HeadlessQueue {
    state: Arc<Mutex<State>>,
    stride_override: Option<u32>,
    available: Vec<HeadlessBuffer>,
    outstanding: usize,
}

impl HeadlessQueue {
    fn allocate(&self, size: Size, _format: SurfaceFormat) -> HeadlessBuffer {
        let stride = self.stride_override.unwrap_or(size.width).max(size.width) as usize;
        let height = size.height as usize;
        let luma = stride * height;
        let chroma = align(stride / 2, CHROMA_ALIGN) * height / 2;
        HeadlessBuffer {
            stride: stride as u32,
            height: size.height,
            data: vec![0; luma + 2 * chroma],
            is_locked: false,
            state: Arc::clone(&self.state),
        }
    }

    fn recycle(&mut self, buffer: HeadlessBuffer) {
        self.outstanding -= 1;
        self.available.push(buffer);
    }
}

impl BufferQueue for HeadlessQueue {
    type Buffer = HeadlessBuffer;

    fn connect(&mut self, _api: ProducerApi) -> Result<(), PlatformError> {
        let mut state = locked(&self.state);
        state.check(FailPoint::Connect)?;
        if state.connected {
            return Err(PlatformError::Message("producer already connected"));
        }
        state.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), PlatformError> {
        let mut state = locked(&self.state);
        if !state.connected {
            return Err(PlatformError::Message("producer not connected"));
        }
        state.connected = false;
        state.disconnects += 1;
        Ok(())
    }

    fn set_scaling_mode(&mut self, mode: ScalingMode) -> Result<(), PlatformError> {
        let mut state = locked(&self.state);
        state.check(FailPoint::ScalingMode)?;
        state.scaling_mode = Some(mode);
        Ok(())
    }

    fn set_crop(&mut self, crop: Rect) -> Result<(), PlatformError> {
        let mut state = locked(&self.state);
        state.check(FailPoint::Crop)?;
        state.crop = Some(crop);
        Ok(())
    }

    fn set_buffer_geometry(
        &mut self,
        size: Size,
        format: SurfaceFormat,
    ) -> Result<(), PlatformError> {
        let mut state = locked(&self.state);
        state.check(FailPoint::Geometry)?;
        state.buffer_size = Some(size);
        state.buffer_format = Some(format);
        Ok(())
    }

    fn set_usage(&mut self, usage: Usage) -> Result<(), PlatformError> {
        let mut state = locked(&self.state);
        state.check(FailPoint::Usage)?;
        state.usage = Some(usage);
        Ok(())
    }

    fn dequeue(&mut self) -> Result<HeadlessBuffer, PlatformError> {
        let (size, format) = {
            let mut state = locked(&self.state);
            state.check(FailPoint::Dequeue)?;
            if !state.connected {
                return Err(PlatformError::Message("dequeue before connect"));
            }
            let (Some(size), Some(format)) = (state.buffer_size, state.buffer_format) else {
                return Err(PlatformError::Message("dequeue before buffer geometry"));
            };
            state.dequeued += 1;
            (size, format)
        };
        if let Some(buffer) = self.available.pop() {
            self.outstanding += 1;
            return Ok(buffer);
        }
        if self.outstanding >= BUFFER_COUNT {
            // The real queue would block here; with an instant consumer this
            // can only mean the producer is holding more than one buffer.
            return Err(PlatformError::Message("no free buffer slot"));
        }
        self.outstanding += 1;
        Ok(self.allocate(size, format))
    }

    fn queue(&mut self, buffer: HeadlessBuffer) -> Result<(), PlatformError> {
        let failed = {
            let mut state = locked(&self.state);
            let failed = state.check(FailPoint::Queue).err();
            if failed.is_none() {
                if buffer.is_locked {
                    return Err(PlatformError::Message("buffer queued while locked"));
                }
                state.queued += 1;
                state.last_frame = Some(buffer.data.clone());
            }
            failed
        };
        self.recycle(buffer);
        match failed {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn cancel(&mut self, buffer: HeadlessBuffer) -> Result<(), PlatformError> {
        let failed = {
            let mut state = locked(&self.state);
            let failed = state.check(FailPoint::Cancel).err();
            if failed.is_none() {
                state.cancelled += 1;
            }
            failed
        };
        self.recycle(buffer);
        match failed {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// A compositor that presents into memory.
pub struct HeadlessCompositor {
    mode: DisplayMode,
    stride_override: Option<u32>,
    state: Arc<Mutex<State>>,
}

impl HeadlessCompositor {
    pub fn new(mode: DisplayMode) -> Self {
        HeadlessCompositor {
            mode,
            stride_override: None,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// A 1920x1080 @60fps display.
    pub fn with_defaults() -> Self {
        Self::new(DisplayMode {
            size: Size {
                width: 1920,
                height: 1080,
            },
            refresh_rate: 60.0,
        })
    }

    /// Force allocated buffers to report this luma stride (clamped to at
    /// least the buffer width), simulating allocator padding.
    pub fn set_stride_override(&mut self, stride: u32) {
        self.stride_override = Some(stride);
    }

    /// Fail the next (first) call at `point`.
    pub fn fail_at(&mut self, point: FailPoint) {
        self.fail_on_call(point, 0);
    }

    /// Fail the `n`th call (zero-based) at `point`.
    pub fn fail_on_call(&mut self, point: FailPoint, n: u64) {
        locked(&self.state).fail.push((point, n));
    }

    /// A handle for inspecting what the pipeline did, valid after the
    /// compositor has been consumed by a session.
    pub fn recorder(&self) -> Recorder {
        Recorder {
            state: Arc::clone(&self.state),
        }
    }
}

impl Compositor for HeadlessCompositor {
    type Control = HeadlessControl;
    type Queue = HeadlessQueue;

    fn display_mode(&self) -> Result<DisplayMode, PlatformError> {
        locked(&self.state).check(FailPoint::DisplayMode)?;
        Ok(self.mode)
    }

    fn create_control(
        &mut self,
        name: &str,
        size: Size,
        format: SurfaceFormat,
    ) -> Result<HeadlessControl, PlatformError> {
        locked(&self.state).check(FailPoint::CreateControl)?;
        Ok(HeadlessControl {
            name: name.to_owned(),
            format,
            staged: Placement {
                size: Some(size),
                ..Placement::default()
            },
            committed: Placement::default(),
        })
    }

    fn commit(&mut self, controls: &mut [&mut HeadlessControl]) -> Result<(), PlatformError> {
        let mut state = locked(&self.state);
        state.check(FailPoint::Commit)?;
        for control in controls {
            control.committed = control.staged;
        }
        state.commits += 1;
        Ok(())
    }

    fn queue_for(&mut self, _control: &HeadlessControl) -> Result<HeadlessQueue, PlatformError> {
        Ok(HeadlessQueue {
            state: Arc::clone(&self.state),
            stride_override: self.stride_override,
            available: Vec::new(),
            outstanding: 0,
        })
    }
}

/// Read-only view of a headless compositor's recorded activity.
#[derive(Clone)]
pub struct Recorder {
    state: Arc<Mutex<State>>,
}

impl Recorder {
    pub fn dequeued(&self) -> u64 {
        locked(&self.state).dequeued
    }

    pub fn queued(&self) -> u64 {
        locked(&self.state).queued
    }

    pub fn cancelled(&self) -> u64 {
        locked(&self.state).cancelled
    }

    pub fn commits(&self) -> u64 {
        locked(&self.state).commits
    }

    pub fn is_connected(&self) -> bool {
        locked(&self.state).connected
    }

    pub fn disconnects(&self) -> u64 {
        locked(&self.state).disconnects
    }

    pub fn scaling_mode(&self) -> Option<ScalingMode> {
        locked(&self.state).scaling_mode
    }

    pub fn crop(&self) -> Option<Rect> {
        locked(&self.state).crop
    }

    pub fn usage(&self) -> Option<Usage> {
        locked(&self.state).usage
    }

    pub fn buffer_geometry(&self) -> Option<(Size, SurfaceFormat)> {
        let state = locked(&self.state);
        state.buffer_size.zip(state.buffer_format)
    }

    /// Contents of the most recently submitted buffer.
    pub fn last_frame(&self) -> Option<Vec<u8>> {
        locked(&self.state).last_frame.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected_queue() -> (HeadlessCompositor, HeadlessQueue) {
        let mut compositor = HeadlessCompositor::with_defaults();
        let control = compositor
            .create_control("test", Size { width: 16, height: 16 }, SurfaceFormat::Opaque)
            .unwrap();
        let mut queue = compositor.queue_for(&control).unwrap();
        queue.connect(ProducerApi::Media).unwrap();
        queue
            .set_buffer_geometry(Size { width: 16, height: 16 }, SurfaceFormat::Yv12)
            .unwrap();
        (compositor, queue)
    }

    #[test]
    fn lock_twice_is_rejected() {
        let (_compositor, mut queue) = connected_queue();
        let mut buffer = queue.dequeue().unwrap();
        let bounds = Rect::from_size(Size { width: 16, height: 16 });
        buffer.lock(bounds).unwrap();
        assert!(buffer.lock(bounds).is_err());
        buffer.unlock().unwrap();
        buffer.lock(bounds).unwrap();
        buffer.unlock().unwrap();
        queue.cancel(buffer).unwrap();
    }

    #[test]
    fn unlock_without_lock_is_rejected() {
        let (_compositor, mut queue) = connected_queue();
        let mut buffer = queue.dequeue().unwrap();
        assert!(buffer.unlock().is_err());
        queue.cancel(buffer).unwrap();
    }

    #[test]
    fn dequeue_before_connect_is_rejected() {
        let mut compositor = HeadlessCompositor::with_defaults();
        let control = compositor
            .create_control("test", Size { width: 16, height: 16 }, SurfaceFormat::Opaque)
            .unwrap();
        let mut queue = compositor.queue_for(&control).unwrap();
        assert!(queue.dequeue().is_err());
    }

    #[test]
    fn double_connect_is_rejected() {
        let (_compositor, mut queue) = connected_queue();
        assert!(queue.connect(ProducerApi::Media).is_err());
    }

    #[test]
    fn holding_every_slot_fails_the_next_dequeue() {
        let (_compositor, mut queue) = connected_queue();
        let a = queue.dequeue().unwrap();
        let _b = queue.dequeue().unwrap();
        assert!(queue.dequeue().is_err());
        queue.cancel(a).unwrap();
        assert!(queue.dequeue().is_ok());
    }

    #[test]
    fn placement_is_invisible_until_commit() {
        let mut compositor = HeadlessCompositor::with_defaults();
        let mut control = compositor
            .create_control("test", Size { width: 16, height: 16 }, SurfaceFormat::Opaque)
            .unwrap();
        control.stage_layer(7);
        control.stage_visible(true);
        assert_eq!(control.committed_layer(), 0);
        assert!(!control.committed_visible());
        compositor.commit(&mut [&mut control]).unwrap();
        assert_eq!(control.committed_layer(), 7);
        assert!(control.committed_visible());
    }

    #[test]
    fn failed_commit_applies_nothing() {
        let mut compositor = HeadlessCompositor::with_defaults();
        compositor.fail_at(FailPoint::Commit);
        let mut control = compositor
            .create_control("test", Size { width: 16, height: 16 }, SurfaceFormat::Opaque)
            .unwrap();
        control.stage_layer(7);
        assert!(compositor.commit(&mut [&mut control]).is_err());
        assert_eq!(control.committed_layer(), 0);
    }

    #[test]
    fn stride_override_pads_buffers() {
        let mut compositor = HeadlessCompositor::with_defaults();
        compositor.set_stride_override(256);
        let control = compositor
            .create_control("test", Size { width: 240, height: 320 }, SurfaceFormat::Opaque)
            .unwrap();
        let mut queue = compositor.queue_for(&control).unwrap();
        queue.connect(ProducerApi::Media).unwrap();
        queue
            .set_buffer_geometry(Size { width: 240, height: 320 }, SurfaceFormat::Yv12)
            .unwrap();
        let buffer = queue.dequeue().unwrap();
        assert_eq!(buffer.stride(), 256);
        queue.cancel(buffer).unwrap();
    }
}
