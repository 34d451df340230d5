//! Surface session lifecycle: open, buffer-queue configuration, teardown.

use log::{debug, warn};

use crate::error::{ConfigStep, Error};
use crate::layout::translate_format;
use crate::surface::{
    BufferQueue, Compositor, ProducerApi, ScalingMode, SurfaceControl, Usage,
};
use crate::types::{Rect, Size, StreamConfig, SurfaceFormat};

/// Z coordinate of the background layer; the video layer sits directly above.
const BACKGROUND_LAYER: i32 = 100_000;

/// An open presentation session: a video surface above a background layer,
/// plus (after [`configure_buffers`](SurfaceSession::configure_buffers)) the
/// producer queue frames are pushed through.
///
/// Every owned handle is independently nullable, so teardown is safe after a
/// partial failure, and `Drop` runs teardown on every exit path.
pub struct SurfaceSession<C: Compositor> {
    compositor: C,
    primary: Option<C::Control>,
    background: Option<C::Control>,
    queue: Option<C::Queue>,
    config: StreamConfig,
    surface_format: SurfaceFormat,
    connected: bool,
    configured: bool,
}

impl<C: Compositor> SurfaceSession<C> {
    /// Create the session's surfaces and commit their placement as one
    /// atomic transaction: background below, video layer above at (0, 0)
    /// sized to the video dimensions.
    pub fn open(mut compositor: C, config: StreamConfig) -> Result<Self, Error> {
        let surface_format = translate_format(config.pixel_format)?;
        let mode = compositor.display_mode().map_err(Error::SurfaceCreation)?;
        debug!(
            "main display is {}x{} @{:.2}fps",
            mode.size.width, mode.size.height, mode.refresh_rate
        );

        let mut background = compositor
            .create_control("video-bkgnd", mode.size, SurfaceFormat::Rgb565)
            .map_err(Error::SurfaceCreation)?;
        let mut primary = compositor
            .create_control("video-surface", mode.size, SurfaceFormat::Opaque)
            .map_err(Error::SurfaceCreation)?;

        let video_size = config.size.aligned_even();
        background.stage_layer(BACKGROUND_LAYER);
        background.stage_visible(true);
        primary.stage_layer(BACKGROUND_LAYER + 1);
        primary.stage_position(0, 0);
        primary.stage_size(video_size);
        primary.stage_visible(true);
        compositor
            .commit(&mut [&mut primary, &mut background])
            .map_err(Error::SurfaceCreation)?;

        Ok(SurfaceSession {
            compositor,
            primary: Some(primary),
            background: Some(background),
            queue: None,
            config,
            surface_format,
            connected: false,
            configured: false,
        })
    }

    /// Connect the video surface as a media producer and configure its
    /// queue: scale-to-window, crop to the video rectangle, buffer geometry
    /// and usage flags.
    ///
    /// Each sub-step fails independently with [`Error::SurfaceConfig`]
    /// naming the step. Calling this twice without an intervening teardown
    /// is rejected with [`Error::AlreadyConfigured`].
    pub fn configure_buffers(&mut self) -> Result<(), Error> {
        if self.configured {
            return Err(Error::AlreadyConfigured);
        }
        let primary = self.primary.as_ref().ok_or(Error::NotConfigured)?;
        let mut queue = self
            .compositor
            .queue_for(primary)
            .map_err(|e| Error::SurfaceConfig(ConfigStep::Connect, e))?;
        queue
            .connect(ProducerApi::Media)
            .map_err(|e| Error::SurfaceConfig(ConfigStep::Connect, e))?;

        if let Err(err) = Self::configure_queue(&mut queue, &self.config, self.surface_format) {
            // The queue never made it into the session; disconnect here so
            // the producer slot is not left occupied.
            if let Err(e) = queue.disconnect() {
                warn!("disconnect after failed configuration: {e}");
            }
            return Err(err);
        }

        self.queue = Some(queue);
        self.connected = true;
        self.configured = true;
        Ok(())
    }

    fn configure_queue(
        queue: &mut C::Queue,
        config: &StreamConfig,
        surface_format: SurfaceFormat,
    ) -> Result<(), Error> {
        let video_size = config.size.aligned_even();
        queue
            .set_scaling_mode(ScalingMode::ScaleToWindow)
            .map_err(|e| Error::SurfaceConfig(ConfigStep::ScalingMode, e))?;
        queue
            .set_crop(Rect::from_size(video_size))
            .map_err(|e| Error::SurfaceConfig(ConfigStep::Crop, e))?;
        queue
            .set_buffer_geometry(video_size, surface_format)
            .map_err(|e| Error::SurfaceConfig(ConfigStep::Geometry, e))?;
        queue
            .set_usage(Usage::video_producer())
            .map_err(|e| Error::SurfaceConfig(ConfigStep::Usage, e))?;
        Ok(())
    }

    /// The session's stream configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Video dimensions rounded up to even.
    pub fn video_size(&self) -> Size {
        self.config.size.aligned_even()
    }

    /// The configured producer queue, or [`Error::NotConfigured`].
    pub fn queue_mut(&mut self) -> Result<&mut C::Queue, Error> {
        self.queue.as_mut().ok_or(Error::NotConfigured)
    }

    /// Release everything the session owns, in a fixed order: disconnect
    /// the producer queue if connected, then drop the queue, the video
    /// surface and the background surface.
    ///
    /// Idempotent; each release is a no-op once the handle is gone.
    /// Failures are logged and never escalated, and later steps still run.
    pub fn teardown(&mut self) {
        if let Some(mut queue) = self.queue.take() {
            if self.connected {
                if let Err(e) = queue.disconnect() {
                    warn!("teardown: disconnect failed: {e}");
                }
                self.connected = false;
            }
            debug!("teardown: released buffer queue");
        }
        if self.primary.take().is_some() {
            debug!("teardown: released video surface");
        }
        if self.background.take().is_some() {
            debug!("teardown: released background surface");
        }
        self.configured = false;
    }
}

impl<C: Compositor> Drop for SurfaceSession<C> {
    fn drop(&mut self) {
        self.teardown();
    }
}
