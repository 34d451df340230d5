#![cfg_attr(not(feature = "std"), no_std)]

//! Push raw planar YUV 4:2:0 frames into a double-buffered presentation
//! surface, one frame at a time.
//!
//! The pipeline is: open a [`SurfaceSession`] against a [`Compositor`],
//! configure its buffer queue, then drive a [`FrameSource`] through a
//! [`Presenter`], which runs the acquire/map/copy/unmap/submit cycle per
//! frame. Teardown is automatic (RAII) and idempotent.
//!
//! The compositor itself is a capability supplied by the caller; the
//! [`headless`] implementation backs the tests and the demo.
//!
//! [`SurfaceSession`]: session::SurfaceSession
//! [`Compositor`]: surface::Compositor
//! [`FrameSource`]: source::FrameSource
//! [`Presenter`]: present::Presenter

pub mod error;
pub mod frame;
pub mod layout;
pub mod types;

#[cfg(feature = "std")]
pub mod headless;
#[cfg(feature = "std")]
pub mod present;
#[cfg(feature = "std")]
pub mod session;
#[cfg(feature = "std")]
pub mod source;
#[cfg(feature = "std")]
pub mod surface;

// Re-exports
pub use error::*;
pub use frame::*;
pub use layout::{PlaneLayout, SurfaceGeometry, translate_format};
pub use types::*;

#[cfg(feature = "std")]
pub use present::*;
#[cfg(feature = "std")]
pub use session::*;
#[cfg(feature = "std")]
pub use source::*;
