//! Capture backend traits and implementations
//!
//! This module defines the narrow contract between the capture loop
//! controller and whatever actually produces frames. A backend opens sources
//! and hands back an exclusively-owned [`CaptureHandle`]; the handle grabs and
//! decodes frames.
//!
//! # Architecture
//!
//! - [`CaptureBackend`] - Opens camera devices and files (`Send + Sync`)
//! - [`CaptureHandle`] - One open source; grab / retrieve / properties
//!   (`Send`, not `Sync`: callers serialize access)
//! - [`Frame`] - Owned image buffer with flip and pyramid-down transforms
//!
//! | Backend | Devices | Files |
//! |---------|---------|-------|
//! | [`MockBackend`] | ✓ (synthetic) | ✓ (synthetic) |
//! | `ImageSequenceBackend` | - | ✓ (images, GIFs, directories) |
//!
//! A handle is released by dropping it. The controller owns the boxed handle
//! and drops it exactly once when the capture is released.

use std::path::Path;

use crate::{
    error::CaptureResult,
    model::{BackendKind, CaptureProperty, CaptureSource},
};

pub mod frame;
#[cfg(feature = "image-backend")]
pub mod image_backend;
pub mod mock;

pub use frame::Frame;
#[cfg(feature = "image-backend")]
pub use image_backend::ImageSequenceBackend;
pub use mock::{MockBackend, MockStats};

/// An open capture source
///
/// Mirrors the grab/retrieve split of native video-capture libraries:
/// [`grab`](CaptureHandle::grab) advances to the next raw frame without
/// decoding it, and [`retrieve`](CaptureHandle::retrieve) decodes the most
/// recently grabbed frame.
pub trait CaptureHandle: Send {
    /// Grabs the next frame
    ///
    /// Returns `Ok(false)` at the end of the stream or when the device has
    /// gone away. `Err` is reserved for unexpected faults.
    fn grab(&mut self) -> CaptureResult<bool>;

    /// Decodes the most recently grabbed frame into `frame`
    ///
    /// Returns `Ok(false)` if there is no grabbed frame to decode.
    fn retrieve(&mut self, frame: &mut Frame, channel: i32) -> CaptureResult<bool>;

    /// Reads a capture property, returning 0.0 when it is not supported
    fn get_property(&self, property: CaptureProperty) -> f64;

    /// Writes a capture property, returning `true` on success
    fn set_property(&mut self, property: CaptureProperty, value: f64) -> bool;
}

/// Factory for capture handles
pub trait CaptureBackend: Send + Sync {
    /// Which backend this is
    fn kind(&self) -> BackendKind;

    /// Opens a camera by index
    ///
    /// # Errors
    ///
    /// - [`CaptureError::DeviceUnavailable`](crate::error::CaptureError::DeviceUnavailable)
    ///   - No usable camera at this index
    /// - [`CaptureError::NotSupported`](crate::error::CaptureError::NotSupported)
    ///   - The backend cannot open devices at all
    fn open_device(&self, index: i32) -> CaptureResult<Box<dyn CaptureHandle>>;

    /// Opens a file or stream
    ///
    /// # Errors
    ///
    /// - [`CaptureError::SourceOpenFailed`](crate::error::CaptureError::SourceOpenFailed)
    ///   - The path does not exist or cannot be decoded
    fn open_file(&self, path: &Path) -> CaptureResult<Box<dyn CaptureHandle>>;

    /// Opens either kind of source
    fn open(&self, source: &CaptureSource) -> CaptureResult<Box<dyn CaptureHandle>> {
        match source {
            CaptureSource::Device(index) => self.open_device(*index),
            CaptureSource::File(path) => self.open_file(path),
        }
    }
}
