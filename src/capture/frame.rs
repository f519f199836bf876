//! Owned image buffer for grabbed frames
//!
//! `Frame` wraps an `image::DynamicImage` and provides the transforms applied
//! to frames after retrieval: flips and half-resolution pyramid reduction.
//!
//! # Examples
//!
//! ```
//! use framegrab::{capture::Frame, model::FlipType};
//!
//! let mut frame = Frame::from_test_pattern(640, 480);
//! frame.flip(FlipType::Both);
//!
//! let small = frame.pyr_down();
//! assert_eq!(small.dimensions(), (320, 240));
//! ```

use image::{DynamicImage, GenericImageView, imageops::FilterType};

use crate::model::FlipType;

/// Owned frame buffer
///
/// A default-constructed frame is empty (0x0) and is meant to be passed to
/// `retrieve()` as the output buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    inner: DynamicImage,
}

impl Default for Frame {
    fn default() -> Self {
        Self::empty()
    }
}

impl Frame {
    /// Creates a frame from a decoded image
    pub fn new(image: DynamicImage) -> Self {
        Self { inner: image }
    }

    /// Creates an empty 0x0 frame
    pub fn empty() -> Self {
        Self::new(DynamicImage::new_rgb8(0, 0))
    }

    /// Whether the frame holds no pixels
    pub fn is_empty(&self) -> bool {
        let (width, height) = self.dimensions();
        width == 0 || height == 0
    }

    /// Replaces the frame contents
    pub fn set(&mut self, image: DynamicImage) {
        self.inner = image;
    }

    /// Mirrors the frame in place
    ///
    /// # Examples
    ///
    /// ```
    /// use framegrab::{capture::Frame, model::FlipType};
    ///
    /// let original = Frame::from_test_pattern(8, 4);
    /// let mut twice = original.clone();
    /// twice.flip(FlipType::Horizontal);
    /// twice.flip(FlipType::Horizontal);
    /// assert_eq!(twice, original);
    /// ```
    pub fn flip(&mut self, flip: FlipType) {
        if flip.is_horizontal() {
            self.inner = self.inner.fliph();
        }
        if flip.is_vertical() {
            self.inner = self.inner.flipv();
        }
    }

    /// Returns a copy reduced to half width and half height
    ///
    /// Odd dimensions round up, so a 5x3 frame becomes 3x2. The reduction
    /// blurs with a Gaussian kernel before resampling.
    pub fn pyr_down(&self) -> Self {
        let (width, height) = self.dimensions();
        if width == 0 || height == 0 {
            return self.clone();
        }
        let new_width = width.div_ceil(2);
        let new_height = height.div_ceil(2);

        Self::new(self.inner.resize_exact(new_width, new_height, FilterType::Gaussian))
    }

    /// Returns the dimensions of the frame as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }

    /// Returns the frame width in pixels
    pub fn width(&self) -> u32 {
        self.dimensions().0
    }

    /// Returns the frame height in pixels
    pub fn height(&self) -> u32 {
        self.dimensions().1
    }

    /// Converts the frame to RGBA8
    pub fn to_rgba8(&self) -> image::RgbaImage {
        self.inner.to_rgba8()
    }

    /// Returns the raw pixel data
    ///
    /// The layout depends on the underlying color type; convert with
    /// `to_rgba8()` first for a predictable layout.
    pub fn as_bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }

    /// Creates a test pattern frame
    ///
    /// The pattern is a horizontal red ramp over a vertical blue ramp, so
    /// every flip produces a distinct image.
    pub fn from_test_pattern(width: u32, height: u32) -> Self {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            let red = (x * 255 / width.max(1)) as u8;
            let blue = (y * 255 / height.max(1)) as u8;
            image::Rgb([red, 64, blue])
        });

        Self::new(DynamicImage::ImageRgb8(img))
    }

    /// Returns a reference to the inner DynamicImage
    pub fn inner(&self) -> &DynamicImage {
        &self.inner
    }

    /// Consumes self and returns the inner DynamicImage
    pub fn into_inner(self) -> DynamicImage {
        self.inner
    }
}
