//! File capture backed by the `image` crate
//!
//! `ImageSequenceBackend` opens three kinds of file sources:
//!
//! - an **animated GIF**, decoded eagerly into its frames;
//! - a **directory**, whose image files are played back in file-name order
//!   and decoded lazily on retrieve;
//! - any other **still image**, which yields exactly one frame.
//!
//! The backend has no cameras, so every `open_device` call fails the same
//! way it would on a machine without a camera attached.

use std::{
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
};

use image::{AnimationDecoder, DynamicImage, codecs::gif::GifDecoder};
use tracing::{debug, info};

use super::{CaptureBackend, CaptureHandle, Frame};
use crate::{
    error::{CaptureError, CaptureResult},
    model::{BackendKind, CaptureProperty},
};

/// File extensions recognised when scanning a directory
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif"];

/// File capture backend for images, image directories and animated GIFs
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageSequenceBackend;

impl ImageSequenceBackend {
    /// Creates the backend
    pub fn new() -> Self {
        Self
    }
}

impl CaptureBackend for ImageSequenceBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ImageSequence
    }

    fn open_device(&self, index: i32) -> CaptureResult<Box<dyn CaptureHandle>> {
        debug!("Image sequence backend has no cameras (requested {})", index);
        Err(CaptureError::DeviceUnavailable { index })
    }

    fn open_file(&self, path: &Path) -> CaptureResult<Box<dyn CaptureHandle>> {
        let open_failed = |reason: String| CaptureError::SourceOpenFailed {
            path: path.display().to_string(),
            reason,
        };

        let metadata = fs::metadata(path).map_err(|e| open_failed(e.to_string()))?;

        let handle = if metadata.is_dir() {
            let files = list_images(path).map_err(|e| open_failed(e.to_string()))?;
            let first = files
                .first()
                .ok_or_else(|| open_failed("directory contains no images".to_string()))?;
            let dimensions = image::image_dimensions(first).map_err(|e| open_failed(e.to_string()))?;
            SequenceHandle::new(FrameStore::Files(files), dimensions, 0.0)
        } else if has_extension(path, "gif") {
            let (frames, fps) = decode_gif(path).map_err(open_failed)?;
            let first = frames
                .first()
                .ok_or_else(|| open_failed("GIF contains no frames".to_string()))?;
            let dimensions = (first.width(), first.height());
            SequenceHandle::new(FrameStore::Decoded(frames), dimensions, fps)
        } else {
            let image = image::ImageReader::open(path)
                .map_err(|e| open_failed(e.to_string()))?
                .with_guessed_format()
                .map_err(|e| open_failed(e.to_string()))?
                .decode()
                .map_err(|e| open_failed(e.to_string()))?;
            let dimensions = (image.width(), image.height());
            SequenceHandle::new(FrameStore::Decoded(vec![image]), dimensions, 0.0)
        };

        info!(
            "Opened {} ({} frames, {}x{})",
            path.display(),
            handle.frames.len(),
            handle.dimensions.0,
            handle.dimensions.1
        );
        Ok(Box::new(handle))
    }
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
}

/// Image files in `dir`, sorted by file name
fn list_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| IMAGE_EXTENSIONS.iter().any(|ext| has_extension(path, ext)))
        .collect();
    files.sort();
    Ok(files)
}

/// Decodes every frame of a GIF and derives a frame rate from the first delay
fn decode_gif(path: &Path) -> Result<(Vec<DynamicImage>, f64), String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let decoder = GifDecoder::new(BufReader::new(file)).map_err(|e| e.to_string())?;
    let frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(|e| e.to_string())?;

    let fps = frames
        .first()
        .map(|frame| {
            let (numer, denom) = frame.delay().numer_denom_ms();
            if numer == 0 {
                0.0
            } else {
                1000.0 * denom as f64 / numer as f64
            }
        })
        .unwrap_or(0.0);

    let images = frames
        .into_iter()
        .map(|frame| DynamicImage::ImageRgba8(frame.into_buffer()))
        .collect();
    Ok((images, fps))
}

#[derive(Debug)]
enum FrameStore {
    /// Decoded on retrieve
    Files(Vec<PathBuf>),
    /// Already in memory
    Decoded(Vec<DynamicImage>),
}

impl FrameStore {
    fn len(&self) -> usize {
        match self {
            FrameStore::Files(files) => files.len(),
            FrameStore::Decoded(images) => images.len(),
        }
    }

    fn load(&self, index: usize) -> Result<DynamicImage, String> {
        match self {
            FrameStore::Files(files) => image::open(&files[index]).map_err(|e| e.to_string()),
            FrameStore::Decoded(images) => Ok(images[index].clone()),
        }
    }
}

#[derive(Debug)]
struct SequenceHandle {
    frames:     FrameStore,
    dimensions: (u32, u32),
    fps:        f64,
    /// Index of the next frame `grab` will advance to
    position:   usize,
    /// Index of the most recently grabbed frame
    current:    Option<usize>,
}

impl SequenceHandle {
    fn new(frames: FrameStore, dimensions: (u32, u32), fps: f64) -> Self {
        Self {
            frames,
            dimensions,
            fps,
            position: 0,
            current: None,
        }
    }
}

impl CaptureHandle for SequenceHandle {
    fn grab(&mut self) -> CaptureResult<bool> {
        if self.position >= self.frames.len() {
            self.current = None;
            return Ok(false);
        }
        self.current = Some(self.position);
        self.position += 1;
        Ok(true)
    }

    fn retrieve(&mut self, frame: &mut Frame, channel: i32) -> CaptureResult<bool> {
        let Some(index) = self.current else {
            return Ok(false);
        };
        let image = self
            .frames
            .load(index)
            .map_err(|reason| CaptureError::RetrieveFailed { channel, reason })?;

        frame.set(if channel == 0 {
            image
        } else {
            DynamicImage::ImageLuma8(image.to_luma8())
        });
        Ok(true)
    }

    fn get_property(&self, property: CaptureProperty) -> f64 {
        let count = self.frames.len() as f64;
        match property {
            CaptureProperty::FrameWidth => self.dimensions.0 as f64,
            CaptureProperty::FrameHeight => self.dimensions.1 as f64,
            CaptureProperty::FrameCount => count,
            CaptureProperty::PosFrames => self.position as f64,
            CaptureProperty::PosAviRatio if count > 0.0 => self.position as f64 / count,
            CaptureProperty::Fps => self.fps,
            CaptureProperty::PosMsec if self.fps > 0.0 => self.position as f64 * 1000.0 / self.fps,
            _ => 0.0,
        }
    }

    fn set_property(&mut self, property: CaptureProperty, value: f64) -> bool {
        match property {
            CaptureProperty::PosFrames if value >= 0.0 && value <= self.frames.len() as f64 => {
                self.position = value as usize;
                self.current = None;
                true
            }
            _ => false,
        }
    }
}
