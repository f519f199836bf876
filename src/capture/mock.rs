//! Mock capture backend for testing
//!
//! This module provides a `MockBackend` implementation of [`CaptureBackend`]
//! that produces synthetic frames without any camera or video file. It is
//! used by the test suite and by the `framegrab` CLI when `--mock` is passed.
//!
//! # Features
//!
//! - **Synthetic devices and files:** Camera indices and file paths that open
//!   successfully; everything else fails like a missing device would
//! - **Frame limits:** End the stream after a fixed number of frames
//! - **Configurable delay:** Simulate a camera's frame period
//! - **Fault injection:** Make a specific grab fail or panic
//! - **Disconnect:** Unplug every open device at runtime
//! - **Release accounting:** Count opened and released handles
//!
//! # Examples
//!
//! ```
//! use framegrab::capture::{CaptureBackend, Frame, MockBackend};
//!
//! let backend = MockBackend::new().with_frame_limit(2);
//! let mut handle = backend.open_device(0).unwrap();
//!
//! assert!(handle.grab().unwrap());
//! let mut frame = Frame::default();
//! assert!(handle.retrieve(&mut frame, 0).unwrap());
//! assert_eq!(frame.dimensions(), (640, 480));
//!
//! assert!(handle.grab().unwrap());
//! assert!(!handle.grab().unwrap()); // end of stream
//! ```

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use image::DynamicImage;
use tracing::debug;

use super::{CaptureBackend, CaptureHandle, Frame};
use crate::{
    error::{CaptureError, CaptureResult},
    model::{BackendKind, CaptureProperty},
};

const MOCK_FPS: f64 = 30.0;

/// Counters shared between a [`MockBackend`] and every handle it opened
#[derive(Debug, Default)]
pub struct MockStats {
    opened:    AtomicUsize,
    released:  AtomicUsize,
    grabs:     AtomicU64,
    retrieves: AtomicU64,
}

impl MockStats {
    /// Number of handles opened
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of handles dropped
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Number of successful grabs across all handles
    pub fn grabs(&self) -> u64 {
        self.grabs.load(Ordering::SeqCst)
    }

    /// Number of successful retrieves across all handles
    pub fn retrieves(&self) -> u64 {
        self.retrieves.load(Ordering::SeqCst)
    }
}

/// Mock capture backend for testing and development
///
/// By default a single camera at index 0 is available, producing an
/// unlimited stream of 640x480 frames with no delay.
#[derive(Debug)]
pub struct MockBackend {
    devices:      Vec<i32>,
    files:        HashMap<PathBuf, u64>,
    frame_size:   (u32, u32),
    frame_limit:  Option<u64>,
    delay:        Option<Duration>,
    fault_after:  Option<u64>,
    panic_after:  Option<u64>,
    stats:        Arc<MockStats>,
    disconnected: Arc<AtomicBool>,
}

impl MockBackend {
    /// Creates a backend with one camera at index 0
    pub fn new() -> Self {
        Self {
            devices:      vec![0],
            files:        HashMap::new(),
            frame_size:   (640, 480),
            frame_limit:  None,
            delay:        None,
            fault_after:  None,
            panic_after:  None,
            stats:        Arc::new(MockStats::default()),
            disconnected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replaces the set of available cameras with indices `0..count`
    pub fn with_devices(mut self, count: i32) -> Self {
        self.devices = (0..count).collect();
        self
    }

    /// Registers a synthetic file that yields `frames` frames
    pub fn with_file(mut self, path: impl Into<PathBuf>, frames: u64) -> Self {
        self.files.insert(path.into(), frames);
        self
    }

    /// Sets the dimensions of generated frames
    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = (width, height);
        self
    }

    /// Ends device streams after `frames` successful grabs
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Sleeps for `delay` inside every grab
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes the `n`th grab attempt (1-based) of each handle return an error
    pub fn with_fault_after(mut self, n: u64) -> Self {
        self.fault_after = Some(n);
        self
    }

    /// Makes the `n`th grab attempt (1-based) of each handle panic
    pub fn with_panic_after(mut self, n: u64) -> Self {
        self.panic_after = Some(n);
        self
    }

    /// Shared counters for every handle this backend opens
    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }

    /// Simulates unplugging every device; subsequent grabs return `false`
    pub fn disconnect_all(&self) {
        debug!("Mock backend: disconnecting all devices");
        self.disconnected.store(true, Ordering::SeqCst);
    }

    fn handle(&self, remaining: Option<u64>, disconnectable: bool) -> MockHandle {
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        MockHandle {
            frame_size: self.frame_size,
            remaining,
            total: remaining,
            attempts: 0,
            grabbed: 0,
            has_frame: false,
            delay: self.delay,
            fault_after: self.fault_after,
            panic_after: self.panic_after,
            stats: Arc::clone(&self.stats),
            disconnected: disconnectable.then(|| Arc::clone(&self.disconnected)),
            settings: HashMap::new(),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for MockBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Mock
    }

    fn open_device(&self, index: i32) -> CaptureResult<Box<dyn CaptureHandle>> {
        if !self.devices.contains(&index) {
            return Err(CaptureError::DeviceUnavailable { index });
        }
        debug!("Mock backend: opened camera {}", index);
        Ok(Box::new(self.handle(self.frame_limit, true)))
    }

    fn open_file(&self, path: &Path) -> CaptureResult<Box<dyn CaptureHandle>> {
        let frames = self
            .files
            .get(path)
            .copied()
            .ok_or_else(|| CaptureError::SourceOpenFailed {
                path:   path.display().to_string(),
                reason: "No such file".to_string(),
            })?;
        debug!("Mock backend: opened {} ({} frames)", path.display(), frames);
        Ok(Box::new(self.handle(Some(frames), false)))
    }
}

/// Handle produced by [`MockBackend`]
#[derive(Debug)]
struct MockHandle {
    frame_size:   (u32, u32),
    remaining:    Option<u64>,
    total:        Option<u64>,
    attempts:     u64,
    grabbed:      u64,
    has_frame:    bool,
    delay:        Option<Duration>,
    fault_after:  Option<u64>,
    panic_after:  Option<u64>,
    stats:        Arc<MockStats>,
    disconnected: Option<Arc<AtomicBool>>,
    settings:     HashMap<CaptureProperty, f64>,
}

impl MockHandle {
    fn is_disconnected(&self) -> bool {
        self.disconnected
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Test pattern whose top-left pixel encodes the frame number
    fn render(&self) -> DynamicImage {
        let (width, height) = self.frame_size;
        let mut frame = Frame::from_test_pattern(width, height).to_rgba8();
        if width > 0 && height > 0 {
            let n = self.grabbed.to_le_bytes();
            frame.put_pixel(0, 0, image::Rgba([n[0], n[1], n[2], 255]));
        }
        DynamicImage::ImageRgba8(frame)
    }
}

impl CaptureHandle for MockHandle {
    fn grab(&mut self) -> CaptureResult<bool> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if self.is_disconnected() {
            self.has_frame = false;
            return Ok(false);
        }

        self.attempts += 1;
        if self.fault_after == Some(self.attempts) {
            return Err(CaptureError::GrabFailed {
                reason: format!("injected fault on grab {}", self.attempts),
            });
        }
        if self.panic_after == Some(self.attempts) {
            panic!("injected panic on grab {}", self.attempts);
        }

        match self.remaining {
            Some(0) => {
                self.has_frame = false;
                return Ok(false);
            }
            Some(ref mut left) => *left -= 1,
            None => {}
        }

        self.grabbed += 1;
        self.has_frame = true;
        self.stats.grabs.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    fn retrieve(&mut self, frame: &mut Frame, channel: i32) -> CaptureResult<bool> {
        if channel < 0 {
            return Err(CaptureError::RetrieveFailed {
                channel,
                reason: "negative channel".to_string(),
            });
        }
        if !self.has_frame {
            return Ok(false);
        }

        let image = self.render();
        frame.set(if channel == 0 {
            image
        } else {
            DynamicImage::ImageLuma8(image.to_luma8())
        });
        self.stats.retrieves.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    fn get_property(&self, property: CaptureProperty) -> f64 {
        match property {
            CaptureProperty::FrameWidth => self.frame_size.0 as f64,
            CaptureProperty::FrameHeight => self.frame_size.1 as f64,
            CaptureProperty::Fps => MOCK_FPS,
            CaptureProperty::PosFrames => self.grabbed as f64,
            CaptureProperty::PosMsec => self.grabbed as f64 * 1000.0 / MOCK_FPS,
            CaptureProperty::FrameCount => self.total.map(|n| n as f64).unwrap_or(0.0),
            other => self.settings.get(&other).copied().unwrap_or(0.0),
        }
    }

    fn set_property(&mut self, property: CaptureProperty, value: f64) -> bool {
        match property {
            CaptureProperty::FrameWidth if value >= 1.0 => {
                self.frame_size.0 = value as u32;
                true
            }
            CaptureProperty::FrameHeight if value >= 1.0 => {
                self.frame_size.1 = value as u32;
                true
            }
            CaptureProperty::Brightness
            | CaptureProperty::Contrast
            | CaptureProperty::Saturation
            | CaptureProperty::Hue
            | CaptureProperty::Gain
            | CaptureProperty::Exposure => {
                self.settings.insert(property, value);
                true
            }
            _ => false,
        }
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.stats.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn test_mock_backend_new() {
        let backend = MockBackend::new();
        assert_eq!(backend.devices, vec![0]);
        assert!(backend.files.is_empty());
        assert_eq!(backend.kind(), BackendKind::Mock);
    }

    #[test]
    fn test_open_missing_device() {
        let backend = MockBackend::new();
        let result = backend.open_device(1);
        assert!(matches!(result, Err(CaptureError::DeviceUnavailable { index: 1 })));
    }

    #[test]
    fn test_no_devices() {
        let backend = MockBackend::new().with_devices(0);
        assert!(backend.open_device(0).is_err());
    }

    #[test]
    fn test_open_missing_file() {
        let backend = MockBackend::new();
        match backend.open_file(Path::new("/nope.avi")) {
            Err(CaptureError::SourceOpenFailed { path, .. }) => assert_eq!(path, "/nope.avi"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected open to fail"),
        }
    }

    #[test]
    fn test_file_end_of_stream() {
        let backend = MockBackend::new().with_file("clip.avi", 3);
        let mut handle = backend.open_file(Path::new("clip.avi")).unwrap();

        assert_eq!(handle.get_property(CaptureProperty::FrameCount), 3.0);
        for _ in 0..3 {
            assert!(handle.grab().unwrap());
        }
        assert!(!handle.grab().unwrap());
        assert!(!handle.grab().unwrap());
        assert_eq!(handle.get_property(CaptureProperty::PosFrames), 3.0);
    }

    #[test]
    fn test_retrieve_before_grab() {
        let backend = MockBackend::new();
        let mut handle = backend.open_device(0).unwrap();
        let mut frame = Frame::default();
        assert!(!handle.retrieve(&mut frame, 0).unwrap());
        assert!(frame.is_empty());
    }

    #[test]
    fn test_retrieve_channels() {
        let backend = MockBackend::new().with_frame_size(32, 16);
        let mut handle = backend.open_device(0).unwrap();
        assert!(handle.grab().unwrap());

        let mut color = Frame::default();
        assert!(handle.retrieve(&mut color, 0).unwrap());
        assert_eq!(color.dimensions(), (32, 16));
        assert_eq!(color.as_bytes().len(), 32 * 16 * 4);

        let mut gray = Frame::default();
        assert!(handle.retrieve(&mut gray, 1).unwrap());
        assert_eq!(gray.as_bytes().len(), 32 * 16);

        let mut bad = Frame::default();
        assert!(matches!(
            handle.retrieve(&mut bad, -1),
            Err(CaptureError::RetrieveFailed { channel: -1, .. })
        ));
    }

    #[test]
    fn test_frames_encode_sequence_number() {
        let backend = MockBackend::new().with_frame_size(4, 4);
        let mut handle = backend.open_device(0).unwrap();
        let mut frame = Frame::default();

        handle.grab().unwrap();
        handle.retrieve(&mut frame, 0).unwrap();
        assert_eq!(frame.to_rgba8().get_pixel(0, 0)[0], 1);

        handle.grab().unwrap();
        handle.retrieve(&mut frame, 0).unwrap();
        assert_eq!(frame.to_rgba8().get_pixel(0, 0)[0], 2);
    }

    #[test]
    fn test_fault_injection() {
        let backend = MockBackend::new().with_fault_after(2);
        let mut handle = backend.open_device(0).unwrap();
        assert!(handle.grab().unwrap());
        assert!(matches!(handle.grab(), Err(CaptureError::GrabFailed { .. })));
        // Only the configured attempt fails
        assert!(handle.grab().unwrap());
    }

    #[test]
    #[should_panic(expected = "injected panic on grab 1")]
    fn test_panic_injection() {
        let backend = MockBackend::new().with_panic_after(1);
        let mut handle = backend.open_device(0).unwrap();
        let _ = handle.grab();
    }

    #[test]
    fn test_disconnect_ends_device_stream() {
        let backend = MockBackend::new();
        let mut handle = backend.open_device(0).unwrap();
        assert!(handle.grab().unwrap());

        backend.disconnect_all();
        assert!(!handle.grab().unwrap());
    }

    #[test]
    fn test_release_accounting() {
        let backend = MockBackend::new().with_devices(2);
        let stats = backend.stats();

        let first = backend.open_device(0).unwrap();
        let second = backend.open_device(1).unwrap();
        assert_eq!(stats.opened(), 2);
        assert_eq!(stats.released(), 0);

        drop(first);
        assert_eq!(stats.released(), 1);
        drop(second);
        assert_eq!(stats.released(), 2);
    }

    #[test]
    fn test_properties() {
        let backend = MockBackend::new().with_frame_size(320, 240);
        let mut handle = backend.open_device(0).unwrap();

        assert_eq!(handle.get_property(CaptureProperty::FrameWidth), 320.0);
        assert_eq!(handle.get_property(CaptureProperty::FrameHeight), 240.0);
        assert_eq!(handle.get_property(CaptureProperty::Fps), MOCK_FPS);
        assert_eq!(handle.get_property(CaptureProperty::Brightness), 0.0);

        assert!(handle.set_property(CaptureProperty::Brightness, 0.75));
        assert_eq!(handle.get_property(CaptureProperty::Brightness), 0.75);

        assert!(handle.set_property(CaptureProperty::FrameWidth, 160.0));
        assert_eq!(handle.get_property(CaptureProperty::FrameWidth), 160.0);

        assert!(!handle.set_property(CaptureProperty::FrameWidth, 0.0));
        assert!(!handle.set_property(CaptureProperty::FourCc, 1.0));
    }

    #[test]
    fn test_delay_timing() {
        let delay = Duration::from_millis(20);
        let backend = MockBackend::new().with_delay(delay);
        let mut handle = backend.open_device(0).unwrap();

        let start = Instant::now();
        handle.grab().unwrap();
        assert!(start.elapsed() >= delay);
    }
}
