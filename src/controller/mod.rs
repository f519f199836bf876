//! Capture loop controller
//!
//! [`VideoCapture`] owns one capture handle and can drive it from a dedicated
//! background thread. The thread repeatedly grabs frames and notifies the
//! registered observers; callers steer it with [`start`](VideoCapture::start),
//! [`pause`](VideoCapture::pause) and [`stop`](VideoCapture::stop).
//!
//! # State machine
//!
//! ```text
//!            start                 pause
//!  Stopped ─────────▶ Running ─────────────▶ Paused
//!     ▲                 │  ▲ ◀───────────────  │
//!     │            stop │  │      start        │ stop
//!     │   loop exit     ▼  │ start             ▼
//!     └──────────── Stopping ◀─────────────────┘
//! ```
//!
//! A failed grab (end of stream, device gone) moves the loop from `Running`
//! to `Stopping` on its own. Whatever ends the loop, the loop itself makes the
//! final move to `Stopped`.
//!
//! # Examples
//!
//! ```
//! use std::sync::{
//!     Arc,
//!     atomic::{AtomicU64, Ordering},
//! };
//!
//! use framegrab::{capture::MockBackend, controller::VideoCapture, model::LoopExit};
//!
//! let backend = MockBackend::new().with_frame_limit(10);
//! let capture = VideoCapture::from_device(&backend, 0).unwrap();
//!
//! let seen = Arc::new(AtomicU64::new(0));
//! let counter = Arc::clone(&seen);
//! capture.subscribe(move |grabbed| {
//!     let frame = grabbed.retrieve(0).unwrap().unwrap();
//!     assert_eq!(frame.dimensions(), (640, 480));
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! capture.start(None).unwrap();
//! assert_eq!(capture.wait().unwrap().unwrap(), LoopExit::EndOfStream);
//! assert_eq!(seen.load(Ordering::SeqCst), 10);
//! ```

mod observer;
mod state;

use std::{
    panic::{self, AssertUnwindSafe},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use chrono::Utc;
pub use observer::{FrameObserver, GrabbedFrame, ObserverId};
use observer::ObserverRegistry;
use parking_lot::Mutex;
use state::{AtomicGrabState, PauseEvent};
use tracing::{debug, error, info, warn};

use crate::{
    capture::{CaptureBackend, CaptureHandle, Frame},
    config::CaptureConfig,
    error::{CaptureError, CaptureResult},
    model::{BackendKind, CaptureProperty, CaptureSource, FlipType, GrabState, LoopExit, SourceKind},
};

/// Handler for faults raised inside the grab loop
///
/// Returns `true` if it took responsibility for the fault. The loop then ends
/// quietly with [`LoopExit::FaultHandled`]; otherwise it ends with
/// [`CaptureError::LoopFailed`].
pub type ErrorHandler = Arc<dyn Fn(&CaptureError) -> bool + Send + Sync>;

/// State shared between a [`VideoCapture`] and its grab thread
pub(crate) struct Shared {
    handle:        Mutex<Option<Box<dyn CaptureHandle>>>,
    state:         AtomicGrabState,
    /// Serializes start/stop with the loop's final move to `Stopped`
    control:       Mutex<()>,
    pause_event:   PauseEvent,
    flip:          Mutex<FlipType>,
    observers:     ObserverRegistry,
    error_handler: Mutex<Option<ErrorHandler>>,
    sequence:      AtomicU64,
    grab_interval: Duration,
}

impl Shared {
    fn grab(&self) -> CaptureResult<bool> {
        // Numbered under the handle lock so the sequence names the frame the
        // backend now holds
        let sequence = {
            let mut handle = self.handle.lock();
            let Some(handle) = handle.as_mut() else {
                return Ok(false);
            };
            if !handle.grab()? {
                return Ok(false);
            }
            self.sequence.fetch_add(1, Ordering::SeqCst) + 1
        };

        let frame = GrabbedFrame {
            shared: self,
            sequence,
            timestamp: Utc::now(),
        };
        self.observers.notify(&frame);
        Ok(true)
    }

    pub(crate) fn retrieve(&self, frame: &mut Frame, channel: i32) -> CaptureResult<bool> {
        self.retrieve_grabbed(frame, channel, None)
    }

    /// Decodes the current frame; with `expected`, only if no later grab has
    /// replaced it
    pub(crate) fn retrieve_grabbed(
        &self,
        frame: &mut Frame,
        channel: i32,
        expected: Option<u64>,
    ) -> CaptureResult<bool> {
        let retrieved = {
            let mut handle = self.handle.lock();
            let Some(handle) = handle.as_mut() else {
                return Err(CaptureError::HandleReleased);
            };
            if expected.is_some_and(|sequence| sequence != self.sequence.load(Ordering::SeqCst)) {
                return Ok(false);
            }
            handle.retrieve(frame, channel)?
        };

        if retrieved {
            self.apply_flip(frame);
        }
        Ok(retrieved)
    }

    fn apply_flip(&self, frame: &mut Frame) {
        let flip = *self.flip.lock();
        if flip != FlipType::None {
            frame.flip(flip);
        }
    }

    /// One grab attempt from the loop; panics become faults
    fn poll_once(&self) -> CaptureResult<bool> {
        panic::catch_unwind(AssertUnwindSafe(|| self.grab()))
            .unwrap_or_else(|payload| Err(CaptureError::from_panic("capture loop", payload)))
    }

    fn resolve_fault(&self, fault: CaptureError) -> CaptureResult<LoopExit> {
        let handler = self.error_handler.lock().clone();
        let handled = handler.is_some_and(|handler| {
            panic::catch_unwind(AssertUnwindSafe(|| handler(&fault))).unwrap_or(false)
        });

        if handled {
            warn!("Capture fault handled by error handler: {}", fault);
            Ok(LoopExit::FaultHandled)
        } else {
            error!("Capture loop failed: {}", fault);
            Err(CaptureError::loop_failed(fault))
        }
    }
}

fn run_loop(shared: Arc<Shared>) -> CaptureResult<LoopExit> {
    debug!("Capture loop running");
    let mut exit = LoopExit::Stopped;

    let fault = loop {
        match shared.state.load() {
            GrabState::Running => match shared.poll_once() {
                Ok(true) => {
                    if !shared.grab_interval.is_zero() {
                        thread::sleep(shared.grab_interval);
                    }
                }
                Ok(false) => {
                    // Capture released or no more frames: end of the stream
                    if shared.state.transition(GrabState::Running, GrabState::Stopping) {
                        debug!("No more frames to grab; stopping");
                        exit = LoopExit::EndOfStream;
                    }
                }
                Err(fault) => break fault,
            },
            GrabState::Paused => shared.pause_event.wait(),
            GrabState::Stopping | GrabState::Stopped => {
                let _control = shared.control.lock();
                if shared.state.load() == GrabState::Running {
                    // start() was called while winding down
                    exit = LoopExit::Stopped;
                    continue;
                }
                shared.state.store(GrabState::Stopped);
                info!("Capture loop exited: {:?}", exit);
                return Ok(exit);
            }
        }
    };

    let outcome = shared.resolve_fault(fault);
    let _control = shared.control.lock();
    shared.state.store(GrabState::Stopped);
    outcome
}

/// Captures frames from a camera or a file
///
/// All methods take `&self`; a `VideoCapture` can be shared between threads
/// behind an `Arc`. Access to the underlying handle is serialized, so a
/// `grab()` issued by a caller never overlaps one issued by the grab loop.
pub struct VideoCapture {
    shared:      Arc<Shared>,
    worker:      Mutex<Option<JoinHandle<CaptureResult<LoopExit>>>>,
    source:      CaptureSource,
    backend:     BackendKind,
    thread_name: String,
}

impl VideoCapture {
    /// Opens a capture with the default configuration
    ///
    /// # Errors
    ///
    /// Fails immediately, without starting anything, if the backend cannot
    /// create a handle for `source`.
    pub fn open(backend: &dyn CaptureBackend, source: &CaptureSource) -> CaptureResult<Self> {
        Self::open_with_config(backend, source, CaptureConfig::default())
    }

    /// Opens a capture with an explicit configuration
    pub fn open_with_config(
        backend: &dyn CaptureBackend,
        source: &CaptureSource,
        config: CaptureConfig,
    ) -> CaptureResult<Self> {
        let handle = backend.open(source).inspect_err(|e| {
            warn!("Failed to open {} with {} backend: {}", source, backend.kind(), e);
        })?;
        info!("Opened {} with {} backend", source, backend.kind());
        Ok(Self::from_handle(handle, source.clone(), backend.kind(), config))
    }

    /// Opens the camera at `index`
    pub fn from_device(backend: &dyn CaptureBackend, index: i32) -> CaptureResult<Self> {
        Self::open(backend, &CaptureSource::Device(index))
    }

    /// Opens a file or stream
    pub fn from_file(backend: &dyn CaptureBackend, path: impl AsRef<Path>) -> CaptureResult<Self> {
        Self::open(backend, &CaptureSource::File(path.as_ref().to_path_buf()))
    }

    /// Wraps an already-open handle
    pub fn from_handle(
        handle: Box<dyn CaptureHandle>,
        source: CaptureSource,
        backend: BackendKind,
        config: CaptureConfig,
    ) -> Self {
        let shared = Shared {
            handle:        Mutex::new(Some(handle)),
            state:         AtomicGrabState::new(GrabState::Stopped),
            control:       Mutex::new(()),
            pause_event:   PauseEvent::default(),
            flip:          Mutex::new(config.flip),
            observers:     ObserverRegistry::default(),
            error_handler: Mutex::new(None),
            sequence:      AtomicU64::new(0),
            grab_interval: config.grab_interval,
        };
        Self {
            shared: Arc::new(shared),
            worker: Mutex::new(None),
            source,
            backend,
            thread_name: config.thread_name,
        }
    }

    /// Starts or resumes the background grab loop
    ///
    /// - `Stopped`: spawns the grab thread. The stored error handler is
    ///   replaced by `handler`, including by `None`.
    /// - `Paused`: resumes the loop.
    /// - `Stopping`: the loop has not exited yet and simply keeps running.
    /// - `Running`: no-op.
    ///
    /// Outside of `Stopped`, a `Some` handler replaces the stored one and
    /// `None` keeps it.
    ///
    /// Once started, use [`subscribe`](Self::subscribe) to be told about
    /// grabbed frames.
    pub fn start(&self, handler: Option<ErrorHandler>) -> CaptureResult<()> {
        let _control = self.shared.control.lock();

        match self.shared.state.load() {
            GrabState::Running => {
                debug!("Capture already running");
                if let Some(handler) = handler {
                    *self.shared.error_handler.lock() = Some(handler);
                }
            }
            GrabState::Paused => {
                if let Some(handler) = handler {
                    *self.shared.error_handler.lock() = Some(handler);
                }
                self.shared.state.store(GrabState::Running);
                self.shared.pause_event.set();
                debug!("Capture resumed");
            }
            GrabState::Stopping => {
                if let Some(handler) = handler {
                    *self.shared.error_handler.lock() = Some(handler);
                }
                self.shared.state.store(GrabState::Running);
                debug!("Capture restarted before the loop exited");
            }
            GrabState::Stopped => {
                let mut worker = self.worker.lock();
                if let Some(previous) = worker.take() {
                    // Already past its final transition; joining only reaps it
                    match previous.join() {
                        Ok(Ok(exit)) => debug!("Reaped previous capture loop: {:?}", exit),
                        Ok(Err(e)) => warn!("Previous capture loop had failed: {}", e),
                        Err(_) => warn!("Previous capture loop panicked"),
                    }
                }

                *self.shared.error_handler.lock() = handler;
                self.shared.state.store(GrabState::Running);

                let shared = Arc::clone(&self.shared);
                let spawned = thread::Builder::new()
                    .name(self.thread_name.clone())
                    .spawn(move || run_loop(shared));
                match spawned {
                    Ok(handle) => *worker = Some(handle),
                    Err(e) => {
                        self.shared.state.store(GrabState::Stopped);
                        return Err(e.into());
                    }
                }
                info!("Capture started on {}", self.source);
            }
        }
        Ok(())
    }

    /// Pauses the grab loop if it is running
    pub fn pause(&self) {
        if self.shared.state.transition(GrabState::Running, GrabState::Paused) {
            debug!("Capture paused");
        }
    }

    /// Asks the grab loop to exit
    ///
    /// The loop notices at its next iteration; a grab in progress is not
    /// interrupted. A paused loop is woken so that it can exit.
    pub fn stop(&self) {
        let _control = self.shared.control.lock();
        if self.shared.state.transition(GrabState::Running, GrabState::Stopping) {
            debug!("Capture stopping");
        } else if self.shared.state.transition(GrabState::Paused, GrabState::Stopping) {
            self.shared.pause_event.set();
            debug!("Capture stopping from pause");
        }
    }

    /// Waits for the current grab loop to exit and reports how it ended
    ///
    /// Returns `None` if no loop has been started since the last `wait`.
    /// Blocks indefinitely while the loop is running or paused.
    ///
    /// Called on the grab thread itself (from an observer, or when an
    /// observer drops the last reference to the capture), it returns `None`
    /// without blocking and the loop finishes on its own.
    pub fn wait(&self) -> Option<CaptureResult<LoopExit>> {
        let handle = self.worker.lock().take()?;
        if handle.thread().id() == thread::current().id() {
            debug!("Not waiting for the capture loop from its own thread");
            return None;
        }
        Some(
            handle
                .join()
                .unwrap_or_else(|payload| Err(CaptureError::from_panic("capture loop", payload))),
        )
    }

    /// Grabs one frame synchronously
    ///
    /// Observers are notified only when the grab succeeds. Returns
    /// `Ok(false)` at the end of the stream or once the capture has been
    /// released.
    pub fn grab(&self) -> CaptureResult<bool> {
        self.shared.grab()
    }

    /// Decodes the most recently grabbed frame into `frame`
    ///
    /// The configured flip is applied to the decoded frame. Fails with
    /// [`CaptureError::HandleReleased`] once the capture has been released.
    pub fn retrieve(&self, frame: &mut Frame, channel: i32) -> CaptureResult<bool> {
        self.shared.retrieve(frame, channel)
    }

    /// Grabs and decodes the next frame into `frame` in one step
    ///
    /// Unlike [`grab`](Self::grab), observers are not notified.
    pub fn read(&self, frame: &mut Frame) -> CaptureResult<bool> {
        let retrieved = {
            let mut handle = self.shared.handle.lock();
            let Some(handle) = handle.as_mut() else {
                return Ok(false);
            };
            if !handle.grab()? {
                return Ok(false);
            }
            self.shared.sequence.fetch_add(1, Ordering::SeqCst);
            handle.retrieve(frame, 0)?
        };

        if retrieved {
            self.shared.apply_flip(frame);
        }
        Ok(retrieved)
    }

    /// Grabs and returns the next frame, or `None` when there are no more
    pub fn query_frame(&self) -> CaptureResult<Option<Frame>> {
        if !self.grab()? {
            return Ok(None);
        }
        let mut frame = Frame::default();
        if self.retrieve(&mut frame, 0)? {
            Ok(Some(frame))
        } else {
            Ok(None)
        }
    }

    /// Like [`query_frame`](Self::query_frame), at half width and half height
    pub fn query_small_frame(&self) -> CaptureResult<Option<Frame>> {
        Ok(self
            .query_frame()?
            .filter(|frame| !frame.is_empty())
            .map(|frame| frame.pyr_down()))
    }

    /// Reads a capture property; 0.0 if unsupported or released
    pub fn get_property(&self, property: CaptureProperty) -> f64 {
        self.shared
            .handle
            .lock()
            .as_ref()
            .map(|handle| handle.get_property(property))
            .unwrap_or(0.0)
    }

    /// Writes a capture property; `false` if unsupported or released
    pub fn set_property(&self, property: CaptureProperty, value: f64) -> bool {
        self.shared
            .handle
            .lock()
            .as_mut()
            .is_some_and(|handle| handle.set_property(property, value))
    }

    /// Frame width reported by the source
    pub fn width(&self) -> u32 {
        self.get_property(CaptureProperty::FrameWidth) as u32
    }

    /// Frame height reported by the source
    pub fn height(&self) -> u32 {
        self.get_property(CaptureProperty::FrameHeight) as u32
    }

    /// Flip applied to retrieved frames
    pub fn flip_type(&self) -> FlipType {
        *self.shared.flip.lock()
    }

    /// Sets the flip applied to retrieved frames
    pub fn set_flip_type(&self, flip: FlipType) {
        *self.shared.flip.lock() = flip;
    }

    /// Whether retrieved frames are mirrored left/right
    pub fn flip_horizontal(&self) -> bool {
        self.flip_type().is_horizontal()
    }

    /// Turns the left/right mirror on or off, keeping the vertical setting
    pub fn set_flip_horizontal(&self, enabled: bool) {
        let mut flip = self.shared.flip.lock();
        *flip = flip.with_horizontal(enabled);
    }

    /// Whether retrieved frames are mirrored top/bottom
    pub fn flip_vertical(&self) -> bool {
        self.flip_type().is_vertical()
    }

    /// Turns the top/bottom mirror on or off, keeping the horizontal setting
    pub fn set_flip_vertical(&self, enabled: bool) {
        let mut flip = self.shared.flip.lock();
        *flip = flip.with_vertical(enabled);
    }

    /// Registers a callback for grabbed frames
    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&GrabbedFrame<'_>) + Send + Sync + 'static,
    {
        self.shared.observers.subscribe(observer)
    }

    /// Removes a callback; returns `false` if it was not registered
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.shared.observers.unsubscribe(id)
    }

    /// Number of registered callbacks
    pub fn observer_count(&self) -> usize {
        self.shared.observers.len()
    }

    /// Current state of the grab loop
    pub fn state(&self) -> GrabState {
        self.shared.state.load()
    }

    /// Whether the grab loop is actively grabbing
    pub fn is_running(&self) -> bool {
        self.state() == GrabState::Running
    }

    /// Where this capture reads from
    pub fn source(&self) -> &CaptureSource {
        &self.source
    }

    /// Whether this capture reads from a camera or a file
    pub fn source_kind(&self) -> SourceKind {
        self.source.kind()
    }

    /// Backend that opened this capture
    pub fn backend_kind(&self) -> BackendKind {
        self.backend
    }

    /// Number of frames grabbed so far, by the loop, `grab()` or `read()`
    pub fn frames_grabbed(&self) -> u64 {
        self.shared.sequence.load(Ordering::SeqCst)
    }

    /// Stops the grab loop, waits for it and releases the capture handle
    ///
    /// After release, `grab()` returns `Ok(false)`, `retrieve()` fails and
    /// properties read as 0.
    /// Calling it again does nothing. Returns the loop's outcome if a loop
    /// had not been waited on yet.
    pub fn release(&self) -> Option<CaptureResult<LoopExit>> {
        self.stop();
        let outcome = self.wait();
        if self.shared.handle.lock().take().is_some() {
            info!("Released capture on {}", self.source);
        }
        outcome
    }
}

impl Drop for VideoCapture {
    fn drop(&mut self) {
        if let Some(Err(e)) = self.release() {
            warn!("Capture loop ended with an error during release: {}", e);
        }
    }
}

impl std::fmt::Debug for VideoCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoCapture")
            .field("source", &self.source)
            .field("backend", &self.backend)
            .field("state", &self.state())
            .field("flip", &self.flip_type())
            .field("observers", &self.observer_count())
            .finish()
    }
}
