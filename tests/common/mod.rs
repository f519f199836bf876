//! Shared test utilities for integration tests

#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use framegrab::{
    capture::{Frame, MockBackend},
    controller::VideoCapture,
    model::GrabState,
    remote::{FrameServer, FrameSource, LocalFrameSource},
};
use parking_lot::Mutex;
use tokio::{sync::watch, task::JoinHandle};

/// Generous upper bound for anything the capture thread should do promptly
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Polls `condition` every couple of milliseconds until it holds or `timeout`
/// elapses
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Waits until the capture reports `state`
pub fn wait_for_state(capture: &VideoCapture, state: GrabState) -> bool {
    wait_until(SETTLE_TIMEOUT, || capture.state() == state)
}

/// Observer that counts notifications and keeps retrieved frames
#[derive(Clone, Default)]
pub struct FrameRecorder {
    notified: Arc<AtomicU64>,
    frames:   Arc<Mutex<Vec<Frame>>>,
}

impl FrameRecorder {
    /// Subscribes a counting observer
    pub fn count(capture: &VideoCapture) -> Self {
        let recorder = Self::default();
        let notified = Arc::clone(&recorder.notified);
        capture.subscribe(move |_| {
            notified.fetch_add(1, Ordering::SeqCst);
        });
        recorder
    }

    /// Subscribes an observer that also retrieves every frame
    pub fn retrieve(capture: &VideoCapture) -> Self {
        let recorder = Self::default();
        let notified = Arc::clone(&recorder.notified);
        let frames = Arc::clone(&recorder.frames);
        capture.subscribe(move |grabbed| {
            notified.fetch_add(1, Ordering::SeqCst);
            if let Ok(Some(frame)) = grabbed.retrieve(0) {
                frames.lock().push(frame);
            }
        });
        recorder
    }

    pub fn notified(&self) -> u64 {
        self.notified.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.frames.lock().clone()
    }
}

/// Opens camera 0 on `backend`
pub fn open_camera(backend: &MockBackend) -> VideoCapture {
    VideoCapture::from_device(backend, 0).expect("mock camera 0 should open")
}

/// A frame server bound to an ephemeral local port
pub struct TestServer {
    pub address: String,
    shutdown:    watch::Sender<bool>,
    task:        JoinHandle<framegrab::error::CaptureResult<()>>,
}

impl TestServer {
    /// Serves `capture` on 127.0.0.1
    pub async fn start(capture: VideoCapture) -> Self {
        let source: Arc<dyn FrameSource> = Arc::new(LocalFrameSource::new(Arc::new(capture)));
        Self::start_with(source).await
    }

    /// Serves any frame source on 127.0.0.1
    pub async fn start_with(source: Arc<dyn FrameSource>) -> Self {
        let server = FrameServer::bind("127.0.0.1:0", source)
            .await
            .expect("bind frame server");
        let address = server.local_addr().expect("local addr").to_string();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(server.run(shutdown_rx));
        Self {
            address,
            shutdown,
            task,
        }
    }

    /// Signals shutdown and waits for the accept loop to finish
    pub async fn stop(self) {
        self.shutdown.send(true).expect("server still listening");
        tokio::time::timeout(SETTLE_TIMEOUT, self.task)
            .await
            .expect("server shut down in time")
            .expect("server task joined")
            .expect("server exited cleanly");
    }
}
