//! Frame observer registration
//!
//! Observers are plain callbacks invoked after every successful grab, in the
//! order they were registered, on the thread that performed the grab. No
//! internal lock is held while they run, so an observer may retrieve the
//! frame, subscribe or unsubscribe, or pause and stop the capture.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::Shared;
use crate::{capture::Frame, error::CaptureResult};

/// Callback invoked for every grabbed frame
pub type FrameObserver = dyn Fn(&GrabbedFrame<'_>) + Send + Sync;

/// Token returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Notification that a frame has been grabbed
///
/// The frame itself is not decoded until an observer asks for it with
/// [`retrieve`](GrabbedFrame::retrieve).
pub struct GrabbedFrame<'a> {
    pub(super) shared:    &'a Shared,
    pub(super) sequence:  u64,
    pub(super) timestamp: DateTime<Utc>,
}

impl GrabbedFrame<'_> {
    /// 1-based count of successful grabs on this capture
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// When the grab completed
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Decodes the grabbed frame into a newly allocated buffer
    ///
    /// The configured flip is applied. Returns `None` if the backend had no
    /// frame to decode, or if another grab has replaced this frame since the
    /// notification was sent.
    pub fn retrieve(&self, channel: i32) -> CaptureResult<Option<Frame>> {
        let mut frame = Frame::default();
        if self
            .shared
            .retrieve_grabbed(&mut frame, channel, Some(self.sequence))?
        {
            Ok(Some(frame))
        } else {
            Ok(None)
        }
    }
}

impl fmt::Debug for GrabbedFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrabbedFrame")
            .field("sequence", &self.sequence)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    next_id:   AtomicU64,
    observers: RwLock<Vec<(ObserverId, Arc<FrameObserver>)>>,
}

impl ObserverRegistry {
    pub(crate) fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&GrabbedFrame<'_>) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, Arc::new(observer)));
        id
    }

    pub(crate) fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub(crate) fn notify(&self, frame: &GrabbedFrame<'_>) {
        let snapshot: Vec<Arc<FrameObserver>> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in snapshot {
            observer(frame);
        }
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}
