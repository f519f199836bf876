//! Remote frame delivery
//!
//! A consumer that needs frames asks a [`FrameSource`] for them. Whether the
//! frames come from a capture in this process or from a capture on another
//! machine is decided once, when the source is constructed:
//!
//! - [`LocalFrameSource`] - Wraps a [`VideoCapture`](crate::controller::VideoCapture)
//!   in this process
//! - [`RemoteFrameSource`] - Talks to a [`FrameServer`] over TCP
//!
//! # Wire protocol
//!
//! One JSON object per line in each direction:
//!
//! | Request | Response |
//! |---------|----------|
//! | `{"op":"query_frame"}` | `{"frame":{"width":640,"height":480,"png":"<base64>"}}` |
//! | `{"op":"query_small_frame"}` | `{"frame":null}` when no frame is available |
//! | anything else | `{"error":"..."}` |

mod protocol;
mod server;
mod source;

pub use protocol::{Request, Response, WireFrame};
pub use server::FrameServer;
pub use source::{FrameSource, LocalFrameSource, RemoteFrameSource};
