//! framegrab: background frame grabbing for camera and video sources
//!
//! This library wraps a camera or video source behind [`controller::VideoCapture`],
//! which can grab frames synchronously or from a dedicated background thread
//! that notifies subscribed observers. Frames can also be served to and
//! fetched from another process over TCP (see [`remote`]).

pub mod capture;
pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod remote;
pub mod util;
