//! Data models and type definitions for framegrab
//!
//! This module defines the plain value types shared by the capture backends,
//! the capture loop controller and the remote frame delivery channel:
//! - Capture sources and the kind of module that serves them
//! - Flip transforms applied to retrieved frames
//! - Capture property identifiers
//! - Capture loop state and exit reasons

use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

/// Identifies which capture backend produced a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Synthetic backend used for tests and development
    Mock,
    /// Still images, image directories and animated GIFs decoded in-process
    ImageSequence,
    /// Frames fetched from a remote frame server
    Remote,
}

impl BackendKind {
    /// Returns the backend kind as a lowercase string
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Mock => "mock",
            BackendKind::ImageSequence => "image_sequence",
            BackendKind::Remote => "remote",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The type of module a capture was created from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Capture from a camera device
    Camera,
    /// Capture from a file or stream path
    File,
}

/// Where a capture reads its frames from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    /// Camera index, starting from 0
    Device(i32),
    /// File name or stream URL
    File(PathBuf),
}

impl CaptureSource {
    /// Returns the kind of module that serves this source
    pub fn kind(&self) -> SourceKind {
        match self {
            CaptureSource::Device(_) => SourceKind::Camera,
            CaptureSource::File(_) => SourceKind::File,
        }
    }
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureSource::Device(index) => write!(f, "camera {}", index),
            CaptureSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

impl FromStr for CaptureSource {
    type Err = std::convert::Infallible;

    /// Parses a bare integer as a camera index and anything else as a path
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<i32>() {
            Ok(index) => CaptureSource::Device(index),
            Err(_) => CaptureSource::File(PathBuf::from(s)),
        })
    }
}

/// Mirroring applied to a frame after it has been retrieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlipType {
    /// Leave the frame as retrieved
    #[default]
    None,
    /// Mirror around the vertical axis (left/right)
    Horizontal,
    /// Mirror around the horizontal axis (top/bottom)
    Vertical,
    /// Mirror around both axes
    Both,
}

impl FlipType {
    /// Builds a flip type from the two independent axes
    pub fn from_axes(horizontal: bool, vertical: bool) -> Self {
        match (horizontal, vertical) {
            (false, false) => FlipType::None,
            (true, false) => FlipType::Horizontal,
            (false, true) => FlipType::Vertical,
            (true, true) => FlipType::Both,
        }
    }

    /// Whether the horizontal mirror is part of this transform
    pub fn is_horizontal(&self) -> bool {
        matches!(self, FlipType::Horizontal | FlipType::Both)
    }

    /// Whether the vertical mirror is part of this transform
    pub fn is_vertical(&self) -> bool {
        matches!(self, FlipType::Vertical | FlipType::Both)
    }

    /// Returns this transform with the horizontal axis set to `enabled`
    pub fn with_horizontal(self, enabled: bool) -> Self {
        Self::from_axes(enabled, self.is_vertical())
    }

    /// Returns this transform with the vertical axis set to `enabled`
    pub fn with_vertical(self, enabled: bool) -> Self {
        Self::from_axes(self.is_horizontal(), enabled)
    }

    /// Returns the flip type as a lowercase string
    pub fn as_str(&self) -> &'static str {
        match self {
            FlipType::None => "none",
            FlipType::Horizontal => "horizontal",
            FlipType::Vertical => "vertical",
            FlipType::Both => "both",
        }
    }
}

impl fmt::Display for FlipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FlipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(FlipType::None),
            "horizontal" | "h" => Ok(FlipType::Horizontal),
            "vertical" | "v" => Ok(FlipType::Vertical),
            "both" | "hv" => Ok(FlipType::Both),
            other => Err(format!("unknown flip type '{}'", other)),
        }
    }
}

/// Capture property identifiers
///
/// Numeric ids follow the conventional video-capture property table so that
/// backends wrapping a native library can pass them through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureProperty {
    /// Current position in milliseconds
    PosMsec,
    /// 0-based index of the frame to be grabbed next
    PosFrames,
    /// Relative position, 0 = start, 1 = end
    PosAviRatio,
    /// Width of the frames in the stream
    FrameWidth,
    /// Height of the frames in the stream
    FrameHeight,
    /// Frame rate
    Fps,
    /// Four-character code of the codec
    FourCc,
    /// Number of frames in the file
    FrameCount,
    /// Format of the retrieved frames
    Format,
    /// Camera brightness
    Brightness,
    /// Camera contrast
    Contrast,
    /// Camera saturation
    Saturation,
    /// Camera hue
    Hue,
    /// Camera gain
    Gain,
    /// Camera exposure
    Exposure,
}

impl CaptureProperty {
    /// Numeric property id
    pub fn id(&self) -> i32 {
        match self {
            CaptureProperty::PosMsec => 0,
            CaptureProperty::PosFrames => 1,
            CaptureProperty::PosAviRatio => 2,
            CaptureProperty::FrameWidth => 3,
            CaptureProperty::FrameHeight => 4,
            CaptureProperty::Fps => 5,
            CaptureProperty::FourCc => 6,
            CaptureProperty::FrameCount => 7,
            CaptureProperty::Format => 8,
            CaptureProperty::Brightness => 10,
            CaptureProperty::Contrast => 11,
            CaptureProperty::Saturation => 12,
            CaptureProperty::Hue => 13,
            CaptureProperty::Gain => 14,
            CaptureProperty::Exposure => 15,
        }
    }
}

/// State of the background grab loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum GrabState {
    /// No loop is running
    Stopped = 0,
    /// The loop is grabbing frames
    Running = 1,
    /// The loop is blocked on the pause event
    Paused = 2,
    /// The loop has been asked to exit and will do so on its next iteration
    Stopping = 3,
}

impl GrabState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => GrabState::Running,
            2 => GrabState::Paused,
            3 => GrabState::Stopping,
            _ => GrabState::Stopped,
        }
    }
}

impl fmt::Display for GrabState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GrabState::Stopped => "stopped",
            GrabState::Running => "running",
            GrabState::Paused => "paused",
            GrabState::Stopping => "stopping",
        };
        write!(f, "{}", name)
    }
}

/// How a grab loop ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopExit {
    /// A grab failed: end of the stream, or the device went away
    EndOfStream,
    /// `stop()` was requested
    Stopped,
    /// A fault occurred and the registered error handler claimed it
    FaultHandled,
}
