//! Error types for frame capture operations
//!
//! This module defines the error taxonomy for the capture backends, the
//! capture loop controller and the remote frame channel. Each error carries
//! enough context to explain what went wrong and provides a remediation hint
//! with suggested next steps.
//!
//! Errors fall into three broad classes:
//!
//! - **Construction failures** ([`CaptureError::DeviceUnavailable`],
//!   [`CaptureError::SourceOpenFailed`]) are raised synchronously when a
//!   capture handle cannot be created.
//! - **End of stream** is not an error at all: a grab that returns `false`
//!   ends the capture loop normally.
//! - **In-loop faults** ([`CaptureError::GrabFailed`],
//!   [`CaptureError::Panicked`], ...) are offered to the error handler passed
//!   to `start()`; unhandled ones surface as [`CaptureError::LoopFailed`].

use serde::{Deserialize, Serialize};

use crate::model::BackendKind;

/// Result type alias for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// High-level error category for filtering and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Source (camera, file, server) not found or could not be opened
    NotFound,
    /// Feature or backend not available
    Unavailable,
    /// Invalid parameters or configuration
    InvalidInput,
    /// Operation timed out
    Timeout,
    /// Fault inside the capture pipeline
    CaptureFault,
    /// Remote peer or wire protocol problem
    Remote,
    /// I/O or system error
    SystemError,
    /// Encoding or image processing error
    ProcessingError,
}

/// Error type for frame capture operations
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The camera at the given index could not be opened
    #[error("Unable to create capture from camera {index}")]
    DeviceUnavailable {
        /// Camera index that failed to open
        index: i32,
    },

    /// A file or stream could not be opened
    #[error("Unable to create capture from {path}: {reason}")]
    SourceOpenFailed {
        /// File name or stream URL
        path:   String,
        /// Why the source could not be opened
        reason: String,
    },

    /// The capture handle has already been released
    #[error("Capture handle has been released")]
    HandleReleased,

    /// The backend reported an unexpected fault while grabbing a frame
    #[error("Frame grab failed: {reason}")]
    GrabFailed {
        /// Backend-specific description of the fault
        reason: String,
    },

    /// The backend could not decode the grabbed frame
    #[error("Failed to retrieve frame on channel {channel}: {reason}")]
    RetrieveFailed {
        /// Channel requested from the backend
        channel: i32,
        /// Backend-specific description of the fault
        reason:  String,
    },

    /// The background grab loop terminated because of an unhandled fault
    #[error("Capture error: {source}")]
    LoopFailed {
        /// The fault that terminated the loop
        #[source]
        source: Box<CaptureError>,
    },

    /// A panic was caught inside the capture pipeline
    #[error("Panic in {context}: {message}")]
    Panicked {
        /// Where the panic was caught
        context: String,
        /// Panic payload, if it was a string
        message: String,
    },

    /// Invalid parameter provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// Name of the invalid parameter
        parameter: String,
        /// Reason why it's invalid
        reason:    String,
    },

    /// Requested capability is not supported by this backend
    #[error("Feature '{feature}' is not supported by backend {backend}")]
    NotSupported {
        /// Name of the unsupported feature
        feature: String,
        /// Backend that doesn't support the feature
        backend: BackendKind,
    },

    /// The remote frame server could not be reached
    #[error("Remote frame server at {address} is unavailable: {reason}")]
    RemoteUnavailable {
        /// Address that was dialled
        address: String,
        /// Connection failure reason
        reason:  String,
    },

    /// A message on the remote frame channel could not be understood
    #[error("Frame protocol error: {reason}")]
    ProtocolError {
        /// What was wrong with the message
        reason: String,
    },

    /// A message on the remote frame channel exceeded the size limit
    #[error("Frame protocol message exceeds {limit} bytes")]
    MessageTooLarge {
        /// Largest accepted message, in bytes
        limit: usize,
    },

    /// The remote frame server reported a failure
    #[error("Remote frame server error: {message}")]
    RemoteError {
        /// Error message sent by the server
        message: String,
    },

    /// Operation timed out
    #[error("Capture operation timed out after {duration_ms}ms")]
    CaptureTimeout {
        /// Timeout duration in milliseconds
        duration_ms: u64,
    },

    /// Image encoding failed
    #[error("Failed to encode image as {format}: {reason}")]
    EncodingFailed {
        /// Image format that failed
        format: String,
        /// Reason for encoding failure
        reason: String,
    },

    /// I/O error occurred
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Image processing error
    #[error("Image processing error: {0}")]
    ImageError(String),
}

impl CaptureError {
    /// Wraps an unhandled in-loop fault
    pub fn loop_failed(source: CaptureError) -> Self {
        CaptureError::LoopFailed {
            source: Box::new(source),
        }
    }

    /// Builds a [`CaptureError::Panicked`] from a caught panic payload
    pub fn from_panic(context: &str, payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        CaptureError::Panicked {
            context: context.to_string(),
            message,
        }
    }

    /// Returns an actionable remediation hint for this error
    ///
    /// # Examples
    ///
    /// ```
    /// use framegrab::error::CaptureError;
    ///
    /// let error = CaptureError::DeviceUnavailable { index: 0 };
    /// assert!(error.remediation_hint().contains("camera"));
    /// ```
    pub fn remediation_hint(&self) -> &str {
        match self {
            CaptureError::DeviceUnavailable { .. } => {
                "Check that a camera is connected at this index and is not in use by another \
                 process. Indices start at 0."
            }
            CaptureError::SourceOpenFailed { .. } => {
                "Check that the path exists, is readable, and points to a supported image, \
                 animated GIF, or directory of images."
            }
            CaptureError::HandleReleased => {
                "The capture was released. Create a new capture to continue grabbing frames."
            }
            CaptureError::GrabFailed { .. } => {
                "The capture device reported a fault. Reconnect the device and call start() \
                 again; there is no automatic retry."
            }
            CaptureError::RetrieveFailed { .. } => {
                "Call grab() successfully before retrieve(), and request a channel the backend \
                 supports."
            }
            CaptureError::LoopFailed { .. } => {
                "The grab loop stopped on an unhandled fault. Pass an error handler to start() \
                 to absorb faults, or call start() again to resume grabbing."
            }
            CaptureError::Panicked { .. } => {
                "A frame observer or backend panicked. Observers must not panic; inspect the \
                 message for the failing component."
            }
            CaptureError::InvalidParameter { parameter, .. } => match parameter.as_str() {
                "flip" => "Flip must be one of: none, horizontal, vertical, both.",
                "channel" => "Use channel 0 for color frames.",
                _ => "Check the parameter value against the API documentation.",
            },
            CaptureError::NotSupported { .. } => {
                "This backend does not support the requested feature. Use a different backend \
                 or capture source."
            }
            CaptureError::RemoteUnavailable { .. } => {
                "Ensure the frame server is running (framegrab serve) and the address and port \
                 are reachable."
            }
            CaptureError::ProtocolError { .. } => {
                "Client and server disagree on the frame protocol. Make sure both sides run the \
                 same framegrab version."
            }
            CaptureError::MessageTooLarge { .. } => {
                "The peer sent an oversized or unterminated message. Messages are single JSON \
                 lines; the connection is closed after this error."
            }
            CaptureError::RemoteError { .. } => {
                "The remote capture failed. Check the server logs for the underlying error."
            }
            CaptureError::CaptureTimeout { .. } => {
                "The operation took too long. Increase FRAMEGRAB_REMOTE_TIMEOUT_MS or check the \
                 network path to the frame server."
            }
            CaptureError::EncodingFailed { format, .. } => match format.as_str() {
                "jpeg" | "jpg" => {
                    "JPEG encoding failed. Try reducing quality parameter or using PNG format."
                }
                _ => "Image encoding failed. Try a different format (PNG, WebP, or JPEG).",
            },
            CaptureError::IoError(_) => {
                "An I/O error occurred. Check file permissions, disk space, and system resources."
            }
            CaptureError::ImageError(_) => {
                "Image processing failed. Ensure the image data is valid and the requested \
                 operations are supported."
            }
        }
    }

    /// Returns the high-level category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            CaptureError::DeviceUnavailable { .. } | CaptureError::SourceOpenFailed { .. } => {
                ErrorCategory::NotFound
            }
            CaptureError::HandleReleased | CaptureError::NotSupported { .. } => {
                ErrorCategory::Unavailable
            }
            CaptureError::GrabFailed { .. }
            | CaptureError::RetrieveFailed { .. }
            | CaptureError::LoopFailed { .. }
            | CaptureError::Panicked { .. } => ErrorCategory::CaptureFault,
            CaptureError::InvalidParameter { .. } => ErrorCategory::InvalidInput,
            CaptureError::RemoteUnavailable { .. }
            | CaptureError::ProtocolError { .. }
            | CaptureError::MessageTooLarge { .. }
            | CaptureError::RemoteError { .. } => ErrorCategory::Remote,
            CaptureError::CaptureTimeout { .. } => ErrorCategory::Timeout,
            CaptureError::IoError(_) => ErrorCategory::SystemError,
            CaptureError::EncodingFailed { .. } | CaptureError::ImageError(_) => {
                ErrorCategory::ProcessingError
            }
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            CaptureError::GrabFailed { .. }
            | CaptureError::RemoteUnavailable { .. }
            | CaptureError::CaptureTimeout { .. }
            | CaptureError::IoError(_) => true,
            CaptureError::LoopFailed { source } => source.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_device_unavailable_message() {
        let error = CaptureError::DeviceUnavailable { index: 3 };
        assert_eq!(error.to_string(), "Unable to create capture from camera 3");
        assert_eq!(error.category(), ErrorCategory::NotFound);
        assert!(!error.is_transient());
    }

    #[test]
    fn test_source_open_failed_message() {
        let error = CaptureError::SourceOpenFailed {
            path:   "/missing/clip.gif".to_string(),
            reason: "No such file or directory".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.contains("/missing/clip.gif"));
        assert!(msg.contains("No such file"));
        assert!(error.remediation_hint().contains("path exists"));
    }

    #[test]
    fn test_loop_failed_wraps_source() {
        let error = CaptureError::loop_failed(CaptureError::GrabFailed {
            reason: "usb reset".to_string(),
        });

        assert!(error.to_string().starts_with("Capture error"));
        assert!(error.to_string().contains("usb reset"));
        let source = error.source().expect("loop failure should expose its cause");
        assert!(source.to_string().contains("usb reset"));
        assert_eq!(error.category(), ErrorCategory::CaptureFault);
        assert!(error.is_transient());
    }

    #[test]
    fn test_from_panic_str_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("observer exploded");
        let error = CaptureError::from_panic("frame observer", payload);
        match error {
            CaptureError::Panicked { context, message } => {
                assert_eq!(context, "frame observer");
                assert_eq!(message, "observer exploded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_panic_string_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("formatted 42"));
        let error = CaptureError::from_panic("grab", payload);
        assert!(error.to_string().contains("formatted 42"));
    }

    #[test]
    fn test_from_panic_opaque_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u32);
        let error = CaptureError::from_panic("grab", payload);
        assert!(error.to_string().contains("non-string panic payload"));
    }

    #[test]
    fn test_invalid_parameter_hints() {
        let flip = CaptureError::InvalidParameter {
            parameter: "flip".to_string(),
            reason:    "unknown".to_string(),
        };
        assert!(flip.remediation_hint().contains("horizontal"));

        let other = CaptureError::InvalidParameter {
            parameter: "port".to_string(),
            reason:    "out of range".to_string(),
        };
        assert!(other.remediation_hint().contains("API documentation"));
        assert_eq!(other.category(), ErrorCategory::InvalidInput);
    }

    #[test]
    fn test_not_supported_message() {
        let error = CaptureError::NotSupported {
            feature: "device_capture".to_string(),
            backend: BackendKind::ImageSequence,
        };
        assert!(error.to_string().contains("image_sequence"));
        assert_eq!(error.category(), ErrorCategory::Unavailable);
    }

    #[test]
    fn test_remote_errors_category() {
        let unavailable = CaptureError::RemoteUnavailable {
            address: "127.0.0.1:9".to_string(),
            reason:  "connection refused".to_string(),
        };
        assert_eq!(unavailable.category(), ErrorCategory::Remote);
        assert!(unavailable.is_transient());

        let protocol = CaptureError::ProtocolError {
            reason: "bad json".to_string(),
        };
        assert_eq!(protocol.category(), ErrorCategory::Remote);
        assert!(!protocol.is_transient());

        let oversized = CaptureError::MessageTooLarge { limit: 4096 };
        assert_eq!(oversized.to_string(), "Frame protocol message exceeds 4096 bytes");
        assert_eq!(oversized.category(), ErrorCategory::Remote);
    }

    #[test]
    fn test_timeout_is_transient() {
        let error = CaptureError::CaptureTimeout { duration_ms: 5000 };
        assert!(error.to_string().contains("5000ms"));
        assert!(error.is_transient());
        assert_eq!(error.category(), ErrorCategory::Timeout);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error: CaptureError = io_error.into();
        assert!(matches!(error, CaptureError::IoError(_)));
        assert!(error.remediation_hint().contains("I/O error"));
    }

    #[test]
    fn test_category_serialization() {
        assert_eq!(
            serde_json::to_string(&ErrorCategory::CaptureFault).unwrap(),
            r#""capture_fault""#
        );
    }
}
