//! Runtime configuration for capture controllers and the frame channel.
//!
//! Defaults are defined as constants and can be overridden at runtime via
//! environment variables:
//!
//! | Environment Variable | Default | Description |
//! |---------------------|---------|-------------|
//! | `FRAMEGRAB_GRAB_INTERVAL_MS` | 0 | Sleep between successful grabs in the background loop |
//! | `FRAMEGRAB_REMOTE_TIMEOUT_MS` | 5000 | Round-trip timeout for remote frame requests |
//! | `FRAMEGRAB_FLIP` | none | Flip applied to retrieved frames (none, horizontal, vertical, both) |
//! | `FRAMEGRAB_THREAD_NAME` | framegrab-capture | Name of the background grab thread |
//!
//! Invalid values fall back to the defaults.

use std::time::Duration;

use tracing::warn;

use crate::model::FlipType;

/// Default pause between successful grabs. Zero grabs as fast as the source
/// delivers frames.
pub const GRAB_INTERVAL_MS: u64 = 0;

/// Default round-trip timeout for a remote frame request.
///
/// A request includes one grab on the server plus PNG encoding and transfer
/// of the frame, so it is sized for a full-resolution frame on a LAN.
pub const REMOTE_TIMEOUT_MS: u64 = 5000;

/// Default name of the background grab thread.
pub const CAPTURE_THREAD_NAME: &str = "framegrab-capture";

/// Configuration shared by a capture controller and its frame sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Sleep between successful grabs in the background loop
    pub grab_interval:  Duration,
    /// Round-trip timeout for remote frame requests
    pub remote_timeout: Duration,
    /// Flip applied to retrieved frames when a capture is created
    pub flip:           FlipType,
    /// Name given to the background grab thread
    pub thread_name:    String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            grab_interval:  Duration::from_millis(GRAB_INTERVAL_MS),
            remote_timeout: Duration::from_millis(REMOTE_TIMEOUT_MS),
            flip:           FlipType::None,
            thread_name:    CAPTURE_THREAD_NAME.to_string(),
        }
    }
}

impl CaptureConfig {
    /// Builds a configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from a custom environment provider
    ///
    /// This allows for easier testing by injecting mock environment variables.
    pub fn from_env_with<F>(env_provider: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let grab_interval = millis_from_env(&env_provider, "FRAMEGRAB_GRAB_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.grab_interval);

        let remote_timeout = millis_from_env(&env_provider, "FRAMEGRAB_REMOTE_TIMEOUT_MS")
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.remote_timeout);

        let flip = match env_provider("FRAMEGRAB_FLIP") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!("Ignoring FRAMEGRAB_FLIP: {}", e);
                defaults.flip
            }),
            None => defaults.flip,
        };

        let thread_name = env_provider("FRAMEGRAB_THREAD_NAME")
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(defaults.thread_name);

        Self {
            grab_interval,
            remote_timeout,
            flip,
            thread_name,
        }
    }

    /// Sets the pause between successful grabs
    pub fn with_grab_interval(mut self, interval: Duration) -> Self {
        self.grab_interval = interval;
        self
    }

    /// Sets the remote request timeout
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Sets the initial flip transform
    pub fn with_flip(mut self, flip: FlipType) -> Self {
        self.flip = flip;
        self
    }

    /// Sets the name of the background grab thread
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

fn millis_from_env<F>(env_provider: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    env_provider(key).and_then(|s| s.trim().parse().ok())
}
