//! # Error Taxonomy
//!
//! The failure modes a caller of this crate can observe. Background
//! workers (audio reader, detector, snapshot publisher) report through
//! the `on_error` callback instead of returning a `Result`; this type is
//! what they report and what entry points like `start_practice` return
//! directly.

use thiserror::Error;

/// Errors surfaced by the practice/tuning core, either directly from a
/// caller-facing entry point or via `on_error` from a background worker.
#[derive(Debug, Error, Clone)]
pub enum PracticeError {
    /// Device enumeration came back empty, or a named device could not be
    /// resolved to a handle.
    #[error("no matching audio device: {0}")]
    NoDevice(String),

    /// A line was resolved but no supported stream format worked after the
    /// retry budget was exhausted.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A transient failure reading from the audio line. Non-fatal; the
    /// detector continues on the next read.
    #[error("audio frame read failed: {0}")]
    FrameReadError(String),

    /// `start_practice` was called while a session was already running.
    #[error("practice session already active")]
    SessionAlreadyActive,

    /// A numeric config field was out of its valid range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The audio line was closed out from under the detector (e.g. by the
    /// OS or the device being unplugged). Fatal: the session returns to
    /// `idle`.
    #[error("detector terminated: {0}")]
    DetectorFatal(String),
}

pub type Result<T> = std::result::Result<T, PracticeError>;

impl PracticeError {
    /// `true` for errors that should stop the owning session outright
    /// (`DetectorFatal`); `false` for errors that are logged and feedback-
    /// reported but otherwise do not disturb scoring state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PracticeError::DetectorFatal(_))
    }
}
