// Audio error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Audio error code constants
///
/// Single source of truth for the numeric codes reported by
/// [`AudioError::code`].
///
/// Error code range: 1001-1008
pub struct AudioErrorCodes {}

impl AudioErrorCodes {
    /// Audio backend could not be created or resumed
    pub const BACKEND_UNAVAILABLE: i32 = 1001;

    /// Playback is already running
    pub const ALREADY_RUNNING: i32 = 1002;

    /// Failed to open audio stream
    pub const STREAM_OPEN_FAILED: i32 = 1003;

    /// Hardware error occurred
    pub const HARDWARE_ERROR: i32 = 1004;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1005;

    /// Tone queue towards the audio callback is full
    pub const TONE_QUEUE_FULL: i32 = 1006;

    /// Audio stream disconnected or channel closed unexpectedly
    pub const STREAM_FAILURE: i32 = 1007;

    /// Scheduler produced a non-finite or non-increasing note time
    pub const SCHEDULER_INVARIANT: i32 = 1008;
}

/// Log an audio error with structured context
///
/// This function logs audio errors with structured fields including:
/// - error_code: Numeric error code for programmatic handling
/// - component: The component where the error occurred
/// - message: Human-readable error message
/// - context: Additional contextual information
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=ClickEngine, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio-related errors
///
/// These errors cover the clock source / audio backend lifecycle and the
/// scheduler's defensive invariant checks.
///
/// Error code ranges: 1001-1008
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Audio backend cannot be created or resumed
    BackendUnavailable { reason: String },

    /// Playback is already running
    AlreadyRunning,

    /// Failed to open audio stream
    StreamOpenFailed { reason: String },

    /// Hardware error occurred
    HardwareError { details: String },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// The audio callback is not consuming scheduled tones fast enough
    ToneQueueFull,

    /// Stream channel disconnected unexpectedly
    StreamFailure { reason: String },

    /// Next note time was non-finite or did not advance
    SchedulerInvariant { detail: String },
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::BackendUnavailable { .. } => AudioErrorCodes::BACKEND_UNAVAILABLE,
            AudioError::AlreadyRunning => AudioErrorCodes::ALREADY_RUNNING,
            AudioError::StreamOpenFailed { .. } => AudioErrorCodes::STREAM_OPEN_FAILED,
            AudioError::HardwareError { .. } => AudioErrorCodes::HARDWARE_ERROR,
            AudioError::LockPoisoned { .. } => AudioErrorCodes::LOCK_POISONED,
            AudioError::ToneQueueFull => AudioErrorCodes::TONE_QUEUE_FULL,
            AudioError::StreamFailure { .. } => AudioErrorCodes::STREAM_FAILURE,
            AudioError::SchedulerInvariant { .. } => AudioErrorCodes::SCHEDULER_INVARIANT,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::BackendUnavailable { reason } => {
                format!("Audio backend unavailable: {}", reason)
            }
            AudioError::AlreadyRunning => "Playback already running. Call stop() first.".to_string(),
            AudioError::StreamOpenFailed { reason } => {
                format!("Failed to open audio stream: {}", reason)
            }
            AudioError::HardwareError { details } => {
                format!("Hardware error: {}", details)
            }
            AudioError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            AudioError::ToneQueueFull => "Tone queue full, click dropped".to_string(),
            AudioError::StreamFailure { reason } => {
                format!("Audio stream failed: {}", reason)
            }
            AudioError::SchedulerInvariant { detail } => {
                format!("Scheduler invariant violated: {}", detail)
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_error_codes() {
        assert_eq!(
            AudioError::BackendUnavailable {
                reason: "test".to_string()
            }
            .code(),
            AudioErrorCodes::BACKEND_UNAVAILABLE
        );
        assert_eq!(
            AudioError::AlreadyRunning.code(),
            AudioErrorCodes::ALREADY_RUNNING
        );
        assert_eq!(
            AudioError::StreamOpenFailed {
                reason: "test".to_string()
            }
            .code(),
            AudioErrorCodes::STREAM_OPEN_FAILED
        );
        assert_eq!(
            AudioError::HardwareError {
                details: "test".to_string()
            }
            .code(),
            AudioErrorCodes::HARDWARE_ERROR
        );
        assert_eq!(
            AudioError::LockPoisoned {
                component: "test".to_string()
            }
            .code(),
            AudioErrorCodes::LOCK_POISONED
        );
        assert_eq!(AudioError::ToneQueueFull.code(), AudioErrorCodes::TONE_QUEUE_FULL);
        assert_eq!(
            AudioError::StreamFailure {
                reason: "test".to_string()
            }
            .code(),
            AudioErrorCodes::STREAM_FAILURE
        );
        assert_eq!(
            AudioError::SchedulerInvariant {
                detail: "test".to_string()
            }
            .code(),
            AudioErrorCodes::SCHEDULER_INVARIANT
        );
    }

    #[test]
    fn test_audio_error_messages() {
        let err = AudioError::BackendUnavailable {
            reason: "no output device".to_string(),
        };
        assert_eq!(err.message(), "Audio backend unavailable: no output device");

        let err = AudioError::AlreadyRunning;
        assert!(err.message().contains("already running"));

        let err = AudioError::HardwareError {
            details: "test error".to_string(),
        };
        assert_eq!(err.message(), "Hardware error: test error");
    }

    #[test]
    fn test_audio_error_display() {
        let err = AudioError::ToneQueueFull;
        let display = format!("{}", err);
        assert!(display.contains("AudioError"));
        assert!(display.contains(&err.code().to_string()));
    }
}
