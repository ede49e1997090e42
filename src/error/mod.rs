// Error types for the click track engine
//
// This module defines custom error types for audio backend and tempo
// configuration operations, with stable numeric codes for collaborators
// that cannot match on Rust enums.

mod audio;
mod tempo;

pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use tempo::{TempoError, TempoErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the collaborator boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
