// Tempo configuration error types
//
// Collaborator setters clamp out-of-range values silently; these errors are
// only produced by the strict parsing paths (CLI arguments, `TryFrom`).

use crate::error::ErrorCode;
use std::fmt;

/// Tempo error code constants
///
/// Error code range: 2001-2004
pub struct TempoErrorCodes {}

impl TempoErrorCodes {
    /// BPM outside [MIN_BPM, MAX_BPM]
    pub const BPM_OUT_OF_RANGE: i32 = 2001;

    /// Beats per bar must be at least 1
    pub const BEATS_PER_BAR_INVALID: i32 = 2002;

    /// Subdivision must be one of 1, 2, 3, 4
    pub const SUBDIVISION_INVALID: i32 = 2003;

    /// Volume outside [0, 1] or not a number
    pub const VOLUME_OUT_OF_RANGE: i32 = 2004;
}

/// Errors describing a rejected tempo setting
#[derive(Debug, Clone, PartialEq)]
pub enum TempoError {
    BpmOutOfRange { bpm: u32, min: u32, max: u32 },
    BeatsPerBarInvalid { beats: u32 },
    SubdivisionInvalid { value: u32 },
    VolumeOutOfRange { volume: f32 },
}

impl ErrorCode for TempoError {
    fn code(&self) -> i32 {
        match self {
            TempoError::BpmOutOfRange { .. } => TempoErrorCodes::BPM_OUT_OF_RANGE,
            TempoError::BeatsPerBarInvalid { .. } => TempoErrorCodes::BEATS_PER_BAR_INVALID,
            TempoError::SubdivisionInvalid { .. } => TempoErrorCodes::SUBDIVISION_INVALID,
            TempoError::VolumeOutOfRange { .. } => TempoErrorCodes::VOLUME_OUT_OF_RANGE,
        }
    }

    fn message(&self) -> String {
        match self {
            TempoError::BpmOutOfRange { bpm, min, max } => {
                format!("BPM must be between {} and {} (got {})", min, max, bpm)
            }
            TempoError::BeatsPerBarInvalid { beats } => {
                format!(
                    "Beats per bar must be at least 1 and fit a 32-bit pulse count (got {})",
                    beats
                )
            }
            TempoError::SubdivisionInvalid { value } => {
                format!("Subdivision must be 1, 2, 3 or 4 (got {})", value)
            }
            TempoError::VolumeOutOfRange { volume } => {
                format!("Volume must be between 0.0 and 1.0 (got {})", volume)
            }
        }
    }
}

impl fmt::Display for TempoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message(), self.code())
    }
}

impl std::error::Error for TempoError {}
