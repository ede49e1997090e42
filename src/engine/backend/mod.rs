//! Clock-source abstractions for the click engine.
//!
//! A [`ClockSource`] is the timing authority: it reports the current time on
//! its own timeline and plays tones at absolute times on that timeline. An
//! [`AudioBackend`] lazily opens one when playback first starts.

use std::sync::Arc;

use crate::audio::ToneRequest;
use crate::error::AudioError;

/// High-precision timeline that schedules tones sample-accurately.
pub trait ClockSource: Send + Sync {
    /// Current time in seconds. Monotonically non-decreasing.
    fn now(&self) -> f64;

    /// Play `tone` at its absolute start time.
    fn schedule_tone(&self, tone: ToneRequest) -> Result<(), AudioError>;

    /// Start or wake the timeline. Called on every play.
    fn resume(&self) -> Result<(), AudioError>;
}

/// Factory for clock sources, implemented per output target.
pub trait AudioBackend: Send + Sync {
    fn open(&self) -> Result<Arc<dyn ClockSource>, AudioError>;

    fn name(&self) -> &'static str;
}

mod cpal;
pub use cpal::CpalBackend;

mod stub;
pub use stub::{ManualBackend, ManualClock, SilentBackend, SilentClock, UnavailableBackend};
