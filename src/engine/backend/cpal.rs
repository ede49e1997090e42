//! CPAL-based clock source for desktop platforms (Linux, macOS, Windows)
//!
//! Thin adapter from the engine's [`AudioBackend`] trait to
//! [`CpalClock`], which owns the output stream.

use std::sync::Arc;

use crate::audio::{CpalClock, ToneRequest};
use crate::config::AudioConfig;
use crate::error::AudioError;

use super::{AudioBackend, ClockSource};

pub struct CpalBackend {
    audio_config: AudioConfig,
}

impl CpalBackend {
    pub fn new(audio_config: AudioConfig) -> Self {
        Self { audio_config }
    }
}

impl AudioBackend for CpalBackend {
    fn open(&self) -> Result<Arc<dyn ClockSource>, AudioError> {
        let clock =
            CpalClock::open(&self.audio_config).map_err(|err| AudioError::BackendUnavailable {
                reason: err.to_string(),
            })?;
        Ok(Arc::new(clock))
    }

    fn name(&self) -> &'static str {
        "cpal"
    }
}

impl ClockSource for CpalClock {
    fn now(&self) -> f64 {
        CpalClock::now(self)
    }

    fn schedule_tone(&self, tone: ToneRequest) -> Result<(), AudioError> {
        CpalClock::schedule_tone(self, tone)
    }

    fn resume(&self) -> Result<(), AudioError> {
        CpalClock::resume(self)
    }
}
