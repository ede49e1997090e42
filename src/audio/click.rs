//! Click synthesis - pitched tones with an exponential decay
//!
//! Pitch communicates metric position:
//! - downbeat (beat 0, sub-beat 0): highest pitch
//! - other main beats (sub-beat 0): medium pitch
//! - subdivision pulses: low pitch
//!
//! Each tone starts exactly at its scheduled time at the volume current when
//! it was scheduled, ramps exponentially down to a near-silent floor over the
//! decay time, holds the floor and is cut at the stop time. Rendering is pure
//! arithmetic on the absolute timeline, so the same tone renders identically
//! in the real-time callback and offline.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::config::ClickConfig;
use crate::scheduler::ClickEvent;

/// Metric weight of a click
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickAccent {
    Downbeat,
    Beat,
    Subdivision,
}

impl ClickAccent {
    pub fn of(event: &ClickEvent) -> Self {
        if event.is_downbeat() {
            ClickAccent::Downbeat
        } else if event.is_main_beat() {
            ClickAccent::Beat
        } else {
            ClickAccent::Subdivision
        }
    }
}

/// A synthesized tone handed to the clock source.
///
/// All times are absolute seconds on the clock source timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToneRequest {
    pub start_time: f64,
    pub stop_time: f64,
    pub frequency: f32,
    pub peak_amplitude: f32,
    /// Duration of the exponential ramp from peak to floor
    pub decay_secs: f64,
    pub floor_amplitude: f32,
}

impl ToneRequest {
    pub fn is_sounding(&self, time: f64) -> bool {
        time >= self.start_time && time < self.stop_time
    }

    /// Envelope gain at absolute `time`.
    ///
    /// `g(t) = peak * (floor / peak) ^ (t / decay)` during the ramp, `floor`
    /// afterwards, zero outside `[start, stop)`.
    pub fn gain_at(&self, time: f64) -> f32 {
        if !self.is_sounding(time) || self.peak_amplitude <= 0.0 {
            return 0.0;
        }

        let elapsed = time - self.start_time;
        if elapsed >= self.decay_secs || self.decay_secs <= 0.0 {
            return self.floor_amplitude;
        }

        let peak = self.peak_amplitude as f64;
        let ratio = self.floor_amplitude as f64 / peak;
        (peak * ratio.powf(elapsed / self.decay_secs)) as f32
    }

    /// Oscillator output at absolute `time`, phase zero at the start.
    pub fn sample_at(&self, time: f64) -> f32 {
        let gain = self.gain_at(time);
        if gain == 0.0 {
            return 0.0;
        }
        let phase = TAU * self.frequency as f64 * (time - self.start_time);
        phase.sin() as f32 * gain
    }

    /// Mix this tone into a mono buffer whose first sample is frame
    /// `first_frame` on a timeline running at `sample_rate`.
    ///
    /// Allocation-free; safe to call from the audio callback.
    pub fn mix_into(&self, buffer: &mut [f32], first_frame: u64, sample_rate: u32) {
        let rate = sample_rate as f64;
        let start_frame = (self.start_time * rate).ceil().max(0.0) as u64;
        let stop_frame = (self.stop_time * rate).ceil().max(0.0) as u64;
        let end_frame = first_frame + buffer.len() as u64;

        let from = start_frame.max(first_frame);
        let to = stop_frame.min(end_frame);
        for frame in from..to {
            let index = (frame - first_frame) as usize;
            buffer[index] += self.sample_at(frame as f64 / rate);
        }
    }
}

/// Turns click events into tones according to [`ClickConfig`].
#[derive(Debug, Clone)]
pub struct ClickVoicing {
    config: ClickConfig,
}

impl ClickVoicing {
    pub fn new(config: ClickConfig) -> Self {
        Self { config }
    }

    pub fn frequency_for(&self, accent: ClickAccent) -> f32 {
        match accent {
            ClickAccent::Downbeat => self.config.downbeat_hz,
            ClickAccent::Beat => self.config.beat_hz,
            ClickAccent::Subdivision => self.config.subdivision_hz,
        }
    }

    pub fn tone_for(&self, event: &ClickEvent, volume: f32) -> ToneRequest {
        let start_time = event.scheduled_time;
        ToneRequest {
            start_time,
            stop_time: start_time + self.config.stop_ms / 1000.0,
            frequency: self.frequency_for(ClickAccent::of(event)),
            peak_amplitude: volume,
            decay_secs: self.config.decay_ms / 1000.0,
            floor_amplitude: self.config.floor_amplitude,
        }
    }
}

impl Default for ClickVoicing {
    fn default() -> Self {
        Self::new(ClickConfig::default())
    }
}
