//! Configuration management for engine tuning
//!
//! This module provides runtime configuration loading from JSON files so the
//! scheduler cadence, lookahead window and click voicing can be adjusted
//! without recompilation. Tempo settings (BPM, meter, volume) are not part of
//! this file; they always start from the defaults in [`crate::tempo`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "CLICK_TRACK_CONFIG";

/// Default config file location relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "assets/click_track.json";

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub click: ClickConfig,
    #[serde(default)]
    pub tap: TapTempoConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

/// Lookahead scheduler timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Wall-clock cadence of the scheduling tick
    pub tick_interval_ms: u64,
    /// How far ahead of the clock notes are handed to the backend
    pub schedule_ahead_ms: f64,
    /// Priming offset applied to the first note after start
    pub start_offset_ms: f64,
    /// How far behind the clock a note may fall before the cursor resyncs
    pub late_tolerance_ms: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 25,
            schedule_ahead_ms: 100.0,
            start_offset_ms: 50.0,
            late_tolerance_ms: 10.0,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn schedule_ahead_secs(&self) -> f64 {
        self.schedule_ahead_ms / 1000.0
    }

    pub fn start_offset_secs(&self) -> f64 {
        self.start_offset_ms / 1000.0
    }

    pub fn late_tolerance_secs(&self) -> f64 {
        self.late_tolerance_ms / 1000.0
    }
}

/// Click voicing: pitch per metric position and amplitude envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickConfig {
    /// Pitch of beat 0, sub-beat 0
    pub downbeat_hz: f32,
    /// Pitch of the remaining main beats
    pub beat_hz: f32,
    /// Pitch of subdivision pulses
    pub subdivision_hz: f32,
    /// Time for the exponential ramp to reach `floor_amplitude`
    pub decay_ms: f64,
    /// Time after the start at which the tone is cut
    pub stop_ms: f64,
    /// Amplitude reached at the end of the decay ramp
    pub floor_amplitude: f32,
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            downbeat_hz: 1000.0,
            beat_hz: 800.0,
            subdivision_hz: 600.0,
            decay_ms: 50.0,
            stop_ms: 55.0,
            floor_amplitude: 0.001,
        }
    }
}

/// Tap-tempo estimator parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapTempoConfig {
    /// Number of most recent taps kept in the history
    pub max_taps: usize,
    /// Idle gap after which the history starts over
    pub reset_gap_ms: f64,
}

impl Default for TapTempoConfig {
    fn default() -> Self {
        Self {
            max_taps: 4,
            reset_gap_ms: 2000.0,
        }
    }
}

/// Beat-event relay polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Drain cadence, roughly one display refresh
    pub poll_interval_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 16,
        }
    }
}

impl RelayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Output stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Capacity of the SPSC ring carrying tones into the audio callback
    pub tone_queue_capacity: usize,
    /// Maximum simultaneously sounding click voices
    pub max_voices: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            tone_queue_capacity: 64,
            max_voices: 16,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// Missing sections fall back to their defaults. If the file doesn't
    /// exist or the JSON is invalid, the default config is returned and a
    /// warning is logged.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::debug!(
                    "[Config] Config file {:?} not readable ({}). Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from `$CLICK_TRACK_CONFIG` or the default path
    pub fn load() -> Self {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => Self::load_from_file(path),
            _ => Self::load_from_file(DEFAULT_CONFIG_PATH),
        }
    }
}
