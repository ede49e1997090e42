// Public API for host applications
// Free functions over one process-wide MetronomeHandle, for callers that do
// not want to own a handle themselves (UI bindings, scripting layers).

use once_cell::sync::Lazy;

use crate::engine::{MetronomeHandle, TelemetryEvent};
use crate::error::AudioError;
use crate::scheduler::ActiveBeat;
use crate::tempo::{Subdivision, TempoConfig, TempoPatch};

// Re-export error code constants for bindings
pub use crate::error::{AudioErrorCodes, TempoErrorCodes};

/// Global MetronomeHandle instance
///
/// Created on first use with the configuration from disk and the cpal
/// backend. The output device is not opened until the first `play`.
static ENGINE_HANDLE: Lazy<MetronomeHandle> = Lazy::new(MetronomeHandle::new);

/// Get the version of the click engine
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Start the click track from the downbeat
///
/// # Returns
/// * `Ok(())` - Playback started
/// * `Err(AudioError)` - Already playing, or no output device could be opened
///   or resumed
pub fn play() -> Result<(), AudioError> {
    ENGINE_HANDLE.play()
}

/// Stop the click track. Safe to call when already stopped.
pub fn stop() {
    ENGINE_HANDLE.stop()
}

pub fn is_playing() -> bool {
    ENGINE_HANDLE.is_playing()
}

/// Set the tempo in beats per minute
///
/// Values outside 30-300 are clamped. Applies from the next click; clicks
/// already scheduled keep their time.
///
/// # Returns
/// The tempo actually stored
pub fn set_bpm(bpm: i64) -> u32 {
    ENGINE_HANDLE.set_bpm(bpm)
}

pub fn set_beats_per_bar(beats: u32) -> u32 {
    ENGINE_HANDLE.set_beats_per_bar(beats)
}

/// Set pulses per beat: 1 quarter, 2 eighth, 3 triplet, 4 sixteenth
pub fn set_subdivision(value: u32) -> Subdivision {
    ENGINE_HANDLE.set_subdivision(value)
}

/// Set click volume (0.0 to 1.0). Affects clicks scheduled afterwards.
pub fn set_volume(volume: f32) -> f32 {
    ENGINE_HANDLE.set_volume(volume)
}

pub fn apply_tempo_patch(patch: TempoPatch) -> TempoConfig {
    ENGINE_HANDLE.apply_patch(&patch)
}

pub fn tempo() -> TempoConfig {
    ENGINE_HANDLE.tempo()
}

/// Register a tap on the tap-tempo pad
///
/// # Arguments
/// * `now_ms` - Tap time in milliseconds on any monotonic timeline
///
/// # Returns
/// * `Some(bpm)` - Estimate applied as the new tempo
/// * `None` - First tap of a session
pub fn record_tap(now_ms: f64) -> Option<u32> {
    ENGINE_HANDLE.record_tap(now_ms)
}

/// Register a tap at the current time
pub fn tap() -> Option<u32> {
    ENGINE_HANDLE.record_tap_now()
}

/// Position of the click currently sounding, if any
pub fn active_beat() -> Option<ActiveBeat> {
    ENGINE_HANDLE.active_beat()
}

pub fn subscribe_active_beat() -> tokio::sync::watch::Receiver<Option<ActiveBeat>> {
    ENGINE_HANDLE.subscribe_active_beat()
}

pub fn subscribe_telemetry() -> tokio::sync::broadcast::Receiver<TelemetryEvent> {
    ENGINE_HANDLE.subscribe_telemetry()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_matches_package() {
        assert_eq!(get_version(), env!("CARGO_PKG_VERSION"));
    }
}
