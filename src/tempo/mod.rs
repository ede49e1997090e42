//! Tempo state shared between the collaborator (writer) and the scheduler
//! (reader).
//!
//! Every field lives in its own atomic so a setter never blocks the
//! scheduling tick. The scheduler re-reads the fields for every note, so a
//! change becomes audible from the very next scheduled click; nothing is
//! quantized to bar boundaries.
//!
//! Setters clamp silently. The strict `validate` / `TryFrom` paths exist for
//! callers that want to reject bad input instead (CLI argument parsing).

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::TempoError;

pub mod tap;

pub use tap::TapTempo;

pub const MIN_BPM: u32 = 30;
pub const MAX_BPM: u32 = 300;
pub const DEFAULT_BPM: u32 = 120;
pub const DEFAULT_BEATS_PER_BAR: u32 = 4;
pub const DEFAULT_VOLUME: f32 = 0.5;

/// Pulses per beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subdivision {
    #[default]
    Quarter = 1,
    Eighth = 2,
    Triplet = 3,
    Sixteenth = 4,
}

impl Subdivision {
    pub const ALL: [Subdivision; 4] = [
        Subdivision::Quarter,
        Subdivision::Eighth,
        Subdivision::Triplet,
        Subdivision::Sixteenth,
    ];

    /// Number of pulses per beat
    pub fn pulses(self) -> u32 {
        self as u32
    }

    /// Clamp an arbitrary integer into the supported set.
    pub fn clamped(value: u32) -> Self {
        match value {
            0 | 1 => Subdivision::Quarter,
            2 => Subdivision::Eighth,
            3 => Subdivision::Triplet,
            _ => Subdivision::Sixteenth,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Subdivision::Quarter => "quarter",
            Subdivision::Eighth => "eighth",
            Subdivision::Triplet => "triplet",
            Subdivision::Sixteenth => "sixteenth",
        }
    }
}

impl TryFrom<u32> for Subdivision {
    type Error = TempoError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Subdivision::Quarter),
            2 => Ok(Subdivision::Eighth),
            3 => Ok(Subdivision::Triplet),
            4 => Ok(Subdivision::Sixteenth),
            _ => Err(TempoError::SubdivisionInvalid { value }),
        }
    }
}

/// Signed so a negative drag delta lands on MIN_BPM instead of wrapping.
pub fn clamp_bpm(bpm: i64) -> u32 {
    bpm.clamp(MIN_BPM as i64, MAX_BPM as i64) as u32
}

pub fn clamp_beats_per_bar(beats: u32) -> u32 {
    beats.max(1)
}

/// NaN is treated as silence.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Plain snapshot of the tempo settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoConfig {
    pub bpm: u32,
    pub beats_per_bar: u32,
    pub subdivision: Subdivision,
    pub volume: f32,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            beats_per_bar: DEFAULT_BEATS_PER_BAR,
            subdivision: Subdivision::Quarter,
            volume: DEFAULT_VOLUME,
        }
    }
}

impl TempoConfig {
    /// Seconds between two consecutive pulses: `60 / bpm / subdivision`.
    pub fn note_interval_secs(&self) -> f64 {
        note_interval_secs(self.bpm, self.subdivision)
    }

    /// Pulses in one bar
    pub fn pulses_per_bar(&self) -> u64 {
        self.beats_per_bar as u64 * self.subdivision.pulses() as u64
    }

    /// Copy with every field clamped into range.
    pub fn clamped(self) -> Self {
        Self {
            bpm: clamp_bpm(self.bpm.into()),
            beats_per_bar: clamp_beats_per_bar(self.beats_per_bar),
            subdivision: self.subdivision,
            volume: clamp_volume(self.volume),
        }
    }

    /// Reject out-of-range fields instead of clamping them.
    pub fn validate(&self) -> Result<(), TempoError> {
        if !(MIN_BPM..=MAX_BPM).contains(&self.bpm) {
            return Err(TempoError::BpmOutOfRange {
                bpm: self.bpm,
                min: MIN_BPM,
                max: MAX_BPM,
            });
        }
        if self.beats_per_bar == 0
            || self
                .beats_per_bar
                .checked_mul(self.subdivision.pulses())
                .is_none()
        {
            return Err(TempoError::BeatsPerBarInvalid {
                beats: self.beats_per_bar,
            });
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(TempoError::VolumeOutOfRange {
                volume: self.volume,
            });
        }
        Ok(())
    }
}

pub fn note_interval_secs(bpm: u32, subdivision: Subdivision) -> f64 {
    60.0 / clamp_bpm(bpm.into()) as f64 / subdivision.pulses() as f64
}

/// Partial tempo update; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TempoPatch {
    #[serde(default)]
    pub bpm: Option<i64>,
    #[serde(default)]
    pub beats_per_bar: Option<u32>,
    #[serde(default)]
    pub subdivision: Option<u32>,
    #[serde(default)]
    pub volume: Option<f32>,
}

impl TempoPatch {
    pub fn is_empty(&self) -> bool {
        self.bpm.is_none()
            && self.beats_per_bar.is_none()
            && self.subdivision.is_none()
            && self.volume.is_none()
    }
}

/// Lock-free tempo settings. Each field is atomic on its own.
#[derive(Debug)]
pub struct TempoState {
    bpm: AtomicU32,
    beats_per_bar: AtomicU32,
    subdivision: AtomicU32,
    /// f32 bit pattern
    volume: AtomicU32,
}

impl TempoState {
    pub fn new(initial: TempoConfig) -> Self {
        let initial = initial.clamped();
        Self {
            bpm: AtomicU32::new(initial.bpm),
            beats_per_bar: AtomicU32::new(initial.beats_per_bar),
            subdivision: AtomicU32::new(initial.subdivision.pulses()),
            volume: AtomicU32::new(initial.volume.to_bits()),
        }
    }

    /// Returns the value actually stored.
    pub fn set_bpm(&self, bpm: i64) -> u32 {
        let clamped = clamp_bpm(bpm);
        self.bpm.store(clamped, Ordering::Relaxed);
        clamped
    }

    pub fn set_beats_per_bar(&self, beats: u32) -> u32 {
        let clamped = clamp_beats_per_bar(beats);
        self.beats_per_bar.store(clamped, Ordering::Relaxed);
        clamped
    }

    pub fn set_subdivision(&self, value: u32) -> Subdivision {
        let subdivision = Subdivision::clamped(value);
        self.subdivision
            .store(subdivision.pulses(), Ordering::Relaxed);
        subdivision
    }

    pub fn set_volume(&self, volume: f32) -> f32 {
        let clamped = clamp_volume(volume);
        self.volume.store(clamped.to_bits(), Ordering::Relaxed);
        clamped
    }

    pub fn apply(&self, patch: &TempoPatch) {
        if let Some(bpm) = patch.bpm {
            self.set_bpm(bpm);
        }
        if let Some(beats) = patch.beats_per_bar {
            self.set_beats_per_bar(beats);
        }
        if let Some(subdivision) = patch.subdivision {
            self.set_subdivision(subdivision);
        }
        if let Some(volume) = patch.volume {
            self.set_volume(volume);
        }
    }

    pub fn bpm(&self) -> u32 {
        self.bpm.load(Ordering::Relaxed)
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar.load(Ordering::Relaxed)
    }

    pub fn subdivision(&self) -> Subdivision {
        Subdivision::clamped(self.subdivision.load(Ordering::Relaxed))
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    /// Field-by-field read; fields may come from different writes.
    pub fn snapshot(&self) -> TempoConfig {
        TempoConfig {
            bpm: self.bpm(),
            beats_per_bar: self.beats_per_bar(),
            subdivision: self.subdivision(),
            volume: self.volume(),
        }
    }
}

impl Default for TempoState {
    fn default() -> Self {
        Self::new(TempoConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let state = TempoState::default();
        let snapshot = state.snapshot();
        assert_eq!(snapshot.bpm, 120);
        assert_eq!(snapshot.beats_per_bar, 4);
        assert_eq!(snapshot.subdivision, Subdivision::Quarter);
        assert_eq!(snapshot.volume, 0.5);
    }

    #[test]
    fn test_bpm_is_clamped_never_stored_out_of_range() {
        let state = TempoState::default();

        assert_eq!(state.set_bpm(5), MIN_BPM);
        assert_eq!(state.bpm(), MIN_BPM);

        assert_eq!(state.set_bpm(1000), MAX_BPM);
        assert_eq!(state.bpm(), MAX_BPM);

        assert_eq!(state.set_bpm(0), MIN_BPM, "zero must not reach the scheduler");
        assert_eq!(state.set_bpm(97), 97);
    }

    #[test]
    fn test_negative_bpm_clamps_to_minimum() {
        let state = TempoState::default();
        assert_eq!(state.set_bpm(-40), MIN_BPM);
        assert_eq!(state.bpm(), MIN_BPM);
        assert_eq!(state.set_bpm(i64::MIN), MIN_BPM);
        assert_eq!(state.set_bpm(i64::MAX), MAX_BPM);

        state.apply(&TempoPatch {
            bpm: Some(-1),
            ..TempoPatch::default()
        });
        assert_eq!(state.bpm(), MIN_BPM);
    }

    #[test]
    fn test_subdivision_clamping() {
        let state = TempoState::default();
        assert_eq!(state.set_subdivision(0), Subdivision::Quarter);
        assert_eq!(state.set_subdivision(3), Subdivision::Triplet);
        assert_eq!(state.set_subdivision(9), Subdivision::Sixteenth);
        assert_eq!(state.subdivision(), Subdivision::Sixteenth);
    }

    #[test]
    fn test_subdivision_try_from_is_strict() {
        for value in 1..=4 {
            assert_eq!(Subdivision::try_from(value).unwrap().pulses(), value);
        }
        assert_eq!(
            Subdivision::try_from(5),
            Err(TempoError::SubdivisionInvalid { value: 5 })
        );
        assert!(Subdivision::try_from(0).is_err());
    }

    #[test]
    fn test_beats_per_bar_minimum_is_one() {
        let state = TempoState::default();
        assert_eq!(state.set_beats_per_bar(0), 1);
        assert_eq!(state.set_beats_per_bar(7), 7);
    }

    #[test]
    fn test_volume_clamping() {
        let state = TempoState::default();
        assert_eq!(state.set_volume(-0.5), 0.0);
        assert_eq!(state.set_volume(1.5), 1.0);
        assert_eq!(state.set_volume(f32::NAN), 0.0);
        assert_eq!(state.set_volume(0.25), 0.25);
        assert_eq!(state.volume(), 0.25);
    }

    #[test]
    fn test_note_interval() {
        let config = TempoConfig {
            bpm: 120,
            subdivision: Subdivision::Eighth,
            ..TempoConfig::default()
        };
        assert!((config.note_interval_secs() - 0.25).abs() < 1e-12);

        let triplets = note_interval_secs(60, Subdivision::Triplet);
        assert!((triplets - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = TempoConfig::default();
        assert!(config.validate().is_ok());

        config.bpm = 301;
        assert!(matches!(
            config.validate(),
            Err(TempoError::BpmOutOfRange { bpm: 301, .. })
        ));

        config.bpm = 120;
        config.beats_per_bar = 0;
        assert!(matches!(
            config.validate(),
            Err(TempoError::BeatsPerBarInvalid { beats: 0 })
        ));

        config.beats_per_bar = 4;
        config.volume = 1.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_huge_bar_does_not_overflow_pulse_count() {
        let config = TempoConfig {
            beats_per_bar: 1 << 30,
            subdivision: Subdivision::Sixteenth,
            ..TempoConfig::default()
        };
        assert_eq!(config.pulses_per_bar(), 1 << 32);
        assert!(matches!(
            config.validate(),
            Err(TempoError::BeatsPerBarInvalid { beats: 1073741824 })
        ));

        let fits = TempoConfig {
            beats_per_bar: u32::MAX / 4,
            ..config
        };
        assert!(fits.validate().is_ok());
    }

    #[test]
    fn test_patch_applies_present_fields_only() {
        let state = TempoState::default();
        state.apply(&TempoPatch {
            bpm: Some(90),
            subdivision: Some(2),
            ..TempoPatch::default()
        });

        let snapshot = state.snapshot();
        assert_eq!(snapshot.bpm, 90);
        assert_eq!(snapshot.subdivision, Subdivision::Eighth);
        assert_eq!(snapshot.beats_per_bar, 4, "untouched field keeps its value");
        assert_eq!(snapshot.volume, 0.5);
        assert!(TempoPatch::default().is_empty());
    }
}
