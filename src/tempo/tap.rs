//! Tap-tempo estimator
//!
//! Converts a burst of manual taps into a BPM value. Only the most recent
//! taps are kept, so the estimate follows the user quickly when they change
//! speed mid-session, and a long pause starts a fresh session.

use std::collections::VecDeque;

use crate::config::TapTempoConfig;

use super::{MAX_BPM, MIN_BPM};

#[derive(Debug, Clone)]
pub struct TapTempo {
    max_taps: usize,
    reset_gap_ms: f64,
    taps: VecDeque<f64>,
}

impl TapTempo {
    pub fn new(config: &TapTempoConfig) -> Self {
        let max_taps = config.max_taps.max(2);
        Self {
            max_taps,
            reset_gap_ms: config.reset_gap_ms,
            taps: VecDeque::with_capacity(max_taps + 1),
        }
    }

    /// Register a tap at `now_ms` (any monotonic millisecond timeline).
    ///
    /// Returns the clamped, rounded BPM once at least two taps are in the
    /// current session, `None` otherwise.
    pub fn record_tap(&mut self, now_ms: f64) -> Option<u32> {
        if let Some(&last) = self.taps.back() {
            let gap = now_ms - last;
            if gap > self.reset_gap_ms || gap < 0.0 {
                self.taps.clear();
            }
        }

        self.taps.push_back(now_ms);
        while self.taps.len() > self.max_taps {
            self.taps.pop_front();
        }

        if self.taps.len() < 2 {
            return None;
        }

        let first = self.taps.front().copied()?;
        let last = self.taps.back().copied()?;
        // Mean of consecutive intervals telescopes to (last - first) / (n - 1).
        let mean_interval_ms = (last - first) / (self.taps.len() - 1) as f64;

        Some(bpm_from_interval(mean_interval_ms))
    }

    pub fn reset(&mut self) {
        self.taps.clear();
    }

    pub fn tap_count(&self) -> usize {
        self.taps.len()
    }
}

impl Default for TapTempo {
    fn default() -> Self {
        Self::new(&TapTempoConfig::default())
    }
}

/// A zero interval yields an infinite tempo, which clamps to MAX_BPM.
fn bpm_from_interval(mean_interval_ms: f64) -> u32 {
    let raw = (60_000.0 / mean_interval_ms).round();
    if raw.is_nan() || raw >= MAX_BPM as f64 {
        MAX_BPM
    } else if raw <= MIN_BPM as f64 {
        MIN_BPM
    } else {
        raw as u32
    }
}
