//! Lookahead scheduler - converts musical time into precisely timed clicks
//!
//! The scheduler is polled on a coarse, jittery wall-clock cadence but never
//! decides *when* a click sounds: each tick hands every note falling inside
//! the lookahead window to the clock source with its exact start time on the
//! audio timeline. A late tick therefore changes nothing audible as long as
//! it arrives before the window runs dry.
//!
//! Timing authority:
//! - `now` always comes from the clock source (audio device timeline)
//! - `next_note_time` advances by `60 / bpm / subdivision` per pulse
//! - tempo is re-read for every note, so changes apply from the next pulse

use serde::{Deserialize, Serialize};

use crate::config::SchedulerConfig;
use crate::error::AudioError;
use crate::tempo::{TempoConfig, TempoState};

pub mod relay;

pub use relay::{ActiveBeat, BeatRelay};

/// One scheduled click. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClickEvent {
    /// Main beat within the bar, `0..beats_per_bar`
    pub beat: u32,
    /// Pulse within the beat, `0..subdivision`
    pub sub_beat: u32,
    /// Start time on the clock source timeline, in seconds
    pub scheduled_time: f64,
}

impl ClickEvent {
    pub fn is_downbeat(&self) -> bool {
        self.beat == 0 && self.sub_beat == 0
    }

    pub fn is_main_beat(&self) -> bool {
        self.sub_beat == 0
    }

    pub fn position(&self) -> ActiveBeat {
        ActiveBeat {
            beat: self.beat,
            sub_beat: self.sub_beat,
        }
    }
}

/// Musical position of the next note to schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cursor {
    pub beat: u32,
    pub sub_beat: u32,
    pub next_note_time: f64,
}

impl Cursor {
    pub fn at(time: f64) -> Self {
        Self {
            beat: 0,
            sub_beat: 0,
            next_note_time: time,
        }
    }

    /// Step one pulse forward, wrapping sub-beat into beat and beat into bar.
    fn advance(&mut self, interval: f64, beats_per_bar: u32, subdivision: u32) {
        self.next_note_time += interval;
        self.sub_beat += 1;
        if self.sub_beat >= subdivision {
            self.sub_beat = 0;
            self.beat += 1;
            if self.beat >= beats_per_bar {
                self.beat = 0;
            }
        }
    }

    /// Skip `steps` pulses at once, keeping the bar position aligned.
    fn skip(&mut self, steps: u64, interval: f64, beats_per_bar: u32, subdivision: u32) {
        let pulses_per_bar = (beats_per_bar as u64) * (subdivision as u64);
        let position = (self.beat as u64) * (subdivision as u64) + self.sub_beat as u64;
        let wrapped = (position + steps % pulses_per_bar) % pulses_per_bar;

        self.beat = (wrapped / subdivision as u64) as u32;
        self.sub_beat = (wrapped % subdivision as u64) as u32;
        self.next_note_time += steps as f64 * interval;
    }

    /// Pull the position back into range after the meter shrank mid-bar.
    ///
    /// A sub-beat past the new subdivision starts the next beat; a beat past
    /// the new bar length starts a new bar.
    fn normalize(&mut self, beats_per_bar: u32, subdivision: u32) {
        if self.sub_beat >= subdivision {
            self.sub_beat = 0;
            self.beat += 1;
        }
        if self.beat >= beats_per_bar {
            self.beat = 0;
        }
    }
}

/// Outcome of one scheduling pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Clicks handed to the clock source during this pass
    pub scheduled: usize,
    /// Pulses dropped because the tick arrived too late to sound them
    pub skipped: u64,
    /// Seconds between `now` and the first note scheduled in this pass
    pub lead_secs: Option<f64>,
    /// Set when the note time stopped advancing and the cursor was resynced
    pub violation: Option<AudioError>,
}

pub struct LookaheadScheduler {
    cursor: Cursor,
    schedule_ahead: f64,
    start_offset: f64,
    late_tolerance: f64,
}

impl LookaheadScheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            cursor: Cursor::at(0.0),
            schedule_ahead: config.schedule_ahead_secs(),
            start_offset: config.start_offset_secs(),
            late_tolerance: config.late_tolerance_secs(),
        }
    }

    /// Rewind to the downbeat and prime the first note slightly after `now`.
    pub fn reset(&mut self, now: f64) {
        self.cursor = Cursor::at(now + self.start_offset);
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn schedule_ahead_secs(&self) -> f64 {
        self.schedule_ahead
    }

    /// Emit every note due before `now + schedule_ahead`.
    ///
    /// `emit` receives each event together with the tempo snapshot it was
    /// computed from, so the caller can voice it with the volume current at
    /// scheduling time.
    pub fn fill_window<F>(&mut self, now: f64, tempo: &TempoState, mut emit: F) -> TickReport
    where
        F: FnMut(ClickEvent, &TempoConfig),
    {
        let mut report = TickReport::default();

        if !self.cursor.next_note_time.is_finite() {
            let err = self.resync(now, "next note time is not finite");
            report.violation = Some(err);
        }

        report.skipped = self.catch_up(now, &tempo.snapshot());

        let horizon = now + self.schedule_ahead;
        while self.cursor.next_note_time < horizon {
            let config = tempo.snapshot();
            let subdivision = config.subdivision.pulses();
            self.cursor.normalize(config.beats_per_bar, subdivision);

            let event = ClickEvent {
                beat: self.cursor.beat,
                sub_beat: self.cursor.sub_beat,
                scheduled_time: self.cursor.next_note_time,
            };
            if report.lead_secs.is_none() {
                report.lead_secs = Some(event.scheduled_time - now);
            }
            emit(event, &config);
            report.scheduled += 1;

            let previous = event.scheduled_time;
            self.cursor
                .advance(config.note_interval_secs(), config.beats_per_bar, subdivision);

            let next = self.cursor.next_note_time;
            debug_assert!(
                next.is_finite() && next > previous,
                "next note time {next} does not follow {previous}"
            );
            if !(next.is_finite() && next > previous) {
                let detail = format!("next note time {} does not follow {}", next, previous);
                report.violation = Some(self.resync(now, &detail));
                break;
            }
        }

        tracing::debug!(
            scheduled = report.scheduled,
            skipped = report.skipped,
            next_note_time = self.cursor.next_note_time,
            "[Scheduler] window filled"
        );

        report
    }

    /// Skip pulses that fell behind the clock, e.g. after the tick task was
    /// starved. Returns the number of skipped pulses.
    fn catch_up(&mut self, now: f64, config: &TempoConfig) -> u64 {
        let earliest = now - self.late_tolerance;
        if self.cursor.next_note_time >= earliest {
            return 0;
        }

        let interval = config.note_interval_secs();
        let behind = earliest - self.cursor.next_note_time;
        let steps = (behind / interval).ceil().max(1.0) as u64;

        let subdivision = config.subdivision.pulses();
        self.cursor.normalize(config.beats_per_bar, subdivision);
        self.cursor
            .skip(steps, interval, config.beats_per_bar, subdivision);

        log::warn!(
            "[Scheduler] Tick {:.1} ms late, skipped {} pulse(s)",
            behind * 1000.0,
            steps
        );
        steps
    }

    /// Drop the malformed note time and continue from the clock.
    fn resync(&mut self, now: f64, detail: &str) -> AudioError {
        let err = AudioError::SchedulerInvariant {
            detail: detail.to_string(),
        };
        crate::error::log_audio_error(&err, "fill_window");
        self.cursor.next_note_time = now + self.start_offset;
        err
    }
}
