//! Transport - the Stopped/Playing state machine around the scheduler.
//!
//! Owns the lookahead scheduler, the beat relay and the click voicing. Every
//! tick voices the clicks the scheduler emits, hands them to the clock source
//! and queues them on the relay in the same order.

use crate::audio::ClickVoicing;
use crate::config::AppConfig;
use crate::engine::backend::ClockSource;
use crate::error::{log_audio_error, AudioError};
use crate::scheduler::{ActiveBeat, BeatRelay, Cursor, LookaheadScheduler, TickReport};
use crate::telemetry;
use crate::tempo::TempoState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Stopped,
    Playing,
}

pub struct Transport {
    state: PlaybackState,
    scheduler: LookaheadScheduler,
    relay: BeatRelay,
    voicing: ClickVoicing,
    run_id: u64,
}

impl Transport {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            state: PlaybackState::Stopped,
            scheduler: LookaheadScheduler::new(&config.scheduler),
            relay: BeatRelay::new(),
            voicing: ClickVoicing::new(config.click.clone()),
            run_id: 0,
        }
    }

    /// Stopped -> Playing. Rewinds to the downbeat with the first note
    /// primed just after `now`. Returns the id of the new run.
    pub fn start(&mut self, now: f64) -> Result<u64, AudioError> {
        if self.state == PlaybackState::Playing {
            return Err(AudioError::AlreadyRunning);
        }

        self.scheduler.reset(now);
        self.relay.clear();
        self.run_id = self.run_id.wrapping_add(1);
        self.state = PlaybackState::Playing;
        Ok(self.run_id)
    }

    /// Playing -> Stopped. Returns whether playback was running.
    ///
    /// Tones already handed to the clock source still sound; only their
    /// visual events are discarded.
    pub fn stop(&mut self) -> bool {
        let was_playing = self.state == PlaybackState::Playing;
        self.state = PlaybackState::Stopped;
        self.relay.clear();
        was_playing
    }

    /// One scheduling pass against `clock`. No-op while stopped.
    pub fn tick(&mut self, clock: &dyn ClockSource, tempo: &TempoState) -> TickReport {
        if self.state != PlaybackState::Playing {
            return TickReport::default();
        }

        let now = clock.now();
        let voicing = &self.voicing;
        let relay = &mut self.relay;
        let report = self.scheduler.fill_window(now, tempo, |event, config| {
            let tone = voicing.tone_for(&event, config.volume);
            if let Err(err) = clock.schedule_tone(tone) {
                // The beat still happened musically; keep the display in step.
                log_audio_error(&err, "schedule_tone");
                telemetry::hub().record_error(&err, "schedule_tone");
            }
            relay.push(event);
        });

        let hub = telemetry::hub();
        if report.skipped > 0 {
            hub.record_resync(report.skipped);
        }
        if let Some(err) = &report.violation {
            hub.record_error(err, "fill_window");
        }
        if let Some(lead) = report.lead_secs {
            hub.record_clicks_scheduled(report.scheduled, lead);
        }

        report
    }

    /// Surface events whose time has come. Returns how many were popped.
    pub fn drain(&mut self, now: f64) -> usize {
        self.relay.drain(now)
    }

    pub fn active_beat(&self) -> Option<ActiveBeat> {
        self.relay.active()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn cursor(&self) -> Cursor {
        self.scheduler.cursor()
    }

    pub fn pending_events(&self) -> usize {
        self.relay.pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::ManualClock;
    use crate::error::AudioErrorCodes;
    use crate::telemetry::MetricEvent;
    use crate::tempo::{Subdivision, TempoConfig};
    use tokio::sync::broadcast::error::TryRecvError;

    fn transport() -> Transport {
        Transport::new(&AppConfig::default())
    }

    fn tempo() -> TempoState {
        TempoState::new(TempoConfig {
            bpm: 120,
            beats_per_bar: 4,
            subdivision: Subdivision::Quarter,
            volume: 0.5,
        })
    }

    #[test]
    fn test_tick_while_stopped_schedules_nothing() {
        let mut transport = transport();
        let clock = ManualClock::new();

        let report = transport.tick(&clock, &tempo());
        assert_eq!(report.scheduled, 0);
        assert!(clock.scheduled_tones().is_empty());
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let mut transport = transport();
        let first = transport.start(0.0).unwrap();
        assert_eq!(transport.start(1.0), Err(AudioError::AlreadyRunning));
        assert_eq!(transport.run_id(), first, "rejected start keeps the run");
    }

    #[test]
    fn test_tones_and_events_stay_in_step() {
        let mut transport = transport();
        let clock = ManualClock::new();
        let tempo = tempo();
        transport.start(clock.now()).unwrap();

        for _ in 0..40 {
            transport.tick(&clock, &tempo);
            clock.advance(0.025);
        }

        let tones = clock.scheduled_tones();
        assert!(tones.len() >= 2);
        // Every tone either already surfaced or is still pending on the relay
        transport.drain(f64::MAX);
        assert_eq!(transport.pending_events(), 0);
        assert_eq!(tones[0].frequency, 1000.0, "first click is the downbeat");
        assert_eq!(tones[1].frequency, 800.0);
        assert!((tones[0].start_time - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_volume_is_captured_at_scheduling_time() {
        let mut transport = transport();
        let clock = ManualClock::new();
        let tempo = tempo();
        transport.start(0.0).unwrap();

        transport.tick(&clock, &tempo);
        tempo.set_volume(0.9);
        clock.set(0.5);
        transport.tick(&clock, &tempo);

        let tones = clock.scheduled_tones();
        assert_eq!(tones[0].peak_amplitude, 0.5);
        assert_eq!(tones[1].peak_amplitude, 0.9);
    }

    #[test]
    fn test_stop_clears_relay_and_is_idempotent() {
        let mut transport = transport();
        let clock = ManualClock::new();
        let tempo = tempo();
        transport.start(0.0).unwrap();
        transport.tick(&clock, &tempo);
        transport.drain(0.06);
        assert!(transport.active_beat().is_some());

        assert!(transport.stop());
        assert!(!transport.stop(), "second stop is a no-op");
        assert_eq!(transport.active_beat(), None);
        assert_eq!(transport.pending_events(), 0);
        assert_eq!(transport.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_invariant_violation_is_reported_and_playback_continues() {
        let mut transport = transport();
        let clock = ManualClock::new();
        let tempo = tempo();
        let mut metrics = telemetry::hub().collector().subscribe();
        transport.start(f64::NAN).unwrap();

        let report = transport.tick(&clock, &tempo);
        assert!(matches!(
            report.violation,
            Some(AudioError::SchedulerInvariant { .. })
        ));
        assert_eq!(transport.pending_events(), 1);
        let tones = clock.scheduled_tones();
        assert_eq!(tones.len(), 1);
        assert!((tones[0].start_time - 0.05).abs() < 1e-9);

        let mut reported = false;
        loop {
            match metrics.try_recv() {
                Ok(MetricEvent::Error { code, context }) => {
                    if code == AudioErrorCodes::SCHEDULER_INVARIANT && context == "fill_window" {
                        reported = true;
                    }
                }
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        assert!(reported, "violation recorded in telemetry");
    }

    #[test]
    fn test_restart_rewinds_to_downbeat() {
        let mut transport = transport();
        let clock = ManualClock::new();
        let tempo = tempo();
        transport.start(0.0).unwrap();
        for step in 0..30 {
            clock.set(step as f64 * 0.025);
            transport.tick(&clock, &tempo);
        }
        transport.stop();

        clock.set(5.0);
        transport.start(clock.now()).unwrap();
        let cursor = transport.cursor();
        assert_eq!((cursor.beat, cursor.sub_beat), (0, 0));
        assert!((cursor.next_note_time - 5.05).abs() < 1e-9);
    }
}
