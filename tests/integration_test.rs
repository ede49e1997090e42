//! Integration tests for MetronomeHandle
//!
//! These tests drive the full engine through its public surface:
//! - Play/stop lifecycle on manual, silent and unavailable backends
//! - Active-beat relay and telemetry streams
//! - Tempo and tap-tempo control while playing
//!
//! No test here touches a real output device.

use std::sync::Arc;
use std::time::{Duration, Instant};

use click_track::config::AppConfig;
use click_track::engine::{
    ClockSource, ManualBackend, ManualClock, MetronomeHandle, SilentBackend, TelemetryEventKind,
    UnavailableBackend,
};
use click_track::error::{AudioError, AudioErrorCodes, ErrorCode};
use click_track::scheduler::ActiveBeat;
use click_track::tempo::{Subdivision, TempoPatch};

/// Wide lookahead and tolerance so a slow CI scheduler never drops notes
/// while the test steps the clock.
fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.scheduler.schedule_ahead_ms = 300.0;
    config.scheduler.late_tolerance_ms = 5_000.0;
    config
}

fn manual_handle() -> (MetronomeHandle, Arc<ManualClock>) {
    let backend = ManualBackend::new();
    let clock = backend.clock();
    let handle = MetronomeHandle::with_backend(test_config(), Arc::new(backend));
    (handle, clock)
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Step the manual clock like a sound card would, in small increments.
fn run_clock(clock: &ManualClock, until: f64) {
    while clock.now() < until {
        clock.advance(0.005);
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn test_handle_creation_does_not_open_backend() {
    let backend = ManualBackend::new();
    let clock = backend.clock();
    let handle = MetronomeHandle::with_backend(AppConfig::default(), Arc::new(backend));

    assert!(!handle.is_playing());
    assert_eq!(handle.active_beat(), None);
    assert_eq!(clock.resume_count(), 0, "clock untouched until play");
}

#[test]
fn test_full_bar_is_scheduled_in_order() {
    let (handle, clock) = manual_handle();
    handle.apply_patch(&TempoPatch {
        bpm: Some(240),
        beats_per_bar: Some(3),
        subdivision: Some(2),
        volume: None,
    });

    handle.play().expect("play on manual backend");
    run_clock(&clock, 1.0);
    assert!(wait_until(|| clock.scheduled_tones().len() >= 7));
    handle.stop();

    let tones = clock.scheduled_tones();
    // 240 BPM in eighths: 0.125 s apart, six pulses per bar
    for pair in tones.windows(2) {
        let delta = pair[1].start_time - pair[0].start_time;
        assert!((delta - 0.125).abs() < 1e-9, "delta {delta}");
    }
    let pitches: Vec<f32> = tones.iter().take(7).map(|t| t.frequency).collect();
    assert_eq!(
        pitches,
        vec![1000.0, 600.0, 800.0, 600.0, 800.0, 600.0, 1000.0],
        "downbeat, subdivision, beat pattern wraps after one bar"
    );
}

#[test]
fn test_active_beat_advances_with_clock() {
    let (handle, clock) = manual_handle();
    let mut beats = handle.subscribe_active_beat();
    handle.play().unwrap();

    run_clock(&clock, 0.6);
    assert!(
        wait_until(|| handle.active_beat() == Some(ActiveBeat { beat: 1, sub_beat: 0 })),
        "second beat (0.55 s) should be active at 0.6 s, got {:?}",
        handle.active_beat()
    );
    assert!(beats.has_changed().unwrap_or(false));

    handle.stop();
    assert_eq!(*beats.borrow_and_update(), None, "stop clears the active beat");
}

#[test]
fn test_play_twice_reports_already_running() {
    let (handle, _clock) = manual_handle();
    handle.play().unwrap();

    let err = handle.play().unwrap_err();
    assert_eq!(err, AudioError::AlreadyRunning);
    assert_eq!(err.code(), AudioErrorCodes::ALREADY_RUNNING);
    assert!(handle.is_playing(), "existing playback is untouched");
    handle.stop();
}

#[test]
fn test_unavailable_backend_surfaces_error_code() {
    let handle = MetronomeHandle::with_backend(
        AppConfig::default(),
        Arc::new(UnavailableBackend::new("no output device")),
    );

    let err = handle.play().unwrap_err();
    assert_eq!(err.code(), AudioErrorCodes::BACKEND_UNAVAILABLE);
    assert!(!handle.is_playing());
    handle.stop();
}

#[test]
fn test_silent_backend_plays_in_real_time() {
    let backend = SilentBackend::new();
    let clock = backend.clock();
    let handle = MetronomeHandle::with_backend(AppConfig::default(), Arc::new(backend));
    handle.set_bpm(300);

    handle.play().unwrap();
    assert!(
        wait_until(|| clock.tone_count() >= 3),
        "silent clock should accumulate clicks"
    );
    assert!(wait_until(|| handle.active_beat().is_some()));
    handle.stop();
    assert!(!handle.is_playing());
}

#[test]
fn test_stop_then_play_restarts_from_downbeat() {
    let (handle, clock) = manual_handle();
    handle.play().unwrap();
    run_clock(&clock, 1.2);
    handle.stop();

    let resume_at = clock.now();
    clock.take_tones();
    handle.play().unwrap();
    assert!(wait_until(|| !clock.scheduled_tones().is_empty()));

    let first = clock.scheduled_tones()[0];
    assert!((first.start_time - (resume_at + 0.05)).abs() < 1e-9);
    assert_eq!(first.frequency, 1000.0);
    handle.stop();
}

#[test]
fn test_tap_tempo_changes_running_tempo() {
    let (handle, clock) = manual_handle();
    handle.play().unwrap();

    for tap in [0.0, 250.0, 500.0, 750.0] {
        handle.record_tap(tap);
    }
    assert_eq!(handle.bpm(), 240);

    run_clock(&clock, 2.0);
    assert!(wait_until(|| clock.scheduled_tones().len() >= 4));
    handle.stop();

    let tones = clock.scheduled_tones();
    let last = tones.len() - 1;
    let delta = tones[last].start_time - tones[last - 1].start_time;
    assert!((delta - 0.25).abs() < 1e-9, "tapped tempo in effect, delta {delta}");
}

#[test]
fn test_telemetry_reports_lifecycle() {
    let (handle, _clock) = manual_handle();
    let mut events = handle.subscribe_telemetry();

    handle.set_subdivision(4);
    handle.play().unwrap();
    handle.stop();

    let kinds: Vec<TelemetryEventKind> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|event| event.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            TelemetryEventKind::TempoChanged {
                bpm: 120,
                beats_per_bar: 4,
                subdivision: Subdivision::Sixteenth,
            },
            TelemetryEventKind::PlaybackStarted { bpm: 120 },
            TelemetryEventKind::PlaybackStopped,
        ]
    );
}
