//! MetronomeHandle: the click engine orchestration layer.
//!
//! Owns the tempo state, the transport and the clock source, and runs the two
//! periodic tasks of a playing metronome on a dedicated timer thread:
//!
//! - the scheduling tick (every `tick_interval_ms`) fills the lookahead window
//! - the relay poll (every `poll_interval_ms`) surfaces due clicks as the
//!   active beat
//!
//! Control calls (play/stop/tempo setters/taps) are synchronous and may be
//! made from any thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::runtime::Runtime;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;

use crate::config::AppConfig;
use crate::engine::backend::{AudioBackend, ClockSource, CpalBackend};
use crate::engine::transport::Transport;
use crate::error::{log_audio_error, AudioError};
use crate::scheduler::ActiveBeat;
use crate::telemetry::{self, LifecyclePhase};
use crate::tempo::{Subdivision, TapTempo, TempoConfig, TempoPatch, TempoState};

#[path = "core_subscriptions.rs"]
mod core_subscriptions;

/// Telemetry event emitted by the handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub timestamp_ms: u64,
    pub kind: TelemetryEventKind,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryEventKind {
    PlaybackStarted {
        bpm: u32,
    },
    PlaybackStopped,
    TempoChanged {
        bpm: u32,
        beats_per_bar: u32,
        subdivision: Subdivision,
    },
    VolumeChanged {
        volume: f32,
    },
    TapTempo {
        bpm: u32,
    },
    Warning,
}

type RuntimeFactory = fn() -> std::io::Result<Runtime>;

struct TimerTask {
    shutdown_tx: watch::Sender<bool>,
    thread: JoinHandle<()>,
}

/// State shared with the timer thread.
struct TimerContext {
    clock: Arc<dyn ClockSource>,
    tempo: Arc<TempoState>,
    transport: Arc<Mutex<Transport>>,
    active_tx: watch::Sender<Option<ActiveBeat>>,
    playing: Arc<AtomicBool>,
    run_id: u64,
    tick_interval: Duration,
    poll_interval: Duration,
}

pub struct MetronomeHandle {
    config: AppConfig,
    backend: Arc<dyn AudioBackend>,
    clock: Mutex<Option<Arc<dyn ClockSource>>>,
    tempo: Arc<TempoState>,
    transport: Arc<Mutex<Transport>>,
    tap: Mutex<TapTempo>,
    active_tx: watch::Sender<Option<ActiveBeat>>,
    telemetry_tx: broadcast::Sender<TelemetryEvent>,
    timer: Mutex<Option<TimerTask>>,
    timer_runtime: RuntimeFactory,
    playing: Arc<AtomicBool>,
    start_instant: Instant,
}

impl MetronomeHandle {
    /// Create a handle with the configuration from disk and the cpal backend.
    pub fn new() -> Self {
        let config = AppConfig::load();
        let backend = Arc::new(CpalBackend::new(config.audio.clone()));
        Self::with_backend(config, backend)
    }

    /// Create a handle on an explicit backend. The backend is not opened
    /// until the first `play`.
    pub fn with_backend(config: AppConfig, backend: Arc<dyn AudioBackend>) -> Self {
        let (active_tx, _) = watch::channel(None);
        let (telemetry_tx, _) = broadcast::channel(128);

        Self {
            tempo: Arc::new(TempoState::default()),
            transport: Arc::new(Mutex::new(Transport::new(&config))),
            tap: Mutex::new(TapTempo::new(&config.tap)),
            config,
            backend,
            clock: Mutex::new(None),
            active_tx,
            telemetry_tx,
            timer: Mutex::new(None),
            timer_runtime: build_timer_runtime,
            playing: Arc::new(AtomicBool::new(false)),
            start_instant: Instant::now(),
        }
    }

    fn emit_event(&self, kind: TelemetryEventKind, detail: Option<String>) {
        let timestamp_ms = self.uptime_ms();
        let _ = self.telemetry_tx.send(TelemetryEvent {
            timestamp_ms,
            kind,
            detail,
        });
    }

    fn emit_tempo_changed(&self) {
        let snapshot = self.tempo.snapshot();
        self.emit_event(
            TelemetryEventKind::TempoChanged {
                bpm: snapshot.bpm,
                beats_per_bar: snapshot.beats_per_bar,
                subdivision: snapshot.subdivision,
            },
            None,
        );
    }

    fn report_failure(&self, err: AudioError, context: &str) -> AudioError {
        log_audio_error(&err, context);
        self.emit_event(TelemetryEventKind::Warning, Some(err.to_string()));
        err
    }

    fn lock_transport(&self) -> MutexGuard<'_, Transport> {
        lock_recover(&self.transport)
    }

    /// Open the backend on first use; later calls reuse the same clock.
    fn ensure_clock(&self) -> Result<Arc<dyn ClockSource>, AudioError> {
        let mut slot = self.clock.lock().map_err(|_| AudioError::LockPoisoned {
            component: "clock".to_string(),
        })?;

        if let Some(clock) = slot.as_ref() {
            return Ok(Arc::clone(clock));
        }

        match self.backend.open() {
            Ok(clock) => {
                log::info!("[MetronomeHandle] Opened {} backend", self.backend.name());
                telemetry::hub().record_phase(LifecyclePhase::BackendOpened);
                *slot = Some(Arc::clone(&clock));
                Ok(clock)
            }
            Err(err) => {
                telemetry::hub().record_phase(LifecyclePhase::BackendFailed);
                Err(as_unavailable(err))
            }
        }
    }

    // ========================================================================
    // TRANSPORT
    // ========================================================================

    /// Start playback from the downbeat.
    ///
    /// Opens the clock source lazily and resumes it on every call. Fails with
    /// `AlreadyRunning` while playing and `BackendUnavailable` when the clock
    /// cannot be opened or resumed; the handle stays stopped on failure.
    pub fn play(&self) -> Result<(), AudioError> {
        let mut timer = self.timer.lock().map_err(|_| AudioError::LockPoisoned {
            component: "timer".to_string(),
        })?;
        if timer.is_some() {
            return Err(AudioError::AlreadyRunning);
        }

        let clock = self.ensure_clock().map_err(|err| self.report_failure(err, "play"))?;
        clock.resume().map_err(|err| {
            telemetry::hub().record_phase(LifecyclePhase::BackendFailed);
            self.report_failure(as_unavailable(err), "resume")
        })?;

        let run_id = self.lock_transport().start(clock.now())?;
        self.playing.store(true, Ordering::SeqCst);

        let ctx = TimerContext {
            clock,
            tempo: Arc::clone(&self.tempo),
            transport: Arc::clone(&self.transport),
            active_tx: self.active_tx.clone(),
            playing: Arc::clone(&self.playing),
            run_id,
            tick_interval: self.config.scheduler.tick_interval(),
            poll_interval: self.config.relay.poll_interval(),
        };

        match spawn_timer(ctx, self.timer_runtime) {
            Ok(task) => *timer = Some(task),
            Err(err) => {
                self.playing.store(false, Ordering::SeqCst);
                self.lock_transport().stop();
                return Err(self.report_failure(err, "spawn_timer"));
            }
        }

        let bpm = self.tempo.bpm();
        log::info!("[MetronomeHandle] Playback started at {} BPM", bpm);
        telemetry::hub().record_phase(LifecyclePhase::PlaybackStarted);
        self.emit_event(TelemetryEventKind::PlaybackStarted { bpm }, None);
        Ok(())
    }

    /// Stop playback. Idempotent.
    ///
    /// Clicks already handed to the clock source may still sound; no new
    /// clicks are scheduled and the active beat clears immediately.
    pub fn stop(&self) {
        let task = lock_recover(&self.timer).take();

        self.playing.store(false, Ordering::SeqCst);
        let was_playing = self.lock_transport().stop();
        self.active_tx.send_replace(None);

        if let Some(task) = task {
            let _ = task.shutdown_tx.send(true);
            if task.thread.join().is_err() {
                log::error!("[MetronomeHandle] Timer thread panicked");
            }
        }

        if was_playing {
            log::info!("[MetronomeHandle] Playback stopped");
            telemetry::hub().record_phase(LifecyclePhase::PlaybackStopped);
            self.emit_event(TelemetryEventKind::PlaybackStopped, None);
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    // ========================================================================
    // TEMPO
    // ========================================================================

    /// Set the tempo, clamped to `[MIN_BPM, MAX_BPM]`. Applies from the next
    /// scheduled click. Returns the stored value.
    pub fn set_bpm(&self, bpm: i64) -> u32 {
        let stored = self.tempo.set_bpm(bpm);
        self.emit_tempo_changed();
        stored
    }

    pub fn set_beats_per_bar(&self, beats: u32) -> u32 {
        let stored = self.tempo.set_beats_per_bar(beats);
        self.emit_tempo_changed();
        stored
    }

    /// Set pulses per beat (1-4, clamped).
    pub fn set_subdivision(&self, value: u32) -> Subdivision {
        let stored = self.tempo.set_subdivision(value);
        self.emit_tempo_changed();
        stored
    }

    /// Set click volume in `[0, 1]`. Applies to clicks scheduled afterwards.
    pub fn set_volume(&self, volume: f32) -> f32 {
        let stored = self.tempo.set_volume(volume);
        self.emit_event(TelemetryEventKind::VolumeChanged { volume: stored }, None);
        stored
    }

    /// Apply several tempo fields at once. Returns the resulting settings.
    pub fn apply_patch(&self, patch: &TempoPatch) -> TempoConfig {
        if patch.is_empty() {
            return self.tempo.snapshot();
        }

        self.tempo.apply(patch);
        if patch.bpm.is_some() || patch.beats_per_bar.is_some() || patch.subdivision.is_some() {
            self.emit_tempo_changed();
        }
        if patch.volume.is_some() {
            self.emit_event(
                TelemetryEventKind::VolumeChanged {
                    volume: self.tempo.volume(),
                },
                None,
            );
        }
        self.tempo.snapshot()
    }

    pub fn bpm(&self) -> u32 {
        self.tempo.bpm()
    }

    pub fn tempo(&self) -> TempoConfig {
        self.tempo.snapshot()
    }

    // ========================================================================
    // TAP TEMPO
    // ========================================================================

    /// Register a tap at `now_ms` on any monotonic millisecond timeline.
    ///
    /// Once two or more taps are in the current session the estimate is
    /// applied as the new tempo and returned.
    pub fn record_tap(&self, now_ms: f64) -> Option<u32> {
        let estimate = lock_recover(&self.tap).record_tap(now_ms)?;
        let stored = self.tempo.set_bpm(estimate.into());
        self.emit_event(TelemetryEventKind::TapTempo { bpm: stored }, None);
        self.emit_tempo_changed();
        Some(stored)
    }

    /// Register a tap at the current wall-clock time.
    pub fn record_tap_now(&self) -> Option<u32> {
        let now_ms = self.start_instant.elapsed().as_secs_f64() * 1000.0;
        self.record_tap(now_ms)
    }

    // ========================================================================
    // BEAT RELAY
    // ========================================================================

    pub fn active_beat(&self) -> Option<ActiveBeat> {
        *self.active_tx.borrow()
    }

    /// Drain due clicks immediately instead of waiting for the relay poll.
    /// Returns how many were popped.
    pub fn drain_now(&self) -> usize {
        let clock = match lock_recover(&self.clock).as_ref() {
            Some(clock) => Arc::clone(clock),
            None => return 0,
        };
        let mut transport = self.lock_transport();
        let popped = transport.drain(clock.now());
        if popped > 0 && transport.is_playing() {
            self.active_tx.send_replace(transport.active_beat());
        }
        popped
    }

    /// Milliseconds elapsed since the handle was created.
    pub fn uptime_ms(&self) -> u64 {
        self.start_instant.elapsed().as_millis() as u64
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

impl Drop for MetronomeHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Default for MetronomeHandle {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn as_unavailable(err: AudioError) -> AudioError {
    match err {
        AudioError::BackendUnavailable { .. } => err,
        other => AudioError::BackendUnavailable {
            reason: other.to_string(),
        },
    }
}

fn build_timer_runtime() -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
}

/// Start the timer thread and wait until its runtime is up.
fn spawn_timer(ctx: TimerContext, build_runtime: RuntimeFactory) -> Result<TimerTask, AudioError> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (ready_tx, ready_rx) = mpsc::channel();

    // Dedicated thread with its own runtime: callers may not have a Tokio
    // runtime, and the timer must not share one with application work.
    let thread = std::thread::Builder::new()
        .name("click-track-timer".to_string())
        .spawn(move || {
            let rt = match build_runtime() {
                Ok(rt) => rt,
                Err(err) => {
                    let _ = ready_tx.send(Err(AudioError::HardwareError {
                        details: format!("Failed to build timer runtime: {}", err),
                    }));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            rt.block_on(async move {
                tokio::join!(
                    schedule_loop(&ctx, shutdown_rx.clone()),
                    relay_loop(&ctx, shutdown_rx)
                );
            });
        })
        .map_err(|e| AudioError::HardwareError {
            details: format!("Failed to spawn timer thread: {}", e),
        })?;

    let ready = ready_rx.recv().unwrap_or_else(|_| {
        Err(AudioError::HardwareError {
            details: "timer thread exited before reporting".to_string(),
        })
    });
    if let Err(err) = ready {
        if thread.join().is_err() {
            log::error!("[MetronomeHandle] Timer thread panicked during startup");
        }
        return Err(err);
    }

    Ok(TimerTask {
        shutdown_tx,
        thread,
    })
}

fn still_running(ctx: &TimerContext, transport: &Transport) -> bool {
    ctx.playing.load(Ordering::SeqCst) && transport.is_playing() && transport.run_id() == ctx.run_id
}

async fn schedule_loop(ctx: &TimerContext, mut shutdown_rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(ctx.tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut expected = tokio::time::Instant::now();

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            fired = interval.tick() => {
                let lateness = fired.saturating_duration_since(expected)
                    + tokio::time::Instant::now().saturating_duration_since(fired);
                expected = fired + ctx.tick_interval;

                {
                    let mut transport = lock_recover(&ctx.transport);
                    if !still_running(ctx, &transport) {
                        break;
                    }
                    transport.tick(ctx.clock.as_ref(), &ctx.tempo);
                }

                telemetry::hub().record_tick_lateness(lateness.as_secs_f32() * 1000.0);
            }
        }
    }

    tracing::debug!(run_id = ctx.run_id, "[MetronomeHandle] schedule loop exited");
}

async fn relay_loop(ctx: &TimerContext, mut shutdown_rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(ctx.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = interval.tick() => {
                let mut transport = lock_recover(&ctx.transport);
                if !still_running(ctx, &transport) {
                    break;
                }
                if transport.drain(ctx.clock.now()) > 0 {
                    let active = transport.active_beat();
                    ctx.active_tx.send_if_modified(|current| {
                        if *current != active {
                            *current = active;
                            true
                        } else {
                            false
                        }
                    });
                }
            }
        }
    }

    tracing::debug!(run_id = ctx.run_id, "[MetronomeHandle] relay loop exited");
}
