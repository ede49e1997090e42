use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::audio::ToneRequest;
use crate::error::AudioError;

use super::{AudioBackend, ClockSource};

/// Deterministic clock driven by hand.
///
/// Time only moves when [`ManualClock::set`] or [`ManualClock::advance`] is
/// called, and every scheduled tone is recorded. Used by the offline renderer,
/// the `schedule` CLI command and tests.
pub struct ManualClock {
    now_bits: AtomicU64,
    tones: Mutex<Vec<ToneRequest>>,
    resume_count: AtomicU64,
    fail_resume: AtomicBool,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(0.0)
    }

    pub fn starting_at(time: f64) -> Self {
        Self {
            now_bits: AtomicU64::new(time.to_bits()),
            tones: Mutex::new(Vec::new()),
            resume_count: AtomicU64::new(0),
            fail_resume: AtomicBool::new(false),
        }
    }

    /// Jump to `time`. Moving backwards is ignored to keep the timeline
    /// monotonic.
    pub fn set(&self, time: f64) {
        let _ = self
            .now_bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                (time > f64::from_bits(bits)).then(|| time.to_bits())
            });
    }

    pub fn advance(&self, seconds: f64) {
        self.set(ClockSource::now(self) + seconds.max(0.0));
    }

    /// Copy of every tone scheduled so far, in scheduling order.
    pub fn scheduled_tones(&self) -> Vec<ToneRequest> {
        self.tones
            .lock()
            .map(|tones| tones.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Remove and return every tone scheduled so far.
    pub fn take_tones(&self) -> Vec<ToneRequest> {
        let mut tones = self
            .tones
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *tones)
    }

    pub fn resume_count(&self) -> u64 {
        self.resume_count.load(Ordering::SeqCst)
    }

    /// Make subsequent `resume` calls fail, simulating a device that refuses
    /// to start.
    pub fn set_fail_resume(&self, fail: bool) {
        self.fail_resume.store(fail, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.now_bits.load(Ordering::Acquire))
    }

    fn schedule_tone(&self, tone: ToneRequest) -> Result<(), AudioError> {
        let mut tones = self.tones.lock().map_err(|_| AudioError::LockPoisoned {
            component: "manual_clock".to_string(),
        })?;
        tones.push(tone);
        Ok(())
    }

    fn resume(&self) -> Result<(), AudioError> {
        if self.fail_resume.load(Ordering::SeqCst) {
            return Err(AudioError::HardwareError {
                details: "manual clock refused to resume".to_string(),
            });
        }
        self.resume_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Backend handing out one shared [`ManualClock`].
pub struct ManualBackend {
    clock: Arc<ManualClock>,
}

impl ManualBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(ManualClock::new()))
    }

    pub fn with_clock(clock: Arc<ManualClock>) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> Arc<ManualClock> {
        Arc::clone(&self.clock)
    }
}

impl Default for ManualBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for ManualBackend {
    fn open(&self) -> Result<Arc<dyn ClockSource>, AudioError> {
        let clock: Arc<dyn ClockSource> = self.clock.clone();
        Ok(clock)
    }

    fn name(&self) -> &'static str {
        "manual"
    }
}

const SILENT_HISTORY: usize = 256;

/// Real-time clock without audio output.
///
/// Time follows `Instant` from the first resume, tones are counted and the
/// most recent ones kept for inspection. Lets the full engine run on hosts
/// without an output device.
pub struct SilentClock {
    origin: Mutex<Option<Instant>>,
    recent: Mutex<VecDeque<ToneRequest>>,
    total: AtomicU64,
}

impl SilentClock {
    pub fn new() -> Self {
        Self {
            origin: Mutex::new(None),
            recent: Mutex::new(VecDeque::with_capacity(SILENT_HISTORY)),
            total: AtomicU64::new(0),
        }
    }

    pub fn tone_count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn recent_tones(&self) -> Vec<ToneRequest> {
        self.recent
            .lock()
            .map(|recent| recent.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl Default for SilentClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for SilentClock {
    fn now(&self) -> f64 {
        self.origin
            .lock()
            .ok()
            .and_then(|origin| *origin)
            .map(|origin| origin.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn schedule_tone(&self, tone: ToneRequest) -> Result<(), AudioError> {
        let mut recent = self.recent.lock().map_err(|_| AudioError::LockPoisoned {
            component: "silent_clock".to_string(),
        })?;
        if recent.len() == SILENT_HISTORY {
            recent.pop_front();
        }
        recent.push_back(tone);
        self.total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn resume(&self) -> Result<(), AudioError> {
        let mut origin = self.origin.lock().map_err(|_| AudioError::LockPoisoned {
            component: "silent_clock".to_string(),
        })?;
        origin.get_or_insert_with(Instant::now);
        Ok(())
    }
}

#[derive(Default)]
pub struct SilentBackend {
    clock: Arc<SilentClock>,
}

impl SilentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clock(&self) -> Arc<SilentClock> {
        Arc::clone(&self.clock)
    }
}

impl AudioBackend for SilentBackend {
    fn open(&self) -> Result<Arc<dyn ClockSource>, AudioError> {
        let clock: Arc<dyn ClockSource> = self.clock.clone();
        Ok(clock)
    }

    fn name(&self) -> &'static str {
        "silent"
    }
}

/// Backend whose clock can never be opened.
pub struct UnavailableBackend {
    reason: String,
}

impl UnavailableBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl AudioBackend for UnavailableBackend {
    fn open(&self) -> Result<Arc<dyn ClockSource>, AudioError> {
        Err(AudioError::BackendUnavailable {
            reason: self.reason.clone(),
        })
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}
