//! Engine module housing the click engine core.
//!
//! This module exposes trait-based clock sources (`backend`), the
//! Stopped/Playing state machine (`transport`) and the `MetronomeHandle`
//! orchestration layer (`core`).

pub mod backend;
pub mod core;
pub mod transport;

pub use backend::{
    AudioBackend, ClockSource, CpalBackend, ManualBackend, ManualClock, SilentBackend,
    SilentClock, UnavailableBackend,
};
pub use core::{MetronomeHandle, TelemetryEvent, TelemetryEventKind};
pub use transport::{PlaybackState, Transport};
