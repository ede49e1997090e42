//! Metric event types published by the scheduling pipeline.

use serde::{Deserialize, Serialize};

/// Lifecycle stages of the clock source and transport.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    BackendOpened,
    BackendFailed,
    PlaybackStarted,
    PlaybackStopped,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    /// Rolling wall-clock lateness of the scheduling tick
    TickJitter {
        avg_ms: f32,
        max_ms: f32,
        sample_count: usize,
    },
    /// One scheduling pass handed `count` clicks to the clock source;
    /// `lead_ms` is how far ahead of the clock the first one lies.
    ClicksScheduled { count: usize, lead_ms: f32 },
    CursorResync { skipped_notes: u64 },
    Lifecycle {
        phase: LifecyclePhase,
        timestamp_ms: u64,
    },
    /// `code` is the `ErrorCode::code` of the underlying error
    Error { code: i32, context: String },
}
