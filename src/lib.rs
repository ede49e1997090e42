// Click Track Core - Rust metronome engine
// Sample-accurate click scheduling on the audio device timeline

// Module declarations
pub mod api;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod telemetry;
pub mod tempo;

// Re-exports for convenience
pub use engine::MetronomeHandle;
pub use error::{AudioError, ErrorCode, TempoError};
pub use scheduler::{ActiveBeat, ClickEvent};
pub use tempo::{Subdivision, TapTempo, TempoConfig, TempoPatch};

/// Install a stderr `tracing` subscriber at `level`.
///
/// `log` records from the engine are forwarded through `tracing`'s log
/// compatibility. Calling this more than once is a no-op.
pub fn init_logging(level: tracing::Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
