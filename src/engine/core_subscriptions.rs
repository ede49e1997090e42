use futures::{Stream, StreamExt};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::{BroadcastStream, WatchStream};

use super::{MetronomeHandle, TelemetryEvent};
use crate::scheduler::ActiveBeat;

impl MetronomeHandle {
    // ========================================================================
    // STREAM SUBSCRIPTIONS
    // ========================================================================

    /// Receiver for the active beat. `None` while nothing is sounding or
    /// playback is stopped. Only the latest value is retained.
    pub fn subscribe_active_beat(&self) -> watch::Receiver<Option<ActiveBeat>> {
        self.active_tx.subscribe()
    }

    pub fn subscribe_telemetry(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.telemetry_tx.subscribe()
    }

    // ========================================================================
    // ASYNC STREAM ADAPTERS
    // ========================================================================

    /// Stream of active-beat changes, starting with the current value.
    pub fn active_beat_stream(&self) -> impl Stream<Item = Option<ActiveBeat>> + Unpin {
        WatchStream::new(self.subscribe_active_beat())
    }

    /// Stream of handle telemetry. Events missed by a lagging consumer are
    /// skipped.
    pub fn telemetry_stream(&self) -> impl Stream<Item = TelemetryEvent> + Unpin {
        BroadcastStream::new(self.subscribe_telemetry())
            .filter_map(|event| futures::future::ready(event.ok()))
    }
}
