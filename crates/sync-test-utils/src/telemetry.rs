//! Capturing telemetry sink for assertions.

use live_sync::telemetry::{TelemetryEvent, TelemetrySink};
use std::sync::{Arc, Mutex};

/// Records every telemetry event for later inspection.
#[derive(Debug, Default)]
pub struct CapturingTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl CapturingTelemetry {
    /// Create a shared capturing sink.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of all recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().expect("telemetry events poisoned").clone()
    }

    /// Number of events recorded under the given stable name.
    #[must_use]
    pub fn count_named(&self, name: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| event.name == name)
            .count()
    }

    /// Drop all recorded events.
    pub fn clear(&self) {
        self.events.lock().expect("telemetry events poisoned").clear();
    }
}

impl TelemetrySink for CapturingTelemetry {
    fn record(&self, event: TelemetryEvent) {
        self.events.lock().expect("telemetry events poisoned").push(event);
    }
}
