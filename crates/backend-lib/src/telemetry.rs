//! Telemetry sink injected into the room service, the orchestrator and the collector.
//!
//! Calls are synchronous and infallible; a sink must never block the caller.
use std::sync::Mutex;
use std::time::Duration;

use metrics::{counter, histogram};

use crate::metrics as keys;

/// Outcome of a processing run, as reported to telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

pub trait Telemetry: Send + Sync {
    fn room_created(&self, room_id: &str, room_name: &str);

    fn room_processed(&self, room_id: &str, room_name: &str, outcome: Outcome, elapsed: Duration);

    fn room_timeout_reset(&self, room_id: &str, room_name: &str);

    /// One provider page was drained. `page` starts at 1.
    fn page_fetched(&self, listing: &str, user_id: &str, page: usize, items: usize);

    fn library_collected(&self, user_id: &str, tracks: usize);
}

/// Forwards to the `metrics` facade. Without an installed recorder every call is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsTelemetry;

impl Telemetry for MetricsTelemetry {
    fn room_created(&self, room_id: &str, room_name: &str) {
        counter!(keys::ROOM_CREATED, "room_id" => room_id.to_string(), "room_name" => room_name.to_string())
            .increment(1);
    }

    fn room_processed(&self, room_id: &str, room_name: &str, outcome: Outcome, elapsed: Duration) {
        let labels = [
            ("room_id", room_id.to_string()),
            ("room_name", room_name.to_string()),
        ];
        histogram!(keys::ROOM_PROCESSING_SECONDS, &labels).record(elapsed.as_secs_f64());
        match outcome {
            Outcome::Success => counter!(keys::ROOM_PROCESSED, &labels).increment(1),
            Outcome::Failure => counter!(keys::ROOM_PROCESSING_FAILED, &labels).increment(1),
        }
    }

    fn room_timeout_reset(&self, room_id: &str, room_name: &str) {
        counter!(keys::ROOM_TIMEOUT_RESET, "room_id" => room_id.to_string(), "room_name" => room_name.to_string())
            .increment(1);
    }

    fn page_fetched(&self, listing: &str, _user_id: &str, _page: usize, items: usize) {
        counter!(keys::PROVIDER_PAGE_FETCHED, "listing" => listing.to_string()).increment(1);
        histogram!(keys::PROVIDER_PAGE_ITEMS, "listing" => listing.to_string()).record(items as f64);
    }

    fn library_collected(&self, _user_id: &str, tracks: usize) {
        histogram!(keys::LIBRARY_COLLECTED_TRACKS).record(tracks as f64);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn room_created(&self, _room_id: &str, _room_name: &str) {}
    fn room_processed(&self, _room_id: &str, _room_name: &str, _outcome: Outcome, _elapsed: Duration) {}
    fn room_timeout_reset(&self, _room_id: &str, _room_name: &str) {}
    fn page_fetched(&self, _listing: &str, _user_id: &str, _page: usize, _items: usize) {}
    fn library_collected(&self, _user_id: &str, _tracks: usize) {}
}

/// Event captured by [`RecordingTelemetry`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryEvent {
    RoomCreated { room_id: String },
    RoomProcessed { room_id: String, outcome: Outcome },
    RoomTimeoutReset { room_id: String },
    PageFetched { listing: String, user_id: String, page: usize, items: usize },
    LibraryCollected { user_id: String, tracks: usize },
}

/// Keeps every event in memory, for assertions in tests and tooling
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    fn push(&self, event: TelemetryEvent) {
        // A poisoned lock only loses telemetry
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl Telemetry for RecordingTelemetry {
    fn room_created(&self, room_id: &str, _room_name: &str) {
        self.push(TelemetryEvent::RoomCreated {
            room_id: room_id.to_string(),
        });
    }

    fn room_processed(&self, room_id: &str, _room_name: &str, outcome: Outcome, _elapsed: Duration) {
        self.push(TelemetryEvent::RoomProcessed {
            room_id: room_id.to_string(),
            outcome,
        });
    }

    fn room_timeout_reset(&self, room_id: &str, _room_name: &str) {
        self.push(TelemetryEvent::RoomTimeoutReset {
            room_id: room_id.to_string(),
        });
    }

    fn page_fetched(&self, listing: &str, user_id: &str, page: usize, items: usize) {
        self.push(TelemetryEvent::PageFetched {
            listing: listing.to_string(),
            user_id: user_id.to_string(),
            page,
            items,
        });
    }

    fn library_collected(&self, user_id: &str, tracks: usize) {
        self.push(TelemetryEvent::LibraryCollected {
            user_id: user_id.to_string(),
            tracks,
        });
    }
}
