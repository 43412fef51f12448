// ============================
// tunepool-backend/src/lib.rs
// ============================
//! Core backend functionality for the `TunePool` room server.

pub mod collector;
pub mod config;
pub mod error;
pub mod merge;
pub mod metrics;
pub mod paginator;
pub mod processing;
pub mod provider;
pub mod room;
pub mod routes;
pub mod service;
pub mod storage;
pub mod telemetry;

use std::sync::Arc;

use crate::collector::LibraryCollector;
use crate::config::Settings;
use crate::merge::{CommonTracksMerger, LibraryMerger};
use crate::paginator::Paginator;
use crate::processing::Processor;
use crate::provider::MusicProvider;
use crate::service::RoomService;
use crate::storage::Storage;
use crate::telemetry::Telemetry;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Room operations
    pub rooms: Arc<RoomService>,
    /// Settings the state was built from
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Wire the room service with the default merger
    pub fn new(
        settings: Settings,
        store: Arc<dyn Storage>,
        provider: Arc<dyn MusicProvider>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self::with_merger(settings, store, provider, Arc::new(CommonTracksMerger::default()), telemetry)
    }

    pub fn with_merger(
        settings: Settings,
        store: Arc<dyn Storage>,
        provider: Arc<dyn MusicProvider>,
        merger: Arc<dyn LibraryMerger>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        let paginator = Paginator::new(settings.provider.page_delay(), telemetry.clone());
        let collector = LibraryCollector::new(provider, paginator, telemetry.clone());
        let processor = Processor::new(store.clone(), collector, merger, telemetry.clone());
        let rooms = RoomService::new(store, Arc::new(processor), telemetry, settings.processing.timeout());

        Self {
            rooms: Arc::new(rooms),
            settings: Arc::new(settings),
        }
    }
}
