// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const ROOM_CREATED: &str = "room.created";
pub const ROOM_PROCESSED: &str = "room.processed";
pub const ROOM_PROCESSING_FAILED: &str = "room.processing_failed";
pub const ROOM_PROCESSING_SECONDS: &str = "room.processing_seconds";
pub const ROOM_TIMEOUT_RESET: &str = "room.timeout_reset";
pub const PROVIDER_PAGE_FETCHED: &str = "provider.page_fetched";
pub const PROVIDER_PAGE_ITEMS: &str = "provider.page_items";
pub const LIBRARY_COLLECTED_TRACKS: &str = "library.collected_tracks";
