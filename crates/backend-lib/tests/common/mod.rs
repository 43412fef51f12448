//! Test utilities shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tunepool_backend::{
    config::Settings,
    error::AppError,
    provider::{FixtureProvider, LibraryFixture, MusicProvider, PlaylistFixture, ProviderError},
    room::Room,
    storage::{FlatFileStorage, MemoryStorage, Precondition, Storage},
    telemetry::RecordingTelemetry,
    AppState,
};
use tunepool_common::{Cursor, Page, Playlist, RoomId, Track, UserId};

pub fn track(id: &str) -> Track {
    Track {
        id: id.to_string(),
        name: format!("Track {id}"),
        artists: vec!["Artist".to_string()],
        duration_ms: 200_000,
    }
}

pub fn tracks(ids: &[&str]) -> Vec<Track> {
    ids.iter().map(|id| track(id)).collect()
}

pub fn owned_playlist(id: &str, owner: &str, ids: &[&str]) -> PlaylistFixture {
    PlaylistFixture {
        playlist: Playlist {
            id: id.to_string(),
            name: format!("Playlist {id}"),
            owner_id: owner.to_string(),
        },
        tracks: tracks(ids),
    }
}

pub fn library(saved: &[&str], playlists: Vec<PlaylistFixture>) -> LibraryFixture {
    LibraryFixture {
        saved_tracks: tracks(saved),
        playlists,
    }
}

/// Settings for tests: the given page size and a short page delay
pub fn test_settings(page_size: usize) -> Settings {
    let mut settings = Settings::default();
    settings.provider.page_size = page_size;
    settings.provider.page_delay_ms = 1;
    settings
}

/// App state over flat-file storage in a temporary directory.
///
/// Keep the returned `TempDir` in scope for the duration of the test.
pub fn setup_test_env<P: MusicProvider + 'static>(
    provider: P,
) -> (Arc<AppState>, Arc<FlatFileStorage>, Arc<RecordingTelemetry>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let storage = Arc::new(FlatFileStorage::new(temp_dir.path()).unwrap());
    let telemetry = Arc::new(RecordingTelemetry::new());

    let mut settings = test_settings(2);
    settings.storage.path = temp_dir.path().to_path_buf();

    let state = AppState::new(settings, storage.clone(), Arc::new(provider), telemetry.clone());
    (Arc::new(state), storage, telemetry, temp_dir)
}

/// App state over any store, with in-memory telemetry
pub fn state_with_store<P: MusicProvider + 'static>(
    store: Arc<dyn Storage>,
    provider: P,
    settings: Settings,
) -> (Arc<AppState>, Arc<RecordingTelemetry>) {
    let telemetry = Arc::new(RecordingTelemetry::new());
    let state = AppState::new(settings, store, Arc::new(provider), telemetry.clone());
    (Arc::new(state), telemetry)
}

/// Fixture provider that can hold every call until released and fail one user's playlists
pub struct TestProvider {
    pub inner: FixtureProvider,
    gate: Option<Arc<Semaphore>>,
    failing_playlists: Option<UserId>,
}

impl TestProvider {
    pub fn new(inner: FixtureProvider) -> Self {
        Self {
            inner,
            gate: None,
            failing_playlists: None,
        }
    }

    /// Hold every call until permits are added to the returned semaphore
    pub fn gated(inner: FixtureProvider) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let provider = Self {
            gate: Some(gate.clone()),
            ..Self::new(inner)
        };
        (provider, gate)
    }

    pub fn failing_playlists_for(mut self, user: &str) -> Self {
        self.failing_playlists = Some(user.to_string());
        self
    }

    async fn wait(&self) {
        if let Some(gate) = &self.gate {
            // Permit goes back on drop, so one release opens the gate for good
            let _permit = gate.acquire().await.unwrap();
        }
    }
}

#[async_trait]
impl MusicProvider for TestProvider {
    async fn list_saved_tracks(&self, user: &str, cursor: Option<Cursor>) -> Result<Page<Track>, ProviderError> {
        self.wait().await;
        self.inner.list_saved_tracks(user, cursor).await
    }

    async fn list_playlists(&self, user: &str, cursor: Option<Cursor>) -> Result<Page<Playlist>, ProviderError> {
        self.wait().await;
        if self.failing_playlists.as_deref() == Some(user) {
            return Err(ProviderError::Upstream("playlists unavailable".to_string()));
        }
        self.inner.list_playlists(user, cursor).await
    }

    async fn list_playlist_tracks(
        &self,
        user: &str,
        playlist_id: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<Track>, ProviderError> {
        self.wait().await;
        self.inner.list_playlist_tracks(user, playlist_id, cursor).await
    }
}

/// Memory store whose processed-store writes, and one chosen conditional write, can be made to fail
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStorage,
    pub fail_processed_writes: AtomicBool,
    /// 1-based number of the `put_unprocessed_if` call to fail, 0 for none
    pub fail_conditional_write_at: AtomicUsize,
    conditional_writes: AtomicUsize,
}

impl FlakyStore {
    pub fn failing_processed_writes() -> Self {
        let store = Self::default();
        store.fail_processed_writes.store(true, Ordering::SeqCst);
        store
    }

    /// Processed writes fail, and so does the conditional write number `call`
    pub fn failing_processed_and_conditional_write(call: usize) -> Self {
        let store = Self::failing_processed_writes();
        store.fail_conditional_write_at.store(call, Ordering::SeqCst);
        store
    }
}

#[async_trait]
impl Storage for FlakyStore {
    async fn get_unprocessed(&self, id: &str) -> Result<Option<Room>, AppError> {
        self.inner.get_unprocessed(id).await
    }

    async fn put_unprocessed(&self, room: &Room) -> Result<(), AppError> {
        self.inner.put_unprocessed(room).await
    }

    async fn put_unprocessed_if(&self, room: &Room, expected: Precondition) -> Result<bool, AppError> {
        let call = self.conditional_writes.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_conditional_write_at.load(Ordering::SeqCst) {
            return Err(AppError::Persistence("unprocessed store unavailable".to_string()));
        }
        self.inner.put_unprocessed_if(room, expected).await
    }

    async fn delete_unprocessed(&self, id: &str) -> Result<bool, AppError> {
        self.inner.delete_unprocessed(id).await
    }

    async fn delete_unprocessed_if(&self, id: &str, expected: Precondition) -> Result<bool, AppError> {
        self.inner.delete_unprocessed_if(id, expected).await
    }

    async fn get_processed(&self, id: &str) -> Result<Option<Room>, AppError> {
        self.inner.get_processed(id).await
    }

    async fn put_processed(&self, room: &Room) -> Result<(), AppError> {
        if self.fail_processed_writes.load(Ordering::SeqCst) {
            return Err(AppError::Persistence("processed store unavailable".to_string()));
        }
        self.inner.put_processed(room).await
    }

    async fn delete_processed_for_user(&self, id: &str, user: &str) -> Result<bool, AppError> {
        self.inner.delete_processed_for_user(id, user).await
    }

    async fn list_unprocessed_for_user(&self, user: &str) -> Result<Vec<Room>, AppError> {
        self.inner.list_unprocessed_for_user(user).await
    }

    async fn list_processed_for_user(&self, user: &str) -> Result<Vec<Room>, AppError> {
        self.inner.list_processed_for_user(user).await
    }

    async fn list_processed_ids(&self) -> Result<Vec<RoomId>, AppError> {
        self.inner.list_processed_ids().await
    }
}

/// Assert that a room lives in exactly one of the two stores
pub async fn assert_in_one_store(store: &dyn Storage, id: &str) {
    let unprocessed = store.get_unprocessed(id).await.unwrap().is_some();
    let processed = store.get_processed(id).await.unwrap().is_some();
    assert!(unprocessed != processed, "room {id}: unprocessed={unprocessed} processed={processed}");
}
