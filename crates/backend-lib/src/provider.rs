//! Music provider client interface.
//!
//! Every listing is cursor based: a call without cursor returns the first page and
//! `Page::next == None` marks the last one. Rate limiting is the caller's job
//! (see [`crate::paginator`]), providers do no backoff of their own.
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs as tokio_fs;
use tracing::{info, warn};
use tunepool_common::{Cursor, Page, Playlist, Track, UserId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("user {0} is no longer connected to the music provider")]
    NotConnected(UserId),

    #[error("playlist {0} not found")]
    PlaylistNotFound(String),

    #[error("invalid page cursor {0:?}")]
    InvalidCursor(Cursor),

    #[error("provider rate limit exceeded")]
    RateLimited,

    #[error("provider request failed: {0}")]
    Upstream(String),
}

#[async_trait]
pub trait MusicProvider: Send + Sync {
    /// Tracks the user saved/liked
    async fn list_saved_tracks(&self, user: &str, cursor: Option<Cursor>) -> Result<Page<Track>, ProviderError>;

    /// Playlists the user owns or follows
    async fn list_playlists(&self, user: &str, cursor: Option<Cursor>) -> Result<Page<Playlist>, ProviderError>;

    async fn list_playlist_tracks(
        &self,
        user: &str,
        playlist_id: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<Track>, ProviderError>;
}

/// A user's library as served by [`FixtureProvider`]
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LibraryFixture {
    #[serde(default)]
    pub saved_tracks: Vec<Track>,
    #[serde(default)]
    pub playlists: Vec<PlaylistFixture>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PlaylistFixture {
    #[serde(flatten)]
    pub playlist: Playlist,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

/// Serves in-memory libraries in pages of `page_size`; cursors are item offsets.
#[derive(Clone)]
pub struct FixtureProvider {
    libraries: Arc<DashMap<UserId, LibraryFixture>>,
    page_size: usize,
}

impl FixtureProvider {
    pub fn new(page_size: usize) -> Self {
        Self {
            libraries: Arc::new(DashMap::new()),
            page_size: page_size.max(1),
        }
    }

    /// Load every `<user>.json` file of `dir`. A missing directory yields an empty provider.
    pub async fn load_dir<P: AsRef<Path>>(dir: P, page_size: usize) -> anyhow::Result<Self> {
        let provider = Self::new(page_size);
        let dir = dir.as_ref();

        if !tokio_fs::try_exists(dir).await? {
            warn!(dir = %dir.display(), "library directory missing, no user is connected");
            return Ok(provider);
        }

        let mut entries = tokio_fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(user) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let content = tokio_fs::read_to_string(&path).await?;
            let library: LibraryFixture = serde_json::from_str(&content)?;
            provider.insert(user.to_string(), library);
        }

        info!(users = provider.libraries.len(), dir = %dir.display(), "loaded library fixtures");
        Ok(provider)
    }

    pub fn insert(&self, user: UserId, library: LibraryFixture) {
        self.libraries.insert(user, library);
    }

    /// Forget a user, as if their provider link had expired
    pub fn disconnect(&self, user: &str) {
        self.libraries.remove(user);
    }

    fn library(&self, user: &str) -> Result<LibraryFixture, ProviderError> {
        self.libraries
            .get(user)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ProviderError::NotConnected(user.to_string()))
    }

    fn page_of<T: Clone>(&self, items: &[T], cursor: Option<Cursor>) -> Result<Page<T>, ProviderError> {
        let offset = match cursor {
            None => 0,
            Some(cursor) => cursor
                .parse::<usize>()
                .ok()
                .filter(|offset| *offset <= items.len())
                .ok_or(ProviderError::InvalidCursor(cursor))?,
        };

        let end = (offset + self.page_size).min(items.len());
        Ok(Page {
            items: items[offset..end].to_vec(),
            total: Some(items.len() as u32),
            next: (end < items.len()).then(|| end.to_string()),
        })
    }
}

#[async_trait]
impl MusicProvider for FixtureProvider {
    async fn list_saved_tracks(&self, user: &str, cursor: Option<Cursor>) -> Result<Page<Track>, ProviderError> {
        let library = self.library(user)?;
        self.page_of(&library.saved_tracks, cursor)
    }

    async fn list_playlists(&self, user: &str, cursor: Option<Cursor>) -> Result<Page<Playlist>, ProviderError> {
        let library = self.library(user)?;
        let playlists: Vec<Playlist> = library.playlists.into_iter().map(|p| p.playlist).collect();
        self.page_of(&playlists, cursor)
    }

    async fn list_playlist_tracks(
        &self,
        user: &str,
        playlist_id: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<Track>, ProviderError> {
        let library = self.library(user)?;
        let playlist = library
            .playlists
            .iter()
            .find(|p| p.playlist.id == playlist_id)
            .ok_or_else(|| ProviderError::PlaylistNotFound(playlist_id.to_string()))?;
        self.page_of(&playlist.tracks, cursor)
    }
}
