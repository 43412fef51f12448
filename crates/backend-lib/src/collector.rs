//! Per-user library collection: saved tracks, then the tracks of every playlist the
//! user owns, in playlist listing order. Followed playlists are skipped. Any failed
//! page aborts the whole collection for that user.
use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info};
use tunepool_common::{Track, UserId};

use crate::paginator::Paginator;
use crate::provider::{MusicProvider, ProviderError};
use crate::telemetry::Telemetry;

pub const SAVED_TRACKS: &str = "saved_tracks";
pub const PLAYLISTS: &str = "playlists";
pub const PLAYLIST_TRACKS: &str = "playlist_tracks";

/// Tracks collected for one user during one processing run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLibrary {
    pub user_id: UserId,
    /// Distinct tracks, saved tracks first, in collection order
    pub tracks: Vec<Track>,
    pub saved_track_count: usize,
    pub owned_playlist_count: usize,
}

impl UserLibrary {
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[derive(Clone)]
pub struct LibraryCollector {
    provider: Arc<dyn MusicProvider>,
    paginator: Paginator,
    telemetry: Arc<dyn Telemetry>,
}

impl LibraryCollector {
    pub fn new(provider: Arc<dyn MusicProvider>, paginator: Paginator, telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            provider,
            paginator,
            telemetry,
        }
    }

    pub async fn collect(&self, user: &str) -> Result<UserLibrary, ProviderError> {
        let result = self.collect_inner(user).await;
        if let Err(e) = &result {
            error!(user_id = user, error = %e, "failed to collect library");
        }
        result
    }

    async fn collect_inner(&self, user: &str) -> Result<UserLibrary, ProviderError> {
        let provider: &dyn MusicProvider = self.provider.as_ref();

        let saved = self
            .paginator
            .collect(SAVED_TRACKS, user, move |cursor| provider.list_saved_tracks(user, cursor))
            .await?;
        info!(user_id = user, tracks = saved.len(), "collected saved tracks");
        let saved_track_count = saved.len();

        let playlists = self
            .paginator
            .collect(PLAYLISTS, user, move |cursor| provider.list_playlists(user, cursor))
            .await?;
        let listed = playlists.len();
        let owned: Vec<_> = playlists.into_iter().filter(|p| p.owner_id == user).collect();
        info!(user_id = user, listed, owned = owned.len(), "collected playlists");

        let mut tracks = saved;
        for playlist in &owned {
            let playlist_id = playlist.id.as_str();
            let playlist_tracks = self
                .paginator
                .collect(PLAYLIST_TRACKS, user, move |cursor| {
                    provider.list_playlist_tracks(user, playlist_id, cursor)
                })
                .await?;
            info!(user_id = user, playlist_id, tracks = playlist_tracks.len(), "collected playlist tracks");
            tracks.extend(playlist_tracks);
        }

        let collected = tracks.len();
        let mut seen = HashSet::new();
        tracks.retain(|track| seen.insert(track.id.clone()));
        info!(user_id = user, collected, distinct = tracks.len(), "library collected");
        self.telemetry.library_collected(user, tracks.len());

        Ok(UserLibrary {
            user_id: user.to_string(),
            tracks,
            saved_track_count,
            owned_playlist_count: owned.len(),
        })
    }
}
