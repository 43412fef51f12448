// ================
// common/src/lib.rs
// ================
//! Common types shared between the `TunePool` backend and its clients.
//! This module defines the track/playlist model, provider paging types and
//! the request/response bodies of the room API.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity of a user at the music provider
pub type UserId = String;

/// Opaque room identifier, used as the join key across both room stores
pub type RoomId = String;

/// Opaque provider cursor pointing at the next page of a listing
pub type Cursor = String;

/// A track as reported by the music provider
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Provider track id, stable across users
    pub id: String,
    /// Display name
    pub name: String,
    /// Artist names, in provider order
    #[serde(default)]
    pub artists: Vec<String>,
    /// Duration in milliseconds
    #[serde(default)]
    pub duration_ms: u32,
}

/// A playlist entry from a user's playlist listing
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    /// Provider playlist id
    pub id: String,
    /// Display name
    pub name: String,
    /// User owning the playlist. Followed playlists carry someone else's id.
    pub owner_id: UserId,
}

/// One page of a cursor-based provider listing
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Page<T> {
    /// Items of this page, in listing order
    pub items: Vec<T>,
    /// Total number of items the provider reports for the whole listing
    #[serde(default)]
    pub total: Option<u32>,
    /// Cursor of the next page; `None` means there are no more pages
    pub next: Option<Cursor>,
}

impl<T> Page<T> {
    /// Build the last page of a listing
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            total: None,
            next: None,
        }
    }

    /// Build a page followed by `next`
    pub fn with_next(items: Vec<T>, next: impl Into<Cursor>) -> Self {
        Self {
            items,
            total: None,
            next: Some(next.into()),
        }
    }
}

/// A track together with the room members that have it in their library
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SharedTrack {
    /// The track itself
    pub track: Track,
    /// Members owning the track, sorted
    pub owners: Vec<UserId>,
}

/// Result of merging the libraries of every room member
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct RoomResult {
    /// Tracks shared between members, most shared first
    pub tracks: Vec<SharedTrack>,
    /// Number of distinct tracks collected per member
    pub library_sizes: BTreeMap<UserId, usize>,
}

/// Body of a room creation request
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct NewRoom {
    /// Optional display name; a default embedding the room id is used when empty
    #[serde(default)]
    pub room_name: String,
}

/// Response to a successful room creation
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreatedRoom {
    /// Generated room id
    pub room_id: RoomId,
}

/// Response to a processing trigger
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingTrigger {
    /// A new processing run was started
    Started,
    /// A run is already in flight for this room
    AlreadyRunning,
    /// The room already holds a successful result
    AlreadyProcessed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_without_next_is_terminal() {
        let page: Page<Track> = serde_json::from_str(r#"{"items":[],"next":null}"#).unwrap();
        assert!(page.next.is_none());
        assert!(page.total.is_none());
    }

    #[test]
    fn new_room_name_defaults_to_empty() {
        let body: NewRoom = serde_json::from_str("{}").unwrap();
        assert!(body.room_name.is_empty());
    }

    #[test]
    fn processing_trigger_is_snake_case() {
        let json = serde_json::to_string(&ProcessingTrigger::AlreadyRunning).unwrap();
        assert_eq!(json, "\"already_running\"");
    }
}
