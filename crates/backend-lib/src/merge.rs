//! Merge of the member libraries into a room result.
use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tunepool_common::{RoomResult, SharedTrack, Track, UserId};

use crate::collector::UserLibrary;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("no library to merge")]
    NoLibraries,

    #[error("library of {0} was collected twice")]
    DuplicateMember(UserId),
}

/// Pure merge of collected libraries. Must not depend on the order of `libraries`.
pub trait LibraryMerger: Send + Sync {
    fn merge(&self, libraries: &[UserLibrary]) -> Result<RoomResult, MergeError>;
}

/// Keeps tracks owned by at least `min_owners` members (every track for a
/// single-member room), most shared first.
#[derive(Debug, Clone, Copy)]
pub struct CommonTracksMerger {
    pub min_owners: usize,
}

impl Default for CommonTracksMerger {
    fn default() -> Self {
        Self { min_owners: 2 }
    }
}

impl LibraryMerger for CommonTracksMerger {
    fn merge(&self, libraries: &[UserLibrary]) -> Result<RoomResult, MergeError> {
        if libraries.is_empty() {
            return Err(MergeError::NoLibraries);
        }

        let mut library_sizes = BTreeMap::new();
        // track id -> (track, owners)
        let mut by_track: BTreeMap<&str, (&Track, BTreeSet<&str>)> = BTreeMap::new();

        for library in libraries {
            if library_sizes.insert(library.user_id.clone(), library.len()).is_some() {
                return Err(MergeError::DuplicateMember(library.user_id.clone()));
            }
            for track in &library.tracks {
                by_track
                    .entry(track.id.as_str())
                    .or_insert_with(|| (track, BTreeSet::new()))
                    .1
                    .insert(library.user_id.as_str());
            }
        }

        let min_owners = self.min_owners.min(libraries.len()).max(1);
        let mut tracks: Vec<SharedTrack> = by_track
            .into_values()
            .filter(|(_, owners)| owners.len() >= min_owners)
            .map(|(track, owners)| SharedTrack {
                track: track.clone(),
                owners: owners.into_iter().map(str::to_string).collect(),
            })
            .collect();

        // Stable sort keeps the id order from the BTreeMap among equal counts
        tracks.sort_by(|a, b| b.owners.len().cmp(&a.owners.len()));

        Ok(RoomResult {
            tracks,
            library_sizes,
        })
    }
}
