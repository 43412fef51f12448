// ============================
// tunepool-backend/src/storage.rs
// ============================
//! Storage abstraction over the two room stores, with flat-file and in-memory implementations.
//!
//! The unprocessed store holds rooms being built, processed, or that failed processing.
//! The processed store holds rooms with a finalized successful result.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{fs, io};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::fs as tokio_fs;
use tokio::sync::Mutex;
use tunepool_common::RoomId;

use crate::error::AppError;
use crate::room::{Room, RoomStatus};

const UNPROCESSED_DIR: &str = "unprocessed-rooms";
const PROCESSED_DIR: &str = "processed-rooms";

/// Expected state of a stored unprocessed room for a conditional write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precondition {
    pub status: RoomStatus,
    pub generation: u64,
    pub revision: u64,
}

impl Precondition {
    /// The state `room` is in right now
    pub fn of(room: &Room) -> Self {
        Self {
            status: room.status,
            generation: room.generation,
            revision: room.revision,
        }
    }

    fn holds_for(&self, stored: &Room) -> bool {
        stored.status == self.status && stored.generation == self.generation && stored.revision == self.revision
    }
}

/// Trait for storage backends
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_unprocessed(&self, id: &str) -> Result<Option<Room>, AppError>;

    /// Insert or overwrite a room in the unprocessed store
    async fn put_unprocessed(&self, room: &Room) -> Result<(), AppError>;

    /// Overwrite a room in the unprocessed store only if the stored copy matches
    /// `expected`. Atomic: returns `false` without writing when the room is absent
    /// or in another state.
    async fn put_unprocessed_if(&self, room: &Room, expected: Precondition) -> Result<bool, AppError>;

    /// Remove a room from the unprocessed store. Returns whether it was present.
    async fn delete_unprocessed(&self, id: &str) -> Result<bool, AppError>;

    /// Remove a room from the unprocessed store only if the stored copy matches `expected`.
    /// Atomic like [`Storage::put_unprocessed_if`].
    async fn delete_unprocessed_if(&self, id: &str, expected: Precondition) -> Result<bool, AppError>;

    async fn get_processed(&self, id: &str) -> Result<Option<Room>, AppError>;

    async fn put_processed(&self, room: &Room) -> Result<(), AppError>;

    /// Hide a processed room from `user`. The document goes away once every member
    /// dismissed it. Returns whether the user could see the room.
    async fn delete_processed_for_user(&self, id: &str, user: &str) -> Result<bool, AppError>;

    async fn list_unprocessed_for_user(&self, user: &str) -> Result<Vec<Room>, AppError>;

    async fn list_processed_for_user(&self, user: &str) -> Result<Vec<Room>, AppError>;

    /// Every room id in the processed store, for reconciliation
    async fn list_processed_ids(&self) -> Result<Vec<RoomId>, AppError>;
}

/// Record a dismissal; returns `true` once every member dismissed the room
fn dismiss(room: &mut Room, user: &str) -> bool {
    room.dismissed_by.insert(user.to_string());
    dismissed_by_all(room)
}

fn dismissed_by_all(room: &Room) -> bool {
    room.members.iter().all(|m| room.dismissed_by.contains(m))
}

fn sort_rooms(rooms: &mut [Room]) {
    rooms.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

/// Flat-file implementation of the Storage trait: one JSON document per room.
#[derive(Clone)]
pub struct FlatFileStorage {
    root: PathBuf,
    unprocessed_lock: Arc<Mutex<()>>,
    processed_lock: Arc<Mutex<()>>,
}

impl FlatFileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(UNPROCESSED_DIR))?;
        fs::create_dir_all(root.join(PROCESSED_DIR))?;
        Ok(Self {
            root,
            unprocessed_lock: Arc::new(Mutex::new(())),
            processed_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Path of a room document. `None` for ids that cannot name a file.
    fn room_path(&self, area: &str, id: &str) -> Option<PathBuf> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(self.root.join(area).join(format!("{id}.json")))
    }

    async fn read_room(&self, area: &str, id: &str) -> Result<Option<Room>, AppError> {
        let Some(path) = self.room_path(area, id) else {
            return Ok(None);
        };

        match tokio_fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write through a temp file + rename so readers never see a partial document
    async fn write_room(&self, area: &str, room: &Room) -> Result<(), AppError> {
        let path = self
            .room_path(area, &room.id)
            .ok_or_else(|| AppError::InvalidInput(format!("invalid room id {:?}", room.id)))?;
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(room)?;
        tokio_fs::write(&tmp, json).await?;
        tokio_fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove_room(&self, area: &str, id: &str) -> Result<bool, AppError> {
        let Some(path) = self.room_path(area, id) else {
            return Ok(false);
        };

        match tokio_fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_all(&self, area: &str) -> Result<Vec<Room>, AppError> {
        let mut rooms = Vec::new();
        let mut entries = tokio_fs::read_dir(self.root.join(area)).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            // A document deleted between read_dir and read is simply skipped
            match tokio_fs::read_to_string(&path).await {
                Ok(content) => rooms.push(serde_json::from_str(&content)?),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }

        sort_rooms(&mut rooms);
        Ok(rooms)
    }
}

#[async_trait]
impl Storage for FlatFileStorage {
    async fn get_unprocessed(&self, id: &str) -> Result<Option<Room>, AppError> {
        self.read_room(UNPROCESSED_DIR, id).await
    }

    async fn put_unprocessed(&self, room: &Room) -> Result<(), AppError> {
        let _guard = self.unprocessed_lock.lock().await;
        self.write_room(UNPROCESSED_DIR, room).await
    }

    async fn put_unprocessed_if(&self, room: &Room, expected: Precondition) -> Result<bool, AppError> {
        let _guard = self.unprocessed_lock.lock().await;

        match self.read_room(UNPROCESSED_DIR, &room.id).await? {
            Some(stored) if expected.holds_for(&stored) => {
                self.write_room(UNPROCESSED_DIR, room).await?;
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn delete_unprocessed(&self, id: &str) -> Result<bool, AppError> {
        let _guard = self.unprocessed_lock.lock().await;
        self.remove_room(UNPROCESSED_DIR, id).await
    }

    async fn delete_unprocessed_if(&self, id: &str, expected: Precondition) -> Result<bool, AppError> {
        let _guard = self.unprocessed_lock.lock().await;

        match self.read_room(UNPROCESSED_DIR, id).await? {
            Some(stored) if expected.holds_for(&stored) => self.remove_room(UNPROCESSED_DIR, id).await,
            _ => Ok(false),
        }
    }

    async fn get_processed(&self, id: &str) -> Result<Option<Room>, AppError> {
        self.read_room(PROCESSED_DIR, id).await
    }

    async fn put_processed(&self, room: &Room) -> Result<(), AppError> {
        let _guard = self.processed_lock.lock().await;
        self.write_room(PROCESSED_DIR, room).await
    }

    async fn delete_processed_for_user(&self, id: &str, user: &str) -> Result<bool, AppError> {
        let _guard = self.processed_lock.lock().await;

        let Some(mut room) = self.read_room(PROCESSED_DIR, id).await? else {
            return Ok(false);
        };
        if !room.is_visible_to(user) {
            return Ok(false);
        }

        if dismiss(&mut room, user) {
            self.remove_room(PROCESSED_DIR, id).await?;
        } else {
            self.write_room(PROCESSED_DIR, &room).await?;
        }
        Ok(true)
    }

    async fn list_unprocessed_for_user(&self, user: &str) -> Result<Vec<Room>, AppError> {
        let mut rooms = self.read_all(UNPROCESSED_DIR).await?;
        rooms.retain(|room| room.is_visible_to(user));
        Ok(rooms)
    }

    async fn list_processed_for_user(&self, user: &str) -> Result<Vec<Room>, AppError> {
        let mut rooms = self.read_all(PROCESSED_DIR).await?;
        rooms.retain(|room| room.is_visible_to(user));
        Ok(rooms)
    }

    async fn list_processed_ids(&self) -> Result<Vec<RoomId>, AppError> {
        Ok(self
            .read_all(PROCESSED_DIR)
            .await?
            .into_iter()
            .map(|room| room.id)
            .collect())
    }
}

/// In-memory implementation of the Storage trait
#[derive(Clone, Default)]
pub struct MemoryStorage {
    unprocessed: Arc<DashMap<RoomId, Room>>,
    processed: Arc<DashMap<RoomId, Room>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn visible(map: &DashMap<RoomId, Room>, user: &str) -> Vec<Room> {
        let mut rooms: Vec<Room> = map
            .iter()
            .filter(|entry| entry.value().is_visible_to(user))
            .map(|entry| entry.value().clone())
            .collect();
        sort_rooms(&mut rooms);
        rooms
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_unprocessed(&self, id: &str) -> Result<Option<Room>, AppError> {
        Ok(self.unprocessed.get(id).map(|entry| entry.value().clone()))
    }

    async fn put_unprocessed(&self, room: &Room) -> Result<(), AppError> {
        self.unprocessed.insert(room.id.clone(), room.clone());
        Ok(())
    }

    async fn put_unprocessed_if(&self, room: &Room, expected: Precondition) -> Result<bool, AppError> {
        // The shard write lock held by get_mut makes check and write one step
        match self.unprocessed.get_mut(&room.id) {
            Some(mut stored) if expected.holds_for(stored.value()) => {
                *stored = room.clone();
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn delete_unprocessed(&self, id: &str) -> Result<bool, AppError> {
        Ok(self.unprocessed.remove(id).is_some())
    }

    async fn delete_unprocessed_if(&self, id: &str, expected: Precondition) -> Result<bool, AppError> {
        Ok(self
            .unprocessed
            .remove_if(id, |_, stored| expected.holds_for(stored))
            .is_some())
    }

    async fn get_processed(&self, id: &str) -> Result<Option<Room>, AppError> {
        Ok(self.processed.get(id).map(|entry| entry.value().clone()))
    }

    async fn put_processed(&self, room: &Room) -> Result<(), AppError> {
        self.processed.insert(room.id.clone(), room.clone());
        Ok(())
    }

    async fn delete_processed_for_user(&self, id: &str, user: &str) -> Result<bool, AppError> {
        // Check and dismissal happen under the shard write lock held by get_mut
        let remove = match self.processed.get_mut(id) {
            Some(mut stored) if stored.is_visible_to(user) => dismiss(stored.value_mut(), user),
            _ => return Ok(false),
        };
        if remove {
            self.processed.remove_if(id, |_, stored| dismissed_by_all(stored));
        }
        Ok(true)
    }

    async fn list_unprocessed_for_user(&self, user: &str) -> Result<Vec<Room>, AppError> {
        Ok(Self::visible(&self.unprocessed, user))
    }

    async fn list_processed_for_user(&self, user: &str) -> Result<Vec<Room>, AppError> {
        Ok(Self::visible(&self.processed, user))
    }

    async fn list_processed_ids(&self) -> Result<Vec<RoomId>, AppError> {
        let mut ids: Vec<RoomId> = self.processed.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}
