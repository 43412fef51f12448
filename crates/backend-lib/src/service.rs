// ============================
// tunepool-backend/src/service.rs
// ============================
//! Room operations on top of the two stores.
//!
//! Reads look in the unprocessed store first and fall back to the processed store.
//! Reading an unprocessed room applies the processing timeout: a room stuck in
//! `Processing` past the deadline is reset to `Unprocessed` and persisted before it is
//! returned.
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tunepool_common::{ProcessingTrigger, RoomResult};

use crate::error::AppError;
use crate::processing::{Processor, RunOutcome};
use crate::room::{generate_room_id, Room, RoomStatus};
use crate::storage::{Precondition, Storage};
use crate::telemetry::Telemetry;

/// Attempts for a read-modify-write before giving up on a busy room
const MAX_WRITE_ATTEMPTS: usize = 5;

/// A room as shown to one user
#[derive(Serialize, Debug, Clone)]
pub struct RoomView {
    #[serde(flatten)]
    pub room: Room,
    pub is_owner: bool,
}

/// Outcome of a processing request. `run` is set only when this call started the run.
#[derive(Debug)]
pub struct ProcessingStart {
    pub trigger: ProcessingTrigger,
    pub run: Option<JoinHandle<RunOutcome>>,
}

/// Which store a room was found in
enum Located {
    Unprocessed(Room),
    Processed(Room),
}

impl Located {
    fn into_room(self) -> Room {
        match self {
            Located::Unprocessed(room) | Located::Processed(room) => room,
        }
    }
}

pub struct RoomService {
    store: Arc<dyn Storage>,
    processor: Arc<Processor>,
    telemetry: Arc<dyn Telemetry>,
    processing_timeout: Duration,
}

impl RoomService {
    pub fn new(
        store: Arc<dyn Storage>,
        processor: Arc<Processor>,
        telemetry: Arc<dyn Telemetry>,
        processing_timeout: Duration,
    ) -> Self {
        Self {
            store,
            processor,
            telemetry,
            processing_timeout,
        }
    }

    /// Create an unprocessed room owned by `owner`, who becomes its first member
    pub async fn create_room(&self, name: &str, owner: &str) -> Result<Room, AppError> {
        if owner.trim().is_empty() {
            return Err(AppError::Unauthorized("missing user".to_string()));
        }

        let room = Room::new(generate_room_id(), name, owner.to_string());
        self.store.put_unprocessed(&room).await?;

        info!(room_id = %room.id, room_name = %room.name, owner, "room created");
        self.telemetry.room_created(&room.id, &room.name);
        Ok(room)
    }

    /// Fetch a room from whichever store holds it, resetting a timed-out run
    pub async fn get_room(&self, id: &str) -> Result<Room, AppError> {
        match self.locate(id).await? {
            Located::Unprocessed(room) => self.reset_if_timed_out(room).await,
            Located::Processed(room) => Ok(room),
        }
    }

    /// Fetch a room on behalf of one of its members
    pub async fn get_room_for_user(&self, id: &str, user: &str) -> Result<RoomView, AppError> {
        let room = self.get_room(id).await?;
        if !room.is_visible_to(user) {
            return Err(AppError::NotMember);
        }
        Ok(RoomView {
            is_owner: room.is_owner(user),
            room,
        })
    }

    /// Add `user` to the room. Joining a room one already belongs to is a no-op, even when locked.
    pub async fn add_user(&self, id: &str, user: &str) -> Result<(), AppError> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut room = self.get_room(id).await?;
            if room.is_member(user) {
                return Ok(());
            }
            if room.locked || room.status != RoomStatus::Unprocessed {
                return Err(AppError::RoomLocked);
            }

            let expected = Precondition::of(&room);
            room.add_member(user.to_string());
            if self.store.put_unprocessed_if(&room, expected).await? {
                info!(room_id = id, user_id = user, members = room.members.len(), "user joined room");
                return Ok(());
            }
        }
        Err(AppError::Internal(format!("room {id} kept changing during update")))
    }

    /// Lock the member set. Only the owner may lock; locking twice is a no-op.
    pub async fn lock_room(&self, id: &str, user: &str) -> Result<(), AppError> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut room = self.get_room(id).await?;
            if !room.is_visible_to(user) {
                return Err(AppError::NotMember);
            }
            if !room.is_owner(user) {
                return Err(AppError::NotOwner);
            }
            // Rooms past Unprocessed are locked for good
            if room.status != RoomStatus::Unprocessed {
                return Ok(());
            }

            let expected = Precondition::of(&room);
            if !room.lock() {
                return Ok(());
            }
            if self.store.put_unprocessed_if(&room, expected).await? {
                info!(room_id = id, "room locked");
                return Ok(());
            }
        }
        Err(AppError::Internal(format!("room {id} kept changing during update")))
    }

    /// Delete a room for `user`.
    ///
    /// A room in the processed store is only hidden from `user`. A room still in the
    /// unprocessed store is deleted for every member.
    pub async fn delete_room(&self, id: &str, user: &str) -> Result<(), AppError> {
        let located = self.locate(id).await?;
        let room = match &located {
            Located::Unprocessed(room) | Located::Processed(room) => room,
        };
        if !room.is_visible_to(user) {
            return Err(AppError::NotMember);
        }

        match located {
            Located::Processed(_) => {
                self.store.delete_processed_for_user(id, user).await?;
                info!(room_id = id, user_id = user, "processed room dismissed by user");
            },
            // A run is writing the processed copy; deleting now would let it reappear.
            // A finalize that outlived the processing timeout no longer holds the room.
            Located::Unprocessed(room)
                if room.finalizing && !room.has_processing_timed_out(Utc::now(), self.processing_timeout) =>
            {
                return Err(AppError::ProcessingInProgress);
            },
            Located::Unprocessed(_) => {
                self.store.delete_unprocessed(id).await?;
                info!(room_id = id, user_id = user, "unprocessed room deleted for all members");
            },
        }
        Ok(())
    }

    /// Ask for the room to be processed.
    ///
    /// Only an `Unprocessed` room starts a run; the room is locked as it enters `Processing`.
    /// A failed room is never processed again.
    pub async fn start_processing(&self, id: &str, user: &str) -> Result<ProcessingStart, AppError> {
        let room = self.get_room(id).await?;
        if !room.is_visible_to(user) {
            return Err(AppError::NotMember);
        }

        let trigger = match room.status {
            RoomStatus::ProcessedSuccess => ProcessingTrigger::AlreadyProcessed,
            RoomStatus::Processing => ProcessingTrigger::AlreadyRunning,
            RoomStatus::ProcessedFailure => return Err(AppError::ProcessingFailed),
            RoomStatus::Unprocessed => match self.processor.begin(room).await? {
                Some(room) => {
                    let run = self.processor.spawn(room);
                    return Ok(ProcessingStart {
                        trigger: ProcessingTrigger::Started,
                        run: Some(run),
                    });
                },
                None => ProcessingTrigger::AlreadyRunning,
            },
        };

        Ok(ProcessingStart { trigger, run: None })
    }

    /// The merged result of a successfully processed room
    pub async fn get_result(&self, id: &str, user: &str) -> Result<RoomResult, AppError> {
        let view = self.get_room_for_user(id, user).await?;
        match view.room.status {
            RoomStatus::Unprocessed => Err(AppError::ProcessingNotStarted),
            RoomStatus::Processing => Err(AppError::ProcessingInProgress),
            RoomStatus::ProcessedFailure => Err(AppError::ProcessingFailed),
            RoomStatus::ProcessedSuccess => view
                .room
                .result
                .ok_or_else(|| AppError::Internal(format!("room {id} is processed without a result"))),
        }
    }

    /// Every room `user` can see. A room present in both stores is listed once, from
    /// the unprocessed store.
    pub async fn list_rooms_for_user(&self, user: &str) -> Result<Vec<Room>, AppError> {
        let unprocessed = self.store.list_unprocessed_for_user(user).await?;
        let processed = self.store.list_processed_for_user(user).await?;

        let mut seen = HashSet::new();
        let mut rooms = Vec::with_capacity(unprocessed.len() + processed.len());
        for room in unprocessed.into_iter().chain(processed) {
            if seen.insert(room.id.clone()) {
                rooms.push(room);
            }
        }
        Ok(rooms)
    }

    /// Remove unprocessed copies of rooms that already reached the processed store.
    /// Returns how many copies were removed.
    pub async fn reconcile(&self) -> Result<usize, AppError> {
        let mut removed = 0;
        for id in self.store.list_processed_ids().await? {
            let Some(stale) = self.store.get_unprocessed(&id).await? else {
                continue;
            };
            if self.store.delete_unprocessed(&id).await? {
                warn!(room_id = %id, status = ?stale.status, "removed unprocessed copy of processed room");
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "reconciliation finished");
        }
        Ok(removed)
    }

    async fn locate(&self, id: &str) -> Result<Located, AppError> {
        if let Some(room) = self.store.get_unprocessed(id).await? {
            return Ok(Located::Unprocessed(room));
        }
        match self.store.get_processed(id).await? {
            Some(room) => Ok(Located::Processed(room)),
            None => Err(AppError::RoomNotFound),
        }
    }

    async fn reset_if_timed_out(&self, mut room: Room) -> Result<Room, AppError> {
        if !room.has_processing_timed_out(Utc::now(), self.processing_timeout) {
            return Ok(room);
        }

        warn!(
            room_id = %room.id,
            room_name = %room.name,
            generation = room.generation,
            started_at = ?room.processing_started_at,
            "processing timed out, resetting room"
        );
        let expected = Precondition::of(&room);
        room.reset_processing();
        if self.store.put_unprocessed_if(&room, expected).await? {
            self.telemetry.room_timeout_reset(&room.id, &room.name);
            return Ok(room);
        }

        // Someone else moved the room on in the meantime; report what is stored now
        info!(room_id = %room.id, "room changed during timeout reset");
        Ok(self.locate(&room.id).await?.into_room())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::LibraryCollector;
    use crate::merge::CommonTracksMerger;
    use crate::paginator::Paginator;
    use crate::provider::FixtureProvider;
    use crate::storage::MemoryStorage;
    use crate::telemetry::NoopTelemetry;

    fn service(store: Arc<MemoryStorage>) -> RoomService {
        let telemetry: Arc<dyn Telemetry> = Arc::new(NoopTelemetry);
        let collector = LibraryCollector::new(
            Arc::new(FixtureProvider::new(50)),
            Paginator::new(Duration::from_millis(100), telemetry.clone()),
            telemetry.clone(),
        );
        let processor = Processor::new(
            store.clone(),
            collector,
            Arc::new(CommonTracksMerger::default()),
            telemetry.clone(),
        );
        RoomService::new(store, Arc::new(processor), telemetry, Duration::from_secs(600))
    }

    #[tokio::test]
    async fn test_add_user_rules() {
        let service = service(Arc::new(MemoryStorage::new()));
        let room = service.create_room("", "alice").await.unwrap();

        service.add_user(&room.id, "bob").await.unwrap();
        service.add_user(&room.id, "bob").await.unwrap();
        service.lock_room(&room.id, "alice").await.unwrap();

        // Members may re-join a locked room, others may not
        service.add_user(&room.id, "bob").await.unwrap();
        assert!(matches!(
            service.add_user(&room.id, "carol").await,
            Err(AppError::RoomLocked)
        ));

        let room = service.get_room(&room.id).await.unwrap();
        assert_eq!(room.members, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[tokio::test]
    async fn test_only_owner_locks() {
        let service = service(Arc::new(MemoryStorage::new()));
        let room = service.create_room("Road trip", "alice").await.unwrap();
        service.add_user(&room.id, "bob").await.unwrap();

        assert!(matches!(service.lock_room(&room.id, "bob").await, Err(AppError::NotOwner)));
        assert!(matches!(service.lock_room(&room.id, "carol").await, Err(AppError::NotMember)));
        service.lock_room(&room.id, "alice").await.unwrap();
        assert!(service.get_room(&room.id).await.unwrap().locked);
    }

    #[tokio::test]
    async fn test_room_view_marks_owner() {
        let service = service(Arc::new(MemoryStorage::new()));
        let room = service.create_room("", "alice").await.unwrap();
        service.add_user(&room.id, "bob").await.unwrap();

        assert!(service.get_room_for_user(&room.id, "alice").await.unwrap().is_owner);
        assert!(!service.get_room_for_user(&room.id, "bob").await.unwrap().is_owner);
        assert!(matches!(
            service.get_room_for_user(&room.id, "carol").await,
            Err(AppError::NotMember)
        ));
        assert!(matches!(
            service.get_room_for_user("missing", "alice").await,
            Err(AppError::RoomNotFound)
        ));
    }

    #[tokio::test]
    async fn test_failed_room_is_not_restarted() {
        let store = Arc::new(MemoryStorage::new());
        let service = service(store.clone());
        let mut room = service.create_room("", "alice").await.unwrap();
        room.begin_processing(Utc::now());
        room.finish_failure(Utc::now());
        store.put_unprocessed(&room).await.unwrap();

        assert!(matches!(
            service.start_processing(&room.id, "alice").await,
            Err(AppError::ProcessingFailed)
        ));
        assert!(matches!(
            service.get_result(&room.id, "alice").await,
            Err(AppError::ProcessingFailed)
        ));
    }

    #[tokio::test]
    async fn test_result_before_processing() {
        let service = service(Arc::new(MemoryStorage::new()));
        let room = service.create_room("", "alice").await.unwrap();
        assert!(matches!(
            service.get_result(&room.id, "alice").await,
            Err(AppError::ProcessingNotStarted)
        ));
    }
}
