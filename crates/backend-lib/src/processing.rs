//! Processing orchestrator: collects every member library concurrently, merges them and
//! finalizes the room across the two stores.
//!
//! Every write a run makes is conditional on the room still being in the state the run
//! left it in. A run superseded by a timeout reset (or any other change) loses its
//! conditional write and its result is discarded.
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::collector::{LibraryCollector, UserLibrary};
use crate::error::AppError;
use crate::merge::LibraryMerger;
use crate::room::{Room, RoomStatus};
use crate::storage::{Precondition, Storage};
use crate::telemetry::{Outcome, Telemetry};

/// How a processing run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Result stored in the processed store
    Succeeded,
    /// Room marked `ProcessedFailure`, or left in `Processing` for the timeout to reset
    Failed,
    /// Another writer changed the room first; nothing of this run was kept
    Superseded,
}

pub struct Processor {
    store: Arc<dyn Storage>,
    collector: LibraryCollector,
    merger: Arc<dyn LibraryMerger>,
    telemetry: Arc<dyn Telemetry>,
}

impl Processor {
    pub fn new(
        store: Arc<dyn Storage>,
        collector: LibraryCollector,
        merger: Arc<dyn LibraryMerger>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            store,
            collector,
            merger,
            telemetry,
        }
    }

    /// Move an `Unprocessed` room to `Processing`.
    ///
    /// Returns the room as stored for the new run, or `None` when another caller changed
    /// the room first (it then is already running, or otherwise no longer startable).
    pub async fn begin(&self, mut room: Room) -> Result<Option<Room>, AppError> {
        if room.status != RoomStatus::Unprocessed {
            return Ok(None);
        }

        let expected = Precondition::of(&room);
        room.begin_processing(Utc::now());
        if !self.store.put_unprocessed_if(&room, expected).await? {
            info!(room_id = %room.id, "room changed before processing could start");
            return Ok(None);
        }

        info!(room_id = %room.id, generation = room.generation, members = room.members.len(), "processing started");
        Ok(Some(room))
    }

    /// Run a begun room in the background
    pub fn spawn(self: &Arc<Self>, room: Room) -> JoinHandle<RunOutcome> {
        let processor = Arc::clone(self);
        tokio::spawn(async move { processor.run(room).await })
    }

    /// Collect, merge and finalize one run. `room` must be the copy returned by [`Processor::begin`].
    pub async fn run(&self, room: Room) -> RunOutcome {
        let started = Instant::now();

        let libraries = match self.collect_all(&room).await {
            Ok(libraries) => libraries,
            Err(e) => {
                warn!(room_id = %room.id, generation = room.generation, error = %e, "library collection failed");
                return self.fail(room, started).await;
            },
        };

        match self.merger.merge(&libraries) {
            Ok(result) => {
                info!(room_id = %room.id, shared_tracks = result.tracks.len(), "libraries merged");
                self.succeed(room, result, started).await
            },
            Err(e) => {
                error!(room_id = %room.id, error = %e, "failed to merge libraries");
                self.fail(room, started).await
            },
        }
    }

    /// Collect every member library. All collections run to completion even when one
    /// fails early; partial work is dropped.
    async fn collect_all(&self, room: &Room) -> Result<Vec<UserLibrary>, AppError> {
        let collections = join_all(room.members.iter().map(|member| self.collector.collect(member))).await;

        let mut libraries: Vec<UserLibrary> = Vec::with_capacity(collections.len());
        let mut failed = Vec::new();
        for (member, collection) in room.members.iter().zip(collections) {
            match collection {
                Ok(library) => libraries.push(library),
                Err(e) => failed.push(format!("{member}: {e}")),
            }
        }

        if failed.is_empty() {
            Ok(libraries)
        } else {
            Err(AppError::UpstreamCollectionFailed(failed.join(", ")))
        }
    }

    async fn succeed(&self, mut room: Room, result: tunepool_common::RoomResult, started: Instant) -> RunOutcome {
        // Claim the finalize. The room stays Processing until the processed copy exists,
        // so a crash from here on is undone by the timeout reset.
        let expected = Precondition::of(&room);
        room.begin_finalizing();
        match self.store.put_unprocessed_if(&room, expected).await {
            Ok(true) => {},
            Ok(false) => return self.superseded(&room),
            Err(e) => {
                error!(room_id = %room.id, error = %e, "failed to claim finalize, room stays in processing");
                self.report(&room, Outcome::Failure, started);
                return RunOutcome::Failed;
            },
        }
        let claimed = Precondition::of(&room);

        let mut processed = room.clone();
        processed.finish_success(result, Utc::now());
        if let Err(e) = self.store.put_processed(&processed).await {
            error!(room_id = %room.id, error = %e, "failed to store processed room, marking processing as failed");
            room.finish_failure(Utc::now());
            match self.store.put_unprocessed_if(&room, claimed).await {
                Ok(true) => {},
                Ok(false) => warn!(room_id = %room.id, "room changed while its result was being stored"),
                Err(e) => error!(
                    room_id = %room.id,
                    error = %e,
                    "failed to record processing failure, room stays in processing until its timeout"
                ),
            }
            self.report(&room, Outcome::Failure, started);
            return RunOutcome::Failed;
        }

        // The processed copy is authoritative from here on; a leftover unprocessed copy
        // is cleaned up by reconciliation
        match self.store.delete_unprocessed_if(&room.id, claimed).await {
            Ok(true) => {},
            Ok(false) => warn!(room_id = %room.id, "room changed while finalizing, leaving its copy to reconciliation"),
            Err(e) => error!(
                room_id = %room.id,
                error = %e,
                "failed to remove unprocessed copy of a processed room, recovery needed"
            ),
        }

        info!(
            room_id = %room.id,
            generation = processed.generation,
            duration_ms = processed.processing_duration_ms,
            "processing succeeded"
        );
        self.report(&processed, Outcome::Success, started);
        RunOutcome::Succeeded
    }

    async fn fail(&self, mut room: Room, started: Instant) -> RunOutcome {
        let expected = Precondition::of(&room);
        room.finish_failure(Utc::now());
        match self.store.put_unprocessed_if(&room, expected).await {
            Ok(true) => {
                info!(room_id = %room.id, generation = room.generation, "processing failed");
                self.report(&room, Outcome::Failure, started);
                RunOutcome::Failed
            },
            Ok(false) => self.superseded(&room),
            Err(e) => {
                error!(room_id = %room.id, error = %e, "failed to record processing failure");
                self.report(&room, Outcome::Failure, started);
                RunOutcome::Failed
            },
        }
    }

    fn superseded(&self, room: &Room) -> RunOutcome {
        warn!(
            room_id = %room.id,
            generation = room.generation,
            "processing run was superseded, discarding its result"
        );
        RunOutcome::Superseded
    }

    fn report(&self, room: &Room, outcome: Outcome, started: Instant) {
        self.telemetry
            .room_processed(&room.id, &room.name, outcome, started.elapsed());
    }
}
