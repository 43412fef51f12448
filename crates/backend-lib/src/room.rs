//! Room entity and its processing state machine.
//!
//! A room moves `Unprocessed -> Processing -> {ProcessedSuccess, ProcessedFailure}`;
//! a stuck `Processing` room is reset back to `Unprocessed` in place. Every run and
//! every reset bumps [`Room::generation`], which the stores use as a precondition so
//! that a run superseded by a reset can never overwrite the room.
use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tunepool_common::{RoomId, RoomResult, UserId};
use uuid::Uuid;

/// Display name used when a room is created without one
pub fn default_room_name(id: &str) -> String {
    format!("Room #{id}")
}

/// Generate a strong random room id (32 lowercase hex characters)
pub fn generate_room_id() -> RoomId {
    Uuid::new_v4().simple().to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Unprocessed,
    Processing,
    ProcessedSuccess,
    ProcessedFailure,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub owner: UserId,
    /// Members in join order; the owner is always first
    pub members: Vec<UserId>,
    pub locked: bool,
    pub status: RoomStatus,
    /// Version of the current or last processing run
    #[serde(default)]
    pub generation: u64,
    /// Bumped by every mutation; conditional writes compare it
    #[serde(default)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub processing_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub processing_duration_ms: Option<u64>,
    /// Set while a `Processing` run writes its result to the processed store
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub finalizing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<RoomResult>,
    /// Members who removed this processed room from their own view
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub dismissed_by: BTreeSet<UserId>,
}

impl Room {
    /// Create a fresh room owned by `owner`. An empty name falls back to the default template.
    pub fn new(id: RoomId, name: &str, owner: UserId) -> Self {
        let name = if name.trim().is_empty() {
            default_room_name(&id)
        } else {
            name.to_string()
        };

        Room {
            id,
            name,
            members: vec![owner.clone()],
            owner,
            locked: false,
            status: RoomStatus::Unprocessed,
            generation: 0,
            revision: 0,
            created_at: Utc::now(),
            processing_started_at: None,
            processing_duration_ms: None,
            finalizing: false,
            result: None,
            dismissed_by: BTreeSet::new(),
        }
    }

    pub fn is_member(&self, user: &str) -> bool {
        self.members.iter().any(|m| m == user)
    }

    pub fn is_owner(&self, user: &str) -> bool {
        self.owner == user
    }

    /// Whether `user` can see this room: a member who has not dismissed it
    pub fn is_visible_to(&self, user: &str) -> bool {
        self.is_member(user) && !self.dismissed_by.contains(user)
    }

    /// Add a member. Returns `false` when the user already was one.
    pub fn add_member(&mut self, user: UserId) -> bool {
        if self.is_member(&user) {
            return false;
        }
        self.members.push(user);
        self.revision += 1;
        true
    }

    /// Lock the member set. Returns `false` when the room already was locked.
    pub fn lock(&mut self) -> bool {
        if self.locked {
            return false;
        }
        self.locked = true;
        self.revision += 1;
        true
    }

    /// Enter `Processing` for a new run. Locks the room: the member set is frozen for the run.
    pub fn begin_processing(&mut self, now: DateTime<Utc>) {
        self.status = RoomStatus::Processing;
        self.generation += 1;
        self.processing_started_at = Some(now);
        self.processing_duration_ms = None;
        self.finalizing = false;
        self.result = None;
        self.locked = true;
        self.revision += 1;
    }

    /// Mark a `Processing` room as having its result written out. The room stays in
    /// `Processing` until the processed store holds it.
    pub fn begin_finalizing(&mut self) {
        self.finalizing = true;
        self.revision += 1;
    }

    pub fn finish_success(&mut self, result: RoomResult, now: DateTime<Utc>) {
        self.status = RoomStatus::ProcessedSuccess;
        self.finalizing = false;
        self.result = Some(result);
        self.processing_duration_ms = Some(self.elapsed_ms(now));
        self.revision += 1;
    }

    pub fn finish_failure(&mut self, now: DateTime<Utc>) {
        self.status = RoomStatus::ProcessedFailure;
        self.finalizing = false;
        self.result = None;
        self.processing_duration_ms = Some(self.elapsed_ms(now));
        self.revision += 1;
    }

    /// True when the room sits in `Processing` for longer than `deadline`
    pub fn has_processing_timed_out(&self, now: DateTime<Utc>, deadline: Duration) -> bool {
        if self.status != RoomStatus::Processing {
            return false;
        }
        match self.processing_started_at {
            Some(started) => now.signed_duration_since(started).to_std().is_ok_and(|elapsed| elapsed > deadline),
            // Processing without a start time can never complete a timeout check
            None => true,
        }
    }

    /// Reset a stuck run so that a new one can start. Supersedes the stuck run's generation.
    pub fn reset_processing(&mut self) {
        self.status = RoomStatus::Unprocessed;
        self.generation += 1;
        self.processing_started_at = None;
        self.processing_duration_ms = None;
        self.finalizing = false;
        self.result = None;
        self.revision += 1;
    }

    fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        self.processing_started_at
            .and_then(|started| now.signed_duration_since(started).to_std().ok())
            .map_or(0, |elapsed| elapsed.as_millis() as u64)
    }
}
