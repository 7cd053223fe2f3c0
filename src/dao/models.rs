use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Lifecycle state of a poll. Transitions only move forward: an `Active` poll
/// becomes `Ended` or `Deleted` and never returns; see [`crate::state::lifecycle`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    /// The poll is open for votes.
    Active,
    /// The poll was closed by its creator; results are archived.
    Ended,
    /// The poll was discarded by its creator; the record stays in the archive.
    Deleted,
}

impl PollStatus {
    /// Whether this status counts as archived (visible in the past-polls view).
    pub fn is_past(self) -> bool {
        matches!(self, PollStatus::Ended | PollStatus::Deleted)
    }

    /// Wire label for this status, matching its serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            PollStatus::Active => "active",
            PollStatus::Ended => "ended",
            PollStatus::Deleted => "deleted",
        }
    }
}

/// Snapshot of a user taken when a poll is created. Display names are
/// deliberately denormalized and do not track later profile changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollParticipantEntity {
    /// Directory identifier of the user.
    pub id: String,
    /// Display name at poll-creation time.
    pub display_name: String,
}

/// Aggregate poll entity persisted by the storage layer.
///
/// Invariant: `ended_at` is present exactly when `status` is `Ended` or
/// `Deleted`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollEntity {
    /// Primary key of the poll, assigned at creation.
    pub id: Uuid,
    /// Display name of the poll.
    pub name: String,
    /// Directory id of the creating user; immutable after creation.
    pub creator_id: String,
    /// Creator display name snapshot.
    pub creator_display_name: String,
    /// Ordered participant set; the creator is always first and ids are unique.
    pub participants: Vec<PollParticipantEntity>,
    /// Current lifecycle state.
    pub status: PollStatus,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Set when the poll leaves the `Active` state (end or delete).
    pub ended_at: Option<SystemTime>,
}

impl PollEntity {
    /// Whether the given user created this poll.
    pub fn is_creator(&self, user_id: &str) -> bool {
        self.creator_id == user_id
    }
}

/// One voter's immutable choice within one poll. At most one vote exists per
/// `(poll_id, voter_id)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteEntity {
    /// Poll this vote belongs to.
    pub poll_id: Uuid,
    /// Directory id of the voting user.
    pub voter_id: String,
    /// Directory id of the chosen participant.
    pub voted_for_id: String,
    /// Timestamp assigned by the store; defines the vote ordering.
    pub created_at: SystemTime,
}

/// Process-wide singleton naming at most one currently running poll and
/// whether a creation is in flight.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivePollStatusEntity {
    /// The currently active poll, if any.
    pub active_poll_id: Option<Uuid>,
    /// True while a creation holds the slot but has not committed yet.
    pub is_creating: bool,
}

impl ActivePollStatusEntity {
    /// Whether the slot is free for a new poll creation.
    pub fn is_idle(&self) -> bool {
        self.active_poll_id.is_none() && !self.is_creating
    }
}
