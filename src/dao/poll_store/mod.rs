/// Always-available in-process backend.
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{ActivePollStatusEntity, PollEntity, PollStatus, VoteEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use std::time::SystemTime;
use uuid::Uuid;

/// Result of claiming the poll-creation slot on the active-poll singleton.
///
/// The claim is a compare-and-swap: it succeeds only when the singleton is
/// idle (`active_poll_id == None && !is_creating`), so two concurrent
/// creations can never both pass the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotClaim {
    /// The slot was idle and is now held (`is_creating = true`).
    Acquired,
    /// Another poll is active or being created; carries the observed state.
    Busy(ActivePollStatusEntity),
}

/// Result of moving a poll to a terminal status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishOutcome {
    /// The poll was active and now carries the requested terminal status.
    Finished(PollEntity),
    /// The poll had already left the active state; carries the status found.
    NotActive(PollStatus),
    /// No poll with that id exists.
    Missing,
}

/// Result of persisting a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteInsert {
    /// The vote is now durable.
    Inserted,
    /// A vote by the same voter already exists for this poll; nothing was
    /// written (first writer wins).
    Duplicate,
}

/// Abstraction over the persistence layer for polls, votes, and the
/// active-poll singleton.
///
/// Backends must make `acquire_creation_slot` and `finish_poll` atomic with
/// respect to concurrent callers; everything else is a plain read or insert.
pub trait PollStore: Send + Sync {
    /// Persist a freshly created poll.
    fn insert_poll(&self, poll: PollEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Look up a poll by id.
    fn find_poll(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PollEntity>>>;
    /// All polls whose status is `Ended` or `Deleted`, newest `ended_at` first.
    fn past_polls(&self) -> BoxFuture<'static, StorageResult<Vec<PollEntity>>>;
    /// Atomically flip an active poll to `status`, stamp `ended_at`, and clear
    /// the singleton when it points at this poll.
    fn finish_poll(
        &self,
        id: Uuid,
        status: PollStatus,
        ended_at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<FinishOutcome>>;
    /// Persist a vote unless the voter already voted in this poll.
    fn insert_vote(&self, vote: VoteEntity) -> BoxFuture<'static, StorageResult<VoteInsert>>;
    /// Look up the vote a user cast in a poll, if any.
    fn find_vote(
        &self,
        poll_id: Uuid,
        voter_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<VoteEntity>>>;
    /// All votes for a poll ordered by `created_at` ascending.
    fn votes_for_poll(&self, poll_id: Uuid)
    -> BoxFuture<'static, StorageResult<Vec<VoteEntity>>>;
    /// Current singleton state, lazily initialized to the idle default when
    /// the record does not exist yet.
    fn active_status(&self) -> BoxFuture<'static, StorageResult<ActivePollStatusEntity>>;
    /// Compare-and-swap claim of the creation slot.
    fn acquire_creation_slot(&self) -> BoxFuture<'static, StorageResult<SlotClaim>>;
    /// Publish a committed creation: `active_poll_id = id`, `is_creating = false`.
    fn commit_creation(&self, poll_id: Uuid) -> BoxFuture<'static, StorageResult<()>>;
    /// Roll the singleton back to idle after a failed creation.
    fn release_creation_slot(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Probe backend connectivity.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Attempt to re-establish a dropped backend connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
