use std::{collections::HashMap, sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dao::{
    models::{ActivePollStatusEntity, PollEntity, PollStatus, VoteEntity},
    poll_store::{FinishOutcome, PollStore, SlotClaim, VoteInsert},
    storage::StorageResult,
};

/// In-process [`PollStore`] backend.
///
/// All state lives behind a single `RwLock`, which makes the singleton
/// compare-and-swap and the two-write poll finish trivially atomic. This is
/// the default backend and the one the service tests run against.
#[derive(Clone, Default)]
pub struct MemoryPollStore {
    inner: Arc<RwLock<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    polls: HashMap<Uuid, PollEntity>,
    // Votes per poll, keyed by voter id. The key doubles as the stored
    // uniqueness backstop for the one-vote-per-voter rule.
    votes: HashMap<Uuid, IndexMap<String, VoteEntity>>,
    status: ActivePollStatusEntity,
}

impl MemoryPollStore {
    /// Create an empty store with an idle singleton.
    pub fn new() -> Self {
        Self::default()
    }

    async fn insert_poll(&self, poll: PollEntity) {
        let mut state = self.inner.write().await;
        state.polls.insert(poll.id, poll);
    }

    async fn find_poll(&self, id: Uuid) -> Option<PollEntity> {
        let state = self.inner.read().await;
        state.polls.get(&id).cloned()
    }

    async fn past_polls(&self) -> Vec<PollEntity> {
        let state = self.inner.read().await;
        let mut past: Vec<PollEntity> = state
            .polls
            .values()
            .filter(|poll| poll.status.is_past())
            .cloned()
            .collect();
        past.sort_by(|a, b| b.ended_at.cmp(&a.ended_at));
        past
    }

    async fn finish_poll(
        &self,
        id: Uuid,
        status: PollStatus,
        ended_at: SystemTime,
    ) -> FinishOutcome {
        let mut state = self.inner.write().await;
        let Some(poll) = state.polls.get_mut(&id) else {
            return FinishOutcome::Missing;
        };
        if poll.status != PollStatus::Active {
            return FinishOutcome::NotActive(poll.status);
        }

        poll.status = status;
        poll.ended_at = Some(ended_at);
        let finished = poll.clone();

        // Same critical section as the status flip: the poll must never be
        // terminal while the singleton still points at it.
        if state.status.active_poll_id == Some(id) {
            state.status = ActivePollStatusEntity::default();
        }

        FinishOutcome::Finished(finished)
    }

    async fn insert_vote(&self, vote: VoteEntity) -> VoteInsert {
        let mut state = self.inner.write().await;
        let votes = state.votes.entry(vote.poll_id).or_default();
        if votes.contains_key(&vote.voter_id) {
            return VoteInsert::Duplicate;
        }
        votes.insert(vote.voter_id.clone(), vote);
        VoteInsert::Inserted
    }

    async fn find_vote(&self, poll_id: Uuid, voter_id: &str) -> Option<VoteEntity> {
        let state = self.inner.read().await;
        state
            .votes
            .get(&poll_id)
            .and_then(|votes| votes.get(voter_id))
            .cloned()
    }

    async fn votes_for_poll(&self, poll_id: Uuid) -> Vec<VoteEntity> {
        let state = self.inner.read().await;
        let mut votes: Vec<VoteEntity> = state
            .votes
            .get(&poll_id)
            .map(|votes| votes.values().cloned().collect())
            .unwrap_or_default();
        // Stable sort: insertion order breaks `created_at` ties.
        votes.sort_by_key(|vote| vote.created_at);
        votes
    }

    async fn active_status(&self) -> ActivePollStatusEntity {
        let state = self.inner.read().await;
        state.status.clone()
    }

    async fn acquire_creation_slot(&self) -> SlotClaim {
        let mut state = self.inner.write().await;
        if state.status.is_idle() {
            state.status.is_creating = true;
            SlotClaim::Acquired
        } else {
            SlotClaim::Busy(state.status.clone())
        }
    }

    async fn commit_creation(&self, poll_id: Uuid) {
        let mut state = self.inner.write().await;
        state.status = ActivePollStatusEntity {
            active_poll_id: Some(poll_id),
            is_creating: false,
        };
    }

    async fn release_creation_slot(&self) {
        let mut state = self.inner.write().await;
        state.status = ActivePollStatusEntity::default();
    }
}

impl PollStore for MemoryPollStore {
    fn insert_poll(&self, poll: PollEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.insert_poll(poll).await;
            Ok(())
        })
    }

    fn find_poll(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PollEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.find_poll(id).await) })
    }

    fn past_polls(&self) -> BoxFuture<'static, StorageResult<Vec<PollEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.past_polls().await) })
    }

    fn finish_poll(
        &self,
        id: Uuid,
        status: PollStatus,
        ended_at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<FinishOutcome>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.finish_poll(id, status, ended_at).await) })
    }

    fn insert_vote(&self, vote: VoteEntity) -> BoxFuture<'static, StorageResult<VoteInsert>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.insert_vote(vote).await) })
    }

    fn find_vote(
        &self,
        poll_id: Uuid,
        voter_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<VoteEntity>>> {
        let store = self.clone();
        let voter_id = voter_id.to_owned();
        Box::pin(async move { Ok(store.find_vote(poll_id, &voter_id).await) })
    }

    fn votes_for_poll(
        &self,
        poll_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<VoteEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.votes_for_poll(poll_id).await) })
    }

    fn active_status(&self) -> BoxFuture<'static, StorageResult<ActivePollStatusEntity>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.active_status().await) })
    }

    fn acquire_creation_slot(&self) -> BoxFuture<'static, StorageResult<SlotClaim>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.acquire_creation_slot().await) })
    }

    fn commit_creation(&self, poll_id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.commit_creation(poll_id).await;
            Ok(())
        })
    }

    fn release_creation_slot(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.release_creation_slot().await;
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn poll(id: Uuid) -> PollEntity {
        PollEntity {
            id,
            name: "test poll".into(),
            creator_id: "user1".into(),
            creator_display_name: "Alpha Player".into(),
            participants: vec![],
            status: PollStatus::Active,
            created_at: SystemTime::UNIX_EPOCH,
            ended_at: None,
        }
    }

    fn vote(poll_id: Uuid, voter: &str, secs: u64) -> VoteEntity {
        VoteEntity {
            poll_id,
            voter_id: voter.into(),
            voted_for_id: "user2".into(),
            created_at: SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
        }
    }

    #[tokio::test]
    async fn creation_slot_is_exclusive() {
        let store = MemoryPollStore::new();

        assert_eq!(store.acquire_creation_slot().await, SlotClaim::Acquired);
        match store.acquire_creation_slot().await {
            SlotClaim::Busy(status) => assert!(status.is_creating),
            other => panic!("expected busy slot, got {other:?}"),
        }

        store.release_creation_slot().await;
        assert_eq!(store.acquire_creation_slot().await, SlotClaim::Acquired);
    }

    #[tokio::test]
    async fn commit_points_singleton_at_poll() {
        let store = MemoryPollStore::new();
        let id = Uuid::new_v4();

        store.acquire_creation_slot().await;
        store.insert_poll(poll(id)).await;
        store.commit_creation(id).await;

        let status = store.active_status().await;
        assert_eq!(status.active_poll_id, Some(id));
        assert!(!status.is_creating);
    }

    #[tokio::test]
    async fn finish_clears_singleton_only_for_matching_poll() {
        let store = MemoryPollStore::new();
        let active = Uuid::new_v4();
        let other = Uuid::new_v4();

        store.insert_poll(poll(active)).await;
        store.insert_poll(poll(other)).await;
        store.commit_creation(active).await;

        // Finishing a poll the singleton does not point at leaves it alone.
        let outcome = store
            .finish_poll(other, PollStatus::Ended, SystemTime::UNIX_EPOCH)
            .await;
        assert!(matches!(outcome, FinishOutcome::Finished(_)));
        assert_eq!(store.active_status().await.active_poll_id, Some(active));

        let outcome = store
            .finish_poll(active, PollStatus::Deleted, SystemTime::UNIX_EPOCH)
            .await;
        assert!(matches!(outcome, FinishOutcome::Finished(_)));
        assert_eq!(store.active_status().await, ActivePollStatusEntity::default());
    }

    #[tokio::test]
    async fn finish_is_a_status_cas() {
        let store = MemoryPollStore::new();
        let id = Uuid::new_v4();
        store.insert_poll(poll(id)).await;

        store
            .finish_poll(id, PollStatus::Ended, SystemTime::UNIX_EPOCH)
            .await;
        let outcome = store
            .finish_poll(id, PollStatus::Deleted, SystemTime::UNIX_EPOCH)
            .await;
        assert_eq!(outcome, FinishOutcome::NotActive(PollStatus::Ended));

        let missing = store
            .finish_poll(Uuid::new_v4(), PollStatus::Ended, SystemTime::UNIX_EPOCH)
            .await;
        assert_eq!(missing, FinishOutcome::Missing);
    }

    #[tokio::test]
    async fn second_vote_by_same_voter_is_rejected() {
        let store = MemoryPollStore::new();
        let id = Uuid::new_v4();

        assert_eq!(store.insert_vote(vote(id, "user2", 1)).await, VoteInsert::Inserted);
        assert_eq!(store.insert_vote(vote(id, "user2", 2)).await, VoteInsert::Duplicate);
        assert_eq!(store.votes_for_poll(id).await.len(), 1);
    }

    #[tokio::test]
    async fn votes_are_ordered_by_creation_time() {
        let store = MemoryPollStore::new();
        let id = Uuid::new_v4();

        store.insert_vote(vote(id, "user3", 9)).await;
        store.insert_vote(vote(id, "user2", 4)).await;
        store.insert_vote(vote(id, "user4", 7)).await;

        let voters: Vec<String> = store
            .votes_for_poll(id)
            .await
            .into_iter()
            .map(|v| v.voter_id)
            .collect();
        assert_eq!(voters, ["user2", "user4", "user3"]);
    }

    #[tokio::test]
    async fn past_polls_newest_first() {
        let store = MemoryPollStore::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let running = Uuid::new_v4();

        for id in [first, second, running] {
            store.insert_poll(poll(id)).await;
        }
        store
            .finish_poll(first, PollStatus::Ended, SystemTime::UNIX_EPOCH + Duration::from_secs(10))
            .await;
        store
            .finish_poll(
                second,
                PollStatus::Deleted,
                SystemTime::UNIX_EPOCH + Duration::from_secs(20),
            )
            .await;

        let past: Vec<Uuid> = store.past_polls().await.into_iter().map(|p| p.id).collect();
        assert_eq!(past, [second, first]);
    }
}
