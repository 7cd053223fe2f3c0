use dashmap::DashMap;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use crate::dao::models::{ActivePollStatusEntity, PollEntity, VoteEntity};

/// Broadcast capacity for the per-poll channels.
const POLL_CHANNEL_CAPACITY: usize = 16;

/// Change-feed sub-state carved out from [`AppState`](super::AppState).
///
/// Services publish here after their writes land; subscribers never touch
/// storage. The active-poll pointer rides a watch channel so late joiners
/// always observe the current value, while per-poll snapshots and vote lists
/// fan out over broadcast channels.
pub struct FeedState {
    status: watch::Sender<ActivePollStatusEntity>,
    polls: DashMap<Uuid, PollHub>,
}

/// Per-poll broadcast channels.
struct PollHub {
    poll: broadcast::Sender<Option<PollEntity>>,
    votes: broadcast::Sender<Vec<VoteEntity>>,
}

impl PollHub {
    fn new() -> Self {
        let (poll, _) = broadcast::channel(POLL_CHANNEL_CAPACITY);
        let (votes, _) = broadcast::channel(POLL_CHANNEL_CAPACITY);
        Self { poll, votes }
    }
}

impl FeedState {
    /// Build the feed tree with an idle active-poll pointer.
    pub fn new() -> Self {
        let (status, _) = watch::channel(ActivePollStatusEntity::default());
        Self {
            status,
            polls: DashMap::new(),
        }
    }

    /// Register a watcher over the active-poll pointer.
    pub fn status_receiver(&self) -> watch::Receiver<ActivePollStatusEntity> {
        self.status.subscribe()
    }

    /// The last published active-poll pointer.
    pub fn current_status(&self) -> ActivePollStatusEntity {
        self.status.borrow().clone()
    }

    /// Publish a new active-poll pointer to every watcher.
    pub fn publish_status(&self, status: ActivePollStatusEntity) {
        self.status.send_replace(status);
    }

    /// Register a subscriber for a poll's snapshot updates.
    ///
    /// Hubs exist only between a poll's first publication and its
    /// retirement; an unknown id returns `None` rather than allocating.
    pub fn subscribe_poll(&self, poll_id: Uuid) -> Option<broadcast::Receiver<Option<PollEntity>>> {
        self.polls.get(&poll_id).map(|hub| hub.poll.subscribe())
    }

    /// Register a subscriber for a poll's ordered vote list.
    pub fn subscribe_votes(&self, poll_id: Uuid) -> Option<broadcast::Receiver<Vec<VoteEntity>>> {
        self.polls.get(&poll_id).map(|hub| hub.votes.subscribe())
    }

    /// Push a poll snapshot to its subscribers, ignoring delivery errors.
    pub fn publish_poll(&self, poll_id: Uuid, snapshot: Option<PollEntity>) {
        let _ = self.hub(poll_id).poll.send(snapshot);
    }

    /// Push a poll's full vote list to its subscribers, ignoring delivery errors.
    pub fn publish_votes(&self, poll_id: Uuid, votes: Vec<VoteEntity>) {
        let _ = self.hub(poll_id).votes.send(votes);
    }

    /// Drop a finished poll's channels. Subscribers still drain whatever was
    /// published before the drop, then observe the channel closing.
    pub fn retire_poll(&self, poll_id: Uuid) {
        self.polls.remove(&poll_id);
    }

    fn hub(&self, poll_id: Uuid) -> dashmap::mapref::one::RefMut<'_, Uuid, PollHub> {
        self.polls.entry(poll_id).or_insert_with(PollHub::new)
    }
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::dao::models::PollStatus;

    fn sample_poll(id: Uuid) -> PollEntity {
        PollEntity {
            id,
            name: "Snack Run".to_owned(),
            creator_id: "user1".to_owned(),
            creator_display_name: "Alpha Player".to_owned(),
            participants: Vec::new(),
            status: PollStatus::Active,
            created_at: SystemTime::now(),
            ended_at: None,
        }
    }

    #[tokio::test]
    async fn status_watch_starts_idle() {
        let feeds = FeedState::new();
        let receiver = feeds.status_receiver();
        assert!(receiver.borrow().is_idle());
    }

    #[tokio::test]
    async fn status_watchers_observe_published_pointer() {
        let feeds = FeedState::new();
        let mut receiver = feeds.status_receiver();

        let poll_id = Uuid::new_v4();
        feeds.publish_status(ActivePollStatusEntity {
            active_poll_id: Some(poll_id),
            is_creating: false,
        });

        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow().active_poll_id, Some(poll_id));
    }

    #[tokio::test]
    async fn poll_snapshots_reach_subscribers() {
        let feeds = FeedState::new();
        let poll_id = Uuid::new_v4();
        feeds.publish_poll(poll_id, Some(sample_poll(poll_id)));

        let mut receiver = feeds.subscribe_poll(poll_id).unwrap();
        feeds.publish_poll(poll_id, Some(sample_poll(poll_id)));

        let snapshot = receiver.recv().await.unwrap();
        assert_eq!(snapshot.unwrap().id, poll_id);
    }

    #[tokio::test]
    async fn vote_lists_reach_subscribers() {
        let feeds = FeedState::new();
        let poll_id = Uuid::new_v4();
        feeds.publish_votes(poll_id, Vec::new());

        let mut receiver = feeds.subscribe_votes(poll_id).unwrap();
        feeds.publish_votes(
            poll_id,
            vec![VoteEntity {
                poll_id,
                voter_id: "user2".to_owned(),
                voted_for_id: "user3".to_owned(),
                created_at: SystemTime::now(),
            }],
        );

        let votes = receiver.recv().await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].voter_id, "user2");
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_harmless() {
        let feeds = FeedState::new();
        let poll_id = Uuid::new_v4();
        feeds.publish_poll(poll_id, None);
        feeds.publish_votes(poll_id, Vec::new());
    }

    #[tokio::test]
    async fn subscribing_to_an_unknown_poll_allocates_nothing() {
        let feeds = FeedState::new();
        let poll_id = Uuid::new_v4();

        assert!(feeds.subscribe_poll(poll_id).is_none());
        assert!(feeds.subscribe_votes(poll_id).is_none());
        assert!(feeds.polls.is_empty());
    }

    #[tokio::test]
    async fn retirement_closes_channels_after_the_last_snapshot() {
        let feeds = FeedState::new();
        let poll_id = Uuid::new_v4();
        feeds.publish_poll(poll_id, Some(sample_poll(poll_id)));

        let mut receiver = feeds.subscribe_poll(poll_id).unwrap();
        feeds.publish_poll(poll_id, Some(sample_poll(poll_id)));
        feeds.retire_poll(poll_id);

        // The snapshot published before retirement still arrives.
        let last = receiver.recv().await.unwrap();
        assert_eq!(last.unwrap().id, poll_id);
        assert!(matches!(
            receiver.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert!(feeds.polls.is_empty());
    }
}
