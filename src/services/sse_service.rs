use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::{
        poll::{PollSummary, VoteSummary},
        sse::{ActivePollStatusEvent, PollSnapshotEvent, ServerEvent, VotesEvent},
    },
    state::SharedState,
};

/// Bounded buffer between each forwarder task and its response stream.
const EVENT_BUFFER: usize = 8;
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Stream the active-poll pointer: the current value first, then every change.
pub async fn status_stream(
    state: SharedState,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut watcher = state.feeds().status_receiver();
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(EVENT_BUFFER);

    tokio::spawn(async move {
        let initial = ActivePollStatusEvent::from(watcher.borrow_and_update().clone());
        if send_json(&tx, "status", &initial).await.is_err() {
            return;
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                changed = watcher.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let event = ActivePollStatusEvent::from(watcher.borrow_and_update().clone());
                    if send_json(&tx, "status", &event).await.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("status SSE stream disconnected");
    });

    into_sse(rx)
}

/// Stream one poll's snapshot: the stored document (or `null`) first, then
/// every change published after a write.
///
/// Unknown and finished polls have no feed channel; their streams close
/// right after the initial snapshot.
pub async fn poll_stream(
    state: SharedState,
    poll_id: Uuid,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Subscribe before the initial load so no update slips between the two.
    let receiver = state.feeds().subscribe_poll(poll_id);
    let initial = initial_poll_snapshot(&state, poll_id).await;
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(EVENT_BUFFER);

    tokio::spawn(async move {
        if send_json(&tx, "poll", &PollSnapshotEvent(initial)).await.is_err() {
            return;
        }

        let Some(mut receiver) = receiver else {
            return;
        };

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(snapshot) => {
                            let event = PollSnapshotEvent(snapshot.map(Into::into));
                            if send_json(&tx, "poll", &event).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => {
                            // Skip lagged messages but keep the stream alive.
                            continue;
                        }
                    }
                }
            }
        }

        tracing::info!(poll_id = %poll_id, "poll SSE stream disconnected");
    });

    into_sse(rx)
}

/// Stream one poll's vote list in creation order: the stored list first,
/// then the full list again after every new vote.
pub async fn votes_stream(
    state: SharedState,
    poll_id: Uuid,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.feeds().subscribe_votes(poll_id);
    let initial = initial_vote_list(&state, poll_id).await;
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(EVENT_BUFFER);

    tokio::spawn(async move {
        if send_json(&tx, "votes", &VotesEvent(initial)).await.is_err() {
            return;
        }

        let Some(mut receiver) = receiver else {
            return;
        };

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(votes) => {
                            let event = VotesEvent(votes.into_iter().map(Into::into).collect());
                            if send_json(&tx, "votes", &event).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => continue,
                    }
                }
            }
        }

        tracing::info!(poll_id = %poll_id, "votes SSE stream disconnected");
    });

    into_sse(rx)
}

/// Load the snapshot a new poll subscriber starts from, falling back to
/// `null` when storage cannot answer.
async fn initial_poll_snapshot(state: &SharedState, poll_id: Uuid) -> Option<PollSummary> {
    let Some(store) = state.poll_store().await else {
        warn!(poll_id = %poll_id, "storage unavailable; poll stream starts with null");
        return None;
    };

    match store.find_poll(poll_id).await {
        Ok(poll) => poll.map(Into::into),
        Err(err) => {
            warn!(poll_id = %poll_id, error = %err, "failed to load poll snapshot; starting with null");
            None
        }
    }
}

/// Load the vote list a new subscriber starts from, falling back to an
/// empty list when storage cannot answer.
async fn initial_vote_list(state: &SharedState, poll_id: Uuid) -> Vec<VoteSummary> {
    let Some(store) = state.poll_store().await else {
        warn!(poll_id = %poll_id, "storage unavailable; votes stream starts empty");
        return Vec::new();
    };

    match store.votes_for_poll(poll_id).await {
        Ok(votes) => votes.into_iter().map(Into::into).collect(),
        Err(err) => {
            warn!(poll_id = %poll_id, error = %err, "failed to load vote list; starting empty");
            Vec::new()
        }
    }
}

/// Serialise a payload and push it through the forwarder channel. The send
/// only fails when the client is gone; serialisation problems are logged and
/// swallowed so the stream stays alive.
async fn send_json<T: Serialize>(
    tx: &mpsc::Sender<Result<Event, Infallible>>,
    name: &str,
    payload: &T,
) -> Result<(), ()> {
    match ServerEvent::json(Some(name.to_owned()), payload) {
        Ok(server_event) => {
            let mut event = Event::default().data(server_event.data);
            if let Some(name) = server_event.event {
                event = event.event(name);
            }
            tx.send(Ok(event)).await.map_err(|_| ())
        }
        Err(err) => {
            warn!(error = %err, "failed to serialise SSE payload");
            Ok(())
        }
    }
}

/// Wrap the forwarder channel into an SSE response with keep-alives. When the
/// client disconnects axum drops the stream and the forwarder task stops.
fn into_sse(
    rx: mpsc::Receiver<Result<Event, Infallible>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::SystemTime};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{PollEntity, PollStatus},
            poll_store::memory::MemoryPollStore,
        },
        state::AppState,
    };

    async fn test_state() -> SharedState {
        let directory = Arc::new(AppConfig::default().user_directory());
        let state = AppState::new(directory);
        state
            .install_poll_store(Arc::new(MemoryPollStore::new()))
            .await;
        state
    }

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
    async fn streams_outlive_the_handle_they_were_built_from() {
        let state = test_state().await;

        let streams = {
            let handle = state.clone();
            let status = status_stream(handle.clone()).await;
            let poll = poll_stream(handle.clone(), Uuid::new_v4()).await;
            let votes = votes_stream(handle, Uuid::new_v4()).await;
            (status, poll, votes)
        };

        drop(streams);
    }

    #[tokio::test]
    async fn initial_snapshot_reads_the_store() {
        let state = test_state().await;
        let poll = sample_poll(Uuid::new_v4());
        let store = state.poll_store().await.unwrap();
        store.insert_poll(poll.clone()).await.unwrap();

        let snapshot = initial_poll_snapshot(&state, poll.id).await;
        assert_eq!(snapshot.unwrap().id, poll.id);
    }

    #[tokio::test]
    async fn initial_values_fall_back_when_storage_is_missing() {
        let directory = Arc::new(AppConfig::default().user_directory());
        let state = AppState::new(directory);

        assert!(initial_poll_snapshot(&state, Uuid::new_v4()).await.is_none());
        assert!(initial_vote_list(&state, Uuid::new_v4()).await.is_empty());
    }
}
