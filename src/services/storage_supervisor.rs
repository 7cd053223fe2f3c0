use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{poll_store::PollStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to the storage backend, keep it healthy, and keep the shared
/// state in degraded mode whenever it is unavailable.
///
/// While degraded the store is uninstalled, so services reject requests
/// instead of queueing writes against a dead connection.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn PollStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.install_poll_store(store.clone()).await;
                sync_feeds(&state, store.as_ref()).await;
                info!("storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                loop {
                    match store.health_check().await {
                        Ok(()) => {
                            sleep(HEALTH_POLL_INTERVAL).await;
                        }
                        Err(_) => {
                            let mut attempt = 0;
                            let mut reconnect_delay = INITIAL_DELAY;
                            let mut reconnected = false;

                            while attempt < MAX_RECONNECT_ATTEMPTS {
                                match store.try_reconnect().await {
                                    Ok(()) => {
                                        info!(
                                            "storage reconnection succeeded after health check failure"
                                        );
                                        reconnected = true;
                                        break;
                                    }
                                    Err(reconnect_err) => {
                                        if attempt == 0 {
                                            warn!(
                                                attempt, error = %reconnect_err,
                                                "storage reconnect first attempt failed; entering degraded mode"
                                            );
                                            state.clear_poll_store().await;
                                        } else {
                                            warn!(attempt, error = %reconnect_err, "storage reconnect attempt failed");
                                        }
                                        attempt += 1;
                                        sleep(reconnect_delay).await;
                                        reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
                                    }
                                }
                            }

                            if reconnected {
                                state.install_poll_store(store.clone()).await;
                                sync_feeds(&state, store.as_ref()).await;
                                sleep(HEALTH_POLL_INTERVAL).await;
                                continue;
                            } else {
                                warn!(
                                    "exhausted storage reconnect attempts; staying in degraded mode"
                                );
                                break;
                            }
                        }
                    }
                }

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Republish the persisted singleton after a connection, so feed watchers
/// converge on what storage actually holds. When a poll is active its
/// channels are reopened as well, so subscriptions survive a restart.
async fn sync_feeds(state: &SharedState, store: &dyn PollStore) {
    let status = match store.active_status().await {
        Ok(status) => status,
        Err(err) => {
            warn!(error = %err, "failed to refresh status feed after storage connect");
            return;
        }
    };

    let active_id = status.active_poll_id;
    state.feeds().publish_status(status);

    let Some(poll_id) = active_id else {
        return;
    };

    match store.find_poll(poll_id).await {
        Ok(poll) => state.feeds().publish_poll(poll_id, poll),
        Err(err) => {
            warn!(poll_id = %poll_id, error = %err, "failed to refresh poll feed after storage connect");
        }
    }

    match store.votes_for_poll(poll_id).await {
        Ok(votes) => state.feeds().publish_votes(poll_id, votes),
        Err(err) => {
            warn!(poll_id = %poll_id, error = %err, "failed to refresh vote feed after storage connect");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{PollEntity, PollStatus},
            poll_store::memory::MemoryPollStore,
        },
        state::AppState,
    };

    #[tokio::test]
    async fn sync_reopens_channels_for_the_active_poll() {
        let directory = Arc::new(AppConfig::default().user_directory());
        let state = AppState::new(directory);

        // Seed storage as if a poll had gone active before a restart.
        let store: Arc<dyn PollStore> = Arc::new(MemoryPollStore::new());
        let poll = PollEntity {
            id: Uuid::new_v4(),
            name: "Lunch Pick".to_owned(),
            creator_id: "user1".to_owned(),
            creator_display_name: "Alpha Player".to_owned(),
            participants: Vec::new(),
            status: PollStatus::Active,
            created_at: SystemTime::now(),
            ended_at: None,
        };
        store.acquire_creation_slot().await.unwrap();
        store.insert_poll(poll.clone()).await.unwrap();
        store.commit_creation(poll.id).await.unwrap();

        state.install_poll_store(store.clone()).await;
        sync_feeds(&state, store.as_ref()).await;

        assert_eq!(state.feeds().current_status().active_poll_id, Some(poll.id));
        assert!(state.feeds().subscribe_poll(poll.id).is_some());
        assert!(state.feeds().subscribe_votes(poll.id).is_some());
    }

    #[tokio::test]
    async fn sync_leaves_feeds_idle_without_an_active_poll() {
        let directory = Arc::new(AppConfig::default().user_directory());
        let state = AppState::new(directory);
        let store: Arc<dyn PollStore> = Arc::new(MemoryPollStore::new());

        sync_feeds(&state, store.as_ref()).await;

        assert!(state.feeds().current_status().is_idle());
    }
}
