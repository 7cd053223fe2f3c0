pub mod feed;
pub mod lifecycle;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    dao::{poll_store::PollStore, user_directory::UserDirectory},
    error::ServiceError,
};

pub use self::feed::FeedState;
pub use self::lifecycle::{Advance, InvalidTransition, PollAction};

/// Cheap-to-clone handle over the shared application state.
pub type SharedState = Arc<AppState>;

/// Central application state storing the storage handle, roster and feeds.
pub struct AppState {
    poll_store: RwLock<Option<Arc<dyn PollStore>>>,
    directory: Arc<dyn UserDirectory>,
    feeds: FeedState,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(directory: Arc<dyn UserDirectory>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            poll_store: RwLock::new(None),
            directory,
            feeds: FeedState::new(),
            degraded: degraded_tx,
        })
    }

    /// Obtain a handle to the current poll store, if one is installed.
    pub async fn poll_store(&self) -> Option<Arc<dyn PollStore>> {
        let guard = self.poll_store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the poll store or fail because the application is degraded.
    pub async fn require_poll_store(&self) -> Result<Arc<dyn PollStore>, ServiceError> {
        self.poll_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new poll store implementation and leave degraded mode.
    pub async fn install_poll_store(&self, store: Arc<dyn PollStore>) {
        {
            let mut guard = self.poll_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current poll store and enter degraded mode.
    pub async fn clear_poll_store(&self) {
        {
            let mut guard = self.poll_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.poll_store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Change feeds fanning out poll and singleton updates to subscribers.
    pub fn feeds(&self) -> &FeedState {
        &self.feeds
    }

    /// Directory of provisioned voter accounts.
    pub fn directory(&self) -> &dyn UserDirectory {
        self.directory.as_ref()
    }

    /// Update and broadcast the degraded flag when the value changes.
    fn update_degraded(&self, value: bool) {
        if *self.degraded.borrow() == value {
            return;
        }

        let _ = self.degraded.send(value);
    }
}
