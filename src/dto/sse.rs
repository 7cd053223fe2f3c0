use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::ActivePollStatusEntity,
    dto::poll::{PollSummary, VoteSummary},
};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Pushed on the status stream whenever the active-poll pointer changes.
pub struct ActivePollStatusEvent {
    /// The currently active poll, if any.
    pub active_poll_id: Option<Uuid>,
    /// Whether a poll creation is currently in flight.
    pub is_creating: bool,
}

impl From<ActivePollStatusEntity> for ActivePollStatusEvent {
    fn from(status: ActivePollStatusEntity) -> Self {
        Self {
            active_poll_id: status.active_poll_id,
            is_creating: status.is_creating,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Pushed on a poll stream: the current snapshot, or `null` when the poll
/// does not exist.
pub struct PollSnapshotEvent(pub Option<PollSummary>);

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Pushed on a votes stream: the full vote list in creation order.
pub struct VotesEvent(pub Vec<VoteSummary>);
