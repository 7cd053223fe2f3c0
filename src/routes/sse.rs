use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/status",
    tag = "sse",
    responses((status = 200, description = "Active-poll pointer stream", content_type = "text/event-stream", body = String))
)]
/// Stream the active-poll pointer: current value on connect, then changes.
pub async fn status_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    info!("New status SSE connection");
    sse_service::status_stream(state).await
}

#[utoipa::path(
    get,
    path = "/sse/polls/{id}",
    tag = "sse",
    params(("id" = Uuid, Path, description = "Identifier of the poll")),
    responses((status = 200, description = "Poll snapshot stream", content_type = "text/event-stream", body = String))
)]
/// Stream one poll's snapshot: current document (or null) on connect, then changes.
pub async fn poll_stream(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    info!(poll_id = %id, "New poll SSE connection");
    sse_service::poll_stream(state, id).await
}

#[utoipa::path(
    get,
    path = "/sse/polls/{id}/votes",
    tag = "sse",
    params(("id" = Uuid, Path, description = "Identifier of the poll")),
    responses((status = 200, description = "Vote list stream", content_type = "text/event-stream", body = String))
)]
/// Stream one poll's vote list in creation order, refreshed after every vote.
pub async fn votes_stream(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    info!(poll_id = %id, "New votes SSE connection");
    sse_service::votes_stream(state, id).await
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/status", get(status_stream))
        .route("/sse/polls/{id}", get(poll_stream))
        .route("/sse/polls/{id}/votes", get(votes_stream))
}
