use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::poll::{
        CreatePollRequest, CreatePollResponse, PastPollSummary, PollActionRequest,
        PollActionResponse, PollSummary, VoteRequest, VoteResponse,
    },
    error::AppError,
    services::poll_service,
    state::SharedState,
};

/// Routes handling poll lifecycle and voting operations.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/polls", post(create_poll))
        .route("/polls/past", get(past_polls))
        .route("/polls/{id}", get(get_poll))
        .route("/polls/{id}/votes", post(submit_vote))
        .route("/polls/{id}/end", post(end_poll))
        .route("/polls/{id}/delete", post(delete_poll))
}

/// Open a new poll, claiming the single active slot.
#[utoipa::path(
    post,
    path = "/polls",
    tag = "polls",
    request_body = CreatePollRequest,
    responses(
        (status = 200, description = "Poll created", body = CreatePollResponse),
        (status = 409, description = "A poll is already active or being created")
    )
)]
pub async fn create_poll(
    State(state): State<SharedState>,
    Json(payload): Json<CreatePollRequest>,
) -> Result<Json<CreatePollResponse>, AppError> {
    let response = poll_service::create_poll(&state, payload).await?;
    Ok(Json(response))
}

/// Fetch one poll by id.
#[utoipa::path(
    get,
    path = "/polls/{id}",
    tag = "polls",
    params(("id" = Uuid, Path, description = "Identifier of the poll")),
    responses(
        (status = 200, description = "Poll found", body = PollSummary),
        (status = 404, description = "Poll not found")
    )
)]
pub async fn get_poll(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PollSummary>, AppError> {
    let summary = poll_service::poll_by_id(&state, id).await?;
    Ok(Json(summary))
}

/// Cast a vote in an active poll.
#[utoipa::path(
    post,
    path = "/polls/{id}/votes",
    tag = "polls",
    params(("id" = Uuid, Path, description = "Identifier of the poll")),
    request_body = VoteRequest,
    responses(
        (status = 200, description = "Vote recorded", body = VoteResponse),
        (status = 409, description = "Poll not active or voter already voted")
    )
)]
pub async fn submit_vote(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VoteRequest>,
) -> Result<Json<VoteResponse>, AppError> {
    let response = poll_service::submit_vote(&state, id, payload).await?;
    Ok(Json(response))
}

/// Close a poll; only its creator may do this.
#[utoipa::path(
    post,
    path = "/polls/{id}/end",
    tag = "polls",
    params(("id" = Uuid, Path, description = "Identifier of the poll")),
    request_body = PollActionRequest,
    responses(
        (status = 200, description = "Poll ended", body = PollActionResponse),
        (status = 401, description = "Requester is not the creator")
    )
)]
pub async fn end_poll(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PollActionRequest>,
) -> Result<Json<PollActionResponse>, AppError> {
    let response = poll_service::end_poll(&state, id, payload).await?;
    Ok(Json(response))
}

/// Discard a poll; only its creator may do this, and repeats are no-ops.
#[utoipa::path(
    post,
    path = "/polls/{id}/delete",
    tag = "polls",
    params(("id" = Uuid, Path, description = "Identifier of the poll")),
    request_body = PollActionRequest,
    responses(
        (status = 200, description = "Poll deleted", body = PollActionResponse),
        (status = 401, description = "Requester is not the creator")
    )
)]
pub async fn delete_poll(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PollActionRequest>,
) -> Result<Json<PollActionResponse>, AppError> {
    let response = poll_service::delete_poll(&state, id, payload).await?;
    Ok(Json(response))
}

/// List ended and deleted polls, newest first, with computed tallies.
#[utoipa::path(
    get,
    path = "/polls/past",
    tag = "polls",
    responses(
        (status = 200, description = "Archived polls with tallies", body = [PastPollSummary])
    )
)]
pub async fn past_polls(
    State(state): State<SharedState>,
) -> Result<Json<Vec<PastPollSummary>>, AppError> {
    let summaries = poll_service::past_polls(&state).await?;
    Ok(Json(summaries))
}
