use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for PollMaster Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::poll::create_poll,
        crate::routes::poll::get_poll,
        crate::routes::poll::submit_vote,
        crate::routes::poll::end_poll,
        crate::routes::poll::delete_poll,
        crate::routes::poll::past_polls,
        crate::routes::sse::status_stream,
        crate::routes::sse::poll_stream,
        crate::routes::sse::votes_stream,
        crate::routes::users::list_users,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::poll::CreatePollRequest,
            crate::dto::poll::VoteRequest,
            crate::dto::poll::PollActionRequest,
            crate::dto::poll::ParticipantSummary,
            crate::dto::poll::PollSummary,
            crate::dto::poll::VoteSummary,
            crate::dto::poll::PastPollSummary,
            crate::dto::poll::CreatePollResponse,
            crate::dto::poll::VoteResponse,
            crate::dto::poll::PollActionResponse,
            crate::dto::sse::ActivePollStatusEvent,
            crate::dto::sse::PollSnapshotEvent,
            crate::dto::sse::VotesEvent,
            crate::dto::users::UserSummary,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "polls", description = "Poll lifecycle and voting operations"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "users", description = "Provisioned voter accounts"),
    )
)]
pub struct ApiDoc;
