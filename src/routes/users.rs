use axum::{Json, Router, extract::State, routing::get};

use crate::{dto::users::UserSummary, state::SharedState};

#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    responses((status = 200, description = "Provisioned accounts", body = [UserSummary]))
)]
/// List every provisioned account, in roster order.
pub async fn list_users(State(state): State<SharedState>) -> Json<Vec<UserSummary>> {
    let users = state
        .directory()
        .all()
        .into_iter()
        .map(Into::into)
        .collect();
    Json(users)
}

/// Configure the user directory routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/users", get(list_users))
}
