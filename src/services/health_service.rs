use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Respond with the current health payload while logging connectivity issues.
///
/// The degraded flag is owned by the storage supervisor; a failed ping here
/// is logged but does not flip the flag on its own.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let degraded = state.is_degraded().await;
    if degraded {
        warn!("storage unavailable (degraded mode)");
        return HealthResponse::report(true);
    }

    if let Some(store) = state.poll_store().await {
        if let Err(err) = store.health_check().await {
            warn!(error = %err, "storage health check failed");
        }
    }

    HealthResponse::report(degraded)
}
