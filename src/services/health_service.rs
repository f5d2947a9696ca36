use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Ping the store and report the active session, if any.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let active_session = state
        .registry()
        .find_active()
        .await
        .map(|handle| handle.code().to_owned());

    match state.store().health_check().await {
        Ok(()) => HealthResponse::ok(active_session),
        Err(err) => {
            warn!(error = %err, "storage health check failed");
            HealthResponse::degraded(active_session)
        }
    }
}
