use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Code of the session currently accepting players or calling numbers.
    pub active_session: Option<String>,
}

impl HealthResponse {
    /// The store answered.
    pub fn ok(active_session: Option<String>) -> Self {
        Self {
            status: "ok".to_string(),
            active_session,
        }
    }

    /// The store did not answer; sessions keep running in memory.
    pub fn degraded(active_session: Option<String>) -> Self {
        Self {
            status: "degraded".to_string(),
            active_session,
        }
    }
}
