use serde::Serialize;
use utoipa::ToSchema;

/// Payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" or "degraded".
    pub status: String,
    /// Identifier of the show currently held in the latest-show cache.
    pub latest_show_id: Option<String>,
}

impl HealthResponse {
    pub fn new(degraded: bool, latest_show_id: Option<String>) -> Self {
        let status = if degraded { "degraded" } else { "ok" };
        Self {
            status: status.to_string(),
            latest_show_id,
        }
    }
}
