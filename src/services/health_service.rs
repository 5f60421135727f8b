use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report degraded mode and the cached show, pinging storage on the way.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_show_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    let latest_show_id = state
        .latest_show()
        .read(|cached| cached.map(|projection| projection.show.id.clone()))
        .await;
    HealthResponse::new(state.is_degraded().await, latest_show_id)
}
