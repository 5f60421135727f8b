use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    routing::get,
};

use crate::{
    dto::{aggregate::Aggregate, show::ShowSummary},
    error::AppError,
    services::show_service,
    state::SharedState,
};

pub fn router() -> Router<SharedState> {
    Router::new().route("/aggregate", get(current_show).post(push_aggregate))
}

/// Extract the token of an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Show produced by the most recent reconciliation.
#[utoipa::path(
    get,
    path = "/aggregate",
    tag = "aggregate",
    responses(
        (status = 200, description = "Authoritative show", body = ShowSummary),
        (status = 503, description = "No snapshot reconciled yet")
    )
)]
pub async fn current_show(
    State(state): State<SharedState>,
) -> Result<Json<ShowSummary>, AppError> {
    Ok(Json(show_service::cached_show(&state).await?))
}

/// Push a snapshot into the ingestion queue.
#[utoipa::path(
    post,
    path = "/aggregate",
    tag = "aggregate",
    request_body = Aggregate,
    security(("host_password" = [])),
    responses(
        (status = 202, description = "Snapshot queued"),
        (status = 401, description = "Missing or wrong host password"),
        (status = 503, description = "Ingestion stopped")
    )
)]
pub async fn push_aggregate(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(aggregate): Json<Aggregate>,
) -> Result<StatusCode, AppError> {
    show_service::enqueue_aggregate(&state, bearer_token(&headers), aggregate).await?;
    Ok(StatusCode::ACCEPTED)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn bearer_token_requires_the_scheme() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer hunter2"));
        assert_eq!(bearer_token(&headers), Some("hunter2"));
    }
}
