use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{dto::show::ShowSummary, error::AppError, services::show_service, state::SharedState};

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/shows/latest", get(latest_show))
        .route("/shows/{id}", get(show_by_id))
}

/// Most recently scheduled show in storage.
#[utoipa::path(
    get,
    path = "/shows/latest",
    tag = "shows",
    responses(
        (status = 200, description = "Latest show", body = ShowSummary),
        (status = 404, description = "No show recorded yet")
    )
)]
pub async fn latest_show(State(state): State<SharedState>) -> Result<Json<ShowSummary>, AppError> {
    Ok(Json(show_service::latest_show(&state).await?))
}

#[utoipa::path(
    get,
    path = "/shows/{id}",
    tag = "shows",
    params(("id" = String, Path, description = "Identifier of the show")),
    responses(
        (status = 200, description = "Show found", body = ShowSummary),
        (status = 404, description = "Unknown show")
    )
)]
pub async fn show_by_id(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ShowSummary>, AppError> {
    Ok(Json(show_service::find_show(&state, id).await?))
}
