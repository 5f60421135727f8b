use std::convert::Infallible;

use axum::{
    Router,
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{
    services::sse_service::{self, StreamKind},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/chat",
    tag = "sse",
    responses((status = 200, description = "Viewer chat SSE stream", content_type = "text/event-stream", body = String))
)]
/// Stream show updates and chat messages to viewers.
pub async fn chat_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = sse_service::subscribe_chat(&state);
    info!("new chat SSE connection");
    sse_service::to_sse_stream(receiver, StreamKind::Chat)
}

#[utoipa::path(
    get,
    path = "/sse/host",
    tag = "sse",
    responses((status = 200, description = "Host SSE stream", content_type = "text/event-stream", body = String))
)]
/// Stream show updates, tile confirmations and timer expiries to hosts.
pub async fn host_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = sse_service::subscribe_host(&state);
    info!("new host SSE connection");
    sse_service::to_sse_stream(receiver, StreamKind::Host)
}

pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/chat", get(chat_stream))
        .route("/sse/host", get(host_stream))
}
