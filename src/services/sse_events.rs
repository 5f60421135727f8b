use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::{
    dao::models::{MessageEntity, ShowEntity, TimerEntity},
    dto::{
        show::ShowSummary,
        sse::{ChatMessageEvent, ServerEvent, TileConfirmEvent, TimerExpiredEvent},
    },
    state::SharedState,
};

pub const EVENT_AGGREGATE: &str = "whenplane.aggregate";
pub const EVENT_TIMER_EXPIRED: &str = "timer.expired";
pub const EVENT_TILE_CONFIRM: &str = "tile.confirm";
pub const EVENT_CHAT_MESSAGE: &str = "chat.message";

/// Broadcast the authoritative show to viewers and hosts.
pub fn broadcast_show_update(state: &SharedState, show: &ShowEntity) {
    let payload = ShowSummary::from(show.clone());
    send_chat_event(state, EVENT_AGGREGATE, &payload);
    send_host_event(state, EVENT_AGGREGATE, &payload);
}

/// Tell hosts a timer reached its deadline; `swept_at` stands in for a timer without one.
pub fn broadcast_timer_expired(state: &SharedState, timer: &TimerEntity, swept_at: DateTime<Utc>) {
    let payload = TimerExpiredEvent {
        timer_id: timer.id.clone(),
        title: timer.title.clone(),
        show_id: timer.show_id.clone(),
        created_by: timer.created_by.clone(),
        expired_at: timer.expires_at.unwrap_or(swept_at).to_rfc3339(),
    };
    send_host_event(state, EVENT_TIMER_EXPIRED, &payload);
}

pub fn broadcast_tile_confirmed(state: &SharedState, tile_id: &str) {
    let payload = TileConfirmEvent {
        tile_id: tile_id.to_owned(),
    };
    send_host_event(state, EVENT_TILE_CONFIRM, &payload);
}

pub fn broadcast_chat_message(state: &SharedState, message: &MessageEntity) {
    send_chat_event(state, EVENT_CHAT_MESSAGE, &ChatMessageEvent::from(message));
}

fn send_chat_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.chat_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize chat SSE payload"),
    }
}

fn send_host_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.host_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize host SSE payload"),
    }
}
