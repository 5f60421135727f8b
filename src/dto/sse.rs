use serde::Serialize;
use utoipa::ToSchema;

use crate::dao::models::MessageEntity;

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast to hosts when a timer reaches its deadline.
pub struct TimerExpiredEvent {
    pub timer_id: String,
    pub title: String,
    pub show_id: Option<String>,
    pub created_by: Option<String>,
    /// RFC 3339 deadline of the timer.
    pub expired_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast to hosts when a tile has been confirmed for the running show.
pub struct TileConfirmEvent {
    #[serde(rename = "tileId")]
    pub tile_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Chat line pushed to viewers.
pub struct ChatMessageEvent {
    pub id: String,
    pub show_id: String,
    pub player_id: String,
    pub contents: String,
    pub system: bool,
    pub replying: Option<String>,
    pub created_at: String,
}

impl From<&MessageEntity> for ChatMessageEvent {
    fn from(message: &MessageEntity) -> Self {
        Self {
            id: message.id.clone(),
            show_id: message.show_id.clone(),
            player_id: message.player_id.clone(),
            contents: message.contents.clone(),
            system: message.system,
            replying: message.replying.clone(),
            created_at: message.created_at.to_rfc3339(),
        }
    }
}
