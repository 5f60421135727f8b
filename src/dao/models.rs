use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rand::{Rng, distr::Alphanumeric, rng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Length of the short identifiers handed to shows, timers and confirmations.
pub const RECORD_ID_LEN: usize = 10;

/// Free-form JSON mapping attached to shows and timers.
pub type Metadata = IndexMap<String, Value>;

/// Generate a short random identifier for a freshly created record.
pub fn new_record_id() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(RECORD_ID_LEN)
        .map(char::from)
        .collect()
}

/// Lifecycle of one show occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ShowState {
    /// Known slot in the weekly schedule, nothing announced yet.
    Scheduled,
    /// A video or fresh thumbnail has been published ahead of the stream.
    Upcoming,
    /// The primary platform reports the stream as live.
    Live,
    /// The stream ended.
    Finished,
}

impl ShowState {
    /// Lowercase label used in storage and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShowState::Scheduled => "scheduled",
            ShowState::Upcoming => "upcoming",
            ShowState::Live => "live",
            ShowState::Finished => "finished",
        }
    }
}

/// Persisted representation of one show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowEntity {
    /// Opaque identifier, empty until the row has been inserted.
    pub id: String,
    pub state: ShowState,
    pub youtube_id: Option<String>,
    pub scheduled_time: DateTime<Utc>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub thumbnail: Option<String>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ShowEntity {
    /// Normalized title stored under the `title` metadata key.
    pub fn title(&self) -> &str {
        self.metadata
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Whether the row has been assigned an identifier by the store.
    pub fn is_persisted(&self) -> bool {
        !self.id.is_empty()
    }
}

/// Bingo tile from the global catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileEntity {
    pub id: String,
    pub title: String,
    pub category: Option<String>,
    pub weight: f64,
    pub score: f64,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Association between a show and one tile of its pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowTileEntity {
    pub show_id: String,
    pub tile_id: String,
    pub weight: f64,
    pub score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShowTileEntity {
    /// Bind `tile` to `show_id`, carrying the tile's current weight and score.
    pub fn for_tile(show_id: &str, tile: &TileEntity, now: DateTime<Utc>) -> Self {
        Self {
            show_id: show_id.to_owned(),
            tile_id: tile.id.clone(),
            weight: tile.weight,
            score: tile.score,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Countdown attached to a show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerEntity {
    pub id: String,
    pub title: String,
    /// Duration in seconds.
    pub duration: i64,
    pub created_by: Option<String>,
    pub show_id: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub settings: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Record of a tile being confirmed during a show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileConfirmationEntity {
    pub id: String,
    pub show_id: String,
    pub tile_id: String,
    /// `None` marks a system-generated confirmation.
    pub confirmed_by: Option<String>,
    pub context: Option<String>,
    pub confirmation_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Chat message persisted for a show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntity {
    pub id: String,
    pub show_id: String,
    pub player_id: String,
    pub contents: String,
    pub system: bool,
    pub replying: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ids_are_short_and_alphanumeric() {
        let id = new_record_id();
        assert_eq!(id.len(), RECORD_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, new_record_id());
    }

    #[test]
    fn show_state_serializes_lowercase() {
        let value = serde_json::to_value(ShowState::Live).unwrap();
        assert_eq!(value, Value::String("live".into()));
        assert_eq!(ShowState::Finished.as_str(), "finished");
    }
}
