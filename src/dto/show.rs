use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::dao::models::{Metadata, ShowEntity, ShowState};

/// Show representation returned by the REST API and pushed over SSE.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ShowSummary {
    pub id: String,
    pub state: ShowState,
    pub youtube_id: Option<String>,
    pub scheduled_time: String,
    pub actual_start_time: Option<String>,
    pub thumbnail: Option<String>,
    #[schema(value_type = Object)]
    pub metadata: Metadata,
    pub created_at: String,
    pub updated_at: String,
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl From<ShowEntity> for ShowSummary {
    fn from(show: ShowEntity) -> Self {
        Self {
            id: show.id,
            state: show.state,
            youtube_id: show.youtube_id,
            scheduled_time: format_time(show.scheduled_time),
            actual_start_time: show.actual_start_time.map(format_time),
            thumbnail: show.thumbnail,
            metadata: show.metadata,
            created_at: format_time(show.created_at),
            updated_at: format_time(show.updated_at),
        }
    }
}

impl ShowSummary {
    /// Title as displayed to viewers.
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(Value::as_str)
    }
}
