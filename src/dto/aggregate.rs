use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Point-in-time bundle of platform status signals published by the aggregate feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Aggregate {
    pub youtube: YoutubeStatus,
    pub twitch: TwitchStatus,
    pub floatplane: FloatplaneStatus,
    #[schema(value_type = Object)]
    pub special_stream: Value,
    #[schema(value_type = Object)]
    pub notable_people: IndexMap<String, NotablePerson>,
    pub has_done: bool,
    #[schema(value_type = Object)]
    pub is_there_wan: Value,
    pub votes: Vec<Vote>,
    pub reload_number: i64,
}

/// Primary video platform status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct YoutubeStatus {
    pub is_live: bool,
    pub upcoming: bool,
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct TwitchStatus {
    pub is_live: bool,
    #[serde(rename = "isWAN")]
    pub is_wan: bool,
}

/// Secondary streaming platform status; carries the stream title and thumbnail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct FloatplaneStatus {
    pub is_live: bool,
    #[serde(rename = "isWAN")]
    pub is_wan: bool,
    pub is_thumbnail_new: bool,
    pub thumbnail: Option<String>,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct NotablePerson {
    pub is_live: bool,
    pub channel: Option<String>,
    pub platform: Option<String>,
    pub title: Option<String>,
}

/// Viewer vote tally for a guessed start time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Vote {
    pub name: String,
    pub comment: Option<String>,
    pub votes: i64,
    pub time: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_feed_payload_with_missing_sections() {
        let raw = r#"{
            "youtube": {"isLive": true, "upcoming": false, "videoId": "abc123"},
            "floatplane": {"isLive": true, "isWAN": true, "isThumbnailNew": false,
                           "thumbnail": "https://pbs.floatplane.com/thumb.jpg",
                           "title": "Big News - WAN Show March 1"},
            "votes": [{"name": "5 minutes late", "votes": 12, "time": 300}],
            "reloadNumber": 3
        }"#;

        let aggregate: Aggregate = serde_json::from_str(raw).unwrap();
        assert!(aggregate.youtube.is_live);
        assert_eq!(aggregate.youtube.video_id.as_deref(), Some("abc123"));
        assert!(aggregate.floatplane.is_wan);
        assert!(!aggregate.twitch.is_live);
        assert_eq!(aggregate.votes[0].votes, 12);
        assert_eq!(aggregate.reload_number, 3);
    }
}
