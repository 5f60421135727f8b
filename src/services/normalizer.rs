use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde_json::{Value, json};
use thiserror::Error;

use crate::{
    config::ShowSlot,
    dao::models::{Metadata, ShowEntity, ShowState},
    dto::aggregate::Aggregate,
    state::{ShowProjection, ShowSignals},
};

/// Separator between the show title and the episode suffix in stream titles.
const TITLE_SEPARATOR: &str = " - ";

/// Reasons a snapshot cannot be turned into a show projection.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("unknown time zone `{0}`")]
    UnknownTimeZone(String),
    #[error("{hour:02}:{minute:02} does not exist on {date} in `{time_zone}`")]
    InvalidSlot {
        date: NaiveDate,
        hour: u32,
        minute: u32,
        time_zone: String,
    },
    #[error("snapshot carries no show title")]
    MissingTitle,
}

/// Next start of the weekly slot strictly after `now`; a slot starting exactly now rolls over a week.
pub fn next_show_slot(now: DateTime<Utc>, slot: &ShowSlot) -> Result<DateTime<Utc>, NormalizeError> {
    let tz: Tz = slot
        .time_zone
        .parse()
        .map_err(|_| NormalizeError::UnknownTimeZone(slot.time_zone.clone()))?;
    let local = now.with_timezone(&tz);

    let today = local.weekday().num_days_from_monday();
    let target = slot.weekday.num_days_from_monday();
    let mut days_ahead = (target + 7 - today) % 7;
    if days_ahead == 0 && (local.hour(), local.minute()) >= (slot.hour, slot.minute) {
        days_ahead = 7;
    }

    let date = local.date_naive() + Days::new(u64::from(days_ahead));
    let invalid = || NormalizeError::InvalidSlot {
        date,
        hour: slot.hour,
        minute: slot.minute,
        time_zone: slot.time_zone.clone(),
    };
    let naive = date.and_hms_opt(slot.hour, slot.minute, 0).ok_or_else(invalid)?;
    let start = tz.from_local_datetime(&naive).earliest().ok_or_else(invalid)?;
    Ok(start.with_timezone(&Utc))
}

/// Strip the `" - <suffix>"` tail of a stream title.
pub fn extract_show_title(raw: &str) -> &str {
    raw.split_once(TITLE_SEPARATOR)
        .map(|(title, _)| title)
        .unwrap_or(raw)
}

pub fn youtube_thumbnail(video_id: &str) -> String {
    format!("https://i.ytimg.com/vi/{video_id}/maxresdefault.jpg")
}

/// Turn a feed snapshot into a candidate show that has not been persisted yet.
pub fn normalize(
    aggregate: &Aggregate,
    slot: &ShowSlot,
    now: DateTime<Utc>,
) -> Result<ShowProjection, NormalizeError> {
    let title = extract_show_title(&aggregate.floatplane.title).trim();
    if title.is_empty() {
        return Err(NormalizeError::MissingTitle);
    }
    let scheduled_time = next_show_slot(now, slot)?;

    let youtube = &aggregate.youtube;
    let floatplane = &aggregate.floatplane;
    let video_id = youtube
        .video_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .map(str::to_owned);

    let thumbnail = match &video_id {
        Some(id) => Some(youtube_thumbnail(id)),
        None => floatplane.thumbnail.clone().filter(|url| !url.is_empty()),
    };

    let mut metadata = Metadata::new();
    metadata.insert("title".into(), Value::String(title.to_owned()));
    metadata.insert(
        "floatplane".into(),
        json!({
            "thumbnail": floatplane.thumbnail,
            "is_live": floatplane.is_live,
            "is_wan": floatplane.is_wan,
            "is_thumbnail_new": floatplane.is_thumbnail_new,
            "title": floatplane.title,
        }),
    );
    metadata.insert(
        "youtube".into(),
        json!({
            "title": floatplane.title,
            "video_id": video_id,
            "upcoming": youtube.upcoming,
            "is_live": youtube.is_live,
        }),
    );

    let signals = ShowSignals {
        primary_live: youtube.is_live,
        has_identifying_signal: video_id.is_some() || floatplane.is_thumbnail_new,
    };

    let show = ShowEntity {
        id: String::new(),
        state: ShowState::Scheduled,
        youtube_id: video_id,
        scheduled_time,
        actual_start_time: youtube.is_live.then_some(now),
        thumbnail,
        metadata,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };

    Ok(ShowProjection { show, signals })
}
