use chrono::Utc;
use mongodb::bson::{DateTime, Document};
use serde::{Deserialize, Serialize};

use super::error::{MongoDaoError, MongoResult};
use crate::dao::models::{
    MessageEntity, Metadata, ShowEntity, ShowState, ShowTileEntity, TileConfirmationEntity,
    TileEntity, TimerEntity,
};

pub fn to_bson_time(value: chrono::DateTime<Utc>) -> DateTime {
    DateTime::from_millis(value.timestamp_millis())
}

pub fn from_bson_time(value: DateTime) -> chrono::DateTime<Utc> {
    chrono::DateTime::from_timestamp_millis(value.timestamp_millis()).unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoShowDocument {
    #[serde(rename = "_id")]
    id: String,
    state: ShowState,
    youtube_id: Option<String>,
    scheduled_time: DateTime,
    actual_start_time: Option<DateTime>,
    thumbnail: Option<String>,
    #[serde(default)]
    metadata: Metadata,
    created_at: DateTime,
    updated_at: DateTime,
    deleted_at: Option<DateTime>,
}

impl From<ShowEntity> for MongoShowDocument {
    fn from(value: ShowEntity) -> Self {
        Self {
            id: value.id,
            state: value.state,
            youtube_id: value.youtube_id,
            scheduled_time: to_bson_time(value.scheduled_time),
            actual_start_time: value.actual_start_time.map(to_bson_time),
            thumbnail: value.thumbnail,
            metadata: value.metadata,
            created_at: to_bson_time(value.created_at),
            updated_at: to_bson_time(value.updated_at),
            deleted_at: value.deleted_at.map(to_bson_time),
        }
    }
}

impl From<MongoShowDocument> for ShowEntity {
    fn from(value: MongoShowDocument) -> Self {
        Self {
            id: value.id,
            state: value.state,
            youtube_id: value.youtube_id,
            scheduled_time: from_bson_time(value.scheduled_time),
            actual_start_time: value.actual_start_time.map(from_bson_time),
            thumbnail: value.thumbnail,
            metadata: value.metadata,
            created_at: from_bson_time(value.created_at),
            updated_at: from_bson_time(value.updated_at),
            deleted_at: value.deleted_at.map(from_bson_time),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTimerDocument {
    #[serde(rename = "_id")]
    id: String,
    title: String,
    duration: i64,
    created_by: Option<String>,
    show_id: Option<String>,
    starts_at: Option<DateTime>,
    expires_at: Option<DateTime>,
    is_active: bool,
    #[serde(default)]
    settings: Metadata,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<TimerEntity> for MongoTimerDocument {
    fn from(value: TimerEntity) -> Self {
        Self {
            id: value.id,
            title: value.title,
            duration: value.duration,
            created_by: value.created_by,
            show_id: value.show_id,
            starts_at: value.starts_at.map(to_bson_time),
            expires_at: value.expires_at.map(to_bson_time),
            is_active: value.is_active,
            settings: value.settings,
            created_at: to_bson_time(value.created_at),
            updated_at: to_bson_time(value.updated_at),
        }
    }
}

impl From<MongoTimerDocument> for TimerEntity {
    fn from(value: MongoTimerDocument) -> Self {
        Self {
            id: value.id,
            title: value.title,
            duration: value.duration,
            created_by: value.created_by,
            show_id: value.show_id,
            starts_at: value.starts_at.map(from_bson_time),
            expires_at: value.expires_at.map(from_bson_time),
            is_active: value.is_active,
            settings: value.settings,
            created_at: from_bson_time(value.created_at),
            updated_at: from_bson_time(value.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoShowTileDocument {
    show_id: String,
    tile_id: String,
    weight: f64,
    score: f64,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<ShowTileEntity> for MongoShowTileDocument {
    fn from(value: ShowTileEntity) -> Self {
        Self {
            show_id: value.show_id,
            tile_id: value.tile_id,
            weight: value.weight,
            score: value.score,
            created_at: to_bson_time(value.created_at),
            updated_at: to_bson_time(value.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConfirmationDocument {
    #[serde(rename = "_id")]
    id: String,
    show_id: String,
    tile_id: String,
    confirmed_by: Option<String>,
    context: Option<String>,
    confirmation_time: DateTime,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<TileConfirmationEntity> for MongoConfirmationDocument {
    fn from(value: TileConfirmationEntity) -> Self {
        Self {
            id: value.id,
            show_id: value.show_id,
            tile_id: value.tile_id,
            confirmed_by: value.confirmed_by,
            context: value.context,
            confirmation_time: to_bson_time(value.confirmation_time),
            created_at: to_bson_time(value.created_at),
            updated_at: to_bson_time(value.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMessageDocument {
    #[serde(rename = "_id")]
    id: String,
    show_id: String,
    player_id: String,
    contents: String,
    system: bool,
    replying: Option<String>,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<MessageEntity> for MongoMessageDocument {
    fn from(value: MessageEntity) -> Self {
        Self {
            id: value.id,
            show_id: value.show_id,
            player_id: value.player_id,
            contents: value.contents,
            system: value.system,
            replying: value.replying,
            created_at: to_bson_time(value.created_at),
            updated_at: to_bson_time(value.updated_at),
        }
    }
}

/// Decode a catalog tile from a raw `$sample` result.
///
/// Weight and score fall back to the catalog defaults when the document predates them.
pub fn tile_from_document(document: &Document) -> MongoResult<TileEntity> {
    let id = document
        .get_str("_id")
        .map_err(|_| MongoDaoError::MalformedTile { field: "_id" })?;
    let title = document
        .get_str("title")
        .map_err(|_| MongoDaoError::MalformedTile { field: "title" })?;

    Ok(TileEntity {
        id: id.to_owned(),
        title: title.to_owned(),
        category: document.get_str("category").ok().map(str::to_owned),
        weight: document.get_f64("weight").unwrap_or(1.0),
        score: document.get_f64("score").unwrap_or(5.0),
        deleted_at: None,
    })
}
