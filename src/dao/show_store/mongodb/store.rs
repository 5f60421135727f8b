use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database,
    bson::{Document, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoConfirmationDocument, MongoMessageDocument, MongoShowDocument, MongoTimerDocument,
        to_bson_time,
    },
    transaction::MongoShowTransaction,
};
use crate::dao::{
    models::{
        MessageEntity, ShowEntity, ShowState, TileConfirmationEntity, TimerEntity, new_record_id,
    },
    show_store::{ShowStore, ShowTransaction},
    storage::StorageResult,
};

pub(super) const SHOW_COLLECTION_NAME: &str = "shows";
pub(super) const TILE_COLLECTION_NAME: &str = "tiles";
pub(super) const SHOW_TILE_COLLECTION_NAME: &str = "show_tiles";
const TIMER_COLLECTION_NAME: &str = "timers";
const CONFIRMATION_COLLECTION_NAME: &str = "tile_confirmations";
const MESSAGE_COLLECTION_NAME: &str = "messages";

#[derive(Clone)]
pub struct MongoShowStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoShowStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;
        let indexes: [(&'static str, &'static str, Document); 3] = [
            (
                SHOW_COLLECTION_NAME,
                "scheduled_time,created_at",
                doc! {"scheduled_time": -1, "created_at": -1},
            ),
            (
                TIMER_COLLECTION_NAME,
                "is_active,expires_at",
                doc! {"is_active": 1, "expires_at": 1},
            ),
            (
                SHOW_TILE_COLLECTION_NAME,
                "show_id,tile_id",
                doc! {"show_id": 1, "tile_id": 1},
            ),
        ];

        for (collection, index, keys) in indexes {
            let model = mongodb::IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .name(Some(format!("{collection}_{}_idx", index.replace(',', "_"))))
                        .build(),
                )
                .build();

            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })?;
        }

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn shows(&self) -> Collection<MongoShowDocument> {
        self.database()
            .await
            .collection::<MongoShowDocument>(SHOW_COLLECTION_NAME)
    }

    async fn timers(&self) -> Collection<MongoTimerDocument> {
        self.database()
            .await
            .collection::<MongoTimerDocument>(TIMER_COLLECTION_NAME)
    }

    async fn latest_show(&self) -> MongoResult<Option<ShowEntity>> {
        let document = self
            .shows()
            .await
            .find_one(doc! {"deleted_at": null})
            .sort(doc! {"scheduled_time": -1, "created_at": -1})
            .await
            .map_err(|source| MongoDaoError::LoadShow { source })?;
        Ok(document.map(Into::into))
    }

    async fn find_show(&self, id: String) -> MongoResult<Option<ShowEntity>> {
        let document = self
            .shows()
            .await
            .find_one(doc! {"_id": id.as_str(), "deleted_at": null})
            .await
            .map_err(|source| MongoDaoError::LoadShow { source })?;
        Ok(document.map(Into::into))
    }

    async fn save_show(&self, mut show: ShowEntity) -> MongoResult<ShowEntity> {
        let collection = self.shows().await;

        if !show.is_persisted() {
            show.id = new_record_id();
            let document: MongoShowDocument = show.clone().into();
            collection
                .insert_one(&document)
                .await
                .map_err(|source| MongoDaoError::SaveShow {
                    id: show.id.clone(),
                    source,
                })?;
            return Ok(show);
        }

        show.updated_at = Utc::now();
        let document: MongoShowDocument = show.clone().into();
        let result = collection
            .replace_one(doc! {"_id": show.id.as_str()}, &document)
            .await
            .map_err(|source| MongoDaoError::SaveShow {
                id: show.id.clone(),
                source,
            })?;
        if result.matched_count == 0 {
            return Err(MongoDaoError::MissingShow { id: show.id });
        }
        Ok(show)
    }

    async fn update_show_state(&self, id: String, state: ShowState) -> MongoResult<()> {
        let result = self
            .shows()
            .await
            .update_one(
                doc! {"_id": id.as_str()},
                doc! {"$set": {"state": state.as_str(), "updated_at": to_bson_time(Utc::now())}},
            )
            .await
            .map_err(|source| MongoDaoError::SaveShow {
                id: id.clone(),
                source,
            })?;
        if result.matched_count == 0 {
            return Err(MongoDaoError::MissingShow { id });
        }
        Ok(())
    }

    async fn begin(&self) -> MongoResult<MongoShowTransaction> {
        let (client, database) = {
            let guard = self.inner.state.read().await;
            (guard.client.clone(), guard.database.clone())
        };
        MongoShowTransaction::start(&client, database).await
    }

    async fn save_timer(&self, mut timer: TimerEntity) -> MongoResult<TimerEntity> {
        if timer.id.is_empty() {
            timer.id = new_record_id();
        }
        let document: MongoTimerDocument = timer.clone().into();
        self.timers()
            .await
            .replace_one(doc! {"_id": timer.id.as_str()}, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveTimer {
                id: timer.id.clone(),
                source,
            })?;
        Ok(timer)
    }

    async fn stop_timers_by_title(&self, title: String, show_id: String) -> MongoResult<u64> {
        let filter = doc! {"title": title.as_str(), "show_id": show_id.as_str(), "is_active": true};
        let result = self
            .timers()
            .await
            .update_many(
                filter,
                doc! {"$set": {"is_active": false, "updated_at": to_bson_time(Utc::now())}},
            )
            .await
            .map_err(|source| MongoDaoError::StopTimers { title, source })?;
        Ok(result.modified_count)
    }

    async fn expired_timers(&self, now: DateTime<Utc>) -> MongoResult<Vec<TimerEntity>> {
        let documents: Vec<MongoTimerDocument> = self
            .timers()
            .await
            .find(doc! {"is_active": true, "expires_at": {"$lt": to_bson_time(now)}})
            .await
            .map_err(|source| MongoDaoError::ListExpiredTimers { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListExpiredTimers { source })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn stop_timer(&self, id: String) -> MongoResult<()> {
        self.timers()
            .await
            .update_one(
                doc! {"_id": id.as_str()},
                doc! {"$set": {"is_active": false, "updated_at": to_bson_time(Utc::now())}},
            )
            .await
            .map_err(|source| MongoDaoError::SaveTimer { id, source })?;
        Ok(())
    }

    async fn save_tile_confirmation(&self, confirmation: TileConfirmationEntity) -> MongoResult<()> {
        let id = confirmation.id.clone();
        let document: MongoConfirmationDocument = confirmation.into();
        self.database()
            .await
            .collection::<MongoConfirmationDocument>(CONFIRMATION_COLLECTION_NAME)
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveConfirmation { id, source })?;
        Ok(())
    }

    async fn save_message(&self, message: MessageEntity) -> MongoResult<()> {
        let id = message.id.clone();
        let document: MongoMessageDocument = message.into();
        self.database()
            .await
            .collection::<MongoMessageDocument>(MESSAGE_COLLECTION_NAME)
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveMessage { id, source })?;
        Ok(())
    }
}

impl ShowStore for MongoShowStore {
    fn latest_show(&self) -> BoxFuture<'static, StorageResult<Option<ShowEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.latest_show().await.map_err(Into::into) })
    }

    fn find_show(&self, id: String) -> BoxFuture<'static, StorageResult<Option<ShowEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_show(id).await.map_err(Into::into) })
    }

    fn save_show(&self, show: ShowEntity) -> BoxFuture<'static, StorageResult<ShowEntity>> {
        let store = self.clone();
        Box::pin(async move { store.save_show(show).await.map_err(Into::into) })
    }

    fn update_show_state(
        &self,
        id: String,
        state: ShowState,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.update_show_state(id, state).await.map_err(Into::into) })
    }

    fn begin(&self) -> BoxFuture<'static, StorageResult<Box<dyn ShowTransaction>>> {
        let store = self.clone();
        Box::pin(async move {
            let tx = store.begin().await?;
            Ok(Box::new(tx) as Box<dyn ShowTransaction>)
        })
    }

    fn save_timer(&self, timer: TimerEntity) -> BoxFuture<'static, StorageResult<TimerEntity>> {
        let store = self.clone();
        Box::pin(async move { store.save_timer(timer).await.map_err(Into::into) })
    }

    fn stop_timers_by_title(
        &self,
        title: String,
        show_id: String,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .stop_timers_by_title(title, show_id)
                .await
                .map_err(Into::into)
        })
    }

    fn expired_timers(
        &self,
        now: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<Vec<TimerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.expired_timers(now).await.map_err(Into::into) })
    }

    fn stop_timer(&self, id: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.stop_timer(id).await.map_err(Into::into) })
    }

    fn save_tile_confirmation(
        &self,
        confirmation: TileConfirmationEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .save_tile_confirmation(confirmation)
                .await
                .map_err(Into::into)
        })
    }

    fn save_message(&self, message: MessageEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_message(message).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.reconnect().await.map_err(Into::into) })
    }
}
