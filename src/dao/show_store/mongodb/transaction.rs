use futures::future::BoxFuture;
use mongodb::{
    Client, ClientSession, Database,
    bson::{Document, doc},
};

use super::{
    error::{MongoDaoError, MongoResult},
    models::{MongoShowDocument, MongoShowTileDocument, tile_from_document},
    store::{SHOW_COLLECTION_NAME, SHOW_TILE_COLLECTION_NAME, TILE_COLLECTION_NAME},
};
use crate::dao::{
    models::{ShowEntity, ShowTileEntity, TileEntity},
    show_store::ShowTransaction,
    storage::StorageResult,
};

/// Multi-document transaction bound to one client session.
pub struct MongoShowTransaction {
    session: ClientSession,
    database: Database,
}

impl MongoShowTransaction {
    pub(super) async fn start(client: &Client, database: Database) -> MongoResult<Self> {
        let mut session = client
            .start_session()
            .await
            .map_err(|source| MongoDaoError::Transaction {
                stage: "start_session",
                source,
            })?;
        session
            .start_transaction()
            .await
            .map_err(|source| MongoDaoError::Transaction {
                stage: "start_transaction",
                source,
            })?;
        Ok(Self { session, database })
    }

    async fn write_show(&mut self, show: ShowEntity) -> MongoResult<()> {
        let document: MongoShowDocument = show.into();
        self.database
            .collection::<MongoShowDocument>(SHOW_COLLECTION_NAME)
            .insert_one(&document)
            .session(&mut self.session)
            .await
            .map_err(|source| MongoDaoError::Transaction {
                stage: "insert_show",
                source,
            })?;
        Ok(())
    }

    async fn draw_tiles(&mut self, limit: usize) -> MongoResult<Vec<TileEntity>> {
        let size = i64::try_from(limit).unwrap_or(i64::MAX);
        let pipeline = vec![
            doc! {"$match": {"deleted_at": null}},
            doc! {"$sample": {"size": size}},
        ];
        let mut cursor = self
            .database
            .collection::<Document>(TILE_COLLECTION_NAME)
            .aggregate(pipeline)
            .session(&mut self.session)
            .await
            .map_err(|source| MongoDaoError::Transaction {
                stage: "sample_tiles",
                source,
            })?;

        let mut tiles = Vec::with_capacity(limit);
        while let Some(document) = cursor.next(&mut self.session).await {
            let document = document.map_err(|source| MongoDaoError::Transaction {
                stage: "sample_tiles",
                source,
            })?;
            tiles.push(tile_from_document(&document)?);
        }
        Ok(tiles)
    }

    async fn write_show_tiles(&mut self, rows: Vec<ShowTileEntity>) -> MongoResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let documents: Vec<MongoShowTileDocument> = rows.into_iter().map(Into::into).collect();
        self.database
            .collection::<MongoShowTileDocument>(SHOW_TILE_COLLECTION_NAME)
            .insert_many(documents)
            .session(&mut self.session)
            .await
            .map_err(|source| MongoDaoError::Transaction {
                stage: "insert_show_tiles",
                source,
            })?;
        Ok(())
    }

    async fn finish(mut self) -> MongoResult<()> {
        self.session
            .commit_transaction()
            .await
            .map_err(|source| MongoDaoError::Transaction {
                stage: "commit",
                source,
            })
    }

    async fn abort(mut self) -> MongoResult<()> {
        self.session
            .abort_transaction()
            .await
            .map_err(|source| MongoDaoError::Transaction {
                stage: "rollback",
                source,
            })
    }
}

impl ShowTransaction for MongoShowTransaction {
    fn insert_show(&mut self, show: ShowEntity) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move { self.write_show(show).await.map_err(Into::into) })
    }

    fn sample_tiles(&mut self, limit: usize) -> BoxFuture<'_, StorageResult<Vec<TileEntity>>> {
        Box::pin(async move {
            self.draw_tiles(limit)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_show_tiles(
        &mut self,
        rows: Vec<ShowTileEntity>,
    ) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            self.write_show_tiles(rows)
                .await
                .map_err(Into::into)
        })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move { (*self).finish().await.map_err(Into::into) })
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move { (*self).abort().await.map_err(Into::into) })
    }
}
