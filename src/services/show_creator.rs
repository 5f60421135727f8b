use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::{
    dao::{
        models::{ShowEntity, ShowTileEntity, new_record_id},
        show_store::{ShowStore, ShowTransaction},
        storage::StorageResult,
    },
    error::ServiceError,
};

/// Show row committed together with its tile pool.
#[derive(Debug, Clone)]
pub struct CreatedShow {
    pub show: ShowEntity,
    pub tile_count: usize,
}

/// Insert `show` under a fresh id together with a random pool of `pool_size` tiles.
///
/// Either both the show and every association are committed, or nothing is.
pub async fn create_show(
    store: &dyn ShowStore,
    mut show: ShowEntity,
    pool_size: usize,
    now: DateTime<Utc>,
) -> Result<CreatedShow, ServiceError> {
    show.id = new_record_id();
    show.created_at = now;
    show.updated_at = now;

    let mut tx = store.begin().await?;
    match stage_show(tx.as_mut(), &show, pool_size, now).await {
        Ok(tile_count) => {
            tx.commit().await?;
            info!(show_id = %show.id, tile_count, "created show with tile pool");
            Ok(CreatedShow { show, tile_count })
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(show_id = %show.id, error = %rollback_err, "failed to roll back show creation");
            }
            Err(err.into())
        }
    }
}

async fn stage_show(
    tx: &mut dyn ShowTransaction,
    show: &ShowEntity,
    pool_size: usize,
    now: DateTime<Utc>,
) -> StorageResult<usize> {
    tx.insert_show(show.clone()).await?;

    let tiles = tx.sample_tiles(pool_size).await?;
    if tiles.len() < pool_size {
        warn!(
            show_id = %show.id,
            requested = pool_size,
            available = tiles.len(),
            "tile catalog smaller than the pool size"
        );
    }

    let rows: Vec<ShowTileEntity> = tiles
        .iter()
        .map(|tile| ShowTileEntity::for_tile(&show.id, tile, now))
        .collect();
    let count = rows.len();
    tx.insert_show_tiles(rows).await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::dao::show_store::{
        MemoryShowStore,
        memory::{
            FaultPlan,
            fixtures::{show, tile_catalog},
        },
    };

    #[tokio::test]
    async fn commits_show_and_pool_together() {
        let store = MemoryShowStore::with_tiles(tile_catalog(120));
        let now = Utc::now();

        let created = create_show(&store, show("", "March 1 Show", now), 90, now)
            .await
            .unwrap();

        assert_eq!(created.tile_count, 90);
        assert_eq!(created.show.id.len(), 10);
        let rows = store.show_tiles().await;
        assert_eq!(rows.len(), 90);
        assert!(rows.iter().all(|row| row.show_id == created.show.id));
        let distinct: HashSet<_> = rows.iter().map(|row| row.tile_id.clone()).collect();
        assert_eq!(distinct.len(), 90);
        assert_eq!(store.shows().await.len(), 1);
    }

    #[tokio::test]
    async fn association_rows_carry_tile_weight_and_score() {
        let catalog = tile_catalog(3);
        let store = MemoryShowStore::with_tiles(catalog.clone());
        let now = Utc::now();

        create_show(&store, show("", "Small", now), 90, now).await.unwrap();

        for row in store.show_tiles().await {
            let tile = catalog.iter().find(|tile| tile.id == row.tile_id).unwrap();
            assert_eq!(row.weight, tile.weight);
            assert_eq!(row.score, tile.score);
        }
    }

    #[tokio::test]
    async fn failed_bulk_insert_rolls_back_the_show() {
        let store = MemoryShowStore::with_tiles(tile_catalog(120));
        store
            .inject_faults(FaultPlan {
                show_tile_insert: true,
                ..FaultPlan::default()
            })
            .await;
        let now = Utc::now();

        let result = create_show(&store, show("", "March 1 Show", now), 90, now).await;

        assert!(matches!(result, Err(ServiceError::Unavailable(_))));
        assert!(store.shows().await.is_empty());
        assert!(store.show_tiles().await.is_empty());
    }
}
