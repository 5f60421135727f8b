pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::dao::models::{
    MessageEntity, ShowEntity, ShowState, ShowTileEntity, TileConfirmationEntity, TileEntity,
    TimerEntity,
};
use crate::dao::storage::StorageResult;

pub use memory::MemoryShowStore;

/// Abstraction over the persistence layer for shows, timers and their side records.
pub trait ShowStore: Send + Sync {
    /// Undeleted show with the latest scheduled time.
    fn latest_show(&self) -> BoxFuture<'static, StorageResult<Option<ShowEntity>>>;
    fn find_show(&self, id: String) -> BoxFuture<'static, StorageResult<Option<ShowEntity>>>;
    /// Insert when `show.id` is empty (assigning a fresh id), update in place otherwise.
    fn save_show(&self, show: ShowEntity) -> BoxFuture<'static, StorageResult<ShowEntity>>;
    fn update_show_state(
        &self,
        id: String,
        state: ShowState,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Open a unit of work for multi-row show creation.
    fn begin(&self) -> BoxFuture<'static, StorageResult<Box<dyn ShowTransaction>>>;
    fn save_timer(&self, timer: TimerEntity) -> BoxFuture<'static, StorageResult<TimerEntity>>;
    /// Deactivate every active timer with `title` owned by `show_id`, returning how many changed.
    fn stop_timers_by_title(
        &self,
        title: String,
        show_id: String,
    ) -> BoxFuture<'static, StorageResult<u64>>;
    fn expired_timers(
        &self,
        now: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<Vec<TimerEntity>>>;
    fn stop_timer(&self, id: String) -> BoxFuture<'static, StorageResult<()>>;
    fn save_tile_confirmation(
        &self,
        confirmation: TileConfirmationEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn save_message(&self, message: MessageEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Writes staged inside a transaction become visible only after [`ShowTransaction::commit`].
pub trait ShowTransaction: Send {
    fn insert_show(&mut self, show: ShowEntity) -> BoxFuture<'_, StorageResult<()>>;
    /// Random pool of at most `limit` undeleted catalog tiles.
    fn sample_tiles(&mut self, limit: usize) -> BoxFuture<'_, StorageResult<Vec<TileEntity>>>;
    fn insert_show_tiles(
        &mut self,
        rows: Vec<ShowTileEntity>,
    ) -> BoxFuture<'_, StorageResult<()>>;
    fn commit(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>>;
    fn rollback(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>>;
}
