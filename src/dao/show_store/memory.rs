use std::{
    fs,
    io::{self, ErrorKind},
    path::Path,
    sync::Arc,
};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rand::{rng, seq::SliceRandom};
use tokio::sync::Mutex;

use super::{ShowStore, ShowTransaction};
use crate::dao::{
    models::{
        MessageEntity, ShowEntity, ShowState, ShowTileEntity, TileConfirmationEntity, TileEntity,
        TimerEntity, new_record_id,
    },
    storage::{StorageError, StorageResult},
};

/// Process-local store used when no database is configured, and by the test suite.
#[derive(Clone, Default)]
pub struct MemoryShowStore {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    shows: Vec<ShowEntity>,
    tiles: Vec<TileEntity>,
    show_tiles: Vec<ShowTileEntity>,
    timers: Vec<TimerEntity>,
    confirmations: Vec<TileConfirmationEntity>,
    messages: Vec<MessageEntity>,
    faults: FaultPlan,
}

/// Operations forced to fail, for exercising error paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct FaultPlan {
    pub save_show: bool,
    pub save_timer: bool,
    pub show_tile_insert: bool,
    pub save_confirmation: bool,
}

impl MemoryShowStore {
    /// Empty store with no tile catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the given tile catalog.
    pub fn with_tiles(tiles: Vec<TileEntity>) -> Self {
        let state = MemoryState {
            tiles,
            ..MemoryState::default()
        };
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }
    /// Store seeded from a JSON array of tiles; an empty catalog is refused.
    pub fn from_catalog_file(path: &Path) -> StorageResult<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            StorageError::unavailable(format!("reading tile catalog `{}`", path.display()), err)
        })?;
        let tiles: Vec<TileEntity> = serde_json::from_str(&contents).map_err(|err| {
            StorageError::unavailable(format!("parsing tile catalog `{}`", path.display()), err)
        })?;
        if tiles.iter().all(|tile| tile.deleted_at.is_some()) {
            return Err(StorageError::unavailable(
                format!("tile catalog `{}` has no usable tiles", path.display()),
                io::Error::new(ErrorKind::InvalidData, "empty tile catalog"),
            ));
        }
        Ok(Self::with_tiles(tiles))
    }
}

fn latest_of(shows: &[ShowEntity]) -> Option<&ShowEntity> {
    shows
        .iter()
        .filter(|show| show.deleted_at.is_none())
        .max_by_key(|show| (show.scheduled_time, show.created_at))
}

impl ShowStore for MemoryShowStore {
    fn latest_show(&self) -> BoxFuture<'static, StorageResult<Option<ShowEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let state = inner.lock().await;
            Ok(latest_of(&state.shows).cloned())
        })
    }

    fn find_show(&self, id: String) -> BoxFuture<'static, StorageResult<Option<ShowEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let state = inner.lock().await;
            Ok(state
                .shows
                .iter()
                .find(|show| show.id == id && show.deleted_at.is_none())
                .cloned())
        })
    }

    fn save_show(&self, mut show: ShowEntity) -> BoxFuture<'static, StorageResult<ShowEntity>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.lock().await;
            if state.faults.save_show {
                return Err(StorageError::aborted("show write rejected"));
            }

            if !show.is_persisted() {
                show.id = new_record_id();
                state.shows.push(show.clone());
                return Ok(show);
            }

            let existing = state
                .shows
                .iter_mut()
                .find(|row| row.id == show.id)
                .ok_or_else(|| StorageError::aborted(format!("show `{}` does not exist", show.id)))?;
            show.created_at = existing.created_at;
            show.updated_at = Utc::now();
            *existing = show.clone();
            Ok(show)
        })
    }

    fn update_show_state(
        &self,
        id: String,
        next: ShowState,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.lock().await;
            if state.faults.save_show {
                return Err(StorageError::aborted("show write rejected"));
            }
            let row = state
                .shows
                .iter_mut()
                .find(|row| row.id == id)
                .ok_or_else(|| StorageError::aborted(format!("show `{id}` does not exist")))?;
            row.state = next;
            row.updated_at = Utc::now();
            Ok(())
        })
    }

    fn begin(&self) -> BoxFuture<'static, StorageResult<Box<dyn ShowTransaction>>> {
        let store = self.clone();
        Box::pin(async move {
            let tx: Box<dyn ShowTransaction> = Box::new(MemoryTransaction {
                store,
                shows: Vec::new(),
                show_tiles: Vec::new(),
            });
            Ok(tx)
        })
    }

    fn save_timer(&self, mut timer: TimerEntity) -> BoxFuture<'static, StorageResult<TimerEntity>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.lock().await;
            if state.faults.save_timer {
                return Err(StorageError::aborted("timer write rejected"));
            }
            if timer.id.is_empty() {
                timer.id = new_record_id();
            }
            match state.timers.iter_mut().find(|row| row.id == timer.id) {
                Some(row) => *row = timer.clone(),
                None => state.timers.push(timer.clone()),
            }
            Ok(timer)
        })
    }

    fn stop_timers_by_title(
        &self,
        title: String,
        show_id: String,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.lock().await;
            if state.faults.save_timer {
                return Err(StorageError::aborted("timer write rejected"));
            }
            let now = Utc::now();
            let mut stopped = 0;
            for timer in state.timers.iter_mut().filter(|timer| {
                timer.is_active
                    && timer.title == title
                    && timer.show_id.as_deref() == Some(show_id.as_str())
            }) {
                timer.is_active = false;
                timer.updated_at = now;
                stopped += 1;
            }
            Ok(stopped)
        })
    }

    fn expired_timers(
        &self,
        now: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<Vec<TimerEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let state = inner.lock().await;
            Ok(state
                .timers
                .iter()
                .filter(|timer| timer.is_active && timer.expires_at.is_some_and(|at| at < now))
                .cloned()
                .collect())
        })
    }

    fn stop_timer(&self, id: String) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.lock().await;
            if let Some(timer) = state.timers.iter_mut().find(|timer| timer.id == id) {
                timer.is_active = false;
                timer.updated_at = Utc::now();
            }
            Ok(())
        })
    }

    fn save_tile_confirmation(
        &self,
        confirmation: TileConfirmationEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.lock().await;
            if state.faults.save_confirmation {
                return Err(StorageError::aborted("confirmation write rejected"));
            }
            state.confirmations.push(confirmation);
            Ok(())
        })
    }

    fn save_message(&self, message: MessageEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.lock().await.messages.push(message);
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

struct MemoryTransaction {
    store: MemoryShowStore,
    shows: Vec<ShowEntity>,
    show_tiles: Vec<ShowTileEntity>,
}

impl ShowTransaction for MemoryTransaction {
    fn insert_show(&mut self, show: ShowEntity) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            if !show.is_persisted() {
                return Err(StorageError::aborted("show id must be assigned before insert"));
            }
            if self.store.inner.lock().await.faults.save_show {
                return Err(StorageError::aborted("show write rejected"));
            }
            self.shows.push(show);
            Ok(())
        })
    }

    fn sample_tiles(&mut self, limit: usize) -> BoxFuture<'_, StorageResult<Vec<TileEntity>>> {
        Box::pin(async move {
            let mut pool: Vec<TileEntity> = {
                let state = self.store.inner.lock().await;
                state
                    .tiles
                    .iter()
                    .filter(|tile| tile.deleted_at.is_none())
                    .cloned()
                    .collect()
            };
            pool.shuffle(&mut rng());
            pool.truncate(limit);
            Ok(pool)
        })
    }

    fn insert_show_tiles(
        &mut self,
        rows: Vec<ShowTileEntity>,
    ) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            if self.store.inner.lock().await.faults.show_tile_insert {
                return Err(StorageError::aborted("show tile bulk insert rejected"));
            }
            self.show_tiles.extend(rows);
            Ok(())
        })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>> {
        let MemoryTransaction {
            store,
            shows,
            show_tiles,
        } = *self;
        Box::pin(async move {
            let mut state = store.inner.lock().await;
            state.shows.extend(shows);
            state.show_tiles.extend(show_tiles);
            Ok(())
        })
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
impl MemoryShowStore {
    pub(crate) async fn inject_faults(&self, faults: FaultPlan) {
        self.inner.lock().await.faults = faults;
    }

    pub(crate) async fn seed_show(&self, show: ShowEntity) {
        self.inner.lock().await.shows.push(show);
    }

    pub(crate) async fn seed_timer(&self, timer: TimerEntity) {
        self.inner.lock().await.timers.push(timer);
    }

    pub(crate) async fn shows(&self) -> Vec<ShowEntity> {
        self.inner.lock().await.shows.clone()
    }

    pub(crate) async fn show_tiles(&self) -> Vec<ShowTileEntity> {
        self.inner.lock().await.show_tiles.clone()
    }

    pub(crate) async fn timers(&self) -> Vec<TimerEntity> {
        self.inner.lock().await.timers.clone()
    }

    pub(crate) async fn confirmations(&self) -> Vec<TileConfirmationEntity> {
        self.inner.lock().await.confirmations.clone()
    }

    pub(crate) async fn messages(&self) -> Vec<MessageEntity> {
        self.inner.lock().await.messages.clone()
    }
}
