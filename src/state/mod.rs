pub mod cache;
mod sse;
pub mod show_state;

use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, watch};

use crate::{
    config::AppConfig, dao::show_store::ShowStore, dto::aggregate::Aggregate,
    error::ServiceError,
};

pub use self::cache::{LatestShowCache, ShowProjection};
pub use self::show_state::{ShowSignals, Transition};
pub use self::sse::SseHub;
use self::sse::SseState;

pub type SharedState = Arc<AppState>;

/// Capacity of each SSE broadcast channel.
const SSE_CHANNEL_CAPACITY: usize = 64;

/// Producer side of the bounded snapshot queue drained by the ingestion consumer.
pub type AggregateSender = mpsc::Sender<Aggregate>;
/// Consumer side of the bounded snapshot queue.
pub type AggregateReceiver = mpsc::Receiver<Aggregate>;

/// Create the bounded snapshot queue; senders wait when it is full.
pub fn aggregate_queue(capacity: usize) -> (AggregateSender, AggregateReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Central application state storing the storage handle, hubs and the latest show.
pub struct AppState {
    show_store: RwLock<Option<Arc<dyn ShowStore>>>,
    config: AppConfig,
    latest_show: LatestShowCache,
    sse: SseState,
    degraded: watch::Sender<bool>,
    aggregates: AggregateSender,
    host_password: Option<String>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(
        config: AppConfig,
        aggregates: AggregateSender,
        host_password: Option<String>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            show_store: RwLock::new(None),
            config,
            latest_show: LatestShowCache::new(),
            sse: SseState::new(SSE_CHANNEL_CAPACITY, SSE_CHANNEL_CAPACITY),
            degraded: degraded_tx,
            aggregates,
            host_password: host_password.filter(|password| !password.is_empty()),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current show store, if one is installed.
    pub async fn show_store(&self) -> Option<Arc<dyn ShowStore>> {
        let guard = self.show_store.read().await;
        guard.as_ref().cloned()
    }

    /// Like [`AppState::show_store`], failing with [`ServiceError::Degraded`] when absent.
    pub async fn require_show_store(&self) -> Result<Arc<dyn ShowStore>, ServiceError> {
        self.show_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new show store implementation and leave degraded mode.
    pub async fn set_show_store(&self, store: Arc<dyn ShowStore>) {
        {
            let mut guard = self.show_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current show store and enter degraded mode.
    pub async fn clear_show_store(&self) {
        {
            let mut guard = self.show_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Broadcast hub used for the viewer chat SSE stream.
    pub fn chat_sse(&self) -> &SseHub {
        self.sse.chat()
    }

    /// Broadcast hub used for the host SSE stream.
    pub fn host_sse(&self) -> &SseHub {
        self.sse.host()
    }

    pub fn latest_show(&self) -> &LatestShowCache {
        &self.latest_show
    }

    pub fn aggregate_sender(&self) -> &AggregateSender {
        &self.aggregates
    }

    /// Shared secret expected on privileged pushes; `None` disables them.
    pub fn host_password(&self) -> Option<&str> {
        self.host_password.as_deref()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use super::{AggregateReceiver, AppState, SharedState, aggregate_queue};
    use crate::{
        config::AppConfig,
        dao::show_store::MemoryShowStore,
        dao::show_store::memory::fixtures::tile_catalog,
        dto::sse::ServerEvent,
    };
    use tokio::sync::broadcast;

    pub(crate) const HOST_PASSWORD: &str = "hunter2";

    /// State wired to an in-memory store seeded with a full tile catalog.
    pub(crate) async fn state_with_store(
        config: AppConfig,
    ) -> (SharedState, MemoryShowStore, AggregateReceiver) {
        let store = MemoryShowStore::with_tiles(tile_catalog(150));
        let (sender, receiver) = aggregate_queue(config.ingestion.queue_capacity);
        let state = AppState::new(config, sender, Some(HOST_PASSWORD.into()));
        state.set_show_store(Arc::new(store.clone())).await;
        (state, store, receiver)
    }

    /// Drain every event already queued on a hub subscription.
    pub(crate) fn drain(receiver: &mut broadcast::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Names of the drained events, in delivery order.
    pub(crate) fn event_names(receiver: &mut broadcast::Receiver<ServerEvent>) -> Vec<String> {
        drain(receiver)
            .into_iter()
            .filter_map(|event| event.event)
            .collect()
    }
}
