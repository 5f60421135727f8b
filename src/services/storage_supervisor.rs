use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{show_store::ShowStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Keep a show store installed in the shared state, toggling degraded mode while it is unreachable.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn ShowStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_show_store(store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                watch_health(&state, store.as_ref()).await;
                state.clear_show_store().await;
            }
            Err(err) => warn!(error = %err, "storage connection attempt failed"),
        }

        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

/// Poll the store until it fails and cannot be recovered in place.
async fn watch_health(state: &SharedState, store: &dyn ShowStore) {
    loop {
        if store.health_check().await.is_ok() {
            if state.is_degraded().await {
                info!("storage healthy again; leaving degraded mode");
                state.update_degraded(false).await;
            }
            sleep(HEALTH_POLL_INTERVAL).await;
            continue;
        }

        if !reconnect(state, store).await {
            warn!("exhausted storage reconnect attempts; reconnecting from scratch");
            return;
        }
        state.update_degraded(false).await;
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

async fn reconnect(state: &SharedState, store: &dyn ShowStore) -> bool {
    let mut delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnected after a failed health check");
                return true;
            }
            Err(err) if attempt == 0 => {
                warn!(attempt, error = %err, "storage reconnect failed; entering degraded mode");
                state.update_degraded(true).await;
            }
            Err(err) => warn!(attempt, error = %err, "storage reconnect attempt failed"),
        }
        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::show_store::MemoryShowStore,
        state::{AppState, aggregate_queue},
    };

    #[tokio::test]
    async fn installs_the_store_and_leaves_degraded_mode() {
        let (sender, _receiver) = aggregate_queue(1);
        let state = AppState::new(AppConfig::default(), sender, None);
        let mut degraded = state.degraded_watcher();
        assert!(*degraded.borrow());

        let supervisor = tokio::spawn(run(state.clone(), || async {
            Ok(Arc::new(MemoryShowStore::new()) as Arc<dyn ShowStore>)
        }));

        tokio::time::timeout(Duration::from_secs(1), degraded.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(!state.is_degraded().await);
        assert!(state.show_store().await.is_some());
        supervisor.abort();
    }
}
