use tokio::sync::RwLock;

use crate::{dao::models::ShowEntity, state::show_state::ShowSignals};

/// Show as derived from one feed snapshot, together with the signals it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct ShowProjection {
    pub show: ShowEntity,
    pub signals: ShowSignals,
}

/// Last authoritative projection; read by handlers, written only by the ingestion consumer.
#[derive(Default)]
pub struct LatestShowCache {
    cell: RwLock<Option<ShowProjection>>,
}

impl LatestShowCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<ShowProjection> {
        self.cell.read().await.clone()
    }

    /// Read a field of the cached projection without cloning all of it.
    pub async fn read<R>(&self, f: impl FnOnce(Option<&ShowProjection>) -> R) -> R {
        let guard = self.cell.read().await;
        f(guard.as_ref())
    }

    pub async fn replace(&self, projection: ShowProjection) {
        *self.cell.write().await = Some(projection);
    }
}
