use tracing::info;

use crate::{
    dto::{aggregate::Aggregate, show::ShowSummary},
    error::ServiceError,
    state::SharedState,
};

/// Authoritative show from the latest-show cache.
pub async fn cached_show(state: &SharedState) -> Result<ShowSummary, ServiceError> {
    state
        .latest_show()
        .read(|cached| cached.map(|projection| ShowSummary::from(projection.show.clone())))
        .await
        .ok_or_else(|| ServiceError::NotReady("no snapshot reconciled yet".into()))
}

/// Most recent persisted show.
pub async fn latest_show(state: &SharedState) -> Result<ShowSummary, ServiceError> {
    let store = state.require_show_store().await?;
    store
        .latest_show()
        .await?
        .map(ShowSummary::from)
        .ok_or_else(|| ServiceError::NotFound("no show has been recorded yet".into()))
}

pub async fn find_show(state: &SharedState, id: String) -> Result<ShowSummary, ServiceError> {
    let store = state.require_show_store().await?;
    store
        .find_show(id.clone())
        .await?
        .map(ShowSummary::from)
        .ok_or_else(|| ServiceError::NotFound(format!("show `{id}`")))
}

/// Queue a pushed snapshot after checking the bearer secret, waiting while the queue is full.
pub async fn enqueue_aggregate(
    state: &SharedState,
    bearer: Option<&str>,
    aggregate: Aggregate,
) -> Result<(), ServiceError> {
    authorize_host(state, bearer)?;
    state
        .aggregate_sender()
        .send(aggregate)
        .await
        .map_err(|_| ServiceError::QueueClosed)?;
    info!("queued pushed aggregate snapshot");
    Ok(())
}

fn authorize_host(state: &SharedState, bearer: Option<&str>) -> Result<(), ServiceError> {
    match (state.host_password(), bearer) {
        (Some(expected), Some(given)) if expected == given => Ok(()),
        (None, _) => Err(ServiceError::Unauthorized(
            "snapshot pushes are disabled".into(),
        )),
        _ => Err(ServiceError::Unauthorized("invalid host password".into())),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::show_store::memory::fixtures::show,
        state::{
            AppState, aggregate_queue,
            testing::{HOST_PASSWORD, state_with_store},
        },
    };

    #[tokio::test]
    async fn pushes_require_the_host_password() {
        let (state, _store, mut receiver) = state_with_store(AppConfig::default()).await;

        let denied = enqueue_aggregate(&state, Some("wrong"), Aggregate::default()).await;
        assert!(matches!(denied, Err(ServiceError::Unauthorized(_))));
        let missing = enqueue_aggregate(&state, None, Aggregate::default()).await;
        assert!(matches!(missing, Err(ServiceError::Unauthorized(_))));

        enqueue_aggregate(&state, Some(HOST_PASSWORD), Aggregate::default())
            .await
            .unwrap();
        assert_eq!(receiver.recv().await, Some(Aggregate::default()));
    }

    #[tokio::test]
    async fn pushes_are_rejected_without_a_configured_password() {
        let (sender, _receiver) = aggregate_queue(1);
        let state = AppState::new(AppConfig::default(), sender, Some(String::new()));

        let result = enqueue_aggregate(&state, Some(""), Aggregate::default()).await;
        assert!(matches!(result, Err(ServiceError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn closed_queue_is_reported() {
        let (state, _store, receiver) = state_with_store(AppConfig::default()).await;
        drop(receiver);

        let result = enqueue_aggregate(&state, Some(HOST_PASSWORD), Aggregate::default()).await;
        assert!(matches!(result, Err(ServiceError::QueueClosed)));
    }

    #[tokio::test]
    async fn lookups_hit_the_store() {
        let (state, store, _rx) = state_with_store(AppConfig::default()).await;
        assert!(matches!(
            latest_show(&state).await,
            Err(ServiceError::NotFound(_))
        ));

        store.seed_show(show("abc", "March 1 Show", Utc::now())).await;
        assert_eq!(latest_show(&state).await.unwrap().id, "abc");
        assert_eq!(
            find_show(&state, "abc".into()).await.unwrap().title(),
            Some("March 1 Show")
        );
        assert!(matches!(
            find_show(&state, "nope".into()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn cached_show_is_unavailable_before_the_first_snapshot() {
        let (state, _store, _rx) = state_with_store(AppConfig::default()).await;
        assert!(matches!(
            cached_show(&state).await,
            Err(ServiceError::NotReady(_))
        ));
    }
}
