use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::{
    sync::watch,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{
            MessageEntity, Metadata, ShowState, TileConfirmationEntity, TimerEntity, new_record_id,
        },
        show_store::ShowStore,
        storage::StorageResult,
    },
    services::sse_events,
    state::{SharedState, Transition},
};

/// Start or cancel the show timer when `transition` crosses the live boundary.
///
/// Storage failures are logged; the transition itself already happened.
pub async fn apply_transition_effects(
    state: &SharedState,
    store: &dyn ShowStore,
    show_id: &str,
    transition: Transition,
    now: DateTime<Utc>,
) {
    let config = &state.config().timer;

    if transition.enters_live() {
        let timer = TimerEntity {
            id: new_record_id(),
            title: config.title.clone(),
            duration: config.duration_secs,
            created_by: None,
            show_id: Some(show_id.to_owned()),
            starts_at: Some(now),
            expires_at: Some(now + ChronoDuration::seconds(config.duration_secs)),
            is_active: true,
            settings: Metadata::new(),
            created_at: now,
            updated_at: now,
        };
        match store.save_timer(timer).await {
            Ok(timer) => info!(show_id, timer_id = %timer.id, "started show timer"),
            Err(err) => warn!(show_id, error = %err, "failed to start show timer"),
        }
    } else if transition.leaves_live() {
        match store
            .stop_timers_by_title(config.title.clone(), show_id.to_owned())
            .await
        {
            Ok(stopped) => info!(show_id, stopped, "stopped show timers"),
            Err(err) => warn!(show_id, error = %err, "failed to stop show timers"),
        }
    }
}

/// Handle every timer whose deadline passed before `now`; returns how many were processed.
pub async fn sweep_expired_timers(state: &SharedState, now: DateTime<Utc>) -> usize {
    let Some(store) = state.show_store().await else {
        debug!("skipping timer sweep in degraded mode");
        return 0;
    };

    let timers = match store.expired_timers(now).await {
        Ok(timers) => timers,
        Err(err) => {
            warn!(error = %err, "failed to list expired timers");
            return 0;
        }
    };

    let count = timers.len();
    for timer in timers {
        expire_timer(state, store.as_ref(), timer, now).await;
    }
    count
}

async fn expire_timer(
    state: &SharedState,
    store: &dyn ShowStore,
    timer: TimerEntity,
    now: DateTime<Utc>,
) {
    if timer.title == state.config().timer.title
        && let Some(show_id) = timer.show_id.as_deref()
    {
        match store.find_show(show_id.to_owned()).await {
            Ok(Some(show)) if show.state == ShowState::Live => {
                if let Err(err) = auto_confirm(state, store, show_id, now).await {
                    warn!(show_id, timer_id = %timer.id, error = %err, "automatic tile confirmation failed");
                }
            }
            Ok(_) => debug!(show_id, timer_id = %timer.id, "show no longer live; skipping confirmation"),
            Err(err) => warn!(show_id, error = %err, "failed to load timer show"),
        }
    }

    if let Err(err) = store.stop_timer(timer.id.clone()).await {
        warn!(timer_id = %timer.id, error = %err, "failed to deactivate expired timer");
    }
    sse_events::broadcast_timer_expired(state, &timer, now);
}

async fn auto_confirm(
    state: &SharedState,
    store: &dyn ShowStore,
    show_id: &str,
    now: DateTime<Utc>,
) -> StorageResult<()> {
    let config = &state.config().timer;

    store
        .save_tile_confirmation(TileConfirmationEntity {
            id: new_record_id(),
            show_id: show_id.to_owned(),
            tile_id: config.auto_confirm_tile_id.clone(),
            confirmed_by: None,
            context: Some(config.auto_confirm_context.clone()),
            confirmation_time: now,
            created_at: now,
            updated_at: now,
        })
        .await?;

    let message = MessageEntity {
        id: Uuid::new_v4().to_string(),
        show_id: show_id.to_owned(),
        player_id: config.system_player_id.clone(),
        contents: config.confirmation_message.clone(),
        system: true,
        replying: None,
        created_at: now,
        updated_at: now,
    };
    store.save_message(message.clone()).await?;

    info!(show_id, tile_id = %config.auto_confirm_tile_id, "confirmed tile after show timer");
    sse_events::broadcast_chat_message(state, &message);
    sse_events::broadcast_tile_confirmed(state, &config.auto_confirm_tile_id);
    Ok(())
}

/// Sweep expired timers on the configured interval until shutdown is signalled.
pub async fn run(state: SharedState, mut shutdown: watch::Receiver<bool>) {
    let period = state.config().timer.sweep_interval.max(Duration::from_millis(1));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep_expired_timers(&state, Utc::now()).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("timer sweep stopped");
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::{
        DateTime, Metadata, ShowState, TimerEntity, Transition, Utc, apply_transition_effects,
        sweep_expired_timers,
    };
    use crate::{
        config::AppConfig,
        dao::show_store::memory::{FaultPlan, fixtures::show},
        services::sse_events::{
            EVENT_CHAT_MESSAGE, EVENT_TILE_CONFIRM, EVENT_TIMER_EXPIRED,
        },
        state::testing::{drain, event_names, state_with_store},
    };

    fn expired_timer(id: &str, title: &str, show_id: &str, now: DateTime<Utc>) -> TimerEntity {
        TimerEntity {
            id: id.into(),
            title: title.into(),
            duration: 14_400,
            created_by: None,
            show_id: Some(show_id.into()),
            starts_at: Some(now - Duration::hours(5)),
            expires_at: Some(now - Duration::hours(1)),
            is_active: true,
            settings: Metadata::new(),
            created_at: now - Duration::hours(5),
            updated_at: now - Duration::hours(5),
        }
    }

    fn live_show(id: &str, now: DateTime<Utc>) -> crate::dao::models::ShowEntity {
        let mut entity = show(id, "March 1 Show", now - Duration::hours(5));
        entity.state = ShowState::Live;
        entity
    }

    #[tokio::test]
    async fn expired_show_timer_confirms_the_four_hour_tile() {
        let (state, store, _rx) = state_with_store(AppConfig::default()).await;
        let now = Utc::now();
        store.seed_show(live_show("show-1", now)).await;
        store
            .seed_timer(expired_timer("timer-1", "WAN Show Timer", "show-1", now))
            .await;
        let mut chat = state.chat_sse().subscribe();
        let mut host = state.host_sse().subscribe();

        assert_eq!(sweep_expired_timers(&state, now).await, 1);

        let confirmations = store.confirmations().await;
        assert_eq!(confirmations.len(), 1);
        assert_eq!(confirmations[0].tile_id, "BfaqFYztlR");
        assert_eq!(confirmations[0].show_id, "show-1");
        assert!(confirmations[0].confirmed_by.is_none());

        let messages = store.messages().await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].system);
        assert_eq!(messages[0].player_id, "SYSTEM");
        assert_eq!(messages[0].contents, "**TILE CONFIRMED** 4 Hour WAN Show");

        assert_eq!(event_names(&mut chat), vec![EVENT_CHAT_MESSAGE]);
        let host_events = drain(&mut host);
        let names: Vec<_> = host_events
            .iter()
            .filter_map(|event| event.event.as_deref())
            .collect();
        assert_eq!(names, vec![EVENT_TILE_CONFIRM, EVENT_TIMER_EXPIRED]);
        assert_eq!(host_events[0].data, r#"{"tileId":"BfaqFYztlR"}"#);
        let expired: serde_json::Value = serde_json::from_str(&host_events[1].data).unwrap();
        let deadline = (now - Duration::hours(1)).to_rfc3339();
        assert_eq!(expired["expired_at"], deadline.as_str());

        assert!(store.timers().await.iter().all(|timer| !timer.is_active));
    }

    #[tokio::test]
    async fn timer_of_a_finished_show_only_expires() {
        let (state, store, _rx) = state_with_store(AppConfig::default()).await;
        let now = Utc::now();
        let mut finished = live_show("show-1", now);
        finished.state = ShowState::Finished;
        store.seed_show(finished).await;
        store
            .seed_timer(expired_timer("timer-1", "WAN Show Timer", "show-1", now))
            .await;
        let mut host = state.host_sse().subscribe();

        sweep_expired_timers(&state, now).await;

        assert!(store.confirmations().await.is_empty());
        assert_eq!(event_names(&mut host), vec![EVENT_TIMER_EXPIRED]);
        assert!(!store.timers().await[0].is_active);
    }

    #[tokio::test]
    async fn other_timers_expire_without_confirmation() {
        let (state, store, _rx) = state_with_store(AppConfig::default()).await;
        let now = Utc::now();
        store.seed_show(live_show("show-1", now)).await;
        store
            .seed_timer(expired_timer("timer-1", "Sponsor spot", "show-1", now))
            .await;

        sweep_expired_timers(&state, now).await;

        assert!(store.confirmations().await.is_empty());
        assert!(!store.timers().await[0].is_active);
    }

    #[tokio::test]
    async fn failed_confirmation_still_deactivates_every_timer() {
        let (state, store, _rx) = state_with_store(AppConfig::default()).await;
        let now = Utc::now();
        store.seed_show(live_show("show-1", now)).await;
        store
            .seed_timer(expired_timer("timer-1", "WAN Show Timer", "show-1", now))
            .await;
        store
            .seed_timer(expired_timer("timer-2", "Break", "show-1", now))
            .await;
        store
            .inject_faults(FaultPlan {
                save_confirmation: true,
                ..FaultPlan::default()
            })
            .await;
        let mut host = state.host_sse().subscribe();

        assert_eq!(sweep_expired_timers(&state, now).await, 2);

        assert!(store.messages().await.is_empty());
        assert!(store.timers().await.iter().all(|timer| !timer.is_active));
        assert_eq!(
            event_names(&mut host),
            vec![EVENT_TIMER_EXPIRED, EVENT_TIMER_EXPIRED]
        );
    }

    #[tokio::test]
    async fn entering_and_leaving_live_starts_and_stops_one_timer() {
        let (state, store, _rx) = state_with_store(AppConfig::default()).await;
        let now = Utc::now();
        let entering = Transition {
            from: ShowState::Upcoming,
            to: ShowState::Live,
        };
        apply_transition_effects(&state, &store, "show-1", entering, now).await;

        let timers = store.timers().await;
        assert_eq!(timers.len(), 1);
        assert!(timers[0].is_active);
        assert_eq!(timers[0].title, "WAN Show Timer");
        assert_eq!(timers[0].duration, 14_400);
        assert_eq!(timers[0].expires_at, Some(now + Duration::seconds(14_400)));

        let leaving = Transition {
            from: ShowState::Live,
            to: ShowState::Finished,
        };
        apply_transition_effects(&state, &store, "show-1", leaving, now).await;
        assert!(store.timers().await.iter().all(|timer| !timer.is_active));
    }
}
