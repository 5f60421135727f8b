use chrono::{DateTime, Utc};
use tokio::{sync::watch, time::sleep};
use tracing::{debug, info, warn};

use crate::{
    dao::{
        models::{ShowEntity, ShowState},
        show_store::ShowStore,
    },
    dto::aggregate::Aggregate,
    services::{
        fingerprint::same_content,
        normalizer::normalize,
        show_creator::create_show,
        sse_events,
        timer_service::apply_transition_effects,
        title_heuristic::{TitleDecision, assess_title},
    },
    state::{AggregateReceiver, SharedState, ShowProjection, ShowSignals, Transition},
};

/// What one snapshot did to the persisted show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Malformed or untitled, or no storage is installed.
    Dropped,
    /// Same content as the cached projection.
    Duplicate,
    /// First show written to an empty store.
    Bootstrapped,
    /// The current show was updated in place.
    Updated,
    /// Placeholder title seen while a new show is due; only state was applied.
    AwaitingFinalTitle,
    /// Title change withheld by the time gate; state was still applied.
    Held,
    /// A new show row and its tile pool were committed.
    Created,
    /// Writing the show failed; nothing new was published.
    Failed,
}

/// Drain the snapshot queue until it closes or shutdown is signalled.
pub async fn run(
    state: SharedState,
    mut receiver: AggregateReceiver,
    mut shutdown: watch::Receiver<bool>,
) {
    let pause = state.config().ingestion.consumer_pause;

    loop {
        let aggregate = tokio::select! {
            received = receiver.recv() => match received {
                Some(aggregate) => aggregate,
                None => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };

        let outcome = reconcile(&state, &aggregate, Utc::now()).await;
        debug!(?outcome, "processed aggregate snapshot");
        sleep(pause).await;
    }
    info!("aggregate consumer stopped");
}

/// Fold one snapshot into the persisted show and the latest-show cache.
pub async fn reconcile(
    state: &SharedState,
    aggregate: &Aggregate,
    now: DateTime<Utc>,
) -> ReconcileOutcome {
    let config = state.config();
    let candidate = match normalize(aggregate, &config.schedule, now) {
        Ok(candidate) => candidate,
        Err(err) => {
            warn!(error = %err, "dropping snapshot that could not be normalized");
            return ReconcileOutcome::Dropped;
        }
    };

    let previous = state.latest_show().get().await;
    if let Some(previous) = &previous
        && same_content(&adopt(&candidate, &previous.show), previous)
    {
        return ReconcileOutcome::Duplicate;
    }

    let Some(store) = state.show_store().await else {
        warn!("skipping snapshot in degraded mode");
        return ReconcileOutcome::Dropped;
    };
    let store = store.as_ref();

    let latest = match store.latest_show().await {
        Ok(latest) => latest,
        Err(err) => {
            warn!(error = %err, "failed to load the latest show");
            return ReconcileOutcome::Failed;
        }
    };

    let Some(latest) = latest else {
        info!("no show stored yet; creating the first one");
        return match create_from(state, store, candidate, now).await {
            Some(projection) => {
                publish(state, projection, previous.as_ref()).await;
                ReconcileOutcome::Bootstrapped
            }
            None => ReconcileOutcome::Failed,
        };
    };

    let assessment = assess_title(candidate.show.title(), &latest, &config.reconcile, now);
    debug!(
        show_id = %latest.id,
        candidate = candidate.show.title(),
        existing = latest.title(),
        distance_to_placeholder = assessment.distance_to_placeholder,
        distance_to_existing = assessment.distance_to_existing,
        hours_since_created = assessment.hours_since_created,
        decision = ?assessment.decision,
        "assessed snapshot title"
    );

    match assessment.decision {
        TitleDecision::Unchanged | TitleDecision::Cosmetic => {
            let projection = update_in_place(state, store, &candidate, &latest, now).await;
            publish(state, projection, previous.as_ref()).await;
            ReconcileOutcome::Updated
        }
        TitleDecision::AwaitingFinalTitle => {
            info!(show_id = %latest.id, "placeholder title up; waiting for the final title");
            let projection = apply_state_only(state, store, candidate.signals, latest, now).await;
            publish(state, projection, previous.as_ref()).await;
            ReconcileOutcome::AwaitingFinalTitle
        }
        TitleDecision::Held => {
            info!(
                show_id = %latest.id,
                hours_since_created = assessment.hours_since_created,
                "title change held back by the new-show gap"
            );
            let projection = apply_state_only(state, store, candidate.signals, latest, now).await;
            publish(state, projection, previous.as_ref()).await;
            ReconcileOutcome::Held
        }
        TitleDecision::NewShow => match create_from(state, store, candidate, now).await {
            Some(projection) => {
                publish(state, projection, previous.as_ref()).await;
                ReconcileOutcome::Created
            }
            None => ReconcileOutcome::Failed,
        },
    }
}

/// Candidate content carried over onto an existing row's identity.
fn adopt(candidate: &ShowProjection, existing: &ShowEntity) -> ShowProjection {
    let incoming = &candidate.show;
    let show = ShowEntity {
        id: existing.id.clone(),
        state: existing.state,
        youtube_id: incoming.youtube_id.clone(),
        scheduled_time: existing.scheduled_time,
        actual_start_time: existing.actual_start_time.or(incoming.actual_start_time),
        thumbnail: incoming.thumbnail.clone(),
        metadata: incoming.metadata.clone(),
        created_at: existing.created_at,
        updated_at: incoming.updated_at,
        deleted_at: existing.deleted_at,
    };
    ShowProjection {
        show,
        signals: candidate.signals,
    }
}

async fn update_in_place(
    state: &SharedState,
    store: &dyn ShowStore,
    candidate: &ShowProjection,
    latest: &ShowEntity,
    now: DateTime<Utc>,
) -> ShowProjection {
    let mut projection = adopt(candidate, latest);
    let transition = Transition::evaluate(latest.state, projection.signals);
    if let Some(transition) = transition {
        projection.show.state = transition.to;
    }

    match store.save_show(projection.show.clone()).await {
        Ok(saved) => {
            if let Some(transition) = transition {
                info!(show_id = %saved.id, from = transition.from.as_str(), to = transition.to.as_str(), "show state changed");
                apply_transition_effects(state, store, &saved.id, transition, now).await;
            }
            projection.show = saved;
        }
        Err(err) => warn!(show_id = %latest.id, error = %err, "failed to update the current show"),
    }
    projection
}

/// Apply the state machine to the persisted row without touching its content.
async fn apply_state_only(
    state: &SharedState,
    store: &dyn ShowStore,
    signals: ShowSignals,
    mut latest: ShowEntity,
    now: DateTime<Utc>,
) -> ShowProjection {
    if let Some(transition) = Transition::evaluate(latest.state, signals) {
        match store.update_show_state(latest.id.clone(), transition.to).await {
            Ok(()) => {
                info!(show_id = %latest.id, from = transition.from.as_str(), to = transition.to.as_str(), "show state changed");
                latest.state = transition.to;
                apply_transition_effects(state, store, &latest.id, transition, now).await;
            }
            Err(err) => warn!(show_id = %latest.id, error = %err, "failed to update show state"),
        }
    }
    ShowProjection {
        show: latest,
        signals,
    }
}

async fn create_from(
    state: &SharedState,
    store: &dyn ShowStore,
    candidate: ShowProjection,
    now: DateTime<Utc>,
) -> Option<ShowProjection> {
    let ShowProjection { mut show, signals } = candidate;
    let transition = Transition::evaluate(ShowState::Scheduled, signals);
    if let Some(transition) = transition {
        show.state = transition.to;
    }

    let created = match create_show(store, show, state.config().reconcile.tile_pool_size, now).await
    {
        Ok(created) => created,
        Err(err) => {
            warn!(error = %err, "failed to create show");
            return None;
        }
    };

    if let Some(transition) = transition {
        apply_transition_effects(state, store, &created.show.id, transition, now).await;
    }
    Some(ShowProjection {
        show: created.show,
        signals,
    })
}

/// Replace the cache and broadcast when the authoritative show changed.
async fn publish(state: &SharedState, projection: ShowProjection, previous: Option<&ShowProjection>) {
    let unchanged = previous.is_some_and(|previous| {
        previous.show.id == projection.show.id
            && previous.show.state == projection.show.state
            && same_content(previous, &projection)
    });

    if !unchanged {
        sse_events::broadcast_show_update(state, &projection.show);
    }
    state.latest_show().replace(projection).await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::Duration;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::show_store::memory::{FaultPlan, fixtures::show},
        dto::aggregate::{FloatplaneStatus, YoutubeStatus},
        services::sse_events::EVENT_AGGREGATE,
        state::{
            AppState, aggregate_queue,
            testing::{event_names, state_with_store},
        },
    };

    fn aggregate(title: &str, is_live: bool, video_id: Option<&str>) -> Aggregate {
        Aggregate {
            youtube: YoutubeStatus {
                is_live,
                upcoming: false,
                video_id: video_id.map(str::to_owned),
            },
            floatplane: FloatplaneStatus {
                is_live,
                is_wan: true,
                is_thumbnail_new: false,
                thumbnail: Some("https://pbs.floatplane.com/thumb.jpeg".into()),
                title: format!("{title} - WAN Show March 1, 2025"),
            },
            ..Aggregate::default()
        }
    }

    fn seeded(id: &str, title: &str, age_hours: i64, state: ShowState, now: DateTime<Utc>) -> ShowEntity {
        let mut entity = show(id, title, now - Duration::hours(age_hours));
        entity.state = state;
        entity
    }

    #[tokio::test]
    async fn identical_snapshots_persist_and_broadcast_once() {
        let (state, store, _rx) = state_with_store(AppConfig::default()).await;
        let now = Utc::now();
        store
            .seed_show(seeded("current", "March 1 Show", 2, ShowState::Scheduled, now))
            .await;
        let mut chat = state.chat_sse().subscribe();
        let snapshot = aggregate("March 1 Show", false, Some("abc123"));

        assert_eq!(reconcile(&state, &snapshot, now).await, ReconcileOutcome::Updated);
        let after_first = store.shows().await;
        assert_eq!(
            reconcile(&state, &snapshot, now + Duration::seconds(10)).await,
            ReconcileOutcome::Duplicate
        );

        assert_eq!(store.shows().await, after_first);
        assert_eq!(event_names(&mut chat), vec![EVENT_AGGREGATE]);
    }

    #[tokio::test]
    async fn empty_store_bootstraps_the_first_show() {
        let (state, store, _rx) = state_with_store(AppConfig::default()).await;
        let now = Utc::now();

        let outcome = reconcile(&state, &aggregate("March 1 Show", false, None), now).await;

        assert_eq!(outcome, ReconcileOutcome::Bootstrapped);
        let shows = store.shows().await;
        assert_eq!(shows.len(), 1);
        assert_eq!(shows[0].title(), "March 1 Show");
        assert_eq!(shows[0].state, ShowState::Scheduled);
        assert_eq!(store.show_tiles().await.len(), 90);
        let cached = state.latest_show().get().await.unwrap();
        assert_eq!(cached.show.id, shows[0].id);
    }

    #[tokio::test]
    async fn placeholder_title_waits_without_creating_a_show() {
        let (state, store, _rx) = state_with_store(AppConfig::default()).await;
        let now = Utc::now();
        let old = seeded("current", "Old Title", 120, ShowState::Finished, now);
        store.seed_show(old.clone()).await;
        let mut host = state.host_sse().subscribe();

        let outcome = reconcile(&state, &aggregate("Hello, Floatplane!", false, None), now).await;

        assert_eq!(outcome, ReconcileOutcome::AwaitingFinalTitle);
        assert_eq!(store.shows().await, vec![old]);
        assert!(store.show_tiles().await.is_empty());
        assert_eq!(event_names(&mut host), vec![EVENT_AGGREGATE]);
        let cached = state.latest_show().get().await.unwrap();
        assert_eq!(cached.show.id, "current");
        assert_eq!(cached.show.title(), "Old Title");
    }

    #[tokio::test]
    async fn placeholder_pre_show_still_goes_live() {
        let (state, store, _rx) = state_with_store(AppConfig::default()).await;
        let now = Utc::now();
        store
            .seed_show(seeded("current", "Old Title", 120, ShowState::Upcoming, now))
            .await;
        let mut chat = state.chat_sse().subscribe();

        for offset in 0..3 {
            let snapshot = aggregate("Hello, Floatplane!", true, Some("abc123"));
            let outcome = reconcile(&state, &snapshot, now + Duration::seconds(offset)).await;
            assert_eq!(outcome, ReconcileOutcome::AwaitingFinalTitle);
        }

        let shows = store.shows().await;
        assert_eq!(shows.len(), 1);
        assert_eq!(shows[0].state, ShowState::Live);
        assert_eq!(shows[0].title(), "Old Title");
        assert_eq!(store.timers().await.len(), 1);
        assert_eq!(event_names(&mut chat), vec![EVENT_AGGREGATE]);
        let cached = state.latest_show().get().await.unwrap();
        assert_eq!(cached.show.state, ShowState::Live);
    }

    #[tokio::test]
    async fn untitled_snapshot_is_dropped_without_a_new_show() {
        let (state, store, _rx) = state_with_store(AppConfig::default()).await;
        let now = Utc::now();
        let old = seeded("current", "Old Title", 120, ShowState::Finished, now);
        store.seed_show(old.clone()).await;

        let untitled = Aggregate::default();
        assert_eq!(reconcile(&state, &untitled, now).await, ReconcileOutcome::Dropped);
        assert_eq!(store.shows().await, vec![old]);

        let later = now + Duration::minutes(1);
        let outcome = reconcile(&state, &aggregate("Old Title", false, None), later).await;
        assert_eq!(outcome, ReconcileOutcome::Updated);
        assert_eq!(store.shows().await.len(), 1);
    }

    #[tokio::test]
    async fn new_title_after_the_gap_creates_a_second_show() {
        let (state, store, _rx) = state_with_store(AppConfig::default()).await;
        let now = Utc::now();
        let old = seeded("current", "Old Title", 120, ShowState::Finished, now);
        store.seed_show(old.clone()).await;
        let mut chat = state.chat_sse().subscribe();

        let outcome = reconcile(&state, &aggregate("March 1 Show", false, None), now).await;

        assert_eq!(outcome, ReconcileOutcome::Created);
        let shows = store.shows().await;
        assert_eq!(shows.len(), 2);
        assert_eq!(shows[0], old);
        let created = &shows[1];
        assert_ne!(created.id, old.id);
        assert_eq!(created.title(), "March 1 Show");

        let pool = store.show_tiles().await;
        assert_eq!(pool.len(), 90);
        assert!(pool.iter().all(|row| row.show_id == created.id));

        assert_eq!(state.latest_show().get().await.unwrap().show.id, created.id);
        assert_eq!(event_names(&mut chat), vec![EVENT_AGGREGATE]);
    }

    #[tokio::test]
    async fn new_title_inside_the_gap_keeps_the_row_but_applies_state() {
        let (state, store, _rx) = state_with_store(AppConfig::default()).await;
        let now = Utc::now();
        store
            .seed_show(seeded("current", "Old Title", 100, ShowState::Upcoming, now))
            .await;

        let outcome = reconcile(&state, &aggregate("March 1 Show", true, Some("abc123")), now).await;

        assert_eq!(outcome, ReconcileOutcome::Held);
        let shows = store.shows().await;
        assert_eq!(shows.len(), 1);
        assert_eq!(shows[0].title(), "Old Title");
        assert_eq!(shows[0].state, ShowState::Live);
        assert!(store.show_tiles().await.is_empty());
        assert_eq!(store.timers().await.len(), 1);
    }

    #[tokio::test]
    async fn going_live_and_ending_starts_then_stops_the_timer() {
        let (state, store, _rx) = state_with_store(AppConfig::default()).await;
        let now = Utc::now();
        store
            .seed_show(seeded("current", "March 1 Show", 3, ShowState::Upcoming, now))
            .await;

        reconcile(&state, &aggregate("March 1 Show", true, Some("abc123")), now).await;
        let timers = store.timers().await;
        assert_eq!(timers.len(), 1);
        assert!(timers[0].is_active);
        assert_eq!(timers[0].show_id.as_deref(), Some("current"));
        let live = store.shows().await.remove(0);
        assert_eq!(live.state, ShowState::Live);
        assert_eq!(live.actual_start_time, Some(now));

        let later = now + Duration::hours(4);
        reconcile(&state, &aggregate("March 1 Show", false, None), later).await;
        let ended = store.shows().await.remove(0);
        assert_eq!(ended.state, ShowState::Finished);
        assert_eq!(ended.actual_start_time, Some(now));
        assert!(store.timers().await.iter().all(|timer| !timer.is_active));
    }

    #[tokio::test]
    async fn scheduled_time_survives_cosmetic_updates() {
        let (state, store, _rx) = state_with_store(AppConfig::default()).await;
        let now = Utc::now();
        let current = seeded("current", "March 1 Show", 3, ShowState::Scheduled, now);
        store.seed_show(current.clone()).await;

        reconcile(&state, &aggregate("March 1 Show!", false, None), now).await;

        let updated = store.shows().await.remove(0);
        assert_eq!(updated.title(), "March 1 Show!");
        assert_eq!(updated.scheduled_time, current.scheduled_time);
        assert_eq!(updated.created_at, current.created_at);
    }

    #[tokio::test]
    async fn failed_creation_leaves_cache_and_store_untouched() {
        let (state, store, _rx) = state_with_store(AppConfig::default()).await;
        let now = Utc::now();
        let old = seeded("current", "Old Title", 120, ShowState::Finished, now);
        store.seed_show(old.clone()).await;
        store
            .inject_faults(FaultPlan {
                show_tile_insert: true,
                ..FaultPlan::default()
            })
            .await;
        let mut chat = state.chat_sse().subscribe();

        let outcome = reconcile(&state, &aggregate("March 1 Show", false, None), now).await;

        assert_eq!(outcome, ReconcileOutcome::Failed);
        assert_eq!(store.shows().await, vec![old]);
        assert!(store.show_tiles().await.is_empty());
        assert!(state.latest_show().get().await.is_none());
        assert!(event_names(&mut chat).is_empty());
    }

    #[tokio::test]
    async fn failed_cosmetic_write_still_refreshes_the_cache() {
        let (state, store, _rx) = state_with_store(AppConfig::default()).await;
        let now = Utc::now();
        let current = seeded("current", "March 1 Show", 3, ShowState::Scheduled, now);
        store.seed_show(current.clone()).await;
        store
            .inject_faults(FaultPlan {
                save_show: true,
                ..FaultPlan::default()
            })
            .await;
        let mut chat = state.chat_sse().subscribe();

        let outcome = reconcile(&state, &aggregate("March 1 Show!", false, None), now).await;

        assert_eq!(outcome, ReconcileOutcome::Updated);
        assert_eq!(store.shows().await, vec![current]);
        let cached = state.latest_show().get().await.unwrap();
        assert_eq!(cached.show.id, "current");
        assert_eq!(cached.show.title(), "March 1 Show!");
        assert_eq!(event_names(&mut chat), vec![EVENT_AGGREGATE]);
    }

    #[tokio::test]
    async fn failed_timer_write_keeps_the_live_transition() {
        let (state, store, _rx) = state_with_store(AppConfig::default()).await;
        let now = Utc::now();
        store
            .seed_show(seeded("current", "March 1 Show", 3, ShowState::Upcoming, now))
            .await;
        store
            .inject_faults(FaultPlan {
                save_timer: true,
                ..FaultPlan::default()
            })
            .await;

        let outcome = reconcile(&state, &aggregate("March 1 Show", true, Some("abc123")), now).await;

        assert_eq!(outcome, ReconcileOutcome::Updated);
        assert_eq!(store.shows().await[0].state, ShowState::Live);
        assert!(store.timers().await.is_empty());
        let cached = state.latest_show().get().await.unwrap();
        assert_eq!(cached.show.state, ShowState::Live);
    }

    #[tokio::test]
    async fn staying_live_never_starts_a_second_timer() {
        let (state, store, _rx) = state_with_store(AppConfig::default()).await;
        let now = Utc::now();
        store
            .seed_show(seeded("current", "March 1 Show", 3, ShowState::Upcoming, now))
            .await;

        let first = aggregate("March 1 Show", true, Some("abc123"));
        assert_eq!(reconcile(&state, &first, now).await, ReconcileOutcome::Updated);
        let new_video = aggregate("March 1 Show", true, Some("def456"));
        let later = now + Duration::minutes(5);
        assert_eq!(reconcile(&state, &new_video, later).await, ReconcileOutcome::Updated);

        let timers = store.timers().await;
        assert_eq!(timers.len(), 1);
        assert!(timers[0].is_active);
        let live = store.shows().await.remove(0);
        assert_eq!(live.state, ShowState::Live);
        assert_eq!(live.youtube_id.as_deref(), Some("def456"));
    }

    #[tokio::test]
    async fn degraded_mode_drops_snapshots() {
        let config = AppConfig::default();
        let (sender, _receiver) = aggregate_queue(config.ingestion.queue_capacity);
        let state = AppState::new(config, sender, None);

        let outcome = reconcile(&state, &aggregate("March 1 Show", false, None), Utc::now()).await;

        assert_eq!(outcome, ReconcileOutcome::Dropped);
        assert!(state.latest_show().get().await.is_none());
    }

    #[tokio::test]
    async fn consumer_drains_the_queue_until_it_closes() {
        let mut config = AppConfig::default();
        config.ingestion.consumer_pause = StdDuration::from_millis(1);
        let (state, store, _unused) = state_with_store(config).await;
        let (sender, receiver) = aggregate_queue(4);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let consumer = tokio::spawn(run(state.clone(), receiver, shutdown_rx));
        sender
            .send(aggregate("March 1 Show", false, None))
            .await
            .unwrap();
        sender
            .send(aggregate("March 1 Show", false, Some("abc123")))
            .await
            .unwrap();
        drop(sender);
        consumer.await.unwrap();

        let shows = store.shows().await;
        assert_eq!(shows.len(), 1);
        assert_eq!(shows[0].state, ShowState::Upcoming);
        assert_eq!(shows[0].youtube_id.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn consumer_stops_on_shutdown() {
        let (state, _store, _unused) = state_with_store(AppConfig::default()).await;
        let (_sender, receiver) = aggregate_queue(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let consumer = tokio::spawn(run(state, receiver, shutdown_rx));
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(StdDuration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
    }
}
