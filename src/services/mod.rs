/// Feed snapshot consumer reconciling the persisted show.
pub mod aggregate_consumer;
/// HTTP poller producing feed snapshots.
pub mod aggregate_source;
/// OpenAPI documentation generation.
pub mod documentation;
/// Order-independent hashing of show projections.
pub mod fingerprint;
/// Health check service.
pub mod health_service;
/// Feed snapshot to show projection.
pub mod normalizer;
/// Transactional creation of a show and its tile pool.
pub mod show_creator;
/// Read endpoints and snapshot pushes.
pub mod show_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events streaming.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Show timers and the expiry sweep.
pub mod timer_service;
/// Title comparison deciding between update and new show.
pub mod title_heuristic;
