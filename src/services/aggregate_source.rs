//! Pulls aggregate snapshots from the public feed and feeds them into the ingestion queue.
//!
//! One HTTP fetch warms the cache, then the live websocket takes over. Without a socket
//! URL the HTTP feed is polled instead.

use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::{sync::watch, time::sleep};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::{
    dto::aggregate::Aggregate,
    state::{AggregateSender, SharedState},
};

const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Failures while fetching one snapshot.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to build HTTP client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to fetch `{url}`")]
    RequestSend {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected status {status} from `{url}`")]
    RequestStatus { url: String, status: StatusCode },
    #[error("failed to decode aggregate from `{url}`")]
    DecodeResponse {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Append the `r=<unix millis>` cache buster to `base`.
pub fn cache_busted_url(base: &str, now_millis: i64) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}r={now_millis}")
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

/// HTTP client for the aggregate feed.
#[derive(Debug, Clone)]
pub struct AggregateSource {
    client: Client,
    url: String,
}

impl AggregateSource {
    pub fn new(url: impl Into<String>) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| SourceError::ClientBuilder { source })?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub async fn fetch(&self) -> Result<Aggregate, SourceError> {
        let url = cache_busted_url(&self.url, Utc::now().timestamp_millis());
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| SourceError::RequestSend {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::RequestStatus { url, status });
        }

        response
            .json::<Aggregate>()
            .await
            .map_err(|source| SourceError::DecodeResponse { url, source })
    }
}

/// Run the source until the queue closes or shutdown is signalled.
pub async fn run(state: SharedState, mut shutdown: watch::Receiver<bool>) {
    let config = &state.config().ingestion;
    let source = match AggregateSource::new(config.source_url.clone()) {
        Ok(source) => source,
        Err(err) => {
            warn!(error = %err, "aggregate source disabled");
            return;
        }
    };
    let sender = state.aggregate_sender().clone();
    let mut backoff = INITIAL_BACKOFF;

    info!(url = %config.source_url, "fetching initial aggregate");
    let first_wait = tokio::select! {
        wait = poll_once(&source, &sender, config.poll_interval, &mut backoff) => wait,
        _ = shutdown_requested(&mut shutdown) => None,
    };

    if let Some(wait) = first_wait {
        match config.socket_url.as_deref() {
            Some(url) => stream_socket(url, &sender, &mut shutdown).await,
            None => {
                info!(url = %config.source_url, "no socket configured; polling aggregate feed");
                poll_forever(&source, &sender, config.poll_interval, wait, backoff, &mut shutdown)
                    .await;
            }
        }
    }
    info!("aggregate source stopped");
}

/// Resolves once shutdown is signalled or the signal sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Sleep for `wait`; returns `true` when shutdown cut the sleep short.
async fn sleep_or_shutdown(wait: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = sleep(wait) => false,
        _ = shutdown_requested(shutdown) => true,
    }
}

async fn poll_forever(
    source: &AggregateSource,
    sender: &AggregateSender,
    interval: Duration,
    mut wait: Duration,
    mut backoff: Duration,
    shutdown: &mut watch::Receiver<bool>,
) {
    loop {
        if sleep_or_shutdown(wait, shutdown).await {
            return;
        }
        let next = tokio::select! {
            next = poll_once(source, sender, interval, &mut backoff) => next,
            _ = shutdown_requested(shutdown) => None,
        };
        match next {
            Some(next) => wait = next,
            None => return,
        }
    }
}

/// Fetch and enqueue one snapshot; returns how long to wait before the next poll,
/// or `None` once the queue is closed.
async fn poll_once(
    source: &AggregateSource,
    sender: &AggregateSender,
    interval: Duration,
    backoff: &mut Duration,
) -> Option<Duration> {
    match source.fetch().await {
        Ok(aggregate) => {
            *backoff = INITIAL_BACKOFF;
            if sender.send(aggregate).await.is_err() {
                warn!("snapshot queue closed; stopping aggregate source");
                return None;
            }
            debug!("queued polled aggregate snapshot");
            Some(interval)
        }
        Err(err) => {
            let wait = *backoff;
            warn!(error = %err, retry_in_ms = wait.as_millis() as u64, "aggregate fetch failed");
            *backoff = next_backoff(wait);
            Some(wait)
        }
    }
}

/// Decode one text frame of the live socket. Keep-alives and non-JSON frames yield `None`.
pub fn parse_socket_message(text: &str) -> Option<Result<Aggregate, serde_json::Error>> {
    let trimmed = text.trim();
    if matches!(trimmed, "ping" | "pong") || !trimmed.starts_with(['{', '[']) {
        return None;
    }
    Some(serde_json::from_str(trimmed))
}

enum SocketEnd {
    Disconnected,
    Stopped,
}

/// Keep the live socket open, reconnecting with backoff, until shutdown or the queue closes.
async fn stream_socket(url: &str, sender: &AggregateSender, shutdown: &mut watch::Receiver<bool>) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        let connected = tokio::select! {
            connected = connect_async(url) => connected,
            _ = shutdown_requested(shutdown) => return,
        };
        let socket = match connected {
            Ok((socket, _response)) => socket,
            Err(err) => {
                let wait = backoff;
                warn!(url, error = %err, retry_in_ms = wait.as_millis() as u64, "aggregate socket connect failed");
                backoff = next_backoff(wait);
                if sleep_or_shutdown(wait, shutdown).await {
                    return;
                }
                continue;
            }
        };
        info!(url, "aggregate socket connected");
        backoff = INITIAL_BACKOFF;

        match forward_frames(socket, sender, shutdown).await {
            SocketEnd::Stopped => return,
            SocketEnd::Disconnected => {
                if sleep_or_shutdown(RECONNECT_DELAY, shutdown).await {
                    return;
                }
            }
        }
    }
}

async fn forward_frames<S>(
    mut socket: S,
    sender: &AggregateSender,
    shutdown: &mut watch::Receiver<bool>,
) -> SocketEnd
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::select! {
            frame = socket.next() => frame,
            _ = shutdown_requested(shutdown) => return SocketEnd::Stopped,
        };
        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => {
                info!("aggregate socket closed");
                return SocketEnd::Disconnected;
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                warn!(error = %err, "aggregate socket read failed");
                return SocketEnd::Disconnected;
            }
        };

        match parse_socket_message(text.as_str()) {
            Some(Ok(aggregate)) => {
                if sender.send(aggregate).await.is_err() {
                    warn!("snapshot queue closed; stopping aggregate source");
                    return SocketEnd::Stopped;
                }
                debug!("queued socket aggregate snapshot");
            }
            Some(Err(err)) => warn!(error = %err, "ignoring undecodable socket message"),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use tokio_tungstenite::tungstenite;

    use super::*;

    #[test]
    fn cache_buster_respects_existing_query() {
        assert_eq!(
            cache_busted_url("https://whenplane.com/api/aggregate?fast=true", 1_700_000_000_000),
            "https://whenplane.com/api/aggregate?fast=true&r=1700000000000"
        );
        assert_eq!(
            cache_busted_url("http://localhost/aggregate", 5),
            "http://localhost/aggregate?r=5"
        );
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let mut delay = INITIAL_BACKOFF;
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(delay.as_secs());
            delay = next_backoff(delay);
        }
        assert_eq!(seen, vec![2, 4, 8, 16, 30, 30]);
    }

    #[tokio::test]
    async fn unreachable_feed_is_reported_and_backs_off() {
        let source = AggregateSource::new("http://127.0.0.1:9/aggregate").unwrap();
        let (sender, mut receiver) = crate::state::aggregate_queue(1);
        let mut backoff = INITIAL_BACKOFF;

        let wait = poll_once(&source, &sender, Duration::from_secs(10), &mut backoff).await;

        assert_eq!(wait, Some(INITIAL_BACKOFF));
        assert_eq!(backoff, Duration::from_secs(4));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn keep_alives_and_noise_are_skipped() {
        assert!(parse_socket_message("ping").is_none());
        assert!(parse_socket_message("pong\n").is_none());
        assert!(parse_socket_message("hello").is_none());
        assert!(matches!(parse_socket_message("{not json"), Some(Err(_))));

        let aggregate = parse_socket_message(
            r#"{"youtube":{"isLive":true,"videoId":"abc123"},"floatplane":{"title":"March 1 Show - WAN Show"}}"#,
        )
        .unwrap()
        .unwrap();
        assert!(aggregate.youtube.is_live);
        assert_eq!(aggregate.floatplane.title, "March 1 Show - WAN Show");
    }

    #[tokio::test]
    async fn socket_frames_are_queued_until_the_peer_closes() {
        let text = |frame: &str| -> Result<Message, tungstenite::Error> {
            Ok(Message::text(frame.to_owned()))
        };
        let frames = stream::iter(vec![
            text("ping"),
            text(r#"{"floatplane":{"title":"First"}}"#),
            text("{broken"),
            Ok(Message::binary(vec![0u8; 4])),
            text(r#"{"floatplane":{"title":"Second"}}"#),
            Err(tungstenite::Error::ConnectionClosed),
            text(r#"{"floatplane":{"title":"Never read"}}"#),
        ]);
        let (sender, mut receiver) = crate::state::aggregate_queue(8);
        let (_shutdown_tx, mut shutdown) = watch::channel(false);

        let end = forward_frames(frames, &sender, &mut shutdown).await;

        assert!(matches!(end, SocketEnd::Disconnected));
        let titles: Vec<_> = std::iter::from_fn(|| receiver.try_recv().ok())
            .map(|aggregate| aggregate.floatplane.title)
            .collect();
        assert_eq!(titles, vec!["First", "Second"]);
    }

    #[tokio::test]
    async fn only_a_true_signal_stops_the_source() {
        let (shutdown_tx, mut shutdown) = watch::channel(false);
        shutdown_tx.send(false).unwrap();
        assert!(!sleep_or_shutdown(Duration::from_millis(20), &mut shutdown).await);

        shutdown_tx.send(true).unwrap();
        assert!(sleep_or_shutdown(Duration::from_secs(60), &mut shutdown).await);

        let (dropped_tx, mut orphaned) = watch::channel(false);
        drop(dropped_tx);
        assert!(sleep_or_shutdown(Duration::from_secs(60), &mut orphaned).await);
    }
}
