use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::{dto::sse::ServerEvent, state::SharedState};

/// Which hub a stream is attached to; used for teardown logging.
#[derive(Debug, Clone, Copy)]
pub enum StreamKind {
    Chat,
    Host,
}

impl StreamKind {
    fn as_str(self) -> &'static str {
        match self {
            StreamKind::Chat => "chat",
            StreamKind::Host => "host",
        }
    }
}

/// Subscribe to the viewer chat stream.
pub fn subscribe_chat(state: &SharedState) -> broadcast::Receiver<ServerEvent> {
    state.chat_sse().subscribe()
}

/// Subscribe to the host stream.
pub fn subscribe_host(state: &SharedState) -> broadcast::Receiver<ServerEvent> {
    state.host_sse().subscribe()
}

/// Convert a broadcast receiver into an SSE response, forwarding events until
/// the client disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    kind: StreamKind,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            let mut event = Event::default().data(payload.data);
                            if let Some(name) = payload.event {
                                event = event.event(name);
                            }

                            if tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(stream = kind.as_str(), skipped, "slow SSE subscriber skipped events");
                        }
                    }
                }
            }
        }

        info!(stream = kind.as_str(), "SSE stream disconnected");
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
