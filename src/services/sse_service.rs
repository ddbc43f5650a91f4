use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        session::SessionSnapshot,
        sse::{Handshake, ServerEvent},
    },
    error::ServiceError,
    state::SharedState,
};

const EVENT_HANDSHAKE: &str = "handshake";
const EVENT_SNAPSHOT: &str = "sessions.snapshot";

/// A live subscription to one session's change feed.
pub struct Subscription {
    pub session_id: Uuid,
    pub round: Option<u32>,
    pub receiver: broadcast::Receiver<ServerEvent>,
    /// Events replayed before the live feed: handshake, then the current snapshot.
    pub initial: Vec<ServerEvent>,
}

/// Subscribe to a session's change feed, hydrating the session if needed.
///
/// The receiver is created before the snapshot is read so no committed change falls in between.
pub async fn subscribe(
    state: &SharedState,
    session_id: Uuid,
    round: Option<u32>,
) -> Result<Subscription, ServiceError> {
    let handle = state.session(session_id).await?;
    let receiver = handle.hub().subscribe();
    let snapshot = handle.read(|live| SessionSnapshot::from(live)).await;

    let handshake = Handshake {
        session_id,
        round,
        degraded: state.is_degraded().await,
    };

    let mut initial = Vec::with_capacity(2);
    for event in [
        ServerEvent::json(Some(EVENT_HANDSHAKE.to_string()), &handshake),
        ServerEvent::json(Some(EVENT_SNAPSHOT.to_string()), &snapshot),
    ] {
        match event {
            Ok(event) => initial.push(event),
            Err(err) => warn!(%session_id, error = %err, "failed to serialize initial SSE payload"),
        }
    }

    Ok(Subscription {
        session_id,
        round,
        receiver,
        initial,
    })
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

/// Convert a subscription into an SSE response, forwarding events until the client disconnects.
pub fn to_sse_stream(
    subscription: Subscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let Subscription {
        session_id,
        round,
        mut receiver,
        initial,
    } = subscription;

    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // forwarder task: replays the initial events, then relays the broadcast feed
    tokio::spawn(async move {
        for payload in initial {
            if tx.send(Ok(to_event(payload))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if !payload.visible_in(round) {
                                continue;
                            }
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(%session_id, skipped, "SSE subscriber lagged");
                            continue;
                        }
                    }
                }
            }
        }

        info!(%session_id, "session SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
