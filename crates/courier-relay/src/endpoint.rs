//! Per-connection endpoint: upgrade gate, reader, writer and pinger.
//!
//! Each accepted WebSocket is owned by three tasks. The reader applies
//! the liveness deadline, the rate limit and the size cap, then hands
//! decoded frames to the hub. The writer drains the bounded outbound
//! queue with a write deadline. The pinger enqueues a ping each period.
//! All three watch the hub's close signal; flipping it is how the hub
//! kills an endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use tokio::{
    sync::{mpsc, watch},
    time::{timeout, Duration, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use courier_proto::Envelope;

use crate::{
    api::AppState,
    hub::{EndpointHandle, Targeted, Unregister},
    rate_limit::TokenBucket,
};

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Deserialize)]
pub struct MessageParams {
    #[serde(default)]
    id: String,
}

// GET /message?id=<id> with upgrade
pub async fn message_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<MessageParams>,
    State(state): State<AppState>,
) -> Response {
    if params.id.is_empty() {
        return (StatusCode::BAD_REQUEST, "missing id query parameter").into_response();
    }
    if !state.registry.is_claimed(&params.id) {
        return (StatusCode::FORBIDDEN, "id not registered").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, params.id, state))
}

async fn handle_socket(socket: WebSocket, id: String, state: AppState) {
    let conn_id = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
    let (sink, stream) = socket.split();

    let (out_tx, out_rx) = mpsc::channel::<Message>(state.config.outbound_queue_len);
    let (close_tx, close_rx) = watch::channel(false);

    state
        .hub
        .register(EndpointHandle::new(
            id.clone(),
            conn_id,
            out_tx.clone(),
            close_tx,
        ))
        .await;
    info!(%id, conn_id, "endpoint connected");

    let writer = tokio::spawn(write_loop(
        sink,
        out_rx,
        close_rx.clone(),
        state.config.write_timeout(),
    ));
    let pinger = tokio::spawn(ping_loop(
        out_tx.clone(),
        close_rx.clone(),
        state.config.ping_period(),
    ));

    read_loop(stream, &id, &out_tx, close_rx, &state).await;

    // Unregister triggers the close signal, which ends writer and pinger;
    // the writer closes the socket on its way out.
    state
        .hub
        .unregister(Unregister {
            conn_id,
            id: id.clone(),
        })
        .await;
    drop(out_tx);
    let _ = pinger.await;
    let _ = writer.await;
    info!(%id, conn_id, "endpoint disconnected");
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    id: &str,
    out: &mpsc::Sender<Message>,
    mut close: watch::Receiver<bool>,
    state: &AppState,
) {
    let mut bucket = TokenBucket::new(
        state.config.rate_limit.burst,
        state.config.rate_limit.refill_interval(),
    );

    loop {
        let frame = tokio::select! {
            read = timeout(state.config.pong_wait(), stream.next()) => match read {
                Ok(Some(Ok(frame))) => frame,
                Ok(Some(Err(e))) => {
                    debug!(%id, "read error: {e}");
                    return;
                }
                Ok(None) => {
                    debug!(%id, "connection closed by peer");
                    return;
                }
                Err(_) => {
                    warn!(%id, "liveness deadline expired");
                    return;
                }
            },
            changed = close.changed() => {
                if changed.is_err() || *close.borrow() {
                    return;
                }
                continue;
            }
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => return,
            // pings are answered by the transport; pongs and other frames
            // just refreshed the deadline
            _ => continue,
        };

        if text.len() > state.config.max_envelope_bytes {
            warn!(%id, len = text.len(), "dropping oversized frame");
            continue;
        }

        if !bucket.try_consume() {
            debug!(%id, "rate limit exceeded");
            send_error(out, "rate limit exceeded");
            continue;
        }

        let envelope = match Envelope::decode(text.as_bytes()) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(%id, "dropping malformed frame: {e}");
                continue;
            }
        };

        if envelope.recipient.is_empty() {
            debug!(%id, len = text.len(), "broadcast frame");
            state.hub.broadcast(text).await;
        } else if !state.registry.is_claimed(&envelope.recipient) {
            debug!(%id, recipient = %envelope.recipient, "recipient not found");
            send_error(out, "recipient not found");
        } else {
            state
                .hub
                .targeted(Targeted {
                    to: envelope.recipient,
                    from: id.to_string(),
                    msg_id: envelope.msg_id,
                    frame: text,
                })
                .await;
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
    mut close: watch::Receiver<bool>,
    write_timeout: Duration,
) {
    loop {
        tokio::select! {
            maybe = rx.recv() => {
                let Some(msg) = maybe else { break };
                match timeout(write_timeout, sink.send(msg)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!("write error: {e}");
                        break;
                    }
                    Err(_) => {
                        warn!("write deadline exceeded");
                        break;
                    }
                }
            }
            changed = close.changed() => {
                if changed.is_err() || *close.borrow() {
                    break;
                }
            }
        }
    }
    let _ = sink.close().await;
}

async fn ping_loop(
    out: mpsc::Sender<Message>,
    mut close: watch::Receiver<bool>,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // the first tick fires immediately; skip it so pings start one period in
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if out.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            changed = close.changed() => {
                if changed.is_err() || *close.borrow() {
                    break;
                }
            }
        }
    }
}

/// Nonblocking error envelope back to this endpoint's own queue.
fn send_error(out: &mpsc::Sender<Message>, body: &str) {
    match Envelope::error(body).encode() {
        Ok(text) => {
            let _ = out.try_send(Message::Text(text));
        }
        Err(e) => warn!("failed to encode error envelope: {e}"),
    }
}
