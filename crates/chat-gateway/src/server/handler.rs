//! WebSocket handler: one reader task and one writer task per connection.
//!
//! The reader enforces the 60s read deadline (any message from the client,
//! pong included, refreshes it) and feeds frames to the router. The writer
//! drains the outbound queue with a 10s per-write deadline and pings every
//! 50s. Either pump exiting tears the session down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;

use chat_core::frame::{self, HEADER_LEN, MAX_PAYLOAD_LEN};

use crate::connection::{Session, OUTBOUND_QUEUE_CAPACITY};
use crate::metrics::GatewayMetrics;
use crate::server::GatewayState;

const READ_DEADLINE: Duration = Duration::from_secs(60);
const WRITE_DEADLINE: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(50);

/// Queue depth above which the writer logs a high-water warning.
const QUEUE_HIGH_WATER: usize = 512;

/// WebSocket upgrade at `/ws`.
pub async fn ws_handler(
    State(state): State<GatewayState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let auth_token = params.get("token").cloned();

    ws.max_message_size(MAX_PAYLOAD_LEN as usize + HEADER_LEN)
        .on_upgrade(move |socket| handle_socket(state, socket, auth_token))
}

async fn handle_socket(state: GatewayState, socket: WebSocket, auth_token: Option<String>) {
    let (outbound_tx, outbound_rx) = mpsc::channel::<Bytes>(OUTBOUND_QUEUE_CAPACITY);
    let session = Session::new(outbound_tx, auth_token);

    state.registry().add(session.clone());
    state.metrics().on_connect();

    tracing::info!(
        session_id = %session.id(),
        has_token = session.auth_token().is_some(),
        "Connection established"
    );

    let (ws_sink, ws_stream) = socket.split();

    let mut writer = tokio::spawn(write_pump(
        ws_sink,
        outbound_rx,
        session.clone(),
        state.metrics().clone(),
    ));
    let mut reader = tokio::spawn(read_pump(ws_stream, state.clone(), session.clone()));

    // Whichever pump exits first takes the other one down with it.
    tokio::select! {
        _ = &mut reader => writer.abort(),
        _ = &mut writer => reader.abort(),
    }

    session.begin_close();
    state.registry().remove(session.id());
    session.mark_closed();
    state.metrics().on_disconnect();

    tracing::info!(
        session_id = %session.id(),
        user_id = session.user_id(),
        "Session closed"
    );
}

async fn read_pump(mut stream: SplitStream<WebSocket>, state: GatewayState, session: Arc<Session>) {
    loop {
        let message = match timeout(READ_DEADLINE, stream.next()).await {
            Err(_) => {
                tracing::warn!(session_id = %session.id(), "Read deadline exceeded");
                break;
            }
            Ok(None) => {
                tracing::debug!(session_id = %session.id(), "Stream ended");
                break;
            }
            Ok(Some(Err(e))) => {
                tracing::warn!(session_id = %session.id(), error = %e, "Unexpected close");
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Binary(data) => {
                state.metrics().inc_received();

                let frame = match frame::decode(&data) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(
                            session_id = %session.id(),
                            error = %e,
                            "Frame decode failed, closing session"
                        );
                        state.metrics().inc_decode_errors();
                        break;
                    }
                };

                tracing::trace!(
                    session_id = %session.id(),
                    route = frame.route,
                    seq = frame.sequence,
                    payload_len = frame.payload.len(),
                    "Frame received"
                );

                match state.router().dispatch(&session, &frame).await {
                    Ok(()) => state.metrics().inc_routed(),
                    Err(e) if e.is_fatal() => {
                        tracing::warn!(session_id = %session.id(), error = %e, "Fatal routing error");
                        state.metrics().inc_routing_errors();
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(session_id = %session.id(), error = %e, "Routing error");
                        state.metrics().inc_routing_errors();
                    }
                }
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Keep-alive traffic; receiving it already refreshed the
                // read deadline.
            }
            Message::Close(_) => {
                tracing::debug!(session_id = %session.id(), "Client closed connection");
                break;
            }
            Message::Text(_) => {
                tracing::warn!(session_id = %session.id(), "Text message on binary protocol");
                break;
            }
        }
    }
}

async fn write_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<Bytes>,
    session: Arc<Session>,
    metrics: Arc<GatewayMetrics>,
) {
    let mut ping = tokio::time::interval_at(
        tokio::time::Instant::now() + PING_INTERVAL,
        PING_INTERVAL,
    );

    loop {
        tokio::select! {
            queued = outbound_rx.recv() => {
                let Some(data) = queued else {
                    // Queue closed: session is going away.
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };

                let depth = outbound_rx.len();
                if depth > QUEUE_HIGH_WATER {
                    tracing::warn!(
                        session_id = %session.id(),
                        user_id = session.user_id(),
                        depth = depth,
                        capacity = OUTBOUND_QUEUE_CAPACITY,
                        "Send queue high"
                    );
                }

                match timeout(WRITE_DEADLINE, sink.send(Message::Binary(data))).await {
                    Err(_) => {
                        tracing::warn!(session_id = %session.id(), "Write deadline exceeded");
                        break;
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(session_id = %session.id(), error = %e, "Write error");
                        break;
                    }
                    Ok(Ok(())) => metrics.inc_sent(),
                }
            }
            _ = ping.tick() => {
                match timeout(WRITE_DEADLINE, sink.send(Message::Ping(Bytes::new()))).await {
                    Err(_) | Ok(Err(_)) => {
                        tracing::debug!(session_id = %session.id(), "Ping failed");
                        break;
                    }
                    Ok(Ok(())) => {}
                }
            }
        }
    }

    let _ = sink.close().await;
    tracing::debug!(session_id = %session.id(), "Write pump ended");
}
