//! WebSocket connection lifecycle.
//!
//! Auth and rate limiting happen before the upgrade; a rejected handshake
//! never becomes a socket. After accept, one task owns the connection:
//! inbound frames are handled sequentially (preserving per-connection
//! order), while room subscriptions are forwarded into the same task
//! through an mpsc so the socket has a single writer.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use telemetry::metrics;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use auth_client::{extract_bearer_token, Identity};
use backplane::{user_topic, TOPIC_ANALYTICS};
use tracker_core::error::{AuthErrorCode, ValidationErrorCode};
use tracker_core::limits::{MAX_MESSAGE_SIZE_BYTES, MAX_USER_AGENT_LEN};
use tracker_core::{Error, Session};

use crate::handlers::{normalize, ConnectionContext};
use crate::protocol::{ClientEnvelope, ClientMessage, ServerMessage};
use crate::state::GatewayState;

/// Buffered fan-out messages per connection before backpressure.
const OUTBOUND_BUFFER: usize = 256;

fn reject(error: &Error) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(json!({
            "success": false,
            "error": error.to_string(),
            "code": error.error_code(),
        })),
    )
        .into_response()
}

/// `GET /ws` upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if user_agent.len() > MAX_USER_AGENT_LEN {
        user_agent = user_agent.chars().take(MAX_USER_AGENT_LEN).collect();
    }
    let ip = addr.ip().to_string();

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let token = match extract_bearer_token(auth_header, params.get("token").map(String::as_str)) {
        Ok(token) => token,
        Err(e) => {
            metrics().connections_rejected_auth.inc();
            return reject(&e);
        }
    };

    let identity = match token {
        Some(token) => match state.auth.validate(&token).await {
            Ok(identity) => identity,
            Err(e) => {
                metrics().connections_rejected_auth.inc();
                warn!(ip = %ip, error = %e, "Rejected connection: invalid credential");
                return reject(&e);
            }
        },
        None if state.config.permissive => Identity::Anonymous,
        None => {
            metrics().connections_rejected_auth.inc();
            return reject(&Error::auth(
                AuthErrorCode::MissingToken,
                "Credential is required",
            ));
        }
    };

    if let Err(e) = state.limiter.try_acquire(identity.rate_limit_key()) {
        metrics().connections_rejected_rate.inc();
        warn!(ip = %ip, identity = %identity.rate_limit_key(), "Rejected connection: rate limit");
        return reject(&e);
    }

    metrics().connections_accepted.inc();
    ws.on_upgrade(move |socket| run_connection(socket, state, identity, user_agent, ip))
}

/// Forward one backplane subscription into the connection's outbound
/// queue. Aborted when the room is left or the connection closes.
fn spawn_forwarder(
    mut rx: broadcast::Receiver<serde_json::Value>,
    out_tx: mpsc::Sender<serde_json::Value>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(value) => {
                    if out_tx.send(value).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    metrics().broadcast_lagged.inc_by(n);
                    debug!(skipped = n, "Subscriber lagged behind fan-out");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn run_connection(
    socket: WebSocket,
    state: Arc<GatewayState>,
    identity: Identity,
    user_agent: String,
    ip: String,
) {
    let geo = state.geo.resolve(&ip).await;
    let user_id = identity.user_id().map(str::to_string);

    let mut session = Session::new(user_id.clone(), &user_agent, &ip);
    let ctx = ConnectionContext::new(session.id, user_id.clone(), &user_agent, geo);

    info!(
        session_id = %session.id,
        user_id = ?user_id,
        device = %ctx.device.as_str(),
        "Connection accepted"
    );

    state.sessions.put(session.clone());
    if let Err(e) = state.store.upsert_session(&session).await {
        warn!(session_id = %session.id, error = %e, "Failed to persist new session");
    }
    metrics().active_connections.inc();
    metrics().active_sessions.set(state.sessions.active_count());

    let identity_topic = user_topic(identity.rate_limit_key());
    let (out_tx, mut out_rx) = mpsc::channel::<serde_json::Value>(OUTBOUND_BUFFER);

    // Every connection listens on its own identity topic; other rooms are
    // joined explicitly.
    let mut rooms: HashMap<String, JoinHandle<()>> = HashMap::new();
    rooms.insert(
        identity_topic.clone(),
        spawn_forwarder(state.backplane.subscribe(&identity_topic), out_tx.clone()),
    );

    let connected = ServerMessage::UserConnected {
        user_id: user_id.clone(),
        session_id: session.id,
        timestamp: Utc::now(),
    }
    .to_value();
    let _ = state
        .backplane
        .publish(&identity_topic, connected.clone())
        .await;
    let _ = state.backplane.publish(TOPIC_ANALYTICS, connected).await;

    let (mut socket_tx, mut socket_rx) = socket.split();

    loop {
        tokio::select! {
            inbound = socket_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let replies = handle_frame(
                            &state,
                            &ctx,
                            &mut session,
                            &identity_topic,
                            &mut rooms,
                            &out_tx,
                            &text,
                        )
                        .await;
                        let mut closed = false;
                        for reply in replies {
                            if let Ok(json) = serde_json::to_string(&reply) {
                                if socket_tx.send(Message::Text(json)).await.is_err() {
                                    closed = true;
                                    break;
                                }
                            }
                        }
                        if closed {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            broadcasted = out_rx.recv() => {
                // Senders are held by this task's forwarders, so the
                // channel only closes when the connection winds down.
                let Some(value) = broadcasted else { break };
                if let Ok(json) = serde_json::to_string(&value) {
                    if socket_tx.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    for (_, handle) in rooms.drain() {
        handle.abort();
    }

    session.close();
    state.sessions.remove(session.id);
    if let Err(e) = state.store.upsert_session(&session).await {
        warn!(session_id = %session.id, error = %e, "Failed to persist closed session");
    }
    metrics().active_connections.dec();
    metrics().active_sessions.set(state.sessions.active_count());

    let disconnected = ServerMessage::UserDisconnected {
        user_id: user_id.clone(),
        session_id: session.id,
        timestamp: Utc::now(),
    }
    .to_value();
    let _ = state
        .backplane
        .publish(&identity_topic, disconnected.clone())
        .await;
    let _ = state.backplane.publish(TOPIC_ANALYTICS, disconnected).await;

    info!(
        session_id = %session.id,
        interactions = session.interactions,
        duration_ms = ?session.duration_ms,
        "Connection closed"
    );
}

/// Handle one inbound frame, returning the messages to write back.
/// Any failure here fails only this frame's ack.
async fn handle_frame(
    state: &Arc<GatewayState>,
    ctx: &ConnectionContext,
    session: &mut Session,
    identity_topic: &str,
    rooms: &mut HashMap<String, JoinHandle<()>>,
    out_tx: &mpsc::Sender<serde_json::Value>,
    text: &str,
) -> Vec<ServerMessage> {
    if text.len() > MAX_MESSAGE_SIZE_BYTES {
        metrics().events_failed_validation.inc();
        return vec![ServerMessage::ack_failure(
            None,
            &Error::validation_code(
                ValidationErrorCode::PayloadTooLarge,
                format!("Message exceeds {} bytes", MAX_MESSAGE_SIZE_BYTES),
            ),
        )];
    }

    let envelope: ClientEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            metrics().events_failed_validation.inc();
            return vec![ServerMessage::ack_failure(
                None,
                &Error::validation_code(
                    ValidationErrorCode::InvalidFormat,
                    format!("Malformed message: {}", e),
                ),
            )];
        }
    };
    let id = envelope.id.clone();

    match envelope.message {
        ClientMessage::Join(room) => {
            if !rooms.contains_key(&room.room) {
                rooms.insert(
                    room.room.clone(),
                    spawn_forwarder(state.backplane.subscribe(&room.room), out_tx.clone()),
                );
                debug!(session_id = %session.id, room = %room.room, "Joined room");
            }
            vec![ServerMessage::ack_ok(id)]
        }
        ClientMessage::Leave(room) => {
            // The identity topic is not a room; it cannot be left.
            if room.room != identity_topic {
                if let Some(handle) = rooms.remove(&room.room) {
                    handle.abort();
                    debug!(session_id = %session.id, room = %room.room, "Left room");
                }
            }
            vec![ServerMessage::ack_ok(id)]
        }
        message => {
            let Some(payload) = message.into_payload() else {
                return vec![ServerMessage::ack_ok(id)];
            };
            metrics().events_received.inc();
            let start = std::time::Instant::now();

            let event = match normalize(ctx, payload, envelope.timestamp) {
                Ok(event) => event,
                Err(e) => {
                    metrics().events_failed_validation.inc();
                    return vec![ServerMessage::ack_failure(id, &e)];
                }
            };

            // Acknowledged means persisted: a store failure fails the ack.
            if let Err(e) = state.store.record_event(&event).await {
                error!(
                    session_id = %session.id,
                    event_type = %event.kind().as_str(),
                    error = %e,
                    "Failed to persist event"
                );
                return vec![ServerMessage::ack_failure(id, &e)];
            }

            session.record_event(event.kind());
            state.sessions.put(session.clone());
            if let Err(e) = state.store.upsert_session(session).await {
                warn!(session_id = %session.id, error = %e, "Failed to persist session counters");
            }

            let data = serde_json::to_value(&event.payload).unwrap_or_default();
            let behavior = ServerMessage::Behavior {
                event_type: event.kind().as_str().to_string(),
                data: data.clone(),
                timestamp: event.received_at,
            };
            let update = ServerMessage::AnalyticsUpdate {
                event_type: event.kind().as_str().to_string(),
                event_data: data,
                timestamp: event.received_at,
            };
            let _ = state
                .backplane
                .publish(identity_topic, behavior.to_value())
                .await;
            let _ = state
                .backplane
                .publish(TOPIC_ANALYTICS, update.to_value())
                .await;

            metrics()
                .handler_latency_ms
                .observe(start.elapsed().as_millis() as u64);

            vec![
                ServerMessage::ack_success(id, event.id),
                ServerMessage::Acknowledged { event_id: event.id },
            ]
        }
    }
}
