//! Real-time audit event push over WebSocket.
//!
//! Subscribers on `/audit/events/ws` receive every committed audit row as an
//! `AuditEventDto` JSON payload. Delivery is best-effort: a slow client that
//! falls behind the broadcast buffer loses the oldest events and recovers
//! them through the catch-up endpoint.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use crate::dto::AuditEventDto;
use crate::handlers::holder_name;
use crate::server::AppState;

pub async fn audit_events_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| stream_events(socket, state))
}

async fn stream_events(socket: WebSocket, state: AppState) {
    let mut receiver = state.broadcaster.subscribe();
    let (mut sink, mut inbound) = socket.split();
    tracing::debug!("audit websocket subscriber connected");

    loop {
        tokio::select! {
            event = receiver.recv() => match event {
                Ok(event) => {
                    let actor_name = holder_name(&state, &event.actor_id).await;
                    let dto = AuditEventDto::from_event(&event, actor_name.as_deref());
                    let payload = match serde_json::to_string(&dto) {
                        Ok(payload) => payload,
                        Err(error) => {
                            tracing::warn!(error = %error, "failed to serialize audit event for push");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "websocket subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = inbound.next() => match message {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::debug!("audit websocket subscriber disconnected");
}
