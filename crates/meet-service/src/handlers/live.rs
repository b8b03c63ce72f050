//! Live connection endpoint.
//!
//! `GET /api/v1/live?identity=...&displayName=...` upgrades to a WebSocket
//! carrying JSON text frames tagged by `type`. The socket is split: this
//! task reads frames into a `ConnectionActor`, a writer task drains the
//! actor's outbound queue into the socket. Either side closing ends both.

use crate::actors::ConnectionActor;
use crate::broadcast::CONNECTION_OUTBOUND_BUFFER;
use crate::errors::MeetError;
use crate::events::{ClientEvent, ServerEvent};
use crate::identity;
use crate::routes::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

/// Query string for the live endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveQuery {
    pub identity: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Handler for GET /api/v1/live
///
/// The identity is checked before the upgrade; admission to a particular
/// meeting is checked per `join-room`.
///
/// # Response
///
/// - 101 Switching Protocols
/// - 400 `INVALID_IDENTITY`
#[instrument(skip_all, name = "meet.live.upgrade")]
pub async fn live_connection(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LiveQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, MeetError> {
    if !identity::validate(&query.identity) {
        return Err(MeetError::InvalidIdentity);
    }

    let display_name = query
        .display_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| query.identity.clone());

    Ok(ws.on_upgrade(move |socket| serve_connection(socket, state, query.identity, display_name)))
}

#[instrument(skip_all, name = "meet.live.connection", fields(identity = %identity))]
async fn serve_connection(
    socket: WebSocket,
    state: Arc<AppState>,
    identity: String,
    display_name: String,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerEvent>(CONNECTION_OUTBOUND_BUFFER);

    let (handle, actor_task) = ConnectionActor::spawn(
        identity.clone(),
        display_name,
        Arc::clone(&state.registry),
        state.rooms.clone(),
        outbound_tx,
        state.rooms.child_token(),
    );

    let mut writer = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(target: "meet.handlers.live", error = %e, "Failed to encode event");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        tokio::select! {
            // Actor finished (meeting ended, shutdown) and the queue is drained
            _ = &mut writer => break,

            frame = ws_rx.next() => {
                let delivered = match frame {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => handle.send(event).await,
                        Err(e) => handle.send_malformed(format!("Malformed event: {e}")).await,
                    },
                    Some(Ok(Message::Binary(_))) => {
                        handle
                            .send_malformed("Binary frames are not supported".to_string())
                            .await
                    }
                    // Ping/pong are answered by the WebSocket layer
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => Ok(()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(target: "meet.handlers.live", error = %e, "WebSocket read failed");
                        break;
                    }
                };
                if delivered.is_err() {
                    break;
                }
            }
        }
    }

    // Dropping the handle is the actor's signal that the transport is gone
    drop(handle);
    if let Err(e) = actor_task.await {
        warn!(target: "meet.handlers.live", error = ?e, "Connection actor task failed");
    }

    debug!(target: "meet.handlers.live", identity = %identity, "Live connection closed");
}
