//! /ws handler. One control connection per socket.
//!
//! Replies and pushes share the connection's outbox, so the client sees
//! them in the order the hub produced them.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};

use super::ApiState;

pub async fn handle_ws(State(state): State<ApiState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_connection(state, socket))
}

async fn run_connection(state: ApiState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (connection, mut outbox) = state.hub.connect();
    let mut shutdown = state.shutdown_tx.subscribe();
    tracing::info!(connection = %connection.short(), "control connection opened");

    let writer = tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode server message");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let reply = state.hub.handle_text(connection, text.as_str());
                    state.hub.notifier().send(&connection, reply);
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(connection = %connection.short(), error = %e, "socket error");
                    break;
                }
            },
            _ = shutdown.recv() => break,
        }
    }

    // Dropping the outbox sender ends the writer.
    state.hub.disconnect(connection);
    let _ = writer.await;
}
