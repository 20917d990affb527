use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use sqlx::SqlitePool;
use tracing::warn;

use crate::AppState;

use super::{events::ClientEvent, hub::ChatHub};

#[debug_handler(state = AppState)]
pub(crate) async fn chat_ws(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Arc<ChatHub>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(async move |socket| serve_socket(socket, hub, db_pool).await)
}

async fn serve_socket(socket: WebSocket, hub: Arc<ChatHub>, db_pool: SqlitePool) {
    let (connection, mut rx) = hub.connect().await;
    let (mut sender, mut receiver) = socket.split();

    let mut outbound = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let inbound = async {
        while let Some(Ok(msg)) = receiver.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => hub.dispatch(&db_pool, connection, event).await,
                Err(err) => warn!(%connection, error = %err, "ignoring malformed frame"),
            }
        }
    };

    tokio::select! {
        _ = inbound => {},
        _ = &mut outbound => {},
    };

    hub.disconnect(connection).await;
    outbound.abort();
}
