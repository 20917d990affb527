//! Real-time chat: who is online, message relay, and the history endpoints.

mod broadcast;
mod events;
mod history;
mod hub;
mod messages;
mod outbox;
mod presence;
mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub use broadcast::{send_to_registered, FullSnapshot, PresenceBroadcast};
pub use events::{AnnounceUser, ClientEvent, MessageDelivered, MessageSentEcho, SendMessage, ServerEvent};
pub use hub::ChatHub;
pub use messages::{ChatMessage, NewMessage};
pub use outbox::{EventReceiver, Outbox};
pub use presence::{ConnectionId, PresenceRegistry, PresenceSnapshot};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::chat_ws))
        .route("/messages", get(history::all_messages))
        .route("/messages/{participant_id}", get(history::participant_messages))
}
