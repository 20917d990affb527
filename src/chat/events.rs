use std::collections::BTreeMap;

use serde::{de::IgnoredAny, Deserialize, Serialize};

use super::presence::PresenceSnapshot;

/// Frames a client may send: `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    AnnounceUser(AnnounceUser),
    SendMessage(SendMessage),
    /// `data` is ignored and may be absent, `null` or any value.
    ActiveUsersQuery(Option<IgnoredAny>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnounceUser {
    pub user_id: String,
}

/// Every field is optional on the wire so a missing one can be reported
/// back to the sender instead of dropping the frame.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub sender_id: Option<String>,
    pub receiver_id: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    PresenceSnapshot(PresenceSnapshot),
    MessageDelivered(MessageDelivered),
    MessageSentEcho(MessageSentEcho),
    ActiveUsersResult(BTreeMap<String, String>),
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDelivered {
    pub sender_id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSentEcho {
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
}
