use std::collections::BTreeMap;

use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{users, AppError, AppResult};

use super::{
    broadcast::{send_to_registered, FullSnapshot, PresenceBroadcast},
    events::{AnnounceUser, ClientEvent, MessageDelivered, MessageSentEcho, SendMessage, ServerEvent},
    messages::{self, ChatMessage, NewMessage},
    outbox::{EventReceiver, Outbox},
    presence::{ConnectionId, PresenceRegistry, PresenceSnapshot},
};

struct HubState {
    registry: PresenceRegistry,
    outbox: Outbox,
}

/// Presence plus relay. Registry mutations and the broadcast they trigger
/// happen under one lock so nobody sees a snapshot older than its cause.
///
/// Sends hold `send_order` from insert through relay, so pushes reach
/// clients in the same order history returns them.
pub struct ChatHub {
    state: Mutex<HubState>,
    send_order: Mutex<()>,
    broadcast: Box<dyn PresenceBroadcast>,
}

impl Default for ChatHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatHub {
    pub fn new() -> Self {
        Self::with_broadcast(FullSnapshot)
    }

    pub fn with_broadcast(broadcast: impl PresenceBroadcast + 'static) -> Self {
        ChatHub {
            state: Mutex::new(HubState {
                registry: PresenceRegistry::new(),
                outbox: Outbox::default(),
            }),
            send_order: Mutex::new(()),
            broadcast: Box::new(broadcast),
        }
    }

    /// Transport-level connect. Nothing is registered until the client announces itself.
    pub async fn connect(&self) -> (ConnectionId, EventReceiver) {
        let (connection, rx) = self.state.lock().await.outbox.open();
        info!(%connection, "connected");
        (connection, rx)
    }

    pub async fn disconnect(&self, connection: ConnectionId) {
        let mut state = self.state.lock().await;
        let HubState { registry, outbox } = &mut *state;

        let users = registry.unregister(connection);
        outbox.close(connection);
        info!(%connection, ?users, "disconnected");

        self.broadcast.broadcast(registry, outbox);
    }

    pub async fn announce(&self, connection: ConnectionId, user_id: &str) -> AppResult<()> {
        if user_id.trim().is_empty() {
            return Err(AppError::Validation("userId is required".to_owned()));
        }

        let mut state = self.state.lock().await;
        let HubState { registry, outbox } = &mut *state;

        if let Some(stale) = registry.register(user_id, connection) {
            debug!(user_id, %stale, "replacing stale connection");
        }
        info!(%connection, user_id, "user online");

        self.broadcast.broadcast(registry, outbox);
        Ok(())
    }

    /// Persist, then push to the receiver and echo to the sender if either is online.
    /// Nothing is pushed unless the row committed.
    pub async fn send_message(&self, db_pool: &SqlitePool, request: SendMessage) -> AppResult<ChatMessage> {
        let new = NewMessage::try_from(request)?;

        let _order = self.send_order.lock().await;
        let message = messages::insert(db_pool, new).await?;

        let state = self.state.lock().await;
        match state.registry.lookup(&message.receiver_id) {
            Some(connection) => {
                state.outbox.deliver(
                    connection,
                    ServerEvent::MessageDelivered(MessageDelivered {
                        sender_id: message.sender_id.clone(),
                        text: message.text.clone(),
                    }),
                );
                debug!(receiver_id = %message.receiver_id, %connection, "message relayed");
            }
            None => debug!(receiver_id = %message.receiver_id, "receiver offline, message persisted only"),
        }

        if let Some(connection) = state.registry.lookup(&message.sender_id) {
            state.outbox.deliver(
                connection,
                ServerEvent::MessageSentEcho(MessageSentEcho {
                    sender_id: message.sender_id.clone(),
                    receiver_id: message.receiver_id.clone(),
                    text: message.text.clone(),
                }),
            );
        }

        Ok(message)
    }

    /// Resolves online users to usernames and pushes the result to everyone registered.
    /// Users the store does not know are left out, as are users who went
    /// offline while the names were being looked up.
    pub async fn active_users(&self, db_pool: &SqlitePool) -> AppResult<BTreeMap<String, String>> {
        let user_ids = self.state.lock().await.registry.user_ids();
        let mut names = users::display_names(db_pool, &user_ids).await?;

        let state = self.state.lock().await;
        names.retain(|user_id, _| state.registry.lookup(user_id).is_some());
        send_to_registered(
            &state.registry,
            &state.outbox,
            ServerEvent::ActiveUsersResult(names.clone()),
        );

        Ok(names)
    }

    pub async fn snapshot(&self) -> PresenceSnapshot {
        self.state.lock().await.registry.snapshot()
    }

    pub async fn lookup(&self, user_id: &str) -> Option<ConnectionId> {
        self.state.lock().await.registry.lookup(user_id)
    }

    /// Handles one client frame. Failures go back to the calling connection only.
    pub async fn dispatch(&self, db_pool: &SqlitePool, connection: ConnectionId, event: ClientEvent) {
        let result = match event {
            ClientEvent::AnnounceUser(AnnounceUser { user_id }) => self.announce(connection, &user_id).await,
            ClientEvent::SendMessage(request) => self.send_message(db_pool, request).await.map(|_| ()),
            ClientEvent::ActiveUsersQuery(_) => self.active_users(db_pool).await.map(|_| ()),
        };

        if let Err(err) = result {
            warn!(%connection, error = %err, "chat event failed");
            self.state.lock().await.outbox.deliver(
                connection,
                ServerEvent::Error {
                    message: err.public_message(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::{self, seed_user};
    use pretty_assertions::assert_eq;

    fn send(sender: &str, receiver: &str, text: &str) -> SendMessage {
        SendMessage {
            sender_id: Some(sender.into()),
            receiver_id: Some(receiver.into()),
            text: Some(text.into()),
        }
    }

    fn drain(rx: &mut EventReceiver) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    async fn seeded() -> SqlitePool {
        let db_pool = db::memory_pool().await.unwrap();
        seed_user(&db_pool, "u1", "ada").await;
        seed_user(&db_pool, "u2", "bob").await;
        db_pool
    }

    #[tokio::test]
    async fn announce_broadcasts_full_snapshot() {
        let hub = ChatHub::new();
        let (c1, mut rx1) = hub.connect().await;
        let (c2, mut rx2) = hub.connect().await;

        hub.announce(c1, "u1").await.unwrap();
        assert_eq!(
            drain(&mut rx1),
            vec![ServerEvent::PresenceSnapshot(PresenceSnapshot::from([("u1".into(), c1)]))]
        );
        assert!(drain(&mut rx2).is_empty());

        hub.announce(c2, "u2").await.unwrap();
        let expected = ServerEvent::PresenceSnapshot(PresenceSnapshot::from([
            ("u1".into(), c1),
            ("u2".into(), c2),
        ]));
        assert_eq!(drain(&mut rx1), vec![expected.clone()]);
        assert_eq!(drain(&mut rx2), vec![expected]);
    }

    #[tokio::test]
    async fn disconnect_then_reannounce_leaves_one_entry() {
        let hub = ChatHub::new();
        let (c1, mut rx1) = hub.connect().await;
        let (c2, _rx2) = hub.connect().await;
        let (c3, mut rx3) = hub.connect().await;
        hub.announce(c1, "u1").await.unwrap();
        hub.announce(c2, "u2").await.unwrap();
        drain(&mut rx1);

        hub.disconnect(c2).await;
        assert_eq!(
            drain(&mut rx1),
            vec![ServerEvent::PresenceSnapshot(PresenceSnapshot::from([("u1".into(), c1)]))]
        );

        hub.announce(c3, "u2").await.unwrap();
        let expected = PresenceSnapshot::from([("u1".into(), c1), ("u2".into(), c3)]);
        assert_eq!(hub.snapshot().await, expected);
        assert_eq!(drain(&mut rx3), vec![ServerEvent::PresenceSnapshot(expected)]);
    }

    #[tokio::test]
    async fn reconnect_without_disconnect_replaces_stale_connection() {
        let hub = ChatHub::new();
        let (stale, _rx) = hub.connect().await;
        let (fresh, _rx2) = hub.connect().await;

        hub.announce(stale, "u2").await.unwrap();
        hub.announce(fresh, "u2").await.unwrap();

        assert_eq!(hub.lookup("u2").await, Some(fresh));
        assert_eq!(hub.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn online_receiver_gets_pushed() {
        let db_pool = seeded().await;
        let hub = ChatHub::new();
        let (c2, mut rx2) = hub.connect().await;
        hub.announce(c2, "u2").await.unwrap();
        drain(&mut rx2);

        let message = hub.send_message(&db_pool, send("u1", "u2", "hi")).await.unwrap();
        assert_eq!((message.sender_id.as_str(), message.receiver_id.as_str()), ("u1", "u2"));

        assert_eq!(
            drain(&mut rx2),
            vec![ServerEvent::MessageDelivered(MessageDelivered {
                sender_id: "u1".into(),
                text: "hi".into(),
            })]
        );

        let stored = messages::all(&db_pool).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, message.id);
        assert_eq!(stored[0].text, "hi");
    }

    #[tokio::test]
    async fn offline_receiver_still_persisted() {
        let db_pool = seeded().await;
        let hub = ChatHub::new();

        hub.send_message(&db_pool, send("u1", "u2", "later")).await.unwrap();

        let history = messages::for_participant(&db_pool, "u2").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "later");
    }

    #[tokio::test]
    async fn online_sender_gets_echo() {
        let db_pool = seeded().await;
        let hub = ChatHub::new();
        let (c1, mut rx1) = hub.connect().await;
        hub.announce(c1, "u1").await.unwrap();
        drain(&mut rx1);

        hub.send_message(&db_pool, send("u1", "u2", "hello")).await.unwrap();

        assert_eq!(
            drain(&mut rx1),
            vec![ServerEvent::MessageSentEcho(MessageSentEcho {
                sender_id: "u1".into(),
                receiver_id: "u2".into(),
                text: "hello".into(),
            })]
        );
    }

    #[tokio::test]
    async fn failed_commit_pushes_nothing() {
        let db_pool = seeded().await;
        let hub = ChatHub::new();
        let (c1, mut rx1) = hub.connect().await;
        let (ghost, mut ghost_rx) = hub.connect().await;
        hub.announce(c1, "u1").await.unwrap();
        hub.announce(ghost, "ghost").await.unwrap();
        drain(&mut rx1);
        drain(&mut ghost_rx);

        let err = hub.send_message(&db_pool, send("u1", "ghost", "boo")).await.unwrap_err();

        assert!(matches!(err, AppError::Persistence(_)));
        assert!(drain(&mut rx1).is_empty());
        assert!(drain(&mut ghost_rx).is_empty());
        assert!(messages::all(&db_pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_frame_reports_to_caller_only() {
        let db_pool = seeded().await;
        let hub = ChatHub::new();
        let (c1, mut rx1) = hub.connect().await;
        let (c2, mut rx2) = hub.connect().await;
        hub.announce(c1, "u1").await.unwrap();
        hub.announce(c2, "u2").await.unwrap();
        drain(&mut rx1);
        drain(&mut rx2);

        let request = SendMessage {
            sender_id: Some("u1".into()),
            receiver_id: Some("u2".into()),
            text: None,
        };
        hub.dispatch(&db_pool, c1, ClientEvent::SendMessage(request)).await;

        assert_eq!(
            drain(&mut rx1),
            vec![ServerEvent::Error { message: "text is required".into() }]
        );
        assert!(drain(&mut rx2).is_empty());
        assert!(messages::all(&db_pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn active_users_resolved_and_broadcast() {
        let db_pool = seeded().await;
        let hub = ChatHub::new();
        let (c1, mut rx1) = hub.connect().await;
        let (c2, mut rx2) = hub.connect().await;
        let (c3, mut rx3) = hub.connect().await;
        hub.announce(c1, "u1").await.unwrap();
        hub.announce(c2, "u2").await.unwrap();
        hub.announce(c3, "stranger").await.unwrap();
        for rx in [&mut rx1, &mut rx2, &mut rx3] {
            drain(rx);
        }

        hub.dispatch(&db_pool, c1, ClientEvent::ActiveUsersQuery(None)).await;

        let expected = BTreeMap::from([("u1".to_owned(), "ada".to_owned()), ("u2".to_owned(), "bob".to_owned())]);
        for rx in [&mut rx1, &mut rx2, &mut rx3] {
            assert_eq!(drain(rx), vec![ServerEvent::ActiveUsersResult(expected.clone())]);
        }
    }

    #[tokio::test]
    async fn active_users_drops_users_gone_during_lookup() {
        let db_pool = seeded().await;
        let hub = Arc::new(ChatHub::new());
        let (c1, mut rx1) = hub.connect().await;
        let (c2, _rx2) = hub.connect().await;
        hub.announce(c1, "u1").await.unwrap();
        hub.announce(c2, "u2").await.unwrap();
        drain(&mut rx1);

        // park the name lookup on the only pooled connection
        let held = db_pool.acquire().await.unwrap();
        let query = tokio::spawn({
            let hub = hub.clone();
            let db_pool = db_pool.clone();
            async move { hub.active_users(&db_pool).await }
        });
        tokio::task::yield_now().await;

        hub.disconnect(c2).await;
        drop(held);

        let names = query.await.unwrap().unwrap();
        let expected = BTreeMap::from([("u1".to_owned(), "ada".to_owned())]);
        assert_eq!(names, expected);
        assert_eq!(drain(&mut rx1).pop(), Some(ServerEvent::ActiveUsersResult(expected)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sends_push_in_commit_order() {
        let db_pool = db::memory_pool().await.unwrap();
        for (id, name) in [("u1", "ada"), ("u2", "bob"), ("u3", "cyd")] {
            seed_user(&db_pool, id, name).await;
        }
        let hub = Arc::new(ChatHub::new());
        let (c2, mut rx2) = hub.connect().await;
        hub.announce(c2, "u2").await.unwrap();
        drain(&mut rx2);

        let sends: Vec<_> = (0..16)
            .map(|i| {
                let hub = hub.clone();
                let db_pool = db_pool.clone();
                let sender = if i % 2 == 0 { "u1" } else { "u3" };
                tokio::spawn(async move { hub.send_message(&db_pool, send(sender, "u2", &format!("m{i}"))).await })
            })
            .collect();
        for send in sends {
            send.await.unwrap().unwrap();
        }

        let pushed: Vec<String> = drain(&mut rx2)
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::MessageDelivered(MessageDelivered { text, .. }) => Some(text),
                _ => None,
            })
            .collect();
        let committed: Vec<String> = messages::for_participant(&db_pool, "u2")
            .await
            .unwrap()
            .into_iter()
            .map(|message| message.text)
            .collect();
        assert_eq!(pushed.len(), 16);
        assert_eq!(pushed, committed);
    }

    #[tokio::test]
    async fn empty_user_id_is_rejected() {
        let hub = ChatHub::new();
        let (c1, _rx) = hub.connect().await;

        assert!(matches!(hub.announce(c1, " ").await, Err(AppError::Validation(_))));
        assert!(hub.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn broadcast_strategy_is_swappable() {
        struct Silent;
        impl PresenceBroadcast for Silent {
            fn broadcast(&self, _: &PresenceRegistry, _: &Outbox) {}
        }

        let hub = ChatHub::with_broadcast(Silent);
        let (c1, mut rx1) = hub.connect().await;
        hub.announce(c1, "u1").await.unwrap();

        assert!(drain(&mut rx1).is_empty());
        assert_eq!(hub.lookup("u1").await, Some(c1));
    }
}
