use std::collections::HashMap;

use tokio::sync::mpsc;

use super::{events::ServerEvent, presence::ConnectionId};

pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

/// Outbound queue per open connection. Unbounded: delivery never waits.
#[derive(Debug, Default)]
pub struct Outbox {
    queues: HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>,
}

impl Outbox {
    pub fn open(&mut self) -> (ConnectionId, EventReceiver) {
        let connection = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.queues.insert(connection, tx);
        (connection, rx)
    }

    pub fn close(&mut self, connection: ConnectionId) {
        self.queues.remove(&connection);
    }

    /// Fire-and-forget. `false` if the connection is gone.
    pub fn deliver(&self, connection: ConnectionId, event: ServerEvent) -> bool {
        match self.queues.get(&connection) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}
