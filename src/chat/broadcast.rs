use super::{events::ServerEvent, outbox::Outbox, presence::PresenceRegistry};

/// How presence changes reach connected clients.
pub trait PresenceBroadcast: Send + Sync {
    fn broadcast(&self, registry: &PresenceRegistry, outbox: &Outbox);
}

/// Sends the whole presence map to every registered connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct FullSnapshot;

impl PresenceBroadcast for FullSnapshot {
    fn broadcast(&self, registry: &PresenceRegistry, outbox: &Outbox) {
        let snapshot = registry.snapshot();
        send_to_registered(registry, outbox, ServerEvent::PresenceSnapshot(snapshot));
    }
}

/// Returns how many connections accepted the event.
pub fn send_to_registered(registry: &PresenceRegistry, outbox: &Outbox, event: ServerEvent) -> usize {
    registry
        .connections()
        .filter(|connection| outbox.deliver(*connection, event.clone()))
        .count()
}
