use std::{
    collections::{BTreeMap, HashMap},
    fmt,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque handle for one live socket. Distinct from the user it speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type PresenceSnapshot = BTreeMap<String, ConnectionId>;

/// Which users currently hold an open connection.
///
/// One connection per user, last registration wins. A connection speaks for
/// at most one user, so registering it under a new user drops the old entry.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    users: HashMap<String, ConnectionId>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the connection this user was previously registered with, if any.
    pub fn register(&mut self, user_id: &str, connection: ConnectionId) -> Option<ConnectionId> {
        self.users
            .retain(|user, registered| *registered != connection || user == user_id);
        self.users
            .insert(user_id.to_owned(), connection)
            .filter(|previous| *previous != connection)
    }

    /// Removes every user registered under `connection` and returns them.
    pub fn unregister(&mut self, connection: ConnectionId) -> Vec<String> {
        let mut removed = Vec::new();
        self.users.retain(|user, registered| {
            if *registered == connection {
                removed.push(user.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn lookup(&self, user_id: &str) -> Option<ConnectionId> {
        self.users.get(user_id).copied()
    }

    pub fn snapshot(&self) -> PresenceSnapshot {
        self.users
            .iter()
            .map(|(user, connection)| (user.clone(), *connection))
            .collect()
    }

    pub fn user_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.users.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.users.values().copied()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
