use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::Message as TkMessage;

pub(crate) type ConnId = u64;

/// Author id used when a connection gave no `userId` at the handshake.
pub(crate) const DEMO_AUTHOR: &str = "yo";

pub(crate) struct Connection {
    pub(crate) user_id: Option<String>,
    pub(crate) room: Option<u64>,
    pub(crate) sender: UnboundedSender<TkMessage>,
}

/// Tracks every open connection and which room it is currently joined to.
/// Rooms are indexed (room id to connection set) so a broadcast never scans
/// the whole registry.
#[derive(Default)]
pub(crate) struct ConnectionRegistry {
    next_id: ConnId,
    connections: HashMap<ConnId, Connection>,
    rooms: HashMap<u64, HashSet<ConnId>>,
}

impl ConnectionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(
        &mut self,
        user_id: Option<String>,
        sender: UnboundedSender<TkMessage>,
    ) -> ConnId {
        self.next_id += 1;
        let id = self.next_id;
        self.connections.insert(
            id,
            Connection {
                user_id,
                room: None,
                sender,
            },
        );
        id
    }

    /// Joins `conn` to a room, silently leaving the previous one. No
    /// validation that the chat exists; a no-op for unknown connections.
    pub(crate) fn set_room(&mut self, conn: ConnId, chat_id: u64) {
        let previous = match self.connections.get_mut(&conn) {
            Some(connection) => connection.room.replace(chat_id),
            None => return,
        };

        if let Some(previous) = previous {
            self.remove_from_room_index(conn, previous);
        }
        self.rooms.entry(chat_id).or_default().insert(conn);
    }

    /// Removes a connection. Idempotent: unregistering twice leaves the
    /// registry exactly as unregistering once.
    pub(crate) fn unregister(&mut self, conn: ConnId) {
        if let Some(connection) = self.connections.remove(&conn) {
            if let Some(room) = connection.room {
                self.remove_from_room_index(conn, room);
            }
        }
    }

    pub(crate) fn members_of(&self, chat_id: u64) -> impl Iterator<Item = ConnId> + '_ {
        self.rooms
            .get(&chat_id)
            .into_iter()
            .flat_map(|members| members.iter().copied())
    }

    pub(crate) fn get(&self, conn: ConnId) -> Option<&Connection> {
        self.connections.get(&conn)
    }

    /// The author id this connection writes messages under.
    pub(crate) fn author_of(&self, conn: ConnId) -> String {
        self.connections
            .get(&conn)
            .and_then(|c| c.user_id.clone())
            .unwrap_or_else(|| DEMO_AUTHOR.to_string())
    }

    fn remove_from_room_index(&mut self, conn: ConnId, room: u64) {
        if let Some(members) = self.rooms.get_mut(&room) {
            members.remove(&conn);
            if members.is_empty() {
                self.rooms.remove(&room);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(registry: &mut ConnectionRegistry, user_id: Option<&str>) -> ConnId {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        registry.register(user_id.map(str::to_string), tx)
    }

    fn members(registry: &ConnectionRegistry, chat_id: u64) -> Vec<ConnId> {
        let mut ids: Vec<_> = registry.members_of(chat_id).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn join_adds_connection_to_room() {
        let mut registry = ConnectionRegistry::new();
        let a = register(&mut registry, None);
        let b = register(&mut registry, None);

        registry.set_room(a, 1);
        registry.set_room(b, 1);

        assert_eq!(members(&registry, 1), vec![a, b]);
        assert!(members(&registry, 2).is_empty());
    }

    #[test]
    fn rejoin_replaces_previous_room() {
        let mut registry = ConnectionRegistry::new();
        let conn = register(&mut registry, None);

        registry.set_room(conn, 1);
        registry.set_room(conn, 2);

        assert!(members(&registry, 1).is_empty());
        assert_eq!(members(&registry, 2), vec![conn]);
        assert_eq!(registry.get(conn).unwrap().room, Some(2));
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let a = register(&mut registry, None);
        let b = register(&mut registry, None);
        registry.set_room(a, 1);
        registry.set_room(b, 1);

        registry.unregister(a);
        let after_once = members(&registry, 1);
        registry.unregister(a);

        assert_eq!(members(&registry, 1), after_once);
        assert_eq!(after_once, vec![b]);
        assert!(registry.get(a).is_none());
    }

    #[test]
    fn set_room_for_unknown_connection_is_a_no_op() {
        let mut registry = ConnectionRegistry::new();

        registry.set_room(42, 1);

        assert!(members(&registry, 1).is_empty());
    }

    #[test]
    fn author_falls_back_to_demo_id() {
        let mut registry = ConnectionRegistry::new();
        let anonymous = register(&mut registry, None);
        let named = register(&mut registry, Some("u-7"));

        assert_eq!(registry.author_of(anonymous), DEMO_AUTHOR);
        assert_eq!(registry.author_of(named), "u-7");
    }
}
