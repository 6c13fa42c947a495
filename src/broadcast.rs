use log::debug;
use tokio_tungstenite::tungstenite::Message as TkMessage;

use crate::registry::{ConnId, ConnectionRegistry};

/// Fans one serialized frame out to every connection joined to `chat_id`,
/// except `skip` (the originating connection). Best effort, at most once: a
/// closed recipient is skipped and never aborts delivery to the rest.
pub(crate) fn deliver(
    registry: &ConnectionRegistry,
    chat_id: u64,
    payload: &str,
    skip: Option<ConnId>,
) {
    for member in registry.members_of(chat_id) {
        if Some(member) == skip {
            continue;
        }
        let Some(connection) = registry.get(member) else {
            continue;
        };
        if connection
            .sender
            .send(TkMessage::Text(payload.to_string()))
            .is_err()
        {
            debug!("Dropping frame for closed connection {member}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn join(
        registry: &mut ConnectionRegistry,
        chat_id: u64,
    ) -> (ConnId, UnboundedReceiver<TkMessage>) {
        let (tx, rx) = unbounded_channel();
        let conn = registry.register(None, tx);
        registry.set_room(conn, chat_id);
        (conn, rx)
    }

    #[test]
    fn delivers_to_every_room_member_except_skip() {
        let mut registry = ConnectionRegistry::new();
        let (sender, mut sender_rx) = join(&mut registry, 1);
        let (_, mut peer_rx) = join(&mut registry, 1);
        let (_, mut outsider_rx) = join(&mut registry, 2);

        deliver(&registry, 1, "hola", Some(sender));

        let received = peer_rx.try_recv().unwrap();
        assert_eq!(received, TkMessage::Text("hola".to_string()));
        assert!(peer_rx.try_recv().is_err());
        assert!(sender_rx.try_recv().is_err());
        assert!(outsider_rx.try_recv().is_err());
    }

    #[test]
    fn closed_recipient_does_not_block_the_rest() {
        let mut registry = ConnectionRegistry::new();
        let (_, closed_rx) = join(&mut registry, 1);
        drop(closed_rx);
        let (_, mut live_rx) = join(&mut registry, 1);

        deliver(&registry, 1, "hola", None);

        assert!(live_rx.try_recv().is_ok());
    }

    #[test]
    fn empty_room_is_a_no_op() {
        let registry = ConnectionRegistry::new();

        deliver(&registry, 1, "hola", None);
    }
}
