use chrono::Local;
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::broadcast;
use crate::chat_store::{ChatStore, DeliveryState, Message};
use crate::registry::{ConnId, ConnectionRegistry};

/// Frames a client may send. The `tipo` field tags the variant; anything
/// else fails decoding and is dropped.
#[derive(Debug, Deserialize)]
#[serde(tag = "tipo", rename_all = "lowercase")]
pub(crate) enum ClientFrame {
    Join {
        #[serde(rename = "chatId")]
        chat_id: u64,
    },
    Mensaje {
        #[serde(rename = "chatId")]
        chat_id: u64,
        #[serde(rename = "texto")]
        text: String,
    },
    Estado {
        #[serde(rename = "chatId")]
        chat_id: u64,
        #[serde(rename = "mensajeId")]
        message_id: Option<String>,
        estado: DeliveryState,
    },
}

/// Frames the server broadcasts to a room.
#[derive(Debug, Serialize)]
#[serde(tag = "tipo", rename_all = "lowercase")]
pub(crate) enum ServerFrame {
    Mensaje {
        #[serde(rename = "chatId")]
        chat_id: u64,
        #[serde(rename = "mensaje")]
        message: Message,
    },
    Estado {
        #[serde(rename = "chatId")]
        chat_id: u64,
        #[serde(rename = "mensajeId", skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        estado: DeliveryState,
    },
}

#[derive(Debug, Error)]
pub(crate) enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub(crate) fn decode_frame(raw: &str) -> Result<ClientFrame, FrameError> {
    Ok(serde_json::from_str(raw)?)
}

/// Processes one inbound text frame from `conn`. A frame that fails to
/// decode is logged and dropped; the connection stays open.
pub(crate) fn handle_frame(
    store: &mut ChatStore,
    registry: &mut ConnectionRegistry,
    conn: ConnId,
    raw: &str,
) {
    let frame = match decode_frame(raw) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Dropping frame from connection {conn}: {e}");
            return;
        }
    };

    match frame {
        ClientFrame::Join { chat_id } => {
            debug!("Connection {conn} joined room {chat_id}");
            registry.set_room(conn, chat_id);
        }
        ClientFrame::Mensaje { chat_id, text } => on_message(store, registry, conn, chat_id, text),
        ClientFrame::Estado {
            chat_id,
            message_id,
            estado,
        } => on_status(store, registry, conn, chat_id, message_id, estado),
    }
}

/// Stores the message as `enviado` and rebroadcasts it to the rest of the
/// room as `recibido`. The coercion is the protocol's only acknowledgement:
/// the sender keeps its local "sent" view, everyone else renders "received".
fn on_message(
    store: &mut ChatStore,
    registry: &mut ConnectionRegistry,
    conn: ConnId,
    chat_id: u64,
    text: String,
) {
    let author = registry.author_of(conn);
    let time_label = Local::now().format("%H:%M").to_string();

    let Some(stored) = store.append_message(chat_id, text, author, time_label) else {
        debug!("Message for unknown chat {chat_id} ignored");
        return;
    };

    let message = Message {
        state: DeliveryState::Recibido,
        ..stored
    };
    send_to_room(registry, chat_id, ServerFrame::Mensaje { chat_id, message }, conn);
}

fn on_status(
    store: &mut ChatStore,
    registry: &mut ConnectionRegistry,
    conn: ConnId,
    chat_id: u64,
    message_id: Option<String>,
    estado: DeliveryState,
) {
    if store.find_chat(chat_id).is_none() {
        debug!("Status update for unknown chat {chat_id} ignored");
        return;
    }

    let author = registry.author_of(conn);
    store.set_message_state(chat_id, message_id.as_deref(), &author, estado);

    send_to_room(
        registry,
        chat_id,
        ServerFrame::Estado {
            chat_id,
            message_id,
            estado,
        },
        conn,
    );
}

fn send_to_room(registry: &ConnectionRegistry, chat_id: u64, frame: ServerFrame, from: ConnId) {
    match serde_json::to_string(&frame) {
        Ok(payload) => broadcast::deliver(registry, chat_id, &payload, Some(from)),
        Err(e) => error!("Failed to encode outbound frame: {e}"),
    }
}
