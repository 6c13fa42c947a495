use serde::{Deserialize, Serialize};

/// Delivery status of a message, in wire order. The wire labels are the
/// Spanish ones the frontend renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum DeliveryState {
    Enviando,
    Enviado,
    Recibido,
    Leido,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Message {
    pub(crate) id: String,
    #[serde(rename = "texto")]
    pub(crate) text: String,
    #[serde(rename = "autor")]
    pub(crate) author: String,
    #[serde(rename = "hora")]
    pub(crate) time_label: String,
    #[serde(rename = "estado")]
    pub(crate) state: DeliveryState,
}

#[derive(Debug)]
pub(crate) struct Chat {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) messages: Vec<Message>,
}

/// One entry of the `GET /chats` snapshot.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatSnapshot {
    pub(crate) id: u64,
    #[serde(rename = "nombre")]
    pub(crate) name: String,
    #[serde(rename = "ultimoMensaje")]
    pub(crate) last_message: String,
    #[serde(rename = "mensajes")]
    pub(crate) messages: Vec<Message>,
}

/// Authoritative in-memory holder of every chat for the process lifetime.
/// Chats come from the seed list at startup and are never deleted; message
/// lists are append-only. Nothing here is persisted.
pub(crate) struct ChatStore {
    chats: Vec<Chat>,
    message_seq: u64,
}

impl ChatStore {
    pub(crate) fn seeded(seed: &[(u64, &str)]) -> Self {
        Self {
            chats: seed
                .iter()
                .map(|(id, name)| Chat {
                    id: *id,
                    name: (*name).to_string(),
                    messages: Vec::new(),
                })
                .collect(),
            message_seq: 0,
        }
    }

    pub(crate) fn list_chats(&self) -> Vec<ChatSnapshot> {
        self.chats
            .iter()
            .map(|chat| ChatSnapshot {
                id: chat.id,
                name: chat.name.clone(),
                last_message: chat
                    .messages
                    .last()
                    .map(|m| m.text.clone())
                    .unwrap_or_default(),
                messages: chat.messages.clone(),
            })
            .collect()
    }

    pub(crate) fn find_chat(&self, chat_id: u64) -> Option<&Chat> {
        self.chats.iter().find(|chat| chat.id == chat_id)
    }

    /// Appends a new message with state `enviado` and returns a copy of it.
    /// An unknown chat id is a silent no-op; the caller must then suppress
    /// the broadcast as well.
    pub(crate) fn append_message(
        &mut self,
        chat_id: u64,
        text: String,
        author: String,
        time_label: String,
    ) -> Option<Message> {
        self.message_seq += 1;
        let id = format!(
            "{}-{}",
            chrono::Utc::now().timestamp_millis(),
            self.message_seq
        );

        let chat = self.chats.iter_mut().find(|chat| chat.id == chat_id)?;
        chat.messages.push(Message {
            id,
            text,
            author,
            time_label,
            state: DeliveryState::Enviado,
        });

        chat.messages.last().cloned()
    }

    /// Overwrites the delivery state of one message, last write wins. With no
    /// message id, every message in the chat authored by `author` is updated
    /// (the bulk mark-as-read form). Unknown chat or message ids are silent
    /// no-ops.
    pub(crate) fn set_message_state(
        &mut self,
        chat_id: u64,
        message_id: Option<&str>,
        author: &str,
        new_state: DeliveryState,
    ) {
        let Some(chat) = self.chats.iter_mut().find(|chat| chat.id == chat_id) else {
            return;
        };

        match message_id {
            Some(id) => {
                if let Some(message) = chat.messages.iter_mut().find(|m| m.id == id) {
                    message.state = new_state;
                }
            }
            None => {
                for message in chat.messages.iter_mut().filter(|m| m.author == author) {
                    message.state = new_state;
                }
            }
        }
    }
}
