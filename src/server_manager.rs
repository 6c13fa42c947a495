use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use log::{error, info};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message as TkMessage;

use crate::chat_store::ChatStore;
use crate::registry::ConnectionRegistry;
use crate::{protocol, snapshot, StdError};

/// Chats that exist from process start. Everything else about a chat's
/// content lives only as long as the process does.
const SEED_CHATS: &[(u64, &str)] = &[(1, "Ana"), (2, "Beto"), (3, "Carla")];

/// Store and registry share one lock so every frame is applied to
/// completion before the next one, which keeps message order total per chat.
pub(crate) struct ServerState {
    pub(crate) store: ChatStore,
    pub(crate) registry: ConnectionRegistry,
}

pub(crate) type SharedState = Arc<Mutex<ServerState>>;

pub(crate) struct ServerManager {
    state: SharedState,
}

impl ServerManager {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                store: ChatStore::seeded(SEED_CHATS),
                registry: ConnectionRegistry::new(),
            })),
        }
    }

    pub(crate) async fn run(&self) -> Result<(), StdError> {
        let snapshot_state = Arc::clone(&self.state);
        tokio::spawn(async move {
            if let Err(e) = snapshot::serve(snapshot_state).await {
                error!("Snapshot API failed! {e}");
            }
        });

        let addr = ws_addr();
        let listener = TcpListener::bind(&addr).await?;
        info!("Chat server listening on {addr}");

        while let Ok((stream, _)) = listener.accept().await {
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                handle_connection(stream, state).await;
            });
        }

        Ok(())
    }
}

async fn handle_connection(stream: TcpStream, state: SharedState) {
    let mut user_id = None;
    let callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        user_id = user_id_from_query(req.uri().query());
        Ok(response)
    };

    let ws_stream = match accept_hdr_async(stream, callback).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Handshake failed! {e}");
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    let (sender, mut outbound) = mpsc::unbounded_channel::<TkMessage>();
    let conn = state.lock().await.registry.register(user_id, sender);
    info!("Connection {conn} accepted");

    // Drains broadcasts into this connection's socket; the read loop below
    // never writes directly.
    let write_task = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if write.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = read.next().await {
        match msg {
            TkMessage::Text(raw) => {
                let mut guard = state.lock().await;
                let ServerState { store, registry } = &mut *guard;
                protocol::handle_frame(store, registry, conn, &raw);
            }
            TkMessage::Close(_) => break,
            _ => (),
        }
    }

    state.lock().await.registry.unregister(conn);
    write_task.abort();
    info!("Connection {conn} closed");
}

fn ws_addr() -> String {
    std::env::var("UNIMARKET_WS_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string())
}

fn user_id_from_query(query: Option<&str>) -> Option<String> {
    query?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == "userId" && !value.is_empty()).then(|| value.to_string())
    })
}
