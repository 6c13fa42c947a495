use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use log::info;
use tokio::net::TcpListener;

use crate::chat_store::ChatSnapshot;
use crate::server_manager::SharedState;
use crate::StdError;

/// Serves the read-only chat listing the frontend loads before opening its
/// WebSocket. One route, no pagination, no auth.
pub(crate) async fn serve(state: SharedState) -> Result<(), StdError> {
    let addr = http_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("Snapshot API listening on {addr}");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn router(state: SharedState) -> Router {
    Router::new()
        .route("/chats", get(list_chats))
        .with_state(state)
}

async fn list_chats(State(state): State<SharedState>) -> Json<Vec<ChatSnapshot>> {
    Json(state.lock().await.store.list_chats())
}

fn http_addr() -> String {
    std::env::var("UNIMARKET_HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
}
