use server_manager::ServerManager;

mod broadcast;
mod chat_store;
mod protocol;
mod registry;
mod server_manager;
mod snapshot;

pub(crate) type StdError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), StdError> {
    if cfg!(debug_assertions) && std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    let manager = ServerManager::new();
    manager.run().await?;

    Ok(())
}
