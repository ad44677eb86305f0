//! Runnable collaboration server.
//!
//! Binds to `0.0.0.0:$PORT` (default 3000). Log level via `RUST_LOG`.

use coderoom::server::{CollabServer, ServerConfig};

#[tokio::main]
async fn main() {
    env_logger::init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(3000);

    let config = ServerConfig {
        bind_addr: format!("0.0.0.0:{port}"),
        ..ServerConfig::default()
    };

    let server = CollabServer::new(config);
    if let Err(e) = server.run().await {
        log::error!("Server error: {e}");
        std::process::exit(1);
    }
}
