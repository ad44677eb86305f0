//! WebSocket sync server with room-based routing.
//!
//! Architecture:
//! ```text
//! Client A ──┐
//!             ├── Room (room id) ── ProjectTree + active path
//! Client B ──┘                        │
//!                                     ├── MembershipRegistry
//!                                     │
//!                                     └── BroadcastGroup
//!                          ┌──────────┼───────────┐
//!                          ▼          ▼           ▼
//!                       Client A   Client B    Client C
//! ```
//!
//! One task per connection. Each task multiplexes its WebSocket stream and
//! its room broadcast receiver; frames tagged with the task's own
//! connection id are skipped, which is how an editing client avoids
//! receiving its own echo.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

use crate::broadcast::Frame;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::room::{ActivePathPolicy, RoomCoordinator};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Broadcast channel capacity per room
    pub broadcast_capacity: usize,
    /// What to do with dangling active paths on tree updates
    pub active_path_policy: ActivePathPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            broadcast_capacity: 256,
            active_path_policy: ActivePathPolicy::default(),
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub active_rooms: usize,
}

/// The collaboration server.
pub struct CollabServer {
    config: ServerConfig,
    coordinator: Arc<RoomCoordinator>,
    stats: Arc<RwLock<ServerStats>>,
}

impl CollabServer {
    /// Create a new server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let coordinator = Arc::new(RoomCoordinator::with_policy(
            config.broadcast_capacity,
            config.active_path_policy,
        ));
        Self {
            config,
            coordinator,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Start listening for WebSocket connections.
    ///
    /// This runs the server event loop. Call from an async runtime.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Collab server listening on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let coordinator = self.coordinator.clone();
            let stats = self.stats.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, coordinator, stats).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        coordinator: Arc<RoomCoordinator>,
        stats: Arc<RwLock<ServerStats>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (ws_sender, ws_receiver) = ws_stream.split();

        let connection_id = Uuid::new_v4();
        log::info!("WebSocket connection established from {addr} as {connection_id}");

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        // The loop result is propagated only after the departure cleanup
        // below; a failed send must not skip `leave`.
        let result = Self::connection_loop(
            ws_sender,
            ws_receiver,
            connection_id,
            addr,
            &coordinator,
            &stats,
        )
        .await;

        // Cleanup: departure notices, membership, registry entry.
        coordinator.leave(connection_id).await;

        {
            let mut s = stats.write().await;
            s.active_connections -= 1;
            s.active_rooms = coordinator.room_count().await;
        }

        result
    }

    /// Drive one connection's message loop until the socket closes or errors.
    async fn connection_loop(
        mut ws_sender: SplitSink<WebSocketStream<TcpStream>, Message>,
        mut ws_receiver: SplitStream<WebSocketStream<TcpStream>>,
        connection_id: Uuid,
        addr: SocketAddr,
        coordinator: &RoomCoordinator,
        stats: &RwLock<ServerStats>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Populated on the first successful join.
        let mut broadcast_rx: Option<broadcast::Receiver<Arc<Frame>>> = None;

        loop {
            tokio::select! {
                // Incoming WebSocket message
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            {
                                let mut s = stats.write().await;
                                s.total_messages += 1;
                            }

                            match ClientMessage::decode(text.as_str()) {
                                Ok(ClientMessage::Join { room_id, username }) => {
                                    if room_id.is_empty() || username.is_empty() {
                                        let err = ServerMessage::Error {
                                            message: "Username and Room ID are required!".to_string(),
                                        };
                                        ws_sender.send(Message::Text(err.encode()?.into())).await?;
                                        continue;
                                    }

                                    match coordinator.join(&room_id, connection_id, &username).await {
                                        Ok(rx) => {
                                            broadcast_rx = Some(rx);
                                            let mut s = stats.write().await;
                                            s.active_rooms = coordinator.room_count().await;
                                        }
                                        Err(e) => {
                                            log::error!("Join failed for {connection_id} in {room_id}: {e}");
                                        }
                                    }
                                }

                                Ok(ClientMessage::CodeChange { room_id, code, language, path }) => {
                                    coordinator
                                        .apply_code_change(connection_id, &room_id, &path, &code, &language)
                                        .await;
                                }

                                Ok(ClientMessage::TreeUpdate { room_id, project_tree, active_path }) => {
                                    coordinator
                                        .apply_tree_update(connection_id, &room_id, project_tree, active_path)
                                        .await;
                                }

                                Ok(ClientMessage::SyncProject { room_id }) => {
                                    // Unicast: the snapshot goes to the requester only.
                                    if let Some(snapshot) = coordinator.request_sync(&room_id).await {
                                        ws_sender.send(Message::Text(snapshot.encode()?.into())).await?;
                                    }
                                }

                                Err(e) => {
                                    log::warn!("Dropping malformed frame from {addr}: {e}");
                                }
                            }
                        }

                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection closed from {addr}");
                            break;
                        }

                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                        }

                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }

                        _ => {}
                    }
                }

                // Outgoing room broadcast
                frame = async {
                    if let Some(ref mut rx) = broadcast_rx {
                        rx.recv().await
                    } else {
                        // Not in a room yet — wait forever
                        std::future::pending().await
                    }
                } => {
                    match frame {
                        Ok(frame) => {
                            // Echo suppression on the receive edge
                            if frame.origin == Some(connection_id) {
                                continue;
                            }
                            ws_sender.send(Message::Text(frame.payload.clone().into())).await?;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("Connection {connection_id} lagged by {n} broadcasts");
                        }
                        Err(_) => break,
                    }
                }
            }
        }

        Ok(())
    }

    /// Get server statistics.
    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    /// Get the configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// Get the room coordinator.
    pub fn coordinator(&self) -> &Arc<RoomCoordinator> {
        &self.coordinator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9090");
        assert_eq!(config.broadcast_capacity, 256);
        assert_eq!(config.active_path_policy, ActivePathPolicy::LeaveDangling);
    }

    #[test]
    fn test_server_creation() {
        let server = CollabServer::with_defaults();
        assert_eq!(server.bind_addr(), "127.0.0.1:9090");
    }

    #[test]
    fn test_server_custom_config() {
        let config = ServerConfig {
            bind_addr: "0.0.0.0:8080".to_string(),
            broadcast_capacity: 512,
            active_path_policy: ActivePathPolicy::FirstAvailableFile,
        };
        let server = CollabServer::new(config);
        assert_eq!(server.bind_addr(), "0.0.0.0:8080");
    }

    #[tokio::test]
    async fn test_server_stats_initial() {
        let server = CollabServer::with_defaults();
        let stats = server.stats().await;
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.total_messages, 0);
        assert_eq!(stats.active_rooms, 0);
    }
}
