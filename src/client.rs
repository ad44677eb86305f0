//! WebSocket client for the collaboration server.
//!
//! Drives the full protocol — join, edits, tree snapshots, sync requests —
//! and surfaces everything the server sends as [`SyncEvent`]s on a channel.
//! The integration tests are the primary consumer; embedders wanting a
//! headless room member use the same surface.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::protocol::{ClientMessage, ProtocolError, RosterEntry, ServerMessage};
use crate::tree::ProjectTree;

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the client.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Connection established and join sent
    Connected,
    /// Connection lost
    Disconnected,
    /// A room snapshot: broadcast on every join, own join included
    Joined {
        clients: Vec<RosterEntry>,
        project_tree: ProjectTree,
        active_path: Option<String>,
        username: String,
        connection_id: Uuid,
    },
    /// Another member edited a file
    RemoteCodeChange {
        path: String,
        code: String,
        language: String,
    },
    /// Another member replaced the tree, or a `sync-project` answer
    RemoteTreeUpdate {
        project_tree: ProjectTree,
        active_path: Option<String>,
    },
    /// A member left the room
    MemberLeft {
        connection_id: Uuid,
        username: Option<String>,
    },
    /// The server rejected a request (invalid join)
    ServerError { message: String },
}

/// The collaboration client.
///
/// Manages one WebSocket connection to the server: a writer task fed by an
/// outgoing channel, and a reader task that maps server frames into
/// [`SyncEvent`]s.
pub struct CollabClient {
    username: String,
    room_id: String,
    server_url: String,

    state: Arc<RwLock<ConnectionState>>,

    /// Channel to the WebSocket writer task
    outgoing_tx: Option<mpsc::Sender<Message>>,

    /// Event receiver for the application
    event_rx: Option<mpsc::Receiver<SyncEvent>>,

    /// Event sender (held by the reader task)
    event_tx: mpsc::Sender<SyncEvent>,
}

impl CollabClient {
    /// Create a new client for one room.
    pub fn new(
        username: impl Into<String>,
        room_id: impl Into<String>,
        server_url: impl Into<String>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            username: username.into(),
            room_id: room_id.into(),
            server_url: server_url.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.event_rx.take()
    }

    /// Connect to the server and join the room.
    ///
    /// Spawns background tasks for reading/writing WebSocket messages.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let ws_result = tokio_tungstenite::connect_async(&self.server_url).await;
        let (ws_writer, mut ws_reader) = match ws_result {
            Ok((ws_stream, _)) => ws_stream.split(),
            Err(_) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ProtocolError::ConnectionClosed);
            }
        };

        // Writer task: forward the outgoing channel to the WebSocket
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(256);
        self.outgoing_tx = Some(out_tx);
        let mut ws_writer = ws_writer;
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if ws_writer.send(msg).await.is_err() || closing {
                    break;
                }
            }
        });

        // Join the room
        let join = ClientMessage::Join {
            room_id: self.room_id.clone(),
            username: self.username.clone(),
        };
        self.send(join).await?;

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(SyncEvent::Connected).await;

        // Reader task: map server frames into events
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let server_msg = match ServerMessage::decode(text.as_str()) {
                            Ok(m) => m,
                            Err(e) => {
                                log::warn!("Undecodable server frame: {e}");
                                continue;
                            }
                        };

                        let event = match server_msg {
                            ServerMessage::Joined {
                                clients,
                                project_tree,
                                active_path,
                                username,
                                connection_id,
                            } => SyncEvent::Joined {
                                clients,
                                project_tree,
                                active_path,
                                username,
                                connection_id,
                            },
                            ServerMessage::CodeChange {
                                code,
                                language,
                                path,
                            } => SyncEvent::RemoteCodeChange {
                                path,
                                code,
                                language,
                            },
                            ServerMessage::TreeUpdate {
                                project_tree,
                                active_path,
                            } => SyncEvent::RemoteTreeUpdate {
                                project_tree,
                                active_path,
                            },
                            ServerMessage::Disconnected {
                                connection_id,
                                username,
                            } => SyncEvent::MemberLeft {
                                connection_id,
                                username,
                            },
                            ServerMessage::Error { message } => {
                                SyncEvent::ServerError { message }
                            }
                        };

                        if event_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => {
                        break;
                    }
                    _ => {}
                }
            }

            // Connection lost
            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(SyncEvent::Disconnected).await;
        });

        Ok(())
    }

    /// Send a file edit for the joined room.
    pub async fn send_code_change(
        &self,
        path: impl Into<String>,
        code: impl Into<String>,
        language: impl Into<String>,
    ) -> Result<(), ProtocolError> {
        self.send(ClientMessage::CodeChange {
            room_id: self.room_id.clone(),
            code: code.into(),
            language: language.into(),
            path: path.into(),
        })
        .await
    }

    /// Send a whole-tree snapshot for the joined room.
    pub async fn send_tree_update(
        &self,
        project_tree: ProjectTree,
        active_path: Option<String>,
    ) -> Result<(), ProtocolError> {
        self.send(ClientMessage::TreeUpdate {
            room_id: self.room_id.clone(),
            project_tree: Some(project_tree),
            active_path,
        })
        .await
    }

    /// Ask the server for a unicast snapshot of the room.
    pub async fn request_sync(&self) -> Result<(), ProtocolError> {
        self.send(ClientMessage::SyncProject {
            room_id: self.room_id.clone(),
        })
        .await
    }

    /// Close the connection cleanly. The server broadcasts the departure
    /// to the remaining members of the room.
    pub async fn disconnect(&mut self) {
        if let Some(tx) = self.outgoing_tx.take() {
            let _ = tx.send(Message::Close(None)).await;
        }
        *self.state.write().await = ConnectionState::Disconnected;
    }

    async fn send(&self, msg: ClientMessage) -> Result<(), ProtocolError> {
        let encoded = msg.encode()?;
        match &self.outgoing_tx {
            Some(tx) => tx
                .send(Message::Text(encoded.into()))
                .await
                .map_err(|_| ProtocolError::ConnectionClosed),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Get the current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}
