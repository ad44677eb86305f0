//! # coderoom — real-time collaborative code editor sync server
//!
//! Server-authoritative room synchronization over JSON-tagged WebSocket
//! messages: clients join a named room, receive the shared project tree,
//! and edit files with last-writer-wins convergence.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     WebSocket      ┌──────────────┐
//! │ CollabClient │ ◄─────────────────► │ CollabServer │
//! │ (per user)   │     JSON frames     │  (central)   │
//! └──────────────┘                     └──────┬───────┘
//!                                             │
//!                                     ┌───────┴────────┐
//!                                     │ RoomCoordinator│
//!                                     │  ProjectTree   │
//!                                     │  active path   │
//!                                     │  registry      │
//!                                     └───────┬────────┘
//!                                             │
//!                                     ┌───────┴───────┐
//!                                     │ BroadcastGroup│
//!                                     │   (fan-out)   │
//!                                     └───────────────┘
//! ```
//!
//! The server is the single source of truth; client copies are advisory
//! and overwritten by every authoritative broadcast. There is no merge:
//! conflicting edits to the same file converge on the last write applied
//! at the coordinator.
//!
//! ## Modules
//!
//! - [`protocol`] — JSON wire vocabulary (`{"event": ..., "data": ...}`)
//! - [`tree`] — per-room project tree (folders, files, path resolution)
//! - [`registry`] — connection → username registry
//! - [`broadcast`] — room-based fan-out with origin-tagged frames
//! - [`room`] — the room coordinator (join, edits, snapshots, departures)
//! - [`server`] — WebSocket server
//! - [`client`] — WebSocket client
//! - [`exec`] — narrow interface to the remote code-execution collaborator

pub mod broadcast;
pub mod client;
pub mod exec;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod server;
pub mod tree;

// Re-exports for convenience
pub use broadcast::{BroadcastGroup, BroadcastStats, Frame};
pub use client::{CollabClient, ConnectionState, SyncEvent};
pub use exec::{ExecOutcome, Judge0Client, Language};
pub use protocol::{ClientMessage, ProtocolError, RosterEntry, ServerMessage};
pub use registry::MembershipRegistry;
pub use room::{ActivePathPolicy, RoomCoordinator, DEFAULT_ACTIVE_PATH};
pub use server::{CollabServer, ServerConfig, ServerStats};
pub use tree::{Node, ProjectTree, TreeError, DEFAULT_MAIN_CPP};
