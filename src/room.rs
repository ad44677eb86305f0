//! Room coordinator: server-authoritative state for every room.
//!
//! Each room owns one project tree, one active path and one broadcast
//! group. The coordinator mediates all mutations:
//!
//! ```text
//! join ──────────┐
//! code-change ───┤                    ┌── member A
//! tree-update ───┼── RoomCoordinator ─┼── member B
//! sync-project ──┤    (rooms map)     └── member C
//! leave ─────────┘
//! ```
//!
//! Rooms transition `Absent → Active` on first join (seeding the default
//! project) and are never evicted afterwards — state survives the last
//! member's departure for the lifetime of the process. That is a documented
//! limitation, not a leak to fix silently.
//!
//! Every mutation runs under the write lock of the rooms map and broadcasts
//! before releasing it, so members of one room observe broadcasts in
//! application order. Conflicting writes to the same file are
//! last-writer-wins: the second write to arrive at the coordinator is the
//! one everyone converges on.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::broadcast::{BroadcastGroup, Frame};
use crate::protocol::{ProtocolError, RosterEntry, ServerMessage};
use crate::registry::MembershipRegistry;
use crate::tree::{Node, ProjectTree};

/// Path of the file focused in a freshly seeded room.
pub const DEFAULT_ACTIVE_PATH: &str = "src/main.cpp";

/// What to do with an active path that no longer resolves after a tree
/// update.
///
/// The observed behavior of existing deployments is inconsistent — the
/// server stores whatever the client sent, while one client code path picks
/// the next available node — so the choice is a policy hook rather than a
/// hardcoded answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivePathPolicy {
    /// Store the path as sent, even when it dangles. Resolving a dangling
    /// active path yields no node, which is a valid, displayable state.
    #[default]
    LeaveDangling,
    /// Repoint a dangling path at the first file of the tree (depth-first,
    /// sibling names in sorted order), or `None` when the tree has no
    /// files.
    FirstAvailableFile,
}

impl ActivePathPolicy {
    /// Apply the policy to a requested active path against `tree`.
    pub fn apply(&self, tree: &ProjectTree, requested: Option<String>) -> Option<String> {
        match self {
            Self::LeaveDangling => requested,
            Self::FirstAvailableFile => match requested {
                Some(path) if tree.resolve(&path).is_some() => Some(path),
                _ => tree.first_file_path(),
            },
        }
    }
}

/// Per-room state: the authoritative tree, the advisory active path and
/// the fan-out group.
struct Room {
    tree: ProjectTree,
    active_path: Option<String>,
    group: Arc<BroadcastGroup>,
}

impl Room {
    fn seeded(broadcast_capacity: usize) -> Self {
        Self {
            tree: ProjectTree::seed(),
            active_path: Some(DEFAULT_ACTIVE_PATH.to_string()),
            group: Arc::new(BroadcastGroup::new(broadcast_capacity)),
        }
    }

    fn empty(broadcast_capacity: usize) -> Self {
        Self {
            tree: ProjectTree::new(),
            active_path: None,
            group: Arc::new(BroadcastGroup::new(broadcast_capacity)),
        }
    }
}

/// Owns every room and the membership registry.
pub struct RoomCoordinator {
    /// Room id → room state. The write lock serializes all mutations.
    rooms: RwLock<HashMap<String, Room>>,
    registry: MembershipRegistry,
    broadcast_capacity: usize,
    active_path_policy: ActivePathPolicy,
}

impl RoomCoordinator {
    /// Create a coordinator with the default dangling-path policy.
    pub fn new(broadcast_capacity: usize) -> Self {
        Self::with_policy(broadcast_capacity, ActivePathPolicy::default())
    }

    pub fn with_policy(broadcast_capacity: usize, active_path_policy: ActivePathPolicy) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            registry: MembershipRegistry::new(),
            broadcast_capacity,
            active_path_policy,
        }
    }

    /// Join `connection_id` to a room, lazily creating and seeding it.
    ///
    /// Registers the username, adds the connection to the room's broadcast
    /// group and broadcasts the full room snapshot — roster, tree, active
    /// path — to *every* member, the joiner included. The joiner's snapshot
    /// arrives through the returned receiver; the redundant delivery to
    /// members that already hold the state is deliberate, existing clients
    /// rely on the consistent broadcast shape.
    pub async fn join(
        &self,
        room_id: &str,
        connection_id: Uuid,
        username: &str,
    ) -> Result<broadcast::Receiver<Arc<Frame>>, ProtocolError> {
        self.registry.register(connection_id, username).await;

        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(room_id.to_string()).or_insert_with(|| {
            log::info!("Room {room_id} created, seeding default project");
            Room::seeded(self.broadcast_capacity)
        });

        let rx = room.group.add_member(connection_id).await;

        let mut clients = Vec::new();
        for id in room.group.members().await {
            clients.push(RosterEntry {
                connection_id: id,
                username: self.registry.username(&id).await,
            });
        }

        let joined = ServerMessage::Joined {
            clients,
            project_tree: room.tree.clone(),
            active_path: room.active_path.clone(),
            username: username.to_string(),
            connection_id,
        };
        room.group.broadcast(None, &joined)?;

        log::info!("{username} ({connection_id}) joined room {room_id}");
        Ok(rx)
    }

    /// Overwrite one file's content and language tag, last-writer-wins.
    ///
    /// Silent no-op when `room_id` or `path` is missing or the room is
    /// unknown. A path that does not resolve to a file skips the tree write
    /// but the change is still rebroadcast to the other members, matching
    /// the behavior clients were built against.
    pub async fn apply_code_change(
        &self,
        origin: Uuid,
        room_id: &str,
        path: &str,
        code: &str,
        language: &str,
    ) {
        if room_id.is_empty() || path.is_empty() {
            return;
        }

        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(room_id) else {
            return;
        };

        if let Some(Node::File {
            code: stored_code,
            language: stored_language,
        }) = room.tree.resolve_mut(path)
        {
            *stored_code = code.to_string();
            *stored_language = language.to_string();
        }

        let msg = ServerMessage::CodeChange {
            code: code.to_string(),
            language: language.to_string(),
            path: path.to_string(),
        };
        if let Err(e) = room.group.broadcast(Some(origin), &msg) {
            log::warn!("Failed to rebroadcast code change in room {room_id}: {e}");
        }
    }

    /// Replace a room's entire tree and active path with a client snapshot.
    ///
    /// Silent no-op when `room_id` or the tree is missing. A tree update
    /// for a room nobody has joined yet still stores the snapshot, so a
    /// later first join returns it instead of re-seeding.
    pub async fn apply_tree_update(
        &self,
        origin: Uuid,
        room_id: &str,
        project_tree: Option<ProjectTree>,
        active_path: Option<String>,
    ) {
        if room_id.is_empty() {
            return;
        }
        let Some(project_tree) = project_tree else {
            return;
        };

        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::empty(self.broadcast_capacity));

        let active_path = self.active_path_policy.apply(&project_tree, active_path);
        room.tree.replace(project_tree);
        room.active_path = active_path;

        let msg = ServerMessage::TreeUpdate {
            project_tree: room.tree.clone(),
            active_path: room.active_path.clone(),
        };
        if let Err(e) = room.group.broadcast(Some(origin), &msg) {
            log::warn!("Failed to rebroadcast tree update in room {room_id}: {e}");
        }
    }

    /// Build the unicast snapshot answering a `sync-project` request.
    ///
    /// `None` for unknown rooms; the caller writes the message to the
    /// requesting connection only.
    pub async fn request_sync(&self, room_id: &str) -> Option<ServerMessage> {
        if room_id.is_empty() {
            return None;
        }
        let rooms = self.rooms.read().await;
        rooms.get(room_id).map(|room| ServerMessage::TreeUpdate {
            project_tree: room.tree.clone(),
            active_path: room.active_path.clone(),
        })
    }

    /// Handle a connection departure.
    ///
    /// For every room the connection belongs to, broadcasts a departure
    /// notice to the remaining members and drops the membership, then
    /// unregisters the username. Room state itself is never deleted.
    pub async fn leave(&self, connection_id: Uuid) {
        let username = self.registry.username(&connection_id).await;

        let mut rooms = self.rooms.write().await;
        for (room_id, room) in rooms.iter_mut() {
            if room.group.remove_member(&connection_id).await {
                let msg = ServerMessage::Disconnected {
                    connection_id,
                    username: username.clone(),
                };
                if let Err(e) = room.group.broadcast(Some(connection_id), &msg) {
                    log::warn!("Failed to broadcast departure from room {room_id}: {e}");
                }
                log::info!("Connection {connection_id} left room {room_id}");
            }
        }
        drop(rooms);

        self.registry.unregister(connection_id).await;
    }

    /// Current roster for a room, in join order. Empty for unknown rooms.
    pub async fn room_members(&self, room_id: &str) -> Vec<RosterEntry> {
        let rooms = self.rooms.read().await;
        let Some(room) = rooms.get(room_id) else {
            return Vec::new();
        };
        let members = room.group.members().await;
        drop(rooms);

        let mut roster = Vec::with_capacity(members.len());
        for id in members {
            roster.push(RosterEntry {
                connection_id: id,
                username: self.registry.username(&id).await,
            });
        }
        roster
    }

    /// Number of rooms ever created in this process.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn has_room(&self, room_id: &str) -> bool {
        self.rooms.read().await.contains_key(room_id)
    }

    /// The membership registry.
    pub fn registry(&self) -> &MembershipRegistry {
        &self.registry
    }
}
