//! JSON wire protocol for room synchronization.
//!
//! Every WebSocket text frame is an adjacently tagged envelope:
//!
//! ```json
//! { "event": "code-change", "data": { "roomId": "r1", "code": "...", "language": "cpp", "path": "src/main.cpp" } }
//! ```
//!
//! Event names and payload field names (`roomId`, `projectTree`,
//! `activePath`, `connectionId`, ...) are a compatibility contract with the
//! existing browser clients and must not change.
//!
//! Validation policy: string fields on client payloads default to `""` when
//! missing so that schema decoding succeeds and the handler (not serde)
//! decides what to do — an empty required field is a silent drop for every
//! message except `join`, which answers with an explicit `error` event.
//! Frames that fail to decode entirely are dropped with a warning.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tree::ProjectTree;

/// One entry of a room roster.
///
/// `username` is `None` for a connection that is present in the room but
/// was never registered; consumers must tolerate that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub connection_id: Uuid,
    pub username: Option<String>,
}

/// Messages sent by clients to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Join a room under a display name.
    Join {
        #[serde(default)]
        room_id: String,
        #[serde(default)]
        username: String,
    },
    /// Overwrite the content of one file (last-writer-wins).
    CodeChange {
        #[serde(default)]
        room_id: String,
        #[serde(default)]
        code: String,
        #[serde(default)]
        language: String,
        #[serde(default)]
        path: String,
    },
    /// Full-snapshot tree replacement. A missing `projectTree` is a
    /// silent drop.
    TreeUpdate {
        #[serde(default)]
        room_id: String,
        #[serde(default)]
        project_tree: Option<ProjectTree>,
        #[serde(default)]
        active_path: Option<String>,
    },
    /// Request a unicast snapshot of the current room state.
    SyncProject {
        #[serde(default)]
        room_id: String,
    },
}

impl ClientMessage {
    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Deserialize from a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

/// Messages sent by the server to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// Full room snapshot, broadcast to every member (the joiner included)
    /// whenever someone joins.
    Joined {
        clients: Vec<RosterEntry>,
        project_tree: ProjectTree,
        active_path: Option<String>,
        username: String,
        connection_id: Uuid,
    },
    /// A file edit, rebroadcast to the other members of the room.
    CodeChange {
        code: String,
        language: String,
        path: String,
    },
    /// A tree snapshot: rebroadcast after a client-side tree mutation, or
    /// unicast in answer to `sync-project`.
    TreeUpdate {
        project_tree: ProjectTree,
        active_path: Option<String>,
    },
    /// A member left the room.
    Disconnected {
        connection_id: Uuid,
        username: Option<String>,
    },
    /// Only emitted for an invalid `join`; every other validation failure
    /// is a silent drop.
    Error { message: String },
}

impl ServerMessage {
    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Deserialize from a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    Encode(String),
    Decode(String),
    ConnectionClosed,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(e) => write!(f, "Encode error: {e}"),
            Self::Decode(e) => write!(f, "Decode error: {e}"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Node;

    #[test]
    fn test_join_roundtrip() {
        let msg = ClientMessage::Join {
            room_id: "r1".to_string(),
            username: "alice".to_string(),
        };
        let encoded = msg.encode().unwrap();
        assert_eq!(ClientMessage::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn test_event_tag_names() {
        let json = serde_json::to_value(&ClientMessage::SyncProject {
            room_id: "r1".to_string(),
        })
        .unwrap();
        assert_eq!(json["event"], "sync-project");
        assert_eq!(json["data"]["roomId"], "r1");

        let json = serde_json::to_value(&ClientMessage::CodeChange {
            room_id: "r1".to_string(),
            code: "x".to_string(),
            language: "cpp".to_string(),
            path: "src/main.cpp".to_string(),
        })
        .unwrap();
        assert_eq!(json["event"], "code-change");
        assert_eq!(json["data"]["path"], "src/main.cpp");
    }

    #[test]
    fn test_join_missing_fields_decodes_empty() {
        // Validation happens in the handler, not at decode time.
        let msg = ClientMessage::decode(r#"{"event":"join","data":{}}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Join {
                room_id: String::new(),
                username: String::new(),
            }
        );
    }

    #[test]
    fn test_tree_update_missing_tree_is_none() {
        let msg =
            ClientMessage::decode(r#"{"event":"tree-update","data":{"roomId":"r1"}}"#).unwrap();
        match msg {
            ClientMessage::TreeUpdate {
                room_id,
                project_tree,
                active_path,
            } => {
                assert_eq!(room_id, "r1");
                assert!(project_tree.is_none());
                assert!(active_path.is_none());
            }
            other => panic!("Expected TreeUpdate, got {other:?}"),
        }
    }

    #[test]
    fn test_tree_update_null_active_path() {
        let msg = ClientMessage::decode(
            r#"{"event":"tree-update","data":{"roomId":"r1","projectTree":{},"activePath":null}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::TreeUpdate {
                project_tree,
                active_path,
                ..
            } => {
                assert!(project_tree.is_some());
                assert!(active_path.is_none());
            }
            other => panic!("Expected TreeUpdate, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_is_decode_error() {
        assert!(ClientMessage::decode(r#"{"event":"shutdown","data":{}}"#).is_err());
        assert!(ClientMessage::decode("not json at all").is_err());
    }

    #[test]
    fn test_joined_wire_shape() {
        let id = Uuid::new_v4();
        let mut tree = ProjectTree::new();
        tree.insert("", "a.js", Node::file("", "javascript")).unwrap();

        let msg = ServerMessage::Joined {
            clients: vec![RosterEntry {
                connection_id: id,
                username: Some("alice".to_string()),
            }],
            project_tree: tree,
            active_path: Some("a.js".to_string()),
            username: "alice".to_string(),
            connection_id: id,
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event"], "joined");
        assert_eq!(json["data"]["connectionId"], id.to_string());
        assert_eq!(json["data"]["activePath"], "a.js");
        assert_eq!(json["data"]["clients"][0]["username"], "alice");
        assert_eq!(json["data"]["projectTree"]["a.js"]["type"], "file");
    }

    #[test]
    fn test_roster_entry_unregistered_username() {
        let entry = RosterEntry {
            connection_id: Uuid::new_v4(),
            username: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json["username"].is_null());

        let back: RosterEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_server_message_roundtrip() {
        let msg = ServerMessage::CodeChange {
            code: "// edited".to_string(),
            language: "cpp".to_string(),
            path: "src/main.cpp".to_string(),
        };
        let encoded = msg.encode().unwrap();
        assert_eq!(ServerMessage::decode(&encoded).unwrap(), msg);

        let msg = ServerMessage::Error {
            message: "Username and Room ID are required!".to_string(),
        };
        let encoded = msg.encode().unwrap();
        assert_eq!(ServerMessage::decode(&encoded).unwrap(), msg);
    }
}
