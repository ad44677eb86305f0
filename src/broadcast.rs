//! Fan-out broadcast to the members of one room.
//!
//! Uses tokio broadcast channels for O(1) send to all subscribers. Each
//! member gets an independent receiver that buffers up to `capacity` frames
//! before lagging.
//!
//! Frames carry the originating connection id so that the *receiving* edge
//! decides about echo suppression: a rebroadcast tags its origin and the
//! origin's connection task skips it, while a `joined` broadcast carries no
//! origin and reaches every member — the joiner included, by design.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::protocol::{ProtocolError, ServerMessage};

/// A pre-encoded frame queued to every member of a room.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Connection the frame originated from. `None` for frames addressed to
    /// the whole room, the originator included.
    pub origin: Option<Uuid>,
    /// Encoded JSON text, serialized once per broadcast.
    pub payload: String,
}

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    pub frames_sent: u64,
    pub active_members: usize,
}

/// A broadcast group for a single room.
///
/// All members of the room share one broadcast channel; a send fans out to
/// every subscribed receiver. Membership is kept in join order, which is
/// the order rosters are reported in.
pub struct BroadcastGroup {
    sender: broadcast::Sender<Arc<Frame>>,
    /// Member connection ids, join-ordered.
    members: RwLock<Vec<Uuid>>,
    capacity: usize,
    /// Lock-free counter — broadcast() never takes a lock.
    frames_sent: AtomicU64,
}

impl BroadcastGroup {
    /// Create a new broadcast group with the given buffer capacity.
    ///
    /// `capacity` is how many frames can be buffered per receiver before a
    /// lagging member starts dropping frames.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            members: RwLock::new(Vec::new()),
            capacity,
            frames_sent: AtomicU64::new(0),
        }
    }

    /// Add a member and return its receiver.
    ///
    /// Re-adding an already present member does not duplicate the roster
    /// entry; it just hands out a fresh receiver.
    pub async fn add_member(&self, connection_id: Uuid) -> broadcast::Receiver<Arc<Frame>> {
        let mut members = self.members.write().await;
        if !members.contains(&connection_id) {
            members.push(connection_id);
        }
        self.sender.subscribe()
    }

    /// Remove a member. Returns whether it was present.
    pub async fn remove_member(&self, connection_id: &Uuid) -> bool {
        let mut members = self.members.write().await;
        match members.iter().position(|id| id == connection_id) {
            Some(index) => {
                members.remove(index);
                true
            }
            None => false,
        }
    }

    /// Encode `msg` once and queue it to every receiver.
    ///
    /// Returns the number of receivers the frame reached. A group with no
    /// receivers is not an error; the frame is simply dropped.
    pub fn broadcast(
        &self,
        origin: Option<Uuid>,
        msg: &ServerMessage,
    ) -> Result<usize, ProtocolError> {
        let payload = msg.encode()?;
        let frame = Arc::new(Frame { origin, payload });
        let receiver_count = self.sender.send(frame).unwrap_or(0);
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        Ok(receiver_count)
    }

    /// Member connection ids in join order.
    pub async fn members(&self) -> Vec<Uuid> {
        self.members.read().await.clone()
    }

    pub async fn member_count(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn contains(&self, connection_id: &Uuid) -> bool {
        self.members.read().await.contains(connection_id)
    }

    /// Subscribe without becoming a roster member.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Frame>> {
        self.sender.subscribe()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            active_members: self.members.read().await.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_change() -> ServerMessage {
        ServerMessage::CodeChange {
            code: "x".to_string(),
            language: "cpp".to_string(),
            path: "src/main.cpp".to_string(),
        }
    }

    #[tokio::test]
    async fn test_add_remove_member() {
        let group = BroadcastGroup::new(16);
        let id = Uuid::new_v4();

        let _rx = group.add_member(id).await;
        assert_eq!(group.member_count().await, 1);
        assert!(group.contains(&id).await);

        assert!(group.remove_member(&id).await);
        assert_eq!(group.member_count().await, 0);
        assert!(!group.remove_member(&id).await);
    }

    #[tokio::test]
    async fn test_members_keep_join_order() {
        let group = BroadcastGroup::new(16);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        let _ra = group.add_member(a).await;
        let _rb = group.add_member(b).await;
        let _rc = group.add_member(c).await;

        assert_eq!(group.members().await, vec![a, b, c]);

        group.remove_member(&b).await;
        assert_eq!(group.members().await, vec![a, c]);
    }

    #[tokio::test]
    async fn test_rejoin_does_not_duplicate() {
        let group = BroadcastGroup::new(16);
        let a = Uuid::new_v4();

        let _r1 = group.add_member(a).await;
        let _r2 = group.add_member(a).await;
        assert_eq!(group.member_count().await, 1);
    }

    #[tokio::test]
    async fn test_fan_out_reaches_all_receivers() {
        let group = BroadcastGroup::new(16);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let mut ra = group.add_member(a).await;
        let mut rb = group.add_member(b).await;

        let count = group.broadcast(Some(a), &code_change()).unwrap();
        // The channel reaches every receiver, the origin's included;
        // filtering is the receiving edge's job.
        assert_eq!(count, 2);

        let fa = ra.recv().await.unwrap();
        let fb = rb.recv().await.unwrap();
        assert_eq!(fa.origin, Some(a));
        assert_eq!(fa.payload, fb.payload);
        assert!(ServerMessage::decode(&fa.payload).is_ok());
    }

    #[tokio::test]
    async fn test_broadcast_without_receivers() {
        let group = BroadcastGroup::new(16);
        let count = group.broadcast(None, &code_change()).unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let group = BroadcastGroup::new(16);
        let _rx = group.add_member(Uuid::new_v4()).await;

        group.broadcast(None, &code_change()).unwrap();
        group.broadcast(None, &code_change()).unwrap();

        let stats = group.stats().await;
        assert_eq!(stats.frames_sent, 2);
        assert_eq!(stats.active_members, 1);
        assert_eq!(group.capacity(), 16);
    }
}
