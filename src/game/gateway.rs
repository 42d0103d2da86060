//! Outbound event fan-out, scoped to a connection or a room
//!
//! The gateway is the only component that emits to clients; everything
//! above it returns or requests events rather than writing directly.

use std::collections::HashMap;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::game::room::Room;
use crate::ws::protocol::ServerMsg;

/// Per-connection outbound senders
#[derive(Debug, Default)]
pub struct BroadcastGateway {
    senders: HashMap<Uuid, mpsc::UnboundedSender<ServerMsg>>,
}

impl BroadcastGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, conn_id: Uuid, sender: mpsc::UnboundedSender<ServerMsg>) {
        self.senders.insert(conn_id, sender);
    }

    pub fn unregister(&mut self, conn_id: &Uuid) {
        self.senders.remove(conn_id);
    }

    pub fn connected(&self) -> usize {
        self.senders.len()
    }

    /// Send to a single connection. A vanished receiver is silently
    /// dropped; disconnect cleanup will catch up with it.
    pub fn send_to(&self, conn_id: &Uuid, msg: ServerMsg) {
        if let Some(sender) = self.senders.get(conn_id) {
            let _ = sender.send(msg);
        }
    }

    /// Send to every member of a room (bots have no sender and are
    /// skipped naturally).
    pub fn send_to_room(&self, room: &Room, msg: ServerMsg) {
        for member in &room.members {
            self.send_to(member, msg.clone());
        }
    }

    /// Send to every member of a room except one (the reporting sender).
    pub fn send_to_room_except(&self, room: &Room, excluded: &Uuid, msg: ServerMsg) {
        for member in &room.members {
            if member != excluded {
                self.send_to(member, msg.clone());
            }
        }
    }
}
