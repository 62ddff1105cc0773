use std::collections::HashMap;

use tokio::sync::Mutex;

use scrawl_common::protocol::RoomMode;

use crate::room::RoomSession;

/// Process-wide map from room code to live session. The map lock only
/// guards lookup, insert, and remove; room state has its own per-session
/// lock so traffic in one room never stalls another. Where both locks are
/// needed the order is always map first, then room.
pub struct RoomDirectory {
    rooms: Mutex<HashMap<String, RoomSession>>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Look up the session for `code`, creating it on first join. Creation
    /// is serialized by the map lock, so two simultaneous first-joins get
    /// the same session. The mode of the first join sticks.
    pub async fn get_or_create(&self, code: &str, mode: RoomMode) -> RoomSession {
        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(code.to_string())
            .or_insert_with(|| {
                tracing::info!("creating room {} ({:?})", code, mode);
                RoomSession::new(code.to_string(), mode)
            })
            .clone()
    }

    pub async fn get(&self, code: &str) -> Option<RoomSession> {
        self.rooms.lock().await.get(code).cloned()
    }

    /// Drop the room if it has no members. The emptiness check runs under
    /// both locks, so a join that slipped in since the last leave keeps
    /// the room alive; a removed session is retired and refuses joins on
    /// stale handles.
    pub async fn remove_if_empty(&self, code: &str) {
        let mut rooms = self.rooms.lock().await;
        if let Some(session) = rooms.get(code) {
            if session.retire_if_empty().await {
                tracing::info!("room {} is empty, removing", code);
                rooms.remove(code);
            }
        }
    }
}
