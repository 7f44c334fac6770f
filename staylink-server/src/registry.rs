//! Room/presence registry.
//!
//! Maps live connections to logical rooms. Two room kinds exist: identity
//! rooms keyed by a user id and conversation rooms keyed by a conversation
//! id; the registry itself does not distinguish them. Membership is
//! connection-scoped and discarded wholesale on disconnect, so clients must
//! re-identify and re-join after every reconnect.
//!
//! The registry is injected behind a trait so the event router never touches
//! the transport directly and tests can observe fan-out through plain
//! channels.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use shared::events::ServerEvent;
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

/// Longest a full outbound buffer may stall one emit before the event is
/// dropped for that member. Clients reconverge on their next fetch.
const SLOW_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Identifier for one live transport session.
pub type ConnectionId = Uuid;

/// Capability the event router uses for room membership and fan-out.
#[async_trait]
pub trait RoomRegistry: Send + Sync {
    /// Attach a connection's outbound channel. Must be called before any
    /// join for that connection.
    async fn register(&self, conn: ConnectionId, sender: mpsc::Sender<ServerEvent>);

    /// Subscribe the connection to a room. Idempotent.
    async fn join_room(&self, conn: ConnectionId, room: &str);

    /// Deliver an event to every member of a room. Emitting to a room with
    /// no subscribers is a no-op, not an error.
    async fn emit_to_room(&self, room: &str, event: &ServerEvent);

    /// Discard the connection's outbound channel and all of its memberships.
    async fn drop_connection(&self, conn: ConnectionId);
}

#[derive(Default)]
struct RegistryState {
    senders: HashMap<ConnectionId, mpsc::Sender<ServerEvent>>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

impl RegistryState {
    fn prune(&mut self, conn: ConnectionId) {
        self.senders.remove(&conn);
        self.rooms.retain(|_, members| {
            members.remove(&conn);
            !members.is_empty()
        });
    }
}

/// Single-process registry; one instance owns all room state for the server.
#[derive(Default)]
pub struct InProcessRegistry {
    inner: Mutex<RegistryState>,
}

impl InProcessRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomRegistry for InProcessRegistry {
    async fn register(&self, conn: ConnectionId, sender: mpsc::Sender<ServerEvent>) {
        let mut state = self.inner.lock().await;
        state.senders.insert(conn, sender);
    }

    async fn join_room(&self, conn: ConnectionId, room: &str) {
        let mut state = self.inner.lock().await;
        state.rooms.entry(room.to_string()).or_default().insert(conn);
        debug!(%conn, room, "connection joined room");
    }

    async fn emit_to_room(&self, room: &str, event: &ServerEvent) {
        let members: Vec<(ConnectionId, mpsc::Sender<ServerEvent>)> = {
            let state = self.inner.lock().await;
            let Some(members) = state.rooms.get(room) else {
                return;
            };
            members
                .iter()
                .filter_map(|conn| state.senders.get(conn).map(|tx| (*conn, tx.clone())))
                .collect()
        };

        for (conn, sender) in members {
            match sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(event)) => {
                    // Slow consumer; wait briefly, but never long enough to
                    // stall delivery to the rest of the room.
                    if timeout(SLOW_SEND_TIMEOUT, sender.send(event)).await.is_err() {
                        warn!(%conn, room, "dropping event for slow consumer");
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    let mut state = self.inner.lock().await;
                    state.prune(conn);
                }
            }
        }
    }

    async fn drop_connection(&self, conn: ConnectionId) {
        let mut state = self.inner.lock().await;
        state.prune(conn);
        debug!(%conn, "connection dropped from registry");
    }
}
