use anyhow::Result;
use oculex_core::{Role, SessionEvent};
use std::{fmt, sync::Arc};
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

/// One live websocket connection.
///
/// Events are written through an mpsc channel drained by the connection's
/// writer task, so a broadcast never blocks on the peer's network I/O.
#[derive(Clone)]
pub struct Connection {
    /// Unique connection ID
    pub id: Uuid,
    /// Role group this connection joined, if any. A connection holds at
    /// most one role and cannot return to the unjoined state.
    role: Arc<RwLock<Option<Role>>>,
    /// Channel to send events to this connection
    sender: mpsc::Sender<SessionEvent>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = self.role.try_read().ok().and_then(|guard| *guard);

        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("role", &role)
            .field("channel_closed", &self.sender.is_closed())
            .finish()
    }
}

impl Connection {
    pub fn new(sender: mpsc::Sender<SessionEvent>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role: Arc::new(RwLock::new(None)),
            sender,
        }
    }

    /// Send an event to this connection
    pub async fn send_event(&self, event: SessionEvent) -> Result<()> {
        self.sender
            .send(event)
            .await
            .map_err(|_| anyhow::anyhow!("failed to send event: channel closed"))
    }

    /// Record the role group this connection joined
    pub async fn set_role(&self, role: Role) {
        *self.role.write().await = Some(role);
    }

    /// Role group this connection belongs to, if joined
    pub async fn get_role(&self) -> Option<Role> {
        *self.role.read().await
    }
}
