use crate::relay::connection::Connection;
use dashmap::DashMap;
use oculex_core::{Role, SessionEvent};
use std::{fmt, sync::Arc};
use uuid::Uuid;

/// Group-based event broker for the supervised session.
///
/// Exactly one doctor group and one patient group exist process-wide; a
/// connection belongs to at most one of them. Broadcasts snapshot the
/// member list before sending so a slow receiver never holds the maps.
#[derive(Clone, Default)]
pub struct RelayHub {
    /// Active connections mapped by connection ID
    connections: Arc<DashMap<Uuid, Arc<Connection>>>,
    /// Role groups - maps role to list of connection IDs
    groups: Arc<DashMap<Role, Vec<Uuid>>>,
}

impl fmt::Debug for RelayHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayHub")
            .field("connection_count", &self.connections.len())
            .field("doctor_count", &self.group_len(Role::Doctor))
            .field("patient_count", &self.group_len(Role::Patient))
            .finish()
    }
}

impl RelayHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection
    pub fn add_connection(&self, conn_id: Uuid, connection: Arc<Connection>) {
        self.connections.insert(conn_id, connection);
    }

    /// Remove a connection and clean up group membership
    pub fn remove_connection(&self, conn_id: Uuid) {
        self.connections.remove(&conn_id);

        for mut group in self.groups.iter_mut() {
            group.value_mut().retain(|id| id != &conn_id);
        }
    }

    /// Move a connection into a role group.
    ///
    /// Membership is exclusive: joining removes the connection from any
    /// group it previously occupied.
    pub async fn join(&self, conn_id: Uuid, role: Role) {
        for mut group in self.groups.iter_mut() {
            group.value_mut().retain(|id| id != &conn_id);
        }

        let mut members = self.groups.entry(role).or_default();
        if !members.contains(&conn_id) {
            members.push(conn_id);
        }
        drop(members);

        if let Some(connection) = self.get_connection(&conn_id) {
            connection.set_role(role).await;
        }
    }

    /// Snapshot of all connections currently in a role group
    pub fn group_members(&self, role: Role) -> Vec<Arc<Connection>> {
        self.groups
            .get(&role)
            .map(|group| {
                group
                    .iter()
                    .filter_map(|conn_id| {
                        self.connections.get(conn_id).map(|c| c.clone())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Broadcast an event to every connection in a role group.
    ///
    /// An empty group makes this a silent no-op; individual send failures
    /// are logged and do not stop the fan-out.
    pub async fn broadcast(&self, role: Role, event: SessionEvent) {
        let members = self.group_members(role);

        for connection in members {
            if let Err(e) = connection.send_event(event.clone()).await {
                tracing::error!(%role, conn_id = %connection.id, "failed to send event: {}", e);
            }
        }
    }

    /// Get a specific connection
    pub fn get_connection(&self, conn_id: &Uuid) -> Option<Arc<Connection>> {
        self.connections.get(conn_id).map(|c| c.clone())
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn group_len(&self, role: Role) -> usize {
        self.groups.get(&role).map(|group| group.len()).unwrap_or(0)
    }
}
