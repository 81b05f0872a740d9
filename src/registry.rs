use tokio::sync::mpsc;
use tracing::debug;

use crate::types::{ConnId, Role};

/// Outbound half of a live socket. Sends are fire-and-forget: a closed peer
/// just drops the frame.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnId,
    role: Role,
    tx: mpsc::UnboundedSender<String>,
}

impl Connection {
    pub fn new(id: ConnId, role: Role, tx: mpsc::UnboundedSender<String>) -> Self {
        Self { id, role, tx }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn send(&self, payload: impl Into<String>) -> bool {
        if self.tx.send(payload.into()).is_err() {
            debug!(conn_id = self.id, role = self.role.as_str(), "dropping frame for closed connection");
            return false;
        }
        true
    }
}

/// The two connection slots. Each holds at most one occupant; a new
/// registration replaces the previous one.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    user: Option<Connection>,
    admin: Option<Connection>,
}

impl ConnectionRegistry {
    /// Returns the evicted occupant, if any. Dropping it closes its outbound
    /// channel; the transport closes the socket once that channel drains.
    pub fn register_user(&mut self, conn: Connection) -> Option<Connection> {
        self.user.replace(conn)
    }

    pub fn register_admin(&mut self, conn: Connection) -> Option<Connection> {
        self.admin.replace(conn)
    }

    pub fn register(&mut self, conn: Connection) -> Option<Connection> {
        match conn.role() {
            Role::User => self.register_user(conn),
            Role::Admin => self.register_admin(conn),
        }
    }

    /// Openness is checked on every call; a peer may go away before its
    /// close notification reaches the registry.
    pub fn current_user(&self) -> Option<&Connection> {
        self.user.as_ref().filter(|conn| conn.is_open())
    }

    pub fn current_admin(&self) -> Option<&Connection> {
        self.admin.as_ref().filter(|conn| conn.is_open())
    }

    /// Role of the slot `id` currently occupies. Evicted connections occupy
    /// nothing.
    pub fn role_of(&self, id: ConnId) -> Option<Role> {
        if self.user.as_ref().is_some_and(|conn| conn.id() == id) {
            Some(Role::User)
        } else if self.admin.as_ref().is_some_and(|conn| conn.id() == id) {
            Some(Role::Admin)
        } else {
            None
        }
    }

    /// Open user connection, only if it is still `id`.
    pub fn user_if_current(&self, id: ConnId) -> Option<&Connection> {
        self.current_user().filter(|conn| conn.id() == id)
    }

    /// Clears the slot held by `id`. A close from an already-evicted
    /// connection leaves its replacement in place.
    pub fn release(&mut self, id: ConnId) -> Option<Role> {
        if self.user.as_ref().is_some_and(|conn| conn.id() == id) {
            self.user = None;
            Some(Role::User)
        } else if self.admin.as_ref().is_some_and(|conn| conn.id() == id) {
            self.admin = None;
            Some(Role::Admin)
        } else {
            None
        }
    }
}
