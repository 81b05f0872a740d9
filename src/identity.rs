use std::collections::HashMap;

use crate::types::ConnId;

pub const DEFAULT_NAME: &str = "User";
const UNKNOWN_ORIGIN_PART: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub display_name: String,
    pub origin: String,
}

impl Identity {
    /// Builds an identity from the optional fields of an identity frame.
    /// The origin reads `{location}@{ip}`.
    pub fn from_parts(name: Option<&str>, location: Option<&str>, ip: Option<&str>) -> Self {
        let display_name = non_blank(name).unwrap_or(DEFAULT_NAME).to_string();
        let origin = format!(
            "{}@{}",
            non_blank(location).unwrap_or(UNKNOWN_ORIGIN_PART),
            non_blank(ip).unwrap_or(UNKNOWN_ORIGIN_PART)
        );
        Self {
            display_name,
            origin,
        }
    }

    pub fn label(&self) -> String {
        format!("{}_{}", self.origin, self.display_name)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Identity per user connection. Re-identifying overwrites the previous
/// record (last write wins).
#[derive(Debug, Default)]
pub struct IdentityTracker {
    identities: HashMap<ConnId, Identity>,
}

impl IdentityTracker {
    pub fn set_identity(&mut self, conn: ConnId, identity: Identity) -> Option<Identity> {
        self.identities.insert(conn, identity)
    }

    /// `{origin}_{displayName}`, or `User` before any identity arrives.
    pub fn label_for(&self, conn: ConnId) -> String {
        self.identities
            .get(&conn)
            .map(Identity::label)
            .unwrap_or_else(|| DEFAULT_NAME.to_string())
    }

    pub fn display_name_for(&self, conn: ConnId) -> &str {
        self.identities
            .get(&conn)
            .map(|identity| identity.display_name.as_str())
            .unwrap_or(DEFAULT_NAME)
    }

    pub fn discard(&mut self, conn: ConnId) -> Option<Identity> {
        self.identities.remove(&conn)
    }
}
