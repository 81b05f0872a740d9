//! Typing signals between the two sides.
//!
//! Signals go out immediately or not at all. Nothing is queued for a peer
//! that is absent, so a reconnecting peer never sees a stale signal.

use tracing::debug;

use crate::identity::IdentityTracker;
use crate::registry::ConnectionRegistry;
use crate::types::{ConnId, UserTypingNotice, ADMIN_TYPING_OUT, AI_TYPING};

/// Visitor `user` is typing: tell the operator, if one is connected.
pub fn relay_user_typing(
    registry: &ConnectionRegistry,
    identities: &IdentityTracker,
    user: ConnId,
) -> bool {
    let Some(admin) = registry.current_admin() else {
        debug!(conn_id = user, "no admin connected; typing signal dropped");
        return false;
    };
    let notice = UserTypingNotice::new(identities.display_name_for(user));
    match serde_json::to_string(&notice) {
        Ok(payload) => admin.send(payload),
        Err(_) => false,
    }
}

/// Operator is typing: tell the visitor, if one is connected.
pub fn relay_admin_typing(registry: &ConnectionRegistry) -> bool {
    registry
        .current_user()
        .is_some_and(|user| user.send(ADMIN_TYPING_OUT))
}

/// The assistant started composing a reply for `user`.
pub fn signal_assistant_typing(registry: &ConnectionRegistry, user: ConnId) -> bool {
    registry
        .user_if_current(user)
        .is_some_and(|conn| conn.send(AI_TYPING))
}
