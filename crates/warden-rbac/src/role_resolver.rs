//! First-match role resolution over the policy's declared role order.

use crate::policy_config::{Policy, Selector};

/// Maps `(peer_id, channel)` to a role name.
///
/// Roles are evaluated in declaration order; the first role whose users and
/// channels selectors both match wins. A sender without a channel only
/// matches wildcard-channel roles. Falls back to the policy default role.
pub fn resolve_role(peer_id: &str, channel: Option<&str>, policy: &Policy) -> String {
    for (role_name, spec) in &policy.roles {
        if !spec.users.matches(peer_id) {
            continue;
        }
        let channels_match = match (&spec.channels, channel) {
            (Selector::Any, _) => true,
            (Selector::Listed(listed), Some(channel)) => {
                listed.iter().any(|entry| entry == channel)
            }
            (Selector::Listed(_), None) => false,
        };
        if channels_match {
            return role_name.clone();
        }
    }
    policy.default_role.clone()
}
