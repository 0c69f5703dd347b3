//! Slash-command interception for non-administrator senders.
//!
//! Detection happens on message ingress; the actual substitution happens on
//! egress, bridged by a single pending-block slot. The host serializes the
//! message-received / message-sending pair for a conversation, so one slot
//! is sufficient; a staleness cutoff protects against dropped egress events.

use std::sync::Mutex;

use crate::policy_config::{Policy, Selector, SystemCommandMode, SystemCommandsSpec};

pub const PENDING_BLOCK_STALE_MS: u64 = 10_000;

const HELP_COMMAND: &str = "/help";

/// Returns the normalized `/command` head when `content` is a command the
/// sender must not reach, `None` otherwise.
///
/// When `guest_help` is configured, `/help` is intercepted unconditionally,
/// including in allowlist mode where `/help` may be listed as allowed; the
/// substitute help text is the whole point of that setting.
pub fn match_blocked_command(content: &str, commands: &SystemCommandsSpec) -> Option<String> {
    let normalized = content.trim().to_lowercase();
    if !normalized.starts_with('/') {
        return None;
    }
    let head = normalized
        .split_whitespace()
        .next()
        .unwrap_or(normalized.as_str())
        .to_string();

    if commands.guest_help.is_some() && head == HELP_COMMAND {
        return Some(head);
    }

    match commands.mode {
        SystemCommandMode::Allowlist => {
            if commands.allowed.iter().any(|allowed| allowed == &head) {
                None
            } else {
                Some(head)
            }
        }
        SystemCommandMode::Blocklist => {
            if commands.blocked.iter().any(|blocked| blocked == &head) {
                Some(head)
            } else {
                None
            }
        }
    }
}

/// Substitute body for a blocked command: the configured guest help for
/// `/help`, the generic block response otherwise.
pub fn block_response_for<'a>(command: &str, commands: &'a SystemCommandsSpec) -> &'a str {
    if command == HELP_COMMAND {
        if let Some(guest_help) = commands.guest_help.as_deref() {
            return guest_help;
        }
    }
    commands.block_response.as_str()
}

/// Administrators bypass command guarding entirely; admin status is defined
/// as holding a role whose tools selector is the wildcard.
pub fn is_admin_by_tools(role_name: &str, policy: &Policy) -> bool {
    policy
        .role(role_name)
        .map(|role| matches!(role.tools, Selector::Any))
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `PendingBlock` used across Warden components.
pub struct PendingBlock {
    pub command: String,
    pub armed_at_ms: u64,
}

#[derive(Debug, Default)]
/// Single-slot ingress-to-egress bridge for a detected blocked command.
pub struct PendingCommandBlock {
    slot: Mutex<Option<PendingBlock>>,
}

impl PendingCommandBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the slot; any previously armed block is overwritten.
    pub fn arm(&self, command: &str, now_ms: u64) {
        let mut slot = match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(PendingBlock {
            command: command.to_string(),
            armed_at_ms: now_ms,
        });
    }

    /// Atomically empties the slot. An entry older than the staleness
    /// cutoff is discarded rather than returned; that path only triggers
    /// when the host dropped a message-sending event.
    pub fn consume(&self, now_ms: u64) -> Option<PendingBlock> {
        let mut slot = match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let pending = slot.take()?;
        if now_ms.saturating_sub(pending.armed_at_ms) > PENDING_BLOCK_STALE_MS {
            return None;
        }
        Some(pending)
    }
}
