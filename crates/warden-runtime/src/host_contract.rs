//! Contracts between the RBAC plugin and the host agent runtime.
//!
//! The host owns the event bus, the logger sink, and hook scheduling; the
//! plugin only consumes these shapes. Hook handlers are synchronous: no
//! engine decision performs I/O, and log emission is fire-and-forget.

use tracing::{error, info, warn};

/// Tool-call hooks should run ahead of business-logic handlers so a block
/// verdict short-circuits execution.
pub const BEFORE_TOOL_CALL_PRIORITY: i32 = -100;

/// Trait contract for `HostLogger` behavior.
///
/// Sinks are best-effort; callers never observe emission failures.
pub trait HostLogger: Send + Sync {
    fn info(&self, line: &str);
    fn warn(&self, line: &str);
    fn error(&self, line: &str);
}

#[derive(Debug, Clone, Copy, Default)]
/// Host logger forwarding each line to the `tracing` facade.
pub struct TracingHostLogger;

impl HostLogger for TracingHostLogger {
    fn info(&self, line: &str) {
        info!("{line}");
    }

    fn warn(&self, line: &str) {
        warn!("{line}");
    }

    fn error(&self, line: &str) {
        error!("{line}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `ToolCallEvent` used across Warden components.
pub struct ToolCallEvent {
    pub tool_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Tool-call context; `session_key` is absent for internal host calls.
pub struct ToolCallContext {
    pub session_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Block verdict returned to the host; `None` from the hook means the call
/// proceeds untouched.
pub struct ToolCallVerdict {
    pub block: bool,
    pub block_reason: String,
}

impl ToolCallVerdict {
    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            block: true,
            block_reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `MessageReceivedEvent` used across Warden components.
pub struct MessageReceivedEvent {
    pub content: String,
    pub from: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Inbound message context; `channel_id` is absent for non-channelized
/// session scopes.
pub struct MessageContext {
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `MessageSendingEvent` used across Warden components.
pub struct MessageSendingEvent {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Replacement body for an outgoing message.
pub struct OutboundOverride {
    pub content: String,
}

/// Trait contract for `AgentEventHooks` behavior.
///
/// The host guarantees that `message_received` and `message_sending` for a
/// given conversation arrive serially, in that order.
pub trait AgentEventHooks: Send + Sync {
    fn before_tool_call(
        &self,
        event: &ToolCallEvent,
        ctx: &ToolCallContext,
    ) -> Option<ToolCallVerdict>;

    fn message_received(&self, event: &MessageReceivedEvent, ctx: &MessageContext);

    fn message_sending(&self, event: &MessageSendingEvent) -> Option<OutboundOverride>;
}
