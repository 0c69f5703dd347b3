//! RBAC plugin wiring the decision engine into the host's event hooks.
//!
//! Registration freezes a validated policy; every hook decision reads the
//! current policy snapshot through an atomic reference, so a reload swaps
//! policies without tearing in-flight decisions. The plugin keeps no
//! per-call state between hook invocations beyond the audit rate-limiter
//! windows and the single pending-block slot.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arc_swap::{ArcSwap, ArcSwapOption};
use serde_json::{json, Value};
use warden_rbac::{
    block_response_for, check_tool_access, is_admin_by_tools, load_policy_file,
    match_blocked_command, parse_policy, parse_session_key, resolve_role, AuditRateLimiter,
    FailSafeMode, ParsedSessionKey, PendingCommandBlock, Policy,
};

use crate::host_contract::{
    AgentEventHooks, HostLogger, MessageContext, MessageReceivedEvent, MessageSendingEvent,
    OutboundOverride, ToolCallContext, ToolCallEvent, ToolCallVerdict,
};
use crate::time_utils::current_unix_timestamp_ms;

pub const FAIL_SAFE_DENY_REASON: &str = "Access denied: unrecognized session (RBAC failSafe)";
pub const GENERIC_DENY_REASON: &str = "Access denied by RBAC policy";

/// Public struct `RbacPlugin` used across Warden components.
pub struct RbacPlugin {
    policy: ArcSwap<Policy>,
    limiter: ArcSwapOption<AuditRateLimiter>,
    pending_block: PendingCommandBlock,
    logger: Arc<dyn HostLogger>,
}

impl std::fmt::Debug for RbacPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RbacPlugin")
            .field("policy", &self.policy.load())
            .field("limiter", &"..")
            .field("pending_block", &"..")
            .field("logger", &"..")
            .finish()
    }
}

impl RbacPlugin {
    /// Validates `document` and registers the plugin. An invalid policy is
    /// logged and aborts registration; no partially configured plugin is
    /// ever returned.
    pub fn register(document: &Value, logger: Arc<dyn HostLogger>) -> Result<Self> {
        let policy = match parse_policy(document) {
            Ok(policy) => policy,
            Err(error) => {
                logger.error(&format!("rbac: invalid policy: {error}"));
                return Err(error).context("rbac policy rejected at registration");
            }
        };
        Ok(Self::from_policy(policy, logger))
    }

    /// Registers from a policy file on disk.
    pub fn register_from_file(path: &Path, logger: Arc<dyn HostLogger>) -> Result<Self> {
        let policy = match load_policy_file(path) {
            Ok(policy) => policy,
            Err(error) => {
                logger.error(&format!("rbac: invalid policy: {error:#}"));
                return Err(error);
            }
        };
        Ok(Self::from_policy(policy, logger))
    }

    fn from_policy(policy: Policy, logger: Arc<dyn HostLogger>) -> Self {
        let plugin = Self {
            limiter: ArcSwapOption::from(build_audit_limiter(&policy)),
            policy: ArcSwap::from_pointee(policy),
            pending_block: PendingCommandBlock::new(),
            logger,
        };
        plugin.log_policy_applied("registered");
        plugin
    }

    /// Swaps in a freshly validated policy; an invalid document keeps the
    /// last-good policy in place.
    pub fn reload_from_value(&self, document: &Value) -> Result<()> {
        let policy = match parse_policy(document) {
            Ok(policy) => policy,
            Err(error) => {
                self.logger
                    .error(&format!("rbac: reload rejected, keeping active policy: {error}"));
                return Err(error).context("rbac policy rejected at reload");
            }
        };
        self.limiter.store(build_audit_limiter(&policy));
        self.policy.store(Arc::new(policy));
        self.log_policy_applied("reloaded");
        Ok(())
    }

    /// Current policy snapshot.
    pub fn policy(&self) -> Arc<Policy> {
        self.policy.load_full()
    }

    fn log_policy_applied(&self, action: &str) {
        let policy = self.policy.load();
        self.logger.info(&format!(
            "rbac: {action} roles={} defaultRole=\"{}\" failSafe=\"{}\"",
            policy.roles.len(),
            policy.default_role,
            policy.fail_safe.as_str()
        ));
        for warning in &policy.warnings {
            self.logger.warn(&format!("rbac: policy warning: {warning}"));
        }
    }

    fn emit_blocked_line(
        &self,
        policy: &Policy,
        tool_name: &str,
        parsed: &ParsedSessionKey,
        role: &str,
        reason: &str,
    ) {
        if !policy.log_blocked {
            return;
        }
        let now_ms = current_unix_timestamp_ms();
        if let Some(limiter) = self.limiter.load_full() {
            if !limiter.should_log(&parsed.peer_id, now_ms) {
                if limiter.suppressed_in_window(&parsed.peer_id, now_ms) == 1 {
                    self.logger.warn(&format!(
                        "rbac: rate limit exceeded for peer=\"{}\", suppressing logs for 60s",
                        parsed.peer_id
                    ));
                }
                return;
            }
        }
        self.logger.warn(&format!(
            "rbac: BLOCKED tool=\"{tool_name}\" peer=\"{}\" channel=\"{}\" role=\"{role}\" reason=\"{reason}\"",
            parsed.peer_id,
            parsed.channel.as_deref().unwrap_or_default()
        ));
    }
}

impl AgentEventHooks for RbacPlugin {
    fn before_tool_call(
        &self,
        event: &ToolCallEvent,
        ctx: &ToolCallContext,
    ) -> Option<ToolCallVerdict> {
        // Internal and system calls carry no session key and are never gated.
        let session_key = ctx.session_key.as_deref()?;
        let policy = self.policy.load_full();

        let Some(parsed) = parse_session_key(session_key) else {
            return match policy.fail_safe {
                FailSafeMode::Deny => {
                    if policy.log_blocked {
                        self.logger.warn(&format!(
                            "rbac: BLOCKED tool=\"{}\" session=\"{session_key}\" reason=\"{FAIL_SAFE_DENY_REASON}\"",
                            event.tool_name
                        ));
                    }
                    Some(ToolCallVerdict::block(FAIL_SAFE_DENY_REASON))
                }
                FailSafeMode::Allow => None,
            };
        };

        let role = resolve_role(&parsed.peer_id, parsed.channel.as_deref(), &policy);
        let check = check_tool_access(&event.tool_name, &role, &policy);
        if check.allowed {
            if policy.log_allowed {
                self.logger.info(&format!(
                    "rbac: ALLOWED tool=\"{}\" peer=\"{}\" channel=\"{}\" role=\"{role}\"",
                    event.tool_name,
                    parsed.peer_id,
                    parsed.channel.as_deref().unwrap_or_default()
                ));
            }
            return None;
        }

        let reason = check
            .reason
            .unwrap_or_else(|| GENERIC_DENY_REASON.to_string());
        self.emit_blocked_line(&policy, &event.tool_name, &parsed, &role, &reason);
        Some(ToolCallVerdict::block(reason))
    }

    fn message_received(&self, event: &MessageReceivedEvent, ctx: &MessageContext) {
        let policy = self.policy.load_full();
        let Some(commands) = policy.system_commands.as_ref() else {
            return;
        };
        let Some(command) = match_blocked_command(&event.content, commands) else {
            return;
        };
        let role = resolve_role(&event.from, ctx.channel_id.as_deref(), &policy);
        if is_admin_by_tools(&role, &policy) {
            return;
        }
        self.pending_block.arm(&command, current_unix_timestamp_ms());
        self.logger.info(&format!(
            "rbac: GUARD command=\"{command}\" peer=\"{}\" channel=\"{}\" role=\"{role}\"",
            event.from,
            ctx.channel_id.as_deref().unwrap_or_default()
        ));
    }

    fn message_sending(&self, _event: &MessageSendingEvent) -> Option<OutboundOverride> {
        let pending = self.pending_block.consume(current_unix_timestamp_ms())?;
        let policy = self.policy.load_full();
        let commands = policy.system_commands.as_ref()?;
        Some(OutboundOverride {
            content: block_response_for(&pending.command, commands).to_string(),
        })
    }
}

fn build_audit_limiter(policy: &Policy) -> Option<Arc<AuditRateLimiter>> {
    policy
        .rate_limit
        .map(|spec| Arc::new(AuditRateLimiter::new(spec.max_blocked_per_minute)))
}

/// Diagnostic snapshot of the active policy for host status surfaces.
pub fn policy_summary_json(policy: &Policy) -> Value {
    json!({
        "role_count": policy.roles.len(),
        "roles": policy
            .roles
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>(),
        "default_role": policy.default_role,
        "fail_safe": policy.fail_safe.as_str(),
        "log_blocked": policy.log_blocked,
        "log_allowed": policy.log_allowed,
        "tool_groups": policy.tool_groups.keys().collect::<Vec<_>>(),
        "rate_limit_max_blocked_per_minute": policy
            .rate_limit
            .map(|spec| spec.max_blocked_per_minute),
        "system_commands_mode": policy
            .system_commands
            .as_ref()
            .map(|commands| commands.mode.as_str()),
        "warning_count": policy.warnings.len(),
    })
}
