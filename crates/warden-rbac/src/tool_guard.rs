//! Tool access decisions against a resolved role.
//!
//! Tool lists expand into an exact bucket (plain names plus `@group`
//! expansions) and a wildcard bucket (`prefix_*` patterns). Exact matches
//! win; a wildcard only matches names strictly longer than its prefix, so
//! `exec_*` covers `exec_shell` but never `exec` itself.

use serde::Serialize;

use crate::policy_config::{Policy, Selector};

const WILDCARD_SUFFIX: &str = "_*";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Public struct `ToolAccessCheck` used across Warden components.
pub struct ToolAccessCheck {
    pub allowed: bool,
    pub role: String,
    pub reason: Option<String>,
}

impl ToolAccessCheck {
    fn allow(role: &str) -> Self {
        Self {
            allowed: true,
            role: role.to_string(),
            reason: None,
        }
    }

    fn deny(role: &str, reason: String) -> Self {
        Self {
            allowed: false,
            role: role.to_string(),
            reason: Some(reason),
        }
    }
}

/// Decides whether `role_name` may invoke `tool_name` under `policy`.
pub fn check_tool_access(tool_name: &str, role_name: &str, policy: &Policy) -> ToolAccessCheck {
    let Some(role) = policy.role(role_name) else {
        return ToolAccessCheck::deny(role_name, format!("Unknown role \"{role_name}\""));
    };

    let patterns = match &role.tools {
        Selector::Any => return ToolAccessCheck::allow(role_name),
        Selector::Listed(patterns) => patterns,
    };

    let mut exact: Vec<&str> = Vec::with_capacity(patterns.len());
    let mut wildcards: Vec<&str> = Vec::new();
    for pattern in patterns {
        if let Some(group_name) = pattern.strip_prefix('@') {
            if let Some(group_tools) = policy.tool_groups.get(group_name) {
                exact.extend(group_tools.iter().map(String::as_str));
            }
            continue;
        }
        if pattern.ends_with(WILDCARD_SUFFIX) {
            wildcards.push(pattern);
        } else {
            exact.push(pattern);
        }
    }

    if exact.contains(&tool_name) {
        return ToolAccessCheck::allow(role_name);
    }

    for pattern in wildcards {
        let prefix = &pattern[..pattern.len() - 1];
        if tool_name.starts_with(prefix) && tool_name.len() > prefix.len() {
            return ToolAccessCheck::allow(role_name);
        }
    }

    ToolAccessCheck::deny(
        role_name,
        format!("Role \"{role_name}\" does not have access to tool \"{tool_name}\""),
    )
}
