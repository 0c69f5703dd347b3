//! Policy document loading, normalization, and validation.
//!
//! The loader accepts an untyped JSON value (typically deserialized by the
//! host from a JSON or YAML policy file), walks it structurally, and either
//! returns a fully validated [`Policy`] or a [`PolicyConfigError`] naming
//! the offending document path. Non-fatal findings accumulate as warnings
//! on the returned policy; the host logs them but keeps registering.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_ROLE_NAME: &str = "guest";

const WILDCARD_MARKER: &str = "*";
const GROUP_REFERENCE_PREFIX: char = '@';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `ConfigErrorKind` values.
pub enum ConfigErrorKind {
    WrongType,
    MissingField,
    RoleOrdering,
    UnknownReference,
    InvalidValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path} {message}")]
/// Load-time policy rejection carrying the offending document path.
pub struct PolicyConfigError {
    pub kind: ConfigErrorKind,
    pub path: String,
    pub message: String,
}

fn config_error(
    kind: ConfigErrorKind,
    path: impl Into<String>,
    message: impl Into<String>,
) -> PolicyConfigError {
    PolicyConfigError {
        kind,
        path: path.into(),
        message: message.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Wildcard-or-explicit-list selector used by role matchers.
///
/// The `"*"` sentinel exists only in the policy document; internal code
/// matches on the variants.
pub enum Selector {
    Any,
    Listed(Vec<String>),
}

impl Selector {
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    /// Wildcard, or exact membership in the explicit list.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Listed(entries) => entries.iter().any(|entry| entry == value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `RoleSpec` used across Warden components.
pub struct RoleSpec {
    pub users: Selector,
    pub tools: Selector,
    pub channels: Selector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Enumerates supported `FailSafeMode` values.
pub enum FailSafeMode {
    #[default]
    Deny,
    Allow,
}

impl FailSafeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deny => "deny",
            Self::Allow => "allow",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Enumerates supported `SystemCommandMode` values.
pub enum SystemCommandMode {
    #[default]
    Blocklist,
    Allowlist,
}

impl SystemCommandMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blocklist => "blocklist",
            Self::Allowlist => "allowlist",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Audit rate-limit settings for blocked-call log lines.
pub struct AuditRateLimitSpec {
    pub max_blocked_per_minute: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `SystemCommandsSpec` used across Warden components.
pub struct SystemCommandsSpec {
    pub mode: SystemCommandMode,
    pub blocked: Vec<String>,
    pub allowed: Vec<String>,
    pub guest_help: Option<String>,
    pub block_response: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Validated, immutable RBAC policy.
///
/// `roles` preserves document declaration order; role resolution is
/// first-match over that order.
pub struct Policy {
    pub roles: Vec<(String, RoleSpec)>,
    pub default_role: String,
    pub log_blocked: bool,
    pub log_allowed: bool,
    pub fail_safe: FailSafeMode,
    pub tool_groups: BTreeMap<String, Vec<String>>,
    pub rate_limit: Option<AuditRateLimitSpec>,
    pub system_commands: Option<SystemCommandsSpec>,
    pub warnings: Vec<String>,
}

impl Policy {
    pub fn role(&self, name: &str) -> Option<&RoleSpec> {
        self.roles
            .iter()
            .find(|(role_name, _)| role_name == name)
            .map(|(_, spec)| spec)
    }
}

/// Reads and parses a policy document from disk.
///
/// A missing or malformed file is an error; the engine never registers
/// without a valid policy.
pub fn load_policy_file(path: &Path) -> anyhow::Result<Policy> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rbac policy file {}", path.display()))?;
    let document = serde_json::from_str::<Value>(&raw)
        .with_context(|| format!("failed to parse rbac policy file {}", path.display()))?;
    let policy = parse_policy(&document)
        .with_context(|| format!("invalid rbac policy file {}", path.display()))?;
    Ok(policy)
}

/// Validates an untyped policy document and freezes it into a [`Policy`].
///
/// Validation stops at the first structural failure; warnings accumulate.
/// Unknown top-level keys are ignored for forward compatibility.
pub fn parse_policy(document: &Value) -> Result<Policy, PolicyConfigError> {
    let root = document.as_object().ok_or_else(|| {
        config_error(ConfigErrorKind::WrongType, "policy", "must be an object")
    })?;

    let mut warnings = Vec::new();

    let roles_value = root
        .get("roles")
        .and_then(Value::as_object)
        .filter(|entries| !entries.is_empty())
        .ok_or_else(|| {
            config_error(
                ConfigErrorKind::MissingField,
                "roles",
                "must be a non-empty object",
            )
        })?;

    let mut roles: Vec<(String, RoleSpec)> = Vec::with_capacity(roles_value.len());
    let mut first_wildcard_users_role: Option<String> = None;
    for (role_name, role_value) in roles_value {
        let spec = parse_role(role_name, role_value, &mut warnings)?;
        if spec.users.is_any() {
            if first_wildcard_users_role.is_none() {
                first_wildcard_users_role = Some(role_name.clone());
            }
        } else if let Some(wildcard_role) = first_wildcard_users_role.as_deref() {
            return Err(config_error(
                ConfigErrorKind::RoleOrdering,
                format!("roles.{role_name}"),
                format!(
                    "has specific users but is declared after wildcard-users role \
                     \"{wildcard_role}\"; first-match resolution would never reach it"
                ),
            ));
        }
        roles.push((role_name.clone(), spec));
    }

    let default_role = match root.get("defaultRole") {
        None => DEFAULT_ROLE_NAME.to_string(),
        Some(value) => value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                config_error(ConfigErrorKind::WrongType, "defaultRole", "must be a string")
            })?,
    };
    if !roles.iter().any(|(name, _)| name == &default_role) {
        return Err(config_error(
            ConfigErrorKind::UnknownReference,
            "defaultRole",
            format!("\"{default_role}\" is not defined in roles"),
        ));
    }

    let tool_groups = parse_tool_groups(root.get("toolGroups"))?;

    for (role_name, spec) in &roles {
        let Selector::Listed(patterns) = &spec.tools else {
            continue;
        };
        for pattern in patterns {
            let Some(group_name) = pattern.strip_prefix(GROUP_REFERENCE_PREFIX) else {
                continue;
            };
            if !tool_groups.contains_key(group_name) {
                return Err(config_error(
                    ConfigErrorKind::UnknownReference,
                    format!("roles.{role_name}.tools"),
                    format!("references undefined tool group \"@{group_name}\""),
                ));
            }
        }
    }

    let fail_safe = match root.get("failSafe") {
        None => FailSafeMode::default(),
        Some(value) => match value.as_str() {
            Some("deny") => FailSafeMode::Deny,
            Some("allow") => FailSafeMode::Allow,
            _ => {
                return Err(config_error(
                    ConfigErrorKind::InvalidValue,
                    "failSafe",
                    "must be \"deny\" or \"allow\"",
                ))
            }
        },
    };

    let log_blocked = parse_optional_bool(root.get("logBlocked"), "logBlocked", true)?;
    let log_allowed = parse_optional_bool(root.get("logAllowed"), "logAllowed", false)?;

    let rate_limit = match root.get("rateLimit") {
        None | Some(Value::Null) => None,
        Some(value) => Some(parse_rate_limit(value)?),
    };

    let system_commands = match root.get("systemCommands") {
        None | Some(Value::Null) => None,
        Some(value) => Some(parse_system_commands(value)?),
    };

    Ok(Policy {
        roles,
        default_role,
        log_blocked,
        log_allowed,
        fail_safe,
        tool_groups,
        rate_limit,
        system_commands,
        warnings,
    })
}

fn parse_role(
    role_name: &str,
    role_value: &Value,
    warnings: &mut Vec<String>,
) -> Result<RoleSpec, PolicyConfigError> {
    if !role_value.is_object() {
        return Err(config_error(
            ConfigErrorKind::WrongType,
            format!("roles.{role_name}"),
            "must be an object",
        ));
    }

    let users = parse_selector(
        role_value.get("users"),
        format!("roles.{role_name}.users"),
        false,
    )?;
    let tools = parse_selector(
        role_value.get("tools"),
        format!("roles.{role_name}.tools"),
        false,
    )?;
    let channels = parse_selector(
        role_value.get("channels"),
        format!("roles.{role_name}.channels"),
        true,
    )?;

    if matches!(&tools, Selector::Listed(entries) if entries.is_empty()) {
        warnings.push(format!(
            "role \"{role_name}\" has an empty tools list and will block every tool"
        ));
    }
    if matches!(&channels, Selector::Listed(entries) if entries.is_empty()) {
        warnings.push(format!(
            "role \"{role_name}\" has an empty channels list and will never match"
        ));
    }

    Ok(RoleSpec {
        users,
        tools,
        channels,
    })
}

fn parse_selector(
    value: Option<&Value>,
    path: String,
    default_any: bool,
) -> Result<Selector, PolicyConfigError> {
    match value {
        None if default_any => Ok(Selector::Any),
        Some(Value::String(marker)) if marker.as_str() == WILDCARD_MARKER => Ok(Selector::Any),
        Some(Value::Array(entries)) => {
            let mut listed = Vec::with_capacity(entries.len());
            for entry in entries {
                let Some(entry) = entry.as_str() else {
                    return Err(config_error(
                        ConfigErrorKind::WrongType,
                        path,
                        "must be \"*\" or string[]",
                    ));
                };
                listed.push(entry.to_string());
            }
            Ok(Selector::Listed(listed))
        }
        _ => Err(config_error(
            ConfigErrorKind::WrongType,
            path,
            "must be \"*\" or string[]",
        )),
    }
}

fn parse_optional_bool(
    value: Option<&Value>,
    path: &str,
    default: bool,
) -> Result<bool, PolicyConfigError> {
    match value {
        None => Ok(default),
        Some(value) => value.as_bool().ok_or_else(|| {
            config_error(ConfigErrorKind::WrongType, path, "must be a boolean")
        }),
    }
}

fn parse_tool_groups(
    value: Option<&Value>,
) -> Result<BTreeMap<String, Vec<String>>, PolicyConfigError> {
    let mut groups = BTreeMap::new();
    let Some(value) = value else {
        return Ok(groups);
    };
    let entries = value.as_object().ok_or_else(|| {
        config_error(ConfigErrorKind::WrongType, "toolGroups", "must be an object")
    })?;
    for (group_name, tools_value) in entries {
        let path = format!("toolGroups.{group_name}");
        let tools = tools_value.as_array().ok_or_else(|| {
            config_error(ConfigErrorKind::WrongType, path.clone(), "must be string[]")
        })?;
        let mut listed = Vec::with_capacity(tools.len());
        for tool in tools {
            let Some(tool) = tool.as_str() else {
                return Err(config_error(
                    ConfigErrorKind::WrongType,
                    path,
                    "must be string[]",
                ));
            };
            listed.push(tool.to_string());
        }
        groups.insert(group_name.clone(), listed);
    }
    Ok(groups)
}

fn parse_rate_limit(value: &Value) -> Result<AuditRateLimitSpec, PolicyConfigError> {
    if !value.is_object() {
        return Err(config_error(
            ConfigErrorKind::WrongType,
            "rateLimit",
            "must be an object or null",
        ));
    }
    let max = value
        .get("maxBlockedPerMinute")
        .and_then(Value::as_u64)
        .filter(|max| *max >= 1)
        .ok_or_else(|| {
            config_error(
                ConfigErrorKind::InvalidValue,
                "rateLimit.maxBlockedPerMinute",
                "must be a number >= 1",
            )
        })?;
    Ok(AuditRateLimitSpec {
        max_blocked_per_minute: u32::try_from(max).unwrap_or(u32::MAX),
    })
}

fn parse_system_commands(value: &Value) -> Result<SystemCommandsSpec, PolicyConfigError> {
    let entries = value.as_object().ok_or_else(|| {
        config_error(
            ConfigErrorKind::WrongType,
            "systemCommands",
            "must be an object or null",
        )
    })?;

    let mode = match entries.get("mode") {
        None => SystemCommandMode::default(),
        Some(value) => match value.as_str() {
            Some("blocklist") => SystemCommandMode::Blocklist,
            Some("allowlist") => SystemCommandMode::Allowlist,
            _ => {
                return Err(config_error(
                    ConfigErrorKind::InvalidValue,
                    "systemCommands.mode",
                    "must be \"blocklist\" or \"allowlist\"",
                ))
            }
        },
    };

    let blocked = parse_command_list(entries.get("blocked"), "systemCommands.blocked")?;
    let allowed = parse_command_list(entries.get("allowed"), "systemCommands.allowed")?;

    match mode {
        SystemCommandMode::Blocklist => {
            if blocked.as_ref().map(Vec::is_empty).unwrap_or(true) {
                return Err(config_error(
                    ConfigErrorKind::MissingField,
                    "systemCommands.blocked",
                    "must be a non-empty string[] in blocklist mode",
                ));
            }
        }
        SystemCommandMode::Allowlist => {
            if allowed.is_none() {
                return Err(config_error(
                    ConfigErrorKind::MissingField,
                    "systemCommands.allowed",
                    "must be a string[] in allowlist mode",
                ));
            }
        }
    }

    let guest_help = match entries.get("guestHelp") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| {
                    config_error(
                        ConfigErrorKind::WrongType,
                        "systemCommands.guestHelp",
                        "must be a string or null",
                    )
                })?,
        ),
    };

    let block_response = entries
        .get("blockResponse")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            config_error(
                ConfigErrorKind::MissingField,
                "systemCommands.blockResponse",
                "must be a string",
            )
        })?;

    Ok(SystemCommandsSpec {
        mode,
        blocked: blocked.unwrap_or_default(),
        allowed: allowed.unwrap_or_default(),
        guest_help,
        block_response,
    })
}

fn parse_command_list(
    value: Option<&Value>,
    path: &str,
) -> Result<Option<Vec<String>>, PolicyConfigError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let entries = value.as_array().ok_or_else(|| {
        config_error(ConfigErrorKind::WrongType, path, "must be string[]")
    })?;
    let mut commands = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(entry) = entry.as_str() else {
            return Err(config_error(
                ConfigErrorKind::WrongType,
                path,
                "must be string[]",
            ));
        };
        commands.push(normalize_command(entry));
    }
    Ok(Some(commands))
}

/// Canonical command form: trimmed, lowercased, `/`-prefixed.
pub fn normalize_command(raw: &str) -> String {
    let normalized = raw.trim().to_lowercase();
    if normalized.starts_with('/') {
        normalized
    } else {
        format!("/{normalized}")
    }
}
