//! Pure builders for the plugin-contributed bot menu.
//!
//! Telegram accepts at most 100 menu commands, each named with lowercase
//! letters, digits, and underscores up to 32 characters. The builders
//! normalize plugin-declared specs, reject invalid or colliding entries
//! with human-readable issues, and cap the final list without reordering.

use std::collections::BTreeSet;

pub const TELEGRAM_MENU_COMMAND_CAP: usize = 100;
const MENU_COMMAND_MAX_LENGTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Plugin-declared menu entry before normalization.
pub struct MenuCommandSpec {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `MenuCommand` used across Warden components.
pub struct MenuCommand {
    pub command: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Build output: accepted commands plus one issue per rejected spec.
pub struct MenuCommandBuild {
    pub commands: Vec<MenuCommand>,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `CappedMenuCommands` used across Warden components.
pub struct CappedMenuCommands {
    pub commands: Vec<MenuCommand>,
    pub total: usize,
    pub cap: usize,
    pub overflow: usize,
}

fn normalize_menu_command_name(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('/')
        .to_lowercase()
}

fn is_valid_menu_command_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MENU_COMMAND_MAX_LENGTH
        && name
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
}

/// Normalizes plugin specs into menu commands, claiming each accepted name
/// in `existing_commands` so later plugins cannot shadow it.
pub fn build_plugin_menu_commands(
    specs: &[MenuCommandSpec],
    existing_commands: &mut BTreeSet<String>,
) -> MenuCommandBuild {
    let mut build = MenuCommandBuild::default();
    let mut added_this_pass: BTreeSet<String> = BTreeSet::new();

    for spec in specs {
        let name = normalize_menu_command_name(&spec.name);
        if !is_valid_menu_command_name(&name) {
            build.issues.push(format!(
                "menu command \"{}\" rejected: name must match [a-z0-9_] and be at most \
                 {MENU_COMMAND_MAX_LENGTH} chars",
                spec.name.trim()
            ));
            continue;
        }
        let description = spec.description.trim();
        if description.is_empty() {
            build.issues.push(format!(
                "menu command \"{name}\" rejected: description is empty"
            ));
            continue;
        }
        if added_this_pass.contains(&name) {
            build.issues.push(format!(
                "menu command \"{name}\" rejected: duplicate within this registration"
            ));
            continue;
        }
        if existing_commands.contains(&name) {
            build.issues.push(format!(
                "menu command \"{name}\" rejected: conflicts with an already registered command"
            ));
            continue;
        }
        existing_commands.insert(name.clone());
        added_this_pass.insert(name.clone());
        build.commands.push(MenuCommand {
            command: name,
            description: description.to_string(),
        });
    }

    build
}

/// Caps a merged command list for the platform menu API, preserving order.
pub fn build_capped_menu_commands(
    all_commands: Vec<MenuCommand>,
    max_commands: Option<usize>,
) -> CappedMenuCommands {
    let cap = max_commands.unwrap_or(TELEGRAM_MENU_COMMAND_CAP);
    let total = all_commands.len();
    let mut commands = all_commands;
    commands.truncate(cap);
    CappedMenuCommands {
        overflow: total.saturating_sub(cap),
        commands,
        total,
        cap,
    }
}
