//! Registration adapter contract for the Telegram menu API.
//!
//! The adapter pushes a prepared command list to the platform: for each
//! scope it deletes the previous menu, then sets the new one. API failures
//! are tolerated per call so one broken scope never aborts the rest; the
//! outcome is summarized in a single log line.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::menu_commands::MenuCommand;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates supported `MenuScope` values.
pub enum MenuScope {
    Default,
    Chat(String),
}

impl MenuScope {
    pub fn describe(&self) -> String {
        match self {
            Self::Default => "default".to_string(),
            Self::Chat(chat_id) => format!("chat:{chat_id}"),
        }
    }
}

#[async_trait]
/// Trait contract for `MenuCommandApi` behavior.
pub trait MenuCommandApi: Send + Sync {
    async fn delete_commands(&self, scope: &MenuScope) -> Result<()>;

    async fn set_commands(&self, scope: &MenuScope, commands: &[MenuCommand]) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Public struct `MenuRegistrationSummary` used across Warden components.
pub struct MenuRegistrationSummary {
    pub scopes_attempted: usize,
    pub scopes_failed: usize,
    pub command_count: usize,
}

/// Registers `commands` on the default scope plus one scope per chat id.
///
/// Delete-then-set per scope; a failed delete still attempts the set. The
/// summary is logged once regardless of failures.
pub async fn register_menu_commands(
    api: &dyn MenuCommandApi,
    commands: &[MenuCommand],
    chat_ids: &[String],
) -> MenuRegistrationSummary {
    let mut scopes = Vec::with_capacity(chat_ids.len() + 1);
    scopes.push(MenuScope::Default);
    scopes.extend(chat_ids.iter().map(|chat_id| MenuScope::Chat(chat_id.clone())));

    let mut summary = MenuRegistrationSummary {
        scopes_attempted: scopes.len(),
        scopes_failed: 0,
        command_count: commands.len(),
    };

    for scope in &scopes {
        let _ = api.delete_commands(scope).await;
        if api.set_commands(scope, commands).await.is_err() {
            summary.scopes_failed += 1;
        }
    }

    info!(
        "telegram menu: registered {} commands across {}/{} scopes",
        summary.command_count,
        summary.scopes_attempted - summary.scopes_failed,
        summary.scopes_attempted
    );
    summary
}
