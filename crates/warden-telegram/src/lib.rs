//! Telegram menu-command preparation for Warden plugins.
//!
//! Builds the capped, deduplicated command list that plugins contribute to
//! the bot menu, and defines the registration-adapter contract used to push
//! it to the Telegram API. Rendering and transport stay with the host.

pub mod menu_commands;
pub mod menu_registration;

pub use menu_commands::*;
pub use menu_registration::*;
