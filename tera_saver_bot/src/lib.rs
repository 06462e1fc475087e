//! Source code for Tera Saver Bot, a Telegram bot that relays Terabox
//! videos into chats, gated behind a channel subscription and a
//! time-limited ad-view verification token.

/// Startup configuration, read from a TOML file.
mod config;

/// The persisted user/API-selector store.
mod store;

/// The access gate: subscription, verification window, tokens.
mod gate;

/// Clients for the link resolver and URL shortener endpoints.
mod apis;

/// Functions that perform stuff via the bot.
mod actions;

/// Functions that handle events from Telegram.
mod handlers;

/// Entry function that starts the bot.
mod entry;
pub use entry::*;

/// How long a successful verification stays valid.
/// A verification exactly this old still counts.
pub const VERIFY_WINDOW_SECS: i64 = 12 * 60 * 60;
