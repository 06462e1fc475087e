//! Boilerplate shared by the bot crates: process startup and
//! small teloxide helpers that every bot here ends up needing.

use std::future::Future;

use teloxide::{
    prelude::*,
    types::{ChatMemberKind, Recipient},
};

/// The liveness HTTP endpoint, for host-level probing.
pub mod liveness;
pub use liveness::serve_liveness;

/// Initialize logging and run the `closure` in an async runtime.
/// Logging defaults to level `info` unless overridden by the
/// environment variable `RUST_LOG`; this uses the crate
/// [pretty_env_logger][] internally, see its documentation for details.
///
/// [pretty_env_logger]: https://docs.rs/pretty_env_logger
pub fn start_everything(closure: impl Future<Output = ()>) {
    let log_level = std::env::var_os("RUST_LOG")
        .unwrap_or_else(|| std::ffi::OsString::from("info"))
        .into_string()
        .unwrap_or_else(|_| String::from("info"));

    // systemd's journal stamps lines on its own.
    let running_as_systemd_service = std::env::var_os("JOURNAL_STREAM").is_some();

    let mut builder = match running_as_systemd_service {
        true => pretty_env_logger::formatted_builder(),
        false => pretty_env_logger::formatted_timed_builder(),
    };

    builder.parse_filters(&log_level);

    if builder.try_init().is_err() {
        log::error!("Tried to init logger twice!");
    }

    log::info!("hi");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(closure);
}

/// Find out what kind of member a user of this ID is in the specified
/// chat, most likely a channel. Telegram answers with "left" for users
/// it has never seen near the chat, so this errors only when the call
/// itself fails.
pub async fn channel_member_status(
    bot: &Bot,
    user: UserId,
    channel: Recipient,
) -> Result<ChatMemberKind, teloxide::RequestError> {
    Ok(bot.get_chat_member(channel, user).await?.kind)
}
