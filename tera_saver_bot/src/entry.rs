use std::{fs, sync::Arc};
use teloxide::{dptree::deps, prelude::*};

use crate::{config::Config, handlers, store::Store};

/// # Panics
///
/// Panics if the key file or the config are missing or broken,
/// or if Telegram won't take our command list.
pub async fn entry() {
    let key = fs::read_to_string(match cfg!(debug_assertions) {
        true => "key_debug",
        false => "key",
    })
    .expect("Could not load bot key file!");

    let bot = Bot::new(key);

    let config = Arc::new(Config::load());
    let store = Store::open(config.store.clone(), config.shortener_apis.clone()).await;
    let http = reqwest::Client::new();

    bot.set_my_commands(handlers::commands::Command::generate_bot_commands())
        .await
        .expect("Failed to set bot commands!");

    tokio::spawn(saver_bot_commons::serve_liveness(config.liveness_port));

    log::info!("Creating the handler...");

    let handler = dptree::entry()
        .branch(Update::filter_message().branch(dptree::endpoint(handlers::handle_message)));

    log::info!("Dispatching the dispatcher!");

    Dispatcher::builder(bot, handler)
        .default_handler(|_| async {})
        .dependencies(deps![store, config, http])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("The dispatcher has shut down.");
}
