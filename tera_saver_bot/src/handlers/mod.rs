use std::sync::{Arc, LazyLock};

use regex::Regex;
use teloxide::{prelude::*, types::Me, RequestError};

use crate::{actions, config::Config, gate, store::Store};

pub mod commands;

/// Messages whose text carries one of the recognized share hosts.
static QUALIFYING_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://(1024terabox|teraboxapp|freeterabox)\.com/s/")
        .expect("Regex will always be valid")
});

pub async fn handle_message(
    bot: Bot,
    me: Me,
    message: Message,
    store: Arc<Store>,
    config: Arc<Config>,
    http: reqwest::Client,
) -> Result<(), RequestError> {
    let Some(text) = message.text() else {
        return Ok(());
    };

    if let Some(params) = commands::CommandParams::new(&bot, &me, &message, &store, &config) {
        if let Some(future) = params.dispatch() {
            return future.await;
        }
        // A slash message that matches no command is ignored.
        return Ok(());
    }

    if QUALIFYING_LINK.is_match(text) {
        return handle_qualifying_link(&bot, &me, &message, text, &store, &config, &http).await;
    }

    Ok(())
}

/// The gated link flow: subscription, then verification freshness,
/// then the actual relay.
async fn handle_qualifying_link(
    bot: &Bot,
    me: &Me,
    message: &Message,
    text: &str,
    store: &Store,
    config: &Config,
    http: &reqwest::Client,
) -> Result<(), RequestError> {
    let Some(user) = &message.from else {
        return Ok(());
    };
    let chat_id = message.chat.id;
    let user_id = user.id.0.to_string();

    if !gate::is_subscribed(bot, config, user.id).await {
        return actions::send_subscribe_prompt(bot, chat_id, config, actions::SUBSCRIBE_TO_USE_TEXT)
            .await;
    }

    let now = chrono::Utc::now().timestamp();
    let record = store.get(&user_id).await;

    if gate::is_verification_fresh(record.as_ref(), now) {
        actions::relay_video(bot, http, chat_id, &user_id, text, store, config).await
    } else {
        // First contact; make sure a record exists.
        if record.is_none() {
            store.upsert(&user_id, |_| {}).await;
        }
        actions::send_verification_prompt(bot, http, me, chat_id, user.id, store, config).await
    }
}
