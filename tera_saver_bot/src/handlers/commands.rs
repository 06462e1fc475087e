use std::{future::Future, pin::Pin};

use chrono::Utc;
use teloxide::{
    requests::Requester,
    types::{BotCommand, Me, Message},
    Bot, RequestError,
};

use crate::{actions, config::Config, gate, store::Store};

pub const COMMANDS: &[Command] = &[START, STATS, BROADCAST, SHOW_API, ROTATE_API, RESET];

pub type Ret = Result<(), RequestError>;
pub type CommandFuture<'a> = Pin<Box<dyn Future<Output = Ret> + Send + 'a>>;

pub struct CommandParams<'a> {
    pub bot: &'a Bot,
    pub bot_me: &'a Me,
    pub message: &'a Message,
    pub store: &'a Store,
    pub config: &'a Config,
    message_text: &'a str,
    command_len: usize,
}

impl<'a> CommandParams<'a> {
    pub fn new<'new>(
        bot: &'new Bot,
        bot_me: &'new Me,
        message: &'new Message,
        store: &'new Store,
        config: &'new Config,
    ) -> Option<CommandParams<'new>> {
        let message_text = message.text()?;

        if !message_text.starts_with('/') {
            return None;
        }

        let command = message_text.split_whitespace().next()?;

        if !command.is_ascii() {
            // Telegram commands must be ASCII.
            // See https://core.telegram.org/bots/api#botcommand
            return None;
        }

        let command_len = command.len();

        Some(CommandParams {
            bot,
            bot_me,
            message,
            store,
            config,
            message_text,
            command_len,
        })
    }

    /// Find the matching command and run it.
    pub fn dispatch(self) -> Option<CommandFuture<'a>> {
        // If the command is "/start@Some_Bot", trim the "@" part,
        // but only if it actually names us.
        let callname = if let Some(username_start) = self.command().find('@') {
            if !self.command()[username_start + '@'.len_utf8()..]
                .eq_ignore_ascii_case(self.bot_me.username())
            {
                // This command is not for us. Ignore.
                return None;
            }
            &self.command()[0..username_start]
        } else {
            self.command()
        };
        for command in COMMANDS {
            if command.is_matching_callname(callname) {
                return Some((command.function)(self));
            }
        }
        None
    }

    /// The command itself.
    ///
    /// If the input is `/broad hello there`,
    /// this is the substring `/broad`.
    #[inline]
    pub fn command(&self) -> &str {
        &self.message_text[..self.command_len]
    }

    /// The parameters after the command.
    ///
    /// If the input is `/broad hello there`,
    /// this is the substring `hello there`.
    #[inline]
    pub fn params(&self) -> &str {
        self.message_text[self.command_len..].trim_start()
    }
}

pub struct Command {
    pub callname: &'static str,
    pub description: &'static str,
    pub function: fn(CommandParams) -> CommandFuture,
    hidden: bool,
}

impl Command {
    pub fn is_matching_callname(&self, command: &str) -> bool {
        self.callname.eq_ignore_ascii_case(command)
    }

    pub fn generate_bot_commands() -> Vec<BotCommand> {
        let mut output = Vec::new();

        for command in COMMANDS {
            if command.hidden {
                continue;
            }

            // Cut off the /
            output.push(BotCommand {
                command: command.callname[1..].to_string(),
                description: command.description.to_string(),
            });
        }

        output
    }
}

///////////////////////////////////////
/////////////////COMMAND DEFINITIONS
///////////////////////////////////////

/// Wraps the function's return value in a pinning closure.
macro_rules! wrap {
    ($thing:expr) => {
        |params| Box::pin($thing(params))
    };
}

/// The fixed response for callers who aren't on the admin list.
const DENIED_TEXT: &str = "🚫 You don't have permission to use this command.";

/// Bail out of an admin command, with the denial message,
/// unless the caller is on the admin list.
macro_rules! admin_only {
    ($params:expr) => {{
        let Some(user) = &$params.message.from else {
            return Ok(());
        };
        if !$params.config.is_admin(user.id) {
            $params
                .bot
                .send_message($params.message.chat.id, DENIED_TEXT)
                .await?;
            return Ok(());
        }
    }};
}

pub const START: Command = Command {
    callname: "/start",
    description: "Start the bot and check your access.",
    function: wrap!(start),
    hidden: false,
};
async fn start(params: CommandParams<'_>) -> Ret {
    let Some(user) = &params.message.from else {
        return Ok(());
    };
    let chat_id = params.message.chat.id;
    let user_id = user.id.0.to_string();

    // "/start {token}" is the verification callback. A matching token
    // verifies immediately, without a subscription check.
    if let Some(token) = params.params().split_whitespace().next() {
        if gate::token_matches_user(token, user.id) {
            let now = Utc::now().timestamp();
            params
                .store
                .upsert(&user_id, |record| record.verify_time = Some(now))
                .await;
            params
                .bot
                .send_message(chat_id, actions::VERIFIED_TEXT)
                .await?;
            return Ok(());
        }
    }

    if !gate::is_subscribed(params.bot, params.config, user.id).await {
        actions::send_subscribe_prompt(
            params.bot,
            chat_id,
            params.config,
            actions::SUBSCRIBE_AND_START_TEXT,
        )
        .await?;
        return Ok(());
    }

    if params.store.get(&user_id).await.is_none() {
        params.store.upsert(&user_id, |_| {}).await;
    }

    params
        .bot
        .send_message(chat_id, actions::welcome_text(params.config))
        .await?;
    Ok(())
}

pub const STATS: Command = Command {
    callname: "/ronok",
    description: "",
    function: wrap!(stats),
    hidden: true,
};
async fn stats(params: CommandParams<'_>) -> Ret {
    admin_only!(params);

    let stats = params.store.stats(Utc::now().timestamp()).await;
    params
        .bot
        .send_message(
            params.message.chat.id,
            format!(
                "📊 Total users: {}\n✅ Verified users: {}\n🔗 Processed links: {}",
                stats.total_users, stats.verified_users, stats.processed_links
            ),
        )
        .await?;
    Ok(())
}

pub const BROADCAST: Command = Command {
    callname: "/broad",
    description: "",
    function: wrap!(broadcast),
    hidden: true,
};
async fn broadcast(params: CommandParams<'_>) -> Ret {
    admin_only!(params);

    let text = params.params();
    if text.is_empty() {
        // Nothing to say.
        return Ok(());
    }
    actions::broadcast(params.bot, params.store, text).await;
    Ok(())
}

pub const SHOW_API: Command = Command {
    callname: "/api",
    description: "",
    function: wrap!(show_api),
    hidden: true,
};
async fn show_api(params: CommandParams<'_>) -> Ret {
    admin_only!(params);

    let response = match params.store.current_api().await {
        Some(api) => format!("🔗 Current API: {}", api),
        None => "🔗 No shortener APIs are configured.".to_string(),
    };
    params
        .bot
        .send_message(params.message.chat.id, response)
        .await?;
    Ok(())
}

pub const ROTATE_API: Command = Command {
    callname: "/change",
    description: "",
    function: wrap!(rotate_api),
    hidden: true,
};
async fn rotate_api(params: CommandParams<'_>) -> Ret {
    admin_only!(params);

    let response = match params.store.rotate_api().await {
        Some(api) => format!("🔄 API has been changed.\n🔗 Current API: {}", api),
        None => "🔗 No shortener APIs are configured.".to_string(),
    };
    params
        .bot
        .send_message(params.message.chat.id, response)
        .await?;
    Ok(())
}

pub const RESET: Command = Command {
    callname: "/reset",
    description: "",
    function: wrap!(reset),
    hidden: true,
};
async fn reset(params: CommandParams<'_>) -> Ret {
    admin_only!(params);

    params.store.clear_verifications().await;
    params
        .bot
        .send_message(
            params.message.chat.id,
            "🔄 All users have been reset. They will need to verify their access again.",
        )
        .await?;
    Ok(())
}
