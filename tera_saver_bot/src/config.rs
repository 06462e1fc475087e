use std::path::PathBuf;

use serde::Deserialize;
use teloxide::types::{Recipient, UserId};
use url::Url;

/// Everything that differed between deployments of this bot, plus the
/// collaborator endpoints. All of it is fixed at startup; there is no
/// hot-reload.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Channel users must be subscribed to, without the leading `@`.
    pub channel_username: String,
    /// User IDs allowed to run the admin commands.
    pub admin_ids: Vec<u64>,
    /// Shortener endpoint templates. The long URL is appended as-is,
    /// so these end in something like `&url=`.
    pub shortener_apis: Vec<String>,
    /// Resolver that turns a Terabox share link into a direct video URL.
    pub resolver_url: String,
    /// "How to verify" link shown under the verification prompt.
    pub tutorial_url: String,
    /// Port the liveness endpoint listens on.
    #[serde(default = "default_liveness_port")]
    pub liveness_port: u16,
    /// Where the store blob lives.
    pub store: StoreTarget,
}

/// The store backend: either a local JSON file, or a remote endpoint
/// that speaks `GET`/`POST` of the whole blob.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StoreTarget {
    Http { url: String },
    File { path: PathBuf },
}

fn default_liveness_port() -> u16 {
    3000
}

impl Config {
    /// Read the config from `config.toml`,
    /// or `config_debug.toml` in debug builds.
    ///
    /// # Panics
    ///
    /// Panics if the file is missing or does not parse.
    pub fn load() -> Config {
        let path = match cfg!(debug_assertions) {
            true => "config_debug.toml",
            false => "config.toml",
        };
        let text = std::fs::read_to_string(path).expect("Could not load the config file!");
        let config: Config = toml::from_str(&text).expect("Could not parse the config file!");

        // Catch a bad tutorial link now rather than when building buttons.
        Url::parse(&config.tutorial_url).expect("Tutorial link in the config is not a valid URL!");

        config
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        self.admin_ids.contains(&user.0)
    }

    /// The channel in the form `get_chat_member` wants it.
    pub fn channel_recipient(&self) -> Recipient {
        Recipient::ChannelUsername(format!("@{}", self.channel_username))
    }

    /// A clickable link to the channel.
    pub fn channel_link(&self) -> Url {
        Url::parse(&format!("https://t.me/{}", self.channel_username))
            .expect("Channel usernames always form a valid URL")
    }
}
