use std::path::PathBuf;

use chrono::Utc;
use reqwest::{Client, StatusCode};
use teloxide::{
    payloads::{SendMessageSetters, SendVideoSetters},
    requests::Requester,
    types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, Me, Message, UserId},
    Bot, RequestError,
};
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::{apis, config::Config, gate, store::Store};

pub const SUBSCRIBE_AND_START_TEXT: &str =
    "❗️ Please subscribe to the channel and click /start again to use this bot.";
pub const SUBSCRIBE_TO_USE_TEXT: &str = "❗️ Please subscribe to the channel to use this bot.";
pub const VERIFIED_TEXT: &str =
    "🎉 You have successfully verified! You can use the bot for the next 12 hours.";

const FAILURE_TEXT: &str = "❌ Failed to process the link.";

const VERIFY_PROMPT_TEXT: &str = "Hello,

It seems like your Ads token has expired. Please refresh your token and try again.

Token Timeout: 12 hours

What is a token?

This is an Ads token. After viewing 1 ad, you can utilize the bot for the next 12 hours.

Keep the interactions going smoothly 🚀";

/// The welcome blurb for a plain `/start`.
pub fn welcome_text(config: &Config) -> String {
    format!(
        "Hello, I am a bot to download videos from Terabox.\n\nJust send me the Terabox link and I will start downloading it for you.\n\nJoin @{} For More Updates",
        config.channel_username
    )
}

/// Ask the user to subscribe, with a button deep-linking the channel.
pub async fn send_subscribe_prompt(
    bot: &Bot,
    chat_id: ChatId,
    config: &Config,
    text: &str,
) -> Result<(), RequestError> {
    let markup = InlineKeyboardMarkup::new([[InlineKeyboardButton::url(
        "📢 Subscribe to channel",
        config.channel_link(),
    )]]);
    bot.send_message(chat_id, text).reply_markup(markup).await?;
    Ok(())
}

/// Send the "refresh your Ads token" prompt, with a verify button
/// holding a (shortened) deep link back into this bot.
pub async fn send_verification_prompt(
    bot: &Bot,
    http: &Client,
    me: &Me,
    chat_id: ChatId,
    user: UserId,
    store: &Store,
    config: &Config,
) -> Result<(), RequestError> {
    let token = gate::issue_token(user, Utc::now().timestamp());
    let long_url = format!("https://telegram.me/{}?start={}", me.username(), token);

    let short_url = match store.current_api().await {
        Some(api) => apis::shorten_url(http, &api, &long_url).await,
        None => long_url.clone(),
    };

    // A shortener that answered garbage degrades to the long link too.
    let verify_url = Url::parse(&short_url).unwrap_or_else(|_| {
        Url::parse(&long_url).expect("Deep links into the bot are always valid URLs")
    });
    let tutorial_url =
        Url::parse(&config.tutorial_url).expect("Tutorial link is validated at startup");

    let markup = InlineKeyboardMarkup::new([
        [InlineKeyboardButton::url("🔑 Click here to verify", verify_url)],
        [InlineKeyboardButton::url("📖 How to verify", tutorial_url)],
    ]);

    bot.send_message(chat_id, VERIFY_PROMPT_TEXT)
        .reply_markup(markup)
        .await?;
    Ok(())
}

/// What broke while relaying a video.
#[derive(Debug)]
enum RelayError {
    Resolve(apis::ResolveError),
    Download(reqwest::Error),
    DownloadStatus(StatusCode),
    Io(std::io::Error),
    Telegram(RequestError),
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::Resolve(e) => write!(f, "{}", e),
            RelayError::Download(e) => write!(f, "downloading the video failed: {}", e),
            RelayError::DownloadStatus(status) => write!(f, "video host answered {}", status),
            RelayError::Io(e) => write!(f, "writing the video to disk failed: {}", e),
            RelayError::Telegram(e) => write!(f, "telegram call failed: {}", e),
        }
    }
}

impl From<apis::ResolveError> for RelayError {
    fn from(value: apis::ResolveError) -> Self {
        RelayError::Resolve(value)
    }
}
impl From<reqwest::Error> for RelayError {
    fn from(value: reqwest::Error) -> Self {
        RelayError::Download(value)
    }
}
impl From<std::io::Error> for RelayError {
    fn from(value: std::io::Error) -> Self {
        RelayError::Io(value)
    }
}
impl From<RequestError> for RelayError {
    fn from(value: RequestError) -> Self {
        RelayError::Telegram(value)
    }
}

/// Fetch the video behind `link` and re-upload it into the chat,
/// narrating progress by editing one placeholder message. On success
/// the user's processed-link counter goes up by one; on failure the
/// placeholder becomes a generic notice and no state changes.
pub async fn relay_video(
    bot: &Bot,
    http: &Client,
    chat_id: ChatId,
    user_id: &str,
    link: &str,
    store: &Store,
    config: &Config,
) -> Result<(), RequestError> {
    let progress = bot.send_message(chat_id, "🔄 Requesting API...").await?;

    match relay_pipeline(bot, http, chat_id, link, config, &progress).await {
        Ok(()) => {
            store
                .upsert(user_id, |record| record.processed_links += 1)
                .await;
            Ok(())
        }
        Err(e) => {
            log::warn!("Could not process a link for {}: {}", user_id, e);
            bot.edit_message_text(chat_id, progress.id, FAILURE_TEXT)
                .await?;
            Ok(())
        }
    }
}

async fn relay_pipeline(
    bot: &Bot,
    http: &Client,
    chat_id: ChatId,
    link: &str,
    config: &Config,
    progress: &Message,
) -> Result<(), RelayError> {
    let video_url = apis::resolve_video_url(http, &config.resolver_url, link).await?;

    bot.edit_message_text(chat_id, progress.id, "⬇️ Downloading the video...")
        .await?;

    // The scratch directory owns the file; every path out of here,
    // including the early failure returns, cleans up by dropping it.
    let (_scratch, video_path) = download_video(http, &video_url).await?;

    bot.edit_message_text(chat_id, progress.id, "⬆️ Uploading the video...")
        .await?;

    bot.send_video(chat_id, InputFile::file(video_path))
        .caption(format!(
            "🎥 Your video is downloaded\n\nJoin @{} For More Updates",
            config.channel_username
        ))
        .await?;

    bot.delete_message(chat_id, progress.id).await?;

    Ok(())
}

/// The local name for a downloaded video: the URL's final non-empty
/// path segment.
fn video_filename(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|segment| !segment.is_empty()).last())
        .unwrap_or("video.mp4")
        .to_string()
}

/// Stream the video into a file inside a fresh scratch directory.
/// Each request gets its own directory, so concurrent downloads of
/// same-named assets can't clobber each other.
async fn download_video(
    http: &Client,
    video_url: &str,
) -> Result<(tempfile::TempDir, PathBuf), RelayError> {
    let mut response = http.get(video_url).send().await?;
    if !response.status().is_success() {
        return Err(RelayError::DownloadStatus(response.status()));
    }

    let filename = video_filename(response.url());

    let scratch = tempfile::tempdir()?;
    let path = scratch.path().join(filename);

    let mut file = tokio::fs::File::create(&path).await?;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    Ok((scratch, path))
}

/// Send `text` to every known user. Best-effort: one attempt each,
/// failures logged and skipped.
pub async fn broadcast(bot: &Bot, store: &Store, text: &str) {
    for user_id in store.user_ids().await {
        let recipient = match user_id.parse::<i64>() {
            Ok(raw) => ChatId(raw),
            Err(_) => {
                log::warn!("Skipping a non-numeric user id in the store: {}", user_id);
                continue;
            }
        };
        if let Err(e) = bot.send_message(recipient, text).await {
            log::warn!("Could not broadcast to {}: {}", user_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn filenames_come_from_the_last_path_segment() {
        let url = Url::parse("https://cdn.example.com/dl/My%20Video.mp4?sig=abc").unwrap();
        assert_eq!(video_filename(&url), "My%20Video.mp4");
    }

    #[test]
    fn trailing_slashes_do_not_leave_the_name_empty() {
        let url = Url::parse("https://cdn.example.com/a/b/").unwrap();
        assert_eq!(video_filename(&url), "b");
    }

    #[test]
    fn bare_hosts_fall_back_to_a_stock_name() {
        let url = Url::parse("https://cdn.example.com/").unwrap();
        assert_eq!(video_filename(&url), "video.mp4");
    }

    #[test]
    fn welcome_names_the_channel() {
        let config: Config = toml::from_str(
            r#"
channel_username = "some_channel"
admin_ids = []
shortener_apis = []
resolver_url = "https://resolver.example/"
tutorial_url = "https://t.me/example/4"

[store]
path = "data.json"
"#,
        )
        .unwrap();
        assert!(welcome_text(&config).contains("Join @some_channel For More Updates"));
    }
}
