use saver_bot_commons::channel_member_status;
use teloxide::{prelude::*, Bot};

use crate::{config::Config, store::UserRecord, VERIFY_WINDOW_SECS};

/// True if this record holds a verification that is still within the
/// window. A verification exactly [`VERIFY_WINDOW_SECS`] old passes;
/// one second older does not.
pub fn is_verification_fresh(record: Option<&UserRecord>, now: i64) -> bool {
    match record.and_then(|record| record.verify_time) {
        Some(verify_time) => now - verify_time <= VERIFY_WINDOW_SECS,
        None => false,
    }
}

/// Make a one-time verification token for this user,
/// of the form `{user_id}_{unix_time}`.
pub fn issue_token(user: UserId, now: i64) -> String {
    format!("{}_{}", user.0, now)
}

/// True if the id half of `token` names this user. The timestamp half
/// only exists to make tokens unique; it is not checked, so a stale or
/// mangled timestamp still verifies as long as the id matches.
pub fn token_matches_user(token: &str, user: UserId) -> bool {
    match token.split_once('_') {
        Some((id, _timestamp)) => id == user.0.to_string(),
        None => false,
    }
}

/// Check whether the user is subscribed to the configured channel.
/// Only member, administrator and creator count; a failed check counts
/// as not subscribed.
pub async fn is_subscribed(bot: &Bot, config: &Config, user: UserId) -> bool {
    match channel_member_status(bot, user, config.channel_recipient()).await {
        Ok(kind) => kind.is_privileged() || kind.is_member(),
        Err(e) => {
            log::debug!("Membership check for {} failed: {}", user, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn verified_at(verify_time: i64) -> UserRecord {
        UserRecord {
            verify_time: Some(verify_time),
            processed_links: 0,
        }
    }

    #[test]
    fn fresh_within_the_window() {
        let now = 1_700_000_000;
        assert!(is_verification_fresh(Some(&verified_at(now)), now));
        assert!(is_verification_fresh(Some(&verified_at(now - 60)), now));
    }

    #[test]
    fn fresh_exactly_at_the_window_boundary() {
        let now = 1_700_000_000;
        // Exactly 12 hours old: still fresh.
        assert!(is_verification_fresh(
            Some(&verified_at(now - VERIFY_WINDOW_SECS)),
            now
        ));
        // One second past: stale.
        assert!(!is_verification_fresh(
            Some(&verified_at(now - VERIFY_WINDOW_SECS - 1)),
            now
        ));
    }

    #[test]
    fn never_verified_is_not_fresh() {
        let now = 1_700_000_000;
        assert!(!is_verification_fresh(None, now));
        assert!(!is_verification_fresh(Some(&UserRecord::default()), now));
    }

    #[test]
    fn issued_tokens_verify_for_their_user() {
        let user = UserId(6135009699);
        let token = issue_token(user, 1_700_000_000);
        assert_eq!(token, "6135009699_1700000000");
        assert!(token_matches_user(&token, user));
        assert!(!token_matches_user(&token, UserId(42)));
    }

    #[test]
    fn timestamp_half_is_ignored() {
        let user = UserId(42);
        // Malformed, future, or empty timestamps all still verify.
        assert!(token_matches_user("42_not-a-timestamp", user));
        assert!(token_matches_user("42_99999999999999", user));
        assert!(token_matches_user("42_", user));
        assert!(token_matches_user("42_123_456", user));
    }

    #[test]
    fn tokens_without_a_separator_do_not_verify() {
        assert!(!token_matches_user("42", UserId(42)));
        assert!(!token_matches_user("", UserId(42)));
    }

    #[test]
    fn id_half_must_match_exactly() {
        assert!(!token_matches_user("420_123", UserId(42)));
        assert!(!token_matches_user("4_123", UserId(42)));
        assert!(!token_matches_user("_123", UserId(42)));
    }
}
