use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{config::StoreTarget, gate};

/// Per-user state. One of these exists for every user who has ever
/// gotten past the subscription check with `/start` or a link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Unix seconds of the last successful verification.
    #[serde(default)]
    pub verify_time: Option<i64>,
    /// How many links this user has had relayed successfully.
    #[serde(default)]
    pub processed_links: u64,
}

/// The whole persisted blob: every user record plus the currently
/// selected shortener endpoint. There is no schema versioning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreData {
    #[serde(default)]
    pub users: BTreeMap<String, UserRecord>,
    #[serde(default)]
    pub current_api: Option<String>,
}

/// Numbers for the admin stats command.
#[derive(Debug, Clone, Copy)]
pub struct Stats {
    pub total_users: usize,
    pub verified_users: usize,
    pub processed_links: u64,
}

/// The store. Loaded once at startup; after that the in-memory blob is
/// authoritative and every mutation re-persists the whole thing,
/// fire-and-forget. All operations go through one async lock, so
/// concurrent handlers can't tear a read-modify-write in half.
pub struct Store {
    target: StoreTarget,
    http: reqwest::Client,
    apis: Vec<String>,
    data: Mutex<StoreData>,
}

impl Store {
    /// Load the store once and share it. Never fails: any read or
    /// decode error is logged and yields the empty store.
    pub async fn open(target: StoreTarget, apis: Vec<String>) -> Arc<Store> {
        let http = reqwest::Client::new();
        let data = load(&target, &http).await;

        let store = Arc::new(Store {
            target,
            http,
            apis,
            data: Mutex::new(data),
        });

        // The selector must always point at a configured endpoint.
        {
            let mut data = store.data.lock().await;
            let valid = match &data.current_api {
                Some(api) => store.apis.contains(api),
                None => store.apis.is_empty(),
            };
            if !valid {
                data.current_api = store.apis.first().cloned();
                store.persist(&data).await;
            }
        }

        store
    }

    pub async fn get(&self, user_id: &str) -> Option<UserRecord> {
        self.data.lock().await.users.get(user_id).cloned()
    }

    /// Apply `mutation` to this user's record, creating a default
    /// record first if there is none, then persist.
    pub async fn upsert(&self, user_id: &str, mutation: impl FnOnce(&mut UserRecord)) {
        let mut data = self.data.lock().await;
        mutation(data.users.entry(user_id.to_string()).or_default());
        self.persist(&data).await;
    }

    /// Every user identifier ever recorded, for broadcasting.
    pub async fn user_ids(&self) -> Vec<String> {
        self.data.lock().await.users.keys().cloned().collect()
    }

    pub async fn stats(&self, now: i64) -> Stats {
        let data = self.data.lock().await;
        Stats {
            total_users: data.users.len(),
            verified_users: data
                .users
                .values()
                .filter(|record| gate::is_verification_fresh(Some(record), now))
                .count(),
            processed_links: data.users.values().map(|record| record.processed_links).sum(),
        }
    }

    /// Drop every verification timestamp, forcing everyone to verify
    /// again. Processed-link counters are left alone.
    pub async fn clear_verifications(&self) {
        let mut data = self.data.lock().await;
        for record in data.users.values_mut() {
            record.verify_time = None;
        }
        self.persist(&data).await;
    }

    pub async fn current_api(&self) -> Option<String> {
        self.data.lock().await.current_api.clone()
    }

    /// Advance the selector round-robin and persist. Returns the new
    /// endpoint, or `None` when no endpoints are configured.
    pub async fn rotate_api(&self) -> Option<String> {
        let mut data = self.data.lock().await;
        let position = data
            .current_api
            .as_ref()
            .and_then(|api| self.apis.iter().position(|a| a == api));
        // An endpoint that fell out of the configured list rotates to
        // the start of the list.
        let next = match position {
            Some(i) => self.apis.get((i + 1) % self.apis.len()).cloned(),
            None => self.apis.first().cloned(),
        }?;
        data.current_api = Some(next.clone());
        self.persist(&data).await;
        Some(next)
    }

    /// Write the whole blob out. Failures are logged and swallowed;
    /// the in-memory state stays authoritative either way.
    async fn persist(&self, data: &StoreData) {
        match &self.target {
            StoreTarget::File { path } => {
                let text = match serde_json::to_string_pretty(data) {
                    Ok(text) => text,
                    Err(e) => {
                        log::warn!("Could not encode the store: {}", e);
                        return;
                    }
                };
                if let Err(e) = tokio::fs::write(path, text).await {
                    log::warn!("Could not save the store to {}: {}", path.display(), e);
                }
            }
            StoreTarget::Http { url } => {
                let result = async {
                    self.http
                        .post(url)
                        .json(data)
                        .send()
                        .await?
                        .error_for_status()
                }
                .await;
                if let Err(e) = result {
                    log::warn!("Could not save the store to {}: {}", url, e);
                }
            }
        }
    }
}

async fn load(target: &StoreTarget, http: &reqwest::Client) -> StoreData {
    match target {
        StoreTarget::File { path } => match tokio::fs::read_to_string(path).await {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(data) => data,
                Err(e) => {
                    log::warn!("Could not decode the store at {}: {}", path.display(), e);
                    StoreData::default()
                }
            },
            // A missing file is just the first run.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(e) => {
                log::warn!("Could not read the store at {}: {}", path.display(), e);
                StoreData::default()
            }
        },
        StoreTarget::Http { url } => {
            let result = async {
                http.get(url)
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<StoreData>()
                    .await
            }
            .await;
            match result {
                Ok(data) => data,
                Err(e) => {
                    log::warn!("Could not load the store from {}: {}", url, e);
                    StoreData::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::VERIFY_WINDOW_SECS;

    fn file_target(dir: &tempfile::TempDir) -> StoreTarget {
        StoreTarget::File {
            path: dir.path().join("data.json"),
        }
    }

    fn apis() -> Vec<String> {
        vec![
            "https://a.example/api?url=".to_string(),
            "https://b.example/api?url=".to_string(),
        ]
    }

    #[tokio::test]
    async fn missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(file_target(&dir), apis()).await;
        assert!(store.get("1").await.is_none());
        assert!(store.user_ids().await.is_empty());
    }

    #[tokio::test]
    async fn upserts_round_trip_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(file_target(&dir), apis()).await;
            store.upsert("100", |r| r.verify_time = Some(1234)).await;
            store.upsert("100", |r| r.processed_links += 1).await;
        }
        let store = Store::open(file_target(&dir), apis()).await;
        let record = store.get("100").await.unwrap();
        assert_eq!(record.verify_time, Some(1234));
        assert_eq!(record.processed_links, 1);
    }

    #[tokio::test]
    async fn corrupt_blob_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.json"), "{ not json").unwrap();
        let store = Store::open(file_target(&dir), apis()).await;
        assert!(store.user_ids().await.is_empty());
    }

    #[tokio::test]
    async fn selector_starts_at_the_first_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(file_target(&dir), apis()).await;
        assert_eq!(
            store.current_api().await.as_deref(),
            Some("https://a.example/api?url=")
        );
    }

    #[tokio::test]
    async fn stale_selector_is_repaired() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("data.json"),
            r#"{"users":{},"current_api":"https://gone.example/"}"#,
        )
        .unwrap();
        let store = Store::open(file_target(&dir), apis()).await;
        assert_eq!(
            store.current_api().await.as_deref(),
            Some("https://a.example/api?url=")
        );
    }

    #[tokio::test]
    async fn rotation_is_cyclic() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(file_target(&dir), apis()).await;
        let start = store.current_api().await;
        for _ in 0..apis().len() {
            store.rotate_api().await;
        }
        assert_eq!(store.current_api().await, start);
        store.rotate_api().await;
        assert_ne!(store.current_api().await, start);
    }

    #[tokio::test]
    async fn rotation_with_no_endpoints_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(file_target(&dir), Vec::new()).await;
        assert_eq!(store.rotate_api().await, None);
        assert_eq!(store.current_api().await, None);
    }

    #[tokio::test]
    async fn reset_clears_every_verification_but_not_counters() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(file_target(&dir), apis()).await;
        store.upsert("1", |r| r.verify_time = Some(10)).await;
        store
            .upsert("2", |r| {
                r.verify_time = Some(20);
                r.processed_links = 3;
            })
            .await;
        store.clear_verifications().await;
        assert_eq!(store.get("1").await.unwrap().verify_time, None);
        let two = store.get("2").await.unwrap();
        assert_eq!(two.verify_time, None);
        assert_eq!(two.processed_links, 3);
    }

    #[tokio::test]
    async fn user_ids_list_everyone_ever_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(file_target(&dir), apis()).await;
        store.upsert("1", |_| {}).await;
        store.upsert("2", |r| r.verify_time = Some(5)).await;
        store.upsert("3", |_| {}).await;
        store.clear_verifications().await;
        // Broadcasts go to everyone, verified or not.
        assert_eq!(store.user_ids().await, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn stats_count_only_fresh_verifications() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(file_target(&dir), apis()).await;
        let now = 1_700_000_000;
        store
            .upsert("1", |r| {
                r.verify_time = Some(now);
                r.processed_links = 2;
            })
            .await;
        // Exactly the window old still counts as verified.
        store
            .upsert("2", |r| r.verify_time = Some(now - VERIFY_WINDOW_SECS))
            .await;
        store
            .upsert("3", |r| {
                r.verify_time = Some(now - VERIFY_WINDOW_SECS - 1);
                r.processed_links = 1;
            })
            .await;
        store.upsert("4", |_| {}).await;

        let stats = store.stats(now).await;
        assert_eq!(stats.total_users, 4);
        assert_eq!(stats.verified_users, 2);
        assert_eq!(stats.processed_links, 3);
    }
}
