//! Best-effort stats persistence over a PostgREST-style API
//!
//! The store is optional: without `STATS_API_URL`/`STATS_SERVICE_KEY`
//! every call is a no-op. Failures are logged by callers and never reach
//! the protocol layer.

use reqwest::Client;
use serde::Serialize;

use crate::config::Config;

/// User row upsert payload; conflict resolution merges on username
#[derive(Debug, Clone, Serialize)]
struct UserRow<'a> {
    username: &'a str,
}

/// RPC payload for a finished race: bumps the completion counter and
/// raises the best-WPM watermark server-side
#[derive(Debug, Clone, Serialize)]
struct RaceCompletion<'a> {
    p_username: &'a str,
    p_wpm: f32,
}

/// Handle to the external stats API, cloneable into background tasks
#[derive(Clone)]
pub struct StatsStore {
    inner: Option<StatsClient>,
}

#[derive(Clone)]
struct StatsClient {
    client: Client,
    base_url: String,
    service_key: String,
}

impl StatsStore {
    pub fn new(config: &Config) -> Self {
        let inner = match (&config.stats_api_url, &config.stats_service_key) {
            (Some(url), Some(key)) => Some(StatsClient {
                client: Client::new(),
                base_url: url.trim_end_matches('/').to_string(),
                service_key: key.clone(),
            }),
            _ => None,
        };
        Self { inner }
    }

    /// A store that never talks to anything; used when persistence is
    /// unconfigured and in tests.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Create the user row if absent; idempotent.
    pub async fn upsert_user(&self, username: &str) -> Result<(), StatsError> {
        let Some(client) = &self.inner else {
            return Ok(());
        };

        let url = format!("{}/rest/v1/users?on_conflict=username", client.base_url);
        let response = client
            .client
            .post(&url)
            .header("apikey", &client.service_key)
            .header("Authorization", format!("Bearer {}", client.service_key))
            .header("Content-Type", "application/json")
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&UserRow { username })
            .send()
            .await
            .map_err(StatsError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StatsError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    /// Record a finished race: increment the user's completion counter
    /// and raise their best-WPM watermark.
    pub async fn record_race_completion(&self, username: &str, wpm: f32) -> Result<(), StatsError> {
        let Some(client) = &self.inner else {
            return Ok(());
        };

        let url = format!("{}/rest/v1/rpc/record_race_completion", client.base_url);
        let response = client
            .client
            .post(&url)
            .header("apikey", &client.service_key)
            .header("Authorization", format!("Bearer {}", client.service_key))
            .header("Content-Type", "application/json")
            .json(&RaceCompletion {
                p_username: username,
                p_wpm: wpm,
            })
            .send()
            .await
            .map_err(StatsError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StatsError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Stats API errors
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },
}
