//! Profile preload client.
//!
//! Before the web view loads, the host fetches the user's profile once so
//! the next handshake can hand it to the page without a round trip. The
//! response body is opaque here; it is cached verbatim under
//! `UserProfile`.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;

use crate::bridge::Platform;
use crate::constants::{self, GENERIC_FAILURE_MESSAGE};
use crate::storage::{KeyValueStore, StorageKey};

#[derive(Debug, Serialize)]
struct ProfileRequest<'a> {
    platform: Platform,
    token: &'a str,
    app_id: &'a str,
}

/// HTTP client for the profile endpoint.
#[derive(Debug, Clone)]
pub struct ProfileClient {
    client: Client,
    url: String,
    retry_count: u32,
    retry_delay: Duration,
}

impl ProfileClient {
    /// Creates a client for `url` with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
            retry_count: constants::PROFILE_RETRY_COUNT,
            retry_delay: constants::PROFILE_RETRY_DELAY,
        })
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry_count: u32, retry_delay: Duration) -> Self {
        self.retry_count = retry_count;
        self.retry_delay = retry_delay;
        self
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the profile blob for `token`.
    ///
    /// Connection failures are retried; HTTP error statuses are not.
    ///
    /// # Errors
    ///
    /// For 400-500 responses the error message is the server's body.
    /// Anything else unexpected, including an unreadable or empty success
    /// body, yields a generic message.
    pub async fn preload_user_profile(&self, token: &str, app_id: &str) -> Result<String> {
        let request = ProfileRequest {
            platform: Platform::Ios,
            token,
            app_id,
        };

        let mut attempt = 0;
        let response = loop {
            match self.client.post(&self.url).json(&request).send().await {
                Ok(response) => break response,
                Err(e) if attempt < self.retry_count => {
                    attempt += 1;
                    log::debug!("Profile request failed ({e}), retry {attempt}/{}", self.retry_count);
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    log::warn!("Profile request failed after {} attempts: {e}", attempt + 1);
                    anyhow::bail!(GENERIC_FAILURE_MESSAGE);
                }
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Failed to read profile response body ({status}): {e}");
                anyhow::bail!(GENERIC_FAILURE_MESSAGE);
            }
        };

        if status.is_success() {
            if body.is_empty() {
                log::warn!("Profile service returned an empty body ({status})");
                anyhow::bail!(GENERIC_FAILURE_MESSAGE);
            }
            log::info!("Preloaded user profile ({} bytes)", body.len());
            return Ok(body);
        }

        if (400..=500).contains(&status.as_u16()) && !body.is_empty() {
            log::warn!("Profile service rejected request: {status}");
            anyhow::bail!("{body}");
        }

        log::warn!("Unhandled profile response status {status}");
        anyhow::bail!(GENERIC_FAILURE_MESSAGE)
    }

    /// Fetch the profile and cache it under `UserProfile`.
    pub async fn preload_and_cache(
        &self,
        store: &dyn KeyValueStore,
        token: &str,
        app_id: &str,
    ) -> Result<String> {
        let profile = self.preload_user_profile(token, app_id).await?;
        store
            .set_string(StorageKey::UserProfile, &profile)
            .context("Failed to cache user profile")?;
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(ProfileRequest {
            platform: Platform::Ios,
            token: "abc",
            app_id: "com.example",
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"platform": "ios", "token": "abc", "app_id": "com.example"})
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_gives_generic_message() {
        let client = ProfileClient::new("http://127.0.0.1:9/profile", Duration::from_secs(1))
            .unwrap()
            .with_retry(1, Duration::from_millis(1));
        let err = client.preload_user_profile("t", "app").await.unwrap_err();
        assert_eq!(err.to_string(), GENERIC_FAILURE_MESSAGE);
    }
}
