//! Authenticated brokerage REST client with retry and backoff.
//!
//! Every request carries the account keys plus a fresh correlation id so
//! upstream support can trace individual calls. Transport failures and
//! retryable statuses (429, 5xx) back off exponentially; auth failures and
//! other client errors surface immediately without retry.

use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::broker::cache::ResponseCache;
use crate::config::BrokerConfig;
use crate::error::BrokerError;

pub struct BrokerClient {
    http: Client,
    base_url: String,
    api_key: String,
    user_key: String,
    max_retries: u32,
    backoff_base: Duration,
    cache: ResponseCache,
}

impl BrokerClient {
    pub fn new(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            user_key: config.user_key.clone(),
            max_retries: config.max_retries.max(1),
            backoff_base: Duration::from_millis(config.backoff_ms),
            cache: ResponseCache::new(Duration::from_secs(config.cache_ttl_secs)),
        })
    }

    /// GET a path relative to the configured base URL.
    pub async fn get(&self, path: &str) -> Result<Value, BrokerError> {
        self.request(path, &[]).await
    }

    /// GET with query parameters.
    pub async fn get_with_params(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Value, BrokerError> {
        self.request(path, params).await
    }

    /// GET through the shared response cache, keyed by path.
    pub async fn get_cached(&self, path: &str) -> Result<Value, BrokerError> {
        if let Some(body) = self.cache.get(path) {
            return Ok(body);
        }
        let body = self.request(path, &[]).await?;
        self.cache.put(path, body.clone());
        Ok(body)
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    async fn request(&self, path: &str, params: &[(&str, String)]) -> Result<Value, BrokerError> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_error = String::new();

        for attempt in 1..=self.max_retries {
            debug!(path, attempt, "brokerage request");
            let result = self
                .http
                .get(&url)
                .header("x-api-key", &self.api_key)
                .header("x-user-key", &self.user_key)
                .header("x-request-id", Uuid::new_v4().to_string())
                .query(params)
                .send()
                .await;

            let response = match result {
                Ok(response) => response,
                Err(err) => {
                    last_error = err.to_string();
                    if attempt >= self.max_retries {
                        break;
                    }
                    warn!(path, attempt, error = %last_error, "request failed, backing off");
                    sleep(self.backoff_delay(attempt)).await;
                    continue;
                }
            };

            let status = response.status();
            match classify_status(status) {
                StatusClass::AuthError => {
                    return Err(BrokerError::Auth {
                        status: status.as_u16(),
                    });
                }
                StatusClass::Retryable => {
                    last_error = format!("status {status}");
                    if attempt >= self.max_retries {
                        break;
                    }
                    warn!(path, attempt, %status, "retryable status, backing off");
                    sleep(self.backoff_delay(attempt)).await;
                    continue;
                }
                StatusClass::RequestError => {
                    return Err(BrokerError::Status {
                        status: status.as_u16(),
                        path: path.to_string(),
                    });
                }
                StatusClass::Ok => {}
            }

            let body = response.text().await?;
            return Ok(serde_json::from_str(&body)?);
        }

        Err(BrokerError::RetriesExhausted {
            attempts: self.max_retries,
            path: path.to_string(),
            last_error,
        })
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// What the retry loop does with a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    Ok,
    AuthError,
    Retryable,
    RequestError,
}

fn classify_status(status: StatusCode) -> StatusClass {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        StatusClass::AuthError
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StatusClass::Retryable
    } else if status.is_client_error() {
        StatusClass::RequestError
    } else {
        StatusClass::Ok
    }
}
