//! HTTP client wrapper with retry logic.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use super::api_types::SchwabErrorResponse;
use super::config::{RetryConfig, SchwabConfig};
use super::error::SchwabError;

/// HTTP client for the Schwab API with retry logic.
#[derive(Debug, Clone)]
pub struct SchwabHttpClient {
    client: Client,
    base_url: String,
    retry_config: RetryConfig,
}

impl SchwabHttpClient {
    /// Create a new HTTP client from config.
    pub fn new(config: &SchwabConfig) -> Result<Self, SchwabError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SchwabError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            retry_config: config.retry.clone(),
        })
    }

    /// Make a bearer-authenticated GET request.
    pub async fn get<T: DeserializeOwned>(
        &self,
        access_token: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SchwabError> {
        let url = format!("{}{path}", self.base_url);
        let mut backoff = ExponentialBackoff::new(&self.retry_config);

        loop {
            let request = self
                .client
                .get(&url)
                .query(query)
                .bearer_auth(access_token)
                .header("Accept", "application/json");

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    if let Some(delay) = backoff.next_backoff() {
                        tracing::warn!(
                            error = %e,
                            delay_ms = delay.as_millis(),
                            attempt = backoff.attempt,
                            "Network error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(SchwabError::MaxRetriesExceeded {
                        attempts: backoff.attempt,
                    });
                }
            };

            let status = response.status();

            if status.is_success() {
                let text = response
                    .text()
                    .await
                    .map_err(|e| SchwabError::Network(e.to_string()))?;
                if text.is_empty() {
                    return serde_json::from_str("null")
                        .map_err(|e| SchwabError::JsonParse(e.to_string()));
                }
                return serde_json::from_str(&text)
                    .map_err(|e| SchwabError::JsonParse(e.to_string()));
            }

            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());

            let error_body = response.text().await.unwrap_or_default();
            let error_message = match serde_json::from_str::<SchwabErrorResponse>(&error_body) {
                Ok(err) => err.message.or(err.error).unwrap_or(error_body),
                Err(_) => error_body,
            };

            match categorize_status(status) {
                ErrorCategory::RateLimited => {
                    let delay = retry_after
                        .map(Duration::from_secs)
                        .or_else(|| backoff.next_backoff());
                    if let Some(delay) = delay {
                        tracing::warn!(
                            delay_ms = delay.as_millis(),
                            "Rate limited, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(SchwabError::RateLimited {
                        retry_after_secs: retry_after.unwrap_or(60),
                    });
                }
                ErrorCategory::Retryable => {
                    if let Some(delay) = backoff.next_backoff() {
                        tracing::warn!(
                            status = status.as_u16(),
                            message = %error_message,
                            delay_ms = delay.as_millis(),
                            "Retryable error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(SchwabError::MaxRetriesExceeded {
                        attempts: backoff.attempt,
                    });
                }
                ErrorCategory::NonRetryable => {
                    return match status {
                        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                            Err(SchwabError::AuthenticationFailed)
                        }
                        _ => Err(SchwabError::Api {
                            status: status.as_u16(),
                            message: error_message,
                        }),
                    };
                }
            }
        }
    }

    /// POST a form body with a pre-built Authorization header.
    ///
    /// Used for the OAuth token grant. Never retried: refresh happens at
    /// most once per sync call and a rejection is fatal for that call.
    pub async fn post_form(
        &self,
        url: &str,
        authorization: &str,
        form: &[(&str, &str)],
    ) -> Result<serde_json::Value, SchwabError> {
        let response = self
            .client
            .post(url)
            .header("Authorization", authorization)
            .form(form)
            .send()
            .await
            .map_err(|e| SchwabError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SchwabError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(SchwabError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| SchwabError::JsonParse(e.to_string()))
    }
}

/// Error category for determining retry behavior.
enum ErrorCategory {
    RateLimited,
    Retryable,
    NonRetryable,
}

/// Categorize HTTP status code for retry handling.
const fn categorize_status(status: StatusCode) -> ErrorCategory {
    match status.as_u16() {
        429 => ErrorCategory::RateLimited,
        408 | 500 | 502 | 503 | 504 => ErrorCategory::Retryable,
        _ => ErrorCategory::NonRetryable,
    }
}

/// Exponential backoff calculator.
struct ExponentialBackoff {
    attempt: u32,
    max_attempts: u32,
    current_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
}

impl ExponentialBackoff {
    const fn new(config: &RetryConfig) -> Self {
        Self {
            attempt: 0,
            max_attempts: config.max_attempts,
            current_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            multiplier: config.multiplier,
        }
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.attempt += 1;
        if self.attempt >= self.max_attempts {
            return None;
        }

        let backoff = self.current_backoff;
        self.current_backoff = Duration::from_secs_f64(
            (self.current_backoff.as_secs_f64() * self.multiplier)
                .min(self.max_backoff.as_secs_f64()),
        );

        Some(backoff)
    }
}
