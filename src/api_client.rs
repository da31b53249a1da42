//! RapidAPI-style JSON client.

use std::thread;
use std::time::Duration;

use once_cell::sync::OnceCell;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use serde_json::Value;
use thiserror::Error;

use crate::config::AppConfig;

const REQUEST_TIMEOUT_SECS: u64 = 10;
const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

static CLIENT: OnceCell<Client> = OnceCell::new();

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("rate limit exceeded: {0}")]
    RateLimit(String),
    #[error("api request failed: {0}")]
    Api(String),
}

pub trait ApiClient: Send + Sync {
    fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, ApiError>;
}

fn http_client() -> Result<&'static Client, ApiError> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ApiError::Api(format!("failed to build http client: {e}")))
    })
}

/// Maps a non-success status to the error kind callers branch on.
pub fn classify_status(status: u16, detail: &str) -> ApiError {
    match status {
        401 | 403 => ApiError::Auth(format!("{status} {detail}")),
        429 => ApiError::RateLimit(format!("{status} {detail}")),
        _ => ApiError::Api(format!("{status} {detail}")),
    }
}

pub fn join_url(base: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

#[derive(Debug, Clone)]
pub struct RapidApiClient {
    base_url: String,
    api_key: String,
    host: Option<String>,
    retries: u32,
    backoff: Duration,
}

impl RapidApiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            host: None,
            retries: 3,
            backoff: Duration::from_millis(500),
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, ApiError> {
        let key = cfg
            .api_key
            .clone()
            .ok_or_else(|| ApiError::Auth("RAPIDAPI_KEY is not set".to_string()))?;
        Ok(Self::new(cfg.base_url(), key)
            .host(cfg.api_host.clone())
            .retries(cfg.retries, Duration::from_millis(cfg.backoff_ms)))
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    fn attempt(&self, url: &str, params: &[(&str, &str)]) -> Result<Value, Attempt> {
        let client = http_client().map_err(Attempt::Fatal)?;
        let mut req = client
            .get(url)
            .query(params)
            .header(USER_AGENT, "courtside/0.1")
            .header("x-rapidapi-key", &self.api_key);
        if let Some(host) = &self.host {
            req = req.header("x-rapidapi-host", host);
        }
        let resp = req
            .send()
            .map_err(|e| Attempt::Retry(ApiError::Api(format!("network error: {e}"))))?;
        let status = resp.status();
        if !status.is_success() {
            let err = classify_status(status.as_u16(), status.canonical_reason().unwrap_or(""));
            return Err(if is_retryable(status) {
                Attempt::Retry(err)
            } else {
                Attempt::Fatal(err)
            });
        }
        resp.json::<Value>()
            .map_err(|e| Attempt::Fatal(ApiError::Api(format!("invalid json body: {e}"))))
    }
}

enum Attempt {
    Retry(ApiError),
    Fatal(ApiError),
}

fn is_retryable(status: StatusCode) -> bool {
    RETRY_STATUSES.contains(&status.as_u16())
}

impl ApiClient for RapidApiClient {
    fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, ApiError> {
        let url = join_url(&self.base_url, endpoint);
        tracing::info!(%url, ?params, "api request");
        let mut attempt = 0u32;
        loop {
            match self.attempt(&url, params) {
                Ok(body) => return Ok(body),
                Err(Attempt::Fatal(err)) => {
                    tracing::error!(%url, error = %err, "api request failed");
                    return Err(err);
                }
                Err(Attempt::Retry(err)) if attempt < self.retries => {
                    let wait = self.backoff * 2u32.saturating_pow(attempt);
                    tracing::warn!(%url, error = %err, attempt, ?wait, "retrying api request");
                    thread::sleep(wait);
                    attempt += 1;
                }
                Err(Attempt::Retry(err)) => {
                    tracing::error!(%url, error = %err, "api request failed after retries");
                    return Err(err);
                }
            }
        }
    }
}
