// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP plumbing shared by the REST adapters
//!
//! [`RestClient`] wraps a pooled `reqwest::Client` and adds the retry policy
//! every adapter needs: transport failures and 500/502/503/504 answers are
//! retried with exponential backoff, everything else is handed back to the
//! caller untouched. Requests are rebuilt for every attempt so signatures
//! carrying a timestamp stay fresh.

use crate::error::{CloudError, CloudResult};
use reqwest::header::HeaderMap;
use reqwest::{Client, Request, Response, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Status codes that are worth another attempt
const RETRYABLE_STATUS: [u16; 4] = [500, 502, 503, 504];

/// Longest error body we keep in an error message
const MAX_ERROR_BODY: usize = 512;

/// Tunables for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Retries after the first attempt (default: 5)
    pub max_retries: u32,
    /// Delay before the first retry (default: 50ms)
    pub retry_delay: Duration,
    /// Upper bound for the backoff delay (default: 10s)
    pub max_retry_delay: Duration,
    /// Whole-request timeout (default: 5 minutes)
    pub request_timeout: Duration,
    /// Connection establishment timeout (default: 60s)
    pub connect_timeout: Duration,
    /// Idle pooled connections kept per host (default: 20)
    pub max_idle_per_host: usize,
    /// User-Agent header value
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings {
            max_retries: 5,
            retry_delay: Duration::from_millis(50),
            max_retry_delay: Duration::from_secs(10),
            request_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(60),
            max_idle_per_host: 20,
            user_agent: concat!("cloudmux/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Pooled HTTP client with backoff-limited retries
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    settings: Arc<HttpSettings>,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("max_retries", &self.settings.max_retries)
            .field("user_agent", &self.settings.user_agent)
            .finish()
    }
}

impl RestClient {
    /// Build a client from settings
    pub fn new(settings: HttpSettings) -> CloudResult<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.request_timeout)
            .connect_timeout(settings.connect_timeout)
            .pool_max_idle_per_host(settings.max_idle_per_host)
            .build()?;

        Ok(RestClient {
            client,
            settings: Arc::new(settings),
        })
    }

    /// Client with default settings
    pub fn with_defaults() -> CloudResult<Self> {
        Self::new(HttpSettings::default())
    }

    /// Underlying reqwest client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Active settings
    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    /// Send a request, retrying transient failures
    ///
    /// `make_request` is invoked once per attempt. The final response is
    /// returned whatever its status; use [`error_for_status`] to map failures.
    pub async fn execute<F>(&self, context: &str, mut make_request: F) -> CloudResult<Response>
    where
        F: FnMut(&Client) -> CloudResult<Request> + Send,
    {
        let mut attempt: u32 = 0;
        let mut delay = self.settings.retry_delay;

        loop {
            let request = make_request(&self.client)?;
            debug!(
                method = %request.method(),
                url = %request.url(),
                attempt,
                "sending {}",
                context
            );

            match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if !RETRYABLE_STATUS.contains(&status) || attempt >= self.settings.max_retries {
                        return Ok(response);
                    }
                    warn!(
                        "{} answered HTTP {} (attempt {}/{}), retrying in {:?}",
                        context,
                        status,
                        attempt + 1,
                        self.settings.max_retries + 1,
                        delay
                    );
                }
                Err(e) => {
                    let err = CloudError::from(e);
                    if !err.is_retryable() || attempt >= self.settings.max_retries {
                        return Err(err);
                    }
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        context,
                        attempt + 1,
                        self.settings.max_retries + 1,
                        delay,
                        err
                    );
                }
            }

            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.settings.max_retry_delay);
            attempt += 1;
        }
    }

    /// [`execute`](Self::execute) followed by [`error_for_status`]
    pub async fn execute_checked<F>(&self, context: &str, make_request: F) -> CloudResult<Response>
    where
        F: FnMut(&Client) -> CloudResult<Request> + Send,
    {
        let response = self.execute(context, make_request).await?;
        error_for_status(response, context).await
    }
}

/// Turn a non-2xx response into a [`CloudError`]
pub async fn error_for_status(response: Response, context: &str) -> CloudResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(status_error(response, context).await)
}

/// Build the error for a failed response, consuming its body
pub async fn status_error(response: Response, context: &str) -> CloudError {
    let status = response.status();
    let mut message = response.text().await.unwrap_or_default();
    if message.is_empty() {
        message = status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_string();
    }
    if message.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    CloudError::from_status(status.as_u16(), context, message)
}

/// Whether a status is 404
pub fn is_not_found(status: StatusCode) -> bool {
    status == StatusCode::NOT_FOUND
}

/// Read a header as an owned string
pub fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Read a header and parse it as an unsigned integer
pub fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

/// Collect headers starting with `prefix` (case-insensitive), prefix stripped
pub fn prefixed_headers(headers: &HeaderMap, prefix: &str) -> Vec<(String, String)> {
    let prefix = prefix.to_ascii_lowercase();
    headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(prefix.as_str())?;
            let value = value.to_str().ok()?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Strip the quotes some providers wrap ETags in
pub fn unquote_etag(etag: &str) -> String {
    etag.trim().trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_default_settings() {
        let settings = HttpSettings::default();
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.retry_delay, Duration::from_millis(50));
        assert!(settings.user_agent.starts_with("cloudmux/"));
    }

    #[test]
    fn test_prefixed_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-object-meta-color", HeaderValue::from_static("blue"));
        headers.insert("x-object-meta-size", HeaderValue::from_static("xl"));
        headers.insert("content-type", HeaderValue::from_static("text/plain"));

        let mut meta = prefixed_headers(&headers, "X-Object-Meta-");
        meta.sort();
        assert_eq!(
            meta,
            vec![
                ("color".to_string(), "blue".to_string()),
                ("size".to_string(), "xl".to_string())
            ]
        );
    }

    #[test]
    fn test_header_helpers() {
        let mut headers = HeaderMap::new();
        headers.insert("content-length", HeaderValue::from_static(" 42 "));
        headers.insert("etag", HeaderValue::from_static("\"abc\""));
        assert_eq!(header_u64(&headers, "content-length"), Some(42));
        assert_eq!(header_u64(&headers, "missing"), None);
        assert_eq!(
            header_str(&headers, "etag").map(|e| unquote_etag(&e)),
            Some("abc".to_string())
        );
    }
}
