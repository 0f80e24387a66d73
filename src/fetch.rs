//! Retrying HTTP fetch layer
//!
//! One pooled client shared by all concurrent scan tasks. Transport
//! failures are retried with a fixed delay; HTTP error statuses are
//! returned to the caller unchanged so a 404 on a readme probe reads as
//! "plugin absent" rather than as a dead target.

use crate::error::{Error, Result};
use log::debug;
use reqwest::{Client, Method, StatusCode, redirect};
use std::time::Duration;

/// User agent for requests (standard Chrome on Windows)
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Delay between retry attempts
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Maximum redirects to follow
const MAX_REDIRECTS: usize = 10;

/// A fetched HTTP response, whatever its status code
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Response status
    pub status: StatusCode,
    /// Decoded response body
    pub body: String,
}

impl FetchedPage {
    /// Whether this is a 200 response
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }
}

/// HTTP client with a bounded retry budget per request
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    max_retries: u32,
}

impl HttpClient {
    /// Create a client with a per-request timeout and retry budget
    pub fn new(timeout_secs: u64, max_retries: u32) -> Result<Self> {
        let inner = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .cookie_store(true)
            .danger_accept_invalid_certs(false)
            .build()
            .map_err(|e| Error::HttpClient(e.to_string()))?;

        Ok(Self { inner, max_retries })
    }

    /// GET a URL, retrying transport failures
    ///
    /// Returns `None` once the retry budget is exhausted. Any response
    /// that carries an HTTP status is returned as-is, including 4xx/5xx.
    pub async fn get(&self, url: &str) -> Option<FetchedPage> {
        self.request(Method::GET, url, None).await
    }

    /// POST a URL with an optional body, retrying transport failures
    pub async fn post(&self, url: &str, body: Option<String>) -> Option<FetchedPage> {
        self.request(Method::POST, url, body).await
    }

    async fn request(&self, method: Method, url: &str, body: Option<String>) -> Option<FetchedPage> {
        for attempt in 0..=self.max_retries {
            let mut request = self.inner.request(method.clone(), url);
            if let Some(body) = &body {
                request = request.body(body.clone());
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    match response.text().await {
                        Ok(body) => return Some(FetchedPage { status, body }),
                        Err(e) => debug!("reading body from {} failed: {}", url, e),
                    }
                }
                Err(e) => debug!(
                    "{} {} failed (attempt {}/{}): {}",
                    method,
                    url,
                    attempt + 1,
                    self.max_retries + 1,
                    e
                ),
            }

            if attempt < self.max_retries {
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
        None
    }
}
