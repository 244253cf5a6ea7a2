//! HTTP fetch layer shared by the spider and downloader.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};

/// Per-request timeout covering connect, redirect chasing and body read.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Real browser user agents, rotated per request.
pub const USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    // Chrome on Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:132.0) Gecko/20100101 Firefox/132.0",
    // Firefox on Linux
    "Mozilla/5.0 (X11; Linux x86_64; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Edge on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

/// Pick a user agent pseudo-randomly (time-seeded).
pub fn random_user_agent() -> &'static str {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as usize)
        .unwrap_or(0);
    USER_AGENTS[nanos % USER_AGENTS.len()]
}

/// HTTP client issuing randomized-agent GETs, following redirects.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self { client })
    }

    /// GET a URL. The returned response records the final URL after any
    /// redirects; headers are exposed lowercased.
    pub async fn get(&self, url: &str) -> reqwest::Result<Fetched> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", random_user_agent())
            .send()
            .await?;

        let status = response.status();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_ascii_lowercase(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        Ok(Fetched {
            status,
            final_url,
            headers,
            response,
        })
    }
}

/// A fetched response with its headers snapshot and unread body.
pub struct Fetched {
    pub status: StatusCode,
    /// URL the request actually landed on after redirects.
    pub final_url: String,
    headers: HashMap<String, String>,
    response: reqwest::Response,
}

impl Fetched {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    pub fn content_disposition(&self) -> Option<&str> {
        self.headers.get("content-disposition").map(|s| s.as_str())
    }

    pub async fn bytes(self) -> reqwest::Result<Vec<u8>> {
        self.response.bytes().await.map(|b| b.to_vec())
    }

    pub async fn text(self) -> reqwest::Result<String> {
        self.response.text().await
    }
}
