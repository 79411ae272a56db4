//! HTTP client for streaming hosts.
//!
//! The host serves pages and signed playlists to browsers, so requests
//! carry browser-like headers; an optional cookie unlocks non-public
//! videos.

use reqwest::header::{COOKIE, REFERER};
use url::Url;

use crate::error::HttpError;

/// User agent presented to the streaming host.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36";

/// Thin wrapper over [`reqwest::Client`] with host-appropriate headers.
#[derive(Debug, Clone)]
pub struct StreamClient {
    http: reqwest::Client,
    cookie: Option<String>,
}

impl StreamClient {
    /// Build a client, optionally carrying a session cookie.
    pub fn new(cookie: Option<String>) -> Result<Self, HttpError> {
        let http = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .map_err(HttpError::Client)?;
        Ok(Self { http, cookie })
    }

    /// Fetch a text resource (page markup, playlists).
    pub async fn get_text(&self, url: Url, referer: Option<&str>) -> Result<String, HttpError> {
        let response = self.send(url.clone(), referer).await?;
        response.text().await.map_err(|source| HttpError::Transport {
            url: url.to_string(),
            source,
        })
    }

    /// Fetch a binary resource (media chunks).
    pub async fn get_bytes(&self, url: Url, referer: Option<&str>) -> Result<Vec<u8>, HttpError> {
        let response = self.send(url.clone(), referer).await?;
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|source| HttpError::Transport {
                url: url.to_string(),
                source,
            })
    }

    async fn send(&self, url: Url, referer: Option<&str>) -> Result<reqwest::Response, HttpError> {
        let mut request = self.http.get(url.clone());
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }
        if let Some(cookie) = &self.cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await.map_err(|source| HttpError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response)
    }
}
