use async_trait::async_trait;
use reqwest::header::HeaderMap;
use url::Url;

use crate::error::Result;

/// Narrow contract for delivering one request to the remote endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` to `url` with `headers` and return the response status code.
    /// Non-2xx codes are returned as-is; only delivery failures are errors.
    async fn send(&self, url: &Url, headers: HeaderMap, body: Vec<u8>) -> Result<u16>;
}
