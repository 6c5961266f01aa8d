// ===============================
// src/gateway.rs (transports)
// ===============================
//
// Satu-satunya tempat yang benar-benar bicara HTTP ke venue.
// VenueClient/InfoClient memegang Transport, jadi test bisa pakai MockTransport.
//
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

pub const EXCHANGE_PATH: &str = "/exchange";
pub const INFO_PATH: &str = "/info";

/// Raw HTTP reply: status code and body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReply {
    pub status: u16,
    pub body: String,
}

impl RawReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self { status: 200, body: body.into() }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// POST a JSON body to `path` (relative to the venue base URL).
    async fn post_json(&self, path: &str, body: String) -> Result<RawReply>;
}

/// reqwest-backed transport with its own base URL.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|e| Error::Config(format!("api url {base_url}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self { http, base })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, path: &str, body: String) -> Result<RawReply> {
        let url = self.base.join(path).map_err(|e| Error::Config(e.to_string()))?;
        debug!(%url, "POST");
        let rsp = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = rsp.status().as_u16();
        let body = rsp.text().await?;
        Ok(RawReply { status, body })
    }
}

/// Reads go to the real venue; `/exchange` is acknowledged locally, nothing is submitted.
pub struct DryRunTransport<T> {
    reads: T,
}

impl<T: Transport> DryRunTransport<T> {
    pub fn new(reads: T) -> Self {
        Self { reads }
    }
}

#[async_trait]
impl<T: Transport> Transport for DryRunTransport<T> {
    async fn post_json(&self, path: &str, body: String) -> Result<RawReply> {
        if path == EXCHANGE_PATH {
            tracing::info!(%body, "dry-run: action not submitted");
            return Ok(RawReply::ok(r#"{"status":"ok","response":{"type":"dryRun"}}"#));
        }
        self.reads.post_json(path, body).await
    }
}

/// Scripted replies, records every request. Test double.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<Result<RawReply>>>,
    requests: Mutex<Vec<(String, String)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, status: u16, body: impl Into<String>) -> &Self {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Ok(RawReply { status, body: body.into() }));
        }
        self
    }

    pub fn push_error(&self, err: Error) -> &Self {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(err));
        }
        self
    }

    /// `(path, body)` of every request seen so far.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post_json(&self, path: &str, body: String) -> Result<RawReply> {
        if let Ok(mut r) = self.requests.lock() {
            r.push((path.to_string(), body));
        }
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        next.unwrap_or_else(|| Err(Error::NetworkFailure(format!("no scripted reply for {path}"))))
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn post_json(&self, path: &str, body: String) -> Result<RawReply> {
        (**self).post_json(path, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn mock_replays_in_order_and_records() {
        let m = MockTransport::new();
        m.push_reply(200, "a").push_reply(500, "b");
        assert_eq!(m.post_json(INFO_PATH, "{}".into()).await.unwrap().body, "a");
        assert_eq!(m.post_json(EXCHANGE_PATH, "x".into()).await.unwrap().status, 500);
        assert!(matches!(
            m.post_json(INFO_PATH, "{}".into()).await,
            Err(Error::NetworkFailure(_))
        ));
        let reqs = m.requests();
        assert_eq!(reqs.len(), 3);
        assert_eq!(reqs[1], (EXCHANGE_PATH.to_string(), "x".to_string()));
    }

    #[tokio::test]
    async fn dry_run_only_intercepts_exchange() {
        let reads = Arc::new(MockTransport::new());
        reads.push_reply(200, "[]");
        let t = DryRunTransport::new(reads.clone());
        let ex = t.post_json(EXCHANGE_PATH, "{}".into()).await.unwrap();
        assert!(ex.body.contains(r#""status":"ok""#));
        assert_eq!(t.post_json(INFO_PATH, "{}".into()).await.unwrap().body, "[]");
        assert_eq!(reads.requests().len(), 1);
    }

    #[test]
    fn http_transport_rejects_bad_url() {
        assert!(matches!(HttpTransport::new("not a url"), Err(Error::Config(_))));
    }
}
