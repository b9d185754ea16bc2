//! HTTP client for volume servers.
//!
//! Volumes are plain HTTP blob servers: a blob lives at its computed path
//! and answers HEAD/GET/PUT/DELETE. The client is shared and
//! connection-pooled. Only HEAD probes carry a timeout; a slow PUT or
//! DELETE is allowed to run to completion so the record state written
//! afterwards describes what actually happened on the volume.

use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;

/// Builds the outbound URL for a blob (or its `.key` sidecar) on a volume.
pub fn volume_url(volume: &str, path: &str) -> String {
    format!("http://{volume}{path}")
}

#[derive(Debug, Clone)]
pub struct VolumeClient {
    http: reqwest::Client,
    head_timeout: Duration,
}

impl VolumeClient {
    pub fn new(head_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            head_timeout,
        }
    }

    /// Probes for a blob. Returns `(found, content_length)`; any status
    /// other than 200, a timeout, or a transport failure all count as not
    /// found.
    pub async fn head(&self, url: &str) -> (bool, u64) {
        match self.http.head(url).timeout(self.head_timeout).send().await {
            Ok(res) if res.status() == StatusCode::OK => (true, res.content_length().unwrap_or(0)),
            _ => (false, 0),
        }
    }

    /// Writes a blob. Any non-2xx status is an error.
    pub async fn put(&self, url: &str, body: Bytes) -> anyhow::Result<()> {
        let res = self.http.put(url).body(body).send().await?;
        if !res.status().is_success() {
            anyhow::bail!("put {url}: unexpected status {}", res.status());
        }
        Ok(())
    }

    /// Deletes a blob. 404 counts as success so retried deletes stay
    /// idempotent.
    pub async fn delete(&self, url: &str) -> anyhow::Result<()> {
        let res = self.http.delete(url).send().await?;
        match res.status() {
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(()),
            status => anyhow::bail!("delete {url}: unexpected status {status}"),
        }
    }

    /// Reads a blob back. Used only when rebalancing moves data.
    pub async fn get(&self, url: &str) -> anyhow::Result<Bytes> {
        let res = self.http.get(url).send().await?;
        if !res.status().is_success() {
            anyhow::bail!("get {url}: unexpected status {}", res.status());
        }
        Ok(res.bytes().await?)
    }
}
