//! The HTTP surface.
//!
//! Every URL path is a key, so the whole surface is one dispatcher keyed on
//! the method: GET/HEAD redirect to a live replica, PUT/PATCH write through
//! the replication engine, DELETE/UNLINK retire keys, REBALANCE moves them,
//! and a GET with a query string is a list query over the index. Mutating
//! methods hold the key lock for their whole duration; a lost race is a 409
//! and the client retries.

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode, header};
use axum::response::Response;
use bytes::Bytes;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, error};
use volt_core::placement::{key2path, needs_rebalance};
use volt_core::record::Deleted;

use crate::Master;
use crate::rebalance::{RebalanceRequest, rebalance};
use crate::volume::volume_url;

/// Listing past this many keys without a limit is refused outright.
const LIST_HARD_CAP: usize = 2147483646;

#[derive(Serialize)]
struct ListResponse {
    next: String,
    keys: Vec<String>,
}

pub(crate) async fn dispatch(State(master): State<Arc<Master>>, req: Request) -> Response {
    let method = req.method().clone();
    let key = req.uri().path().as_bytes().to_vec();
    let raw_query = req.uri().query().unwrap_or("").to_string();

    debug!(method = %method, path = %String::from_utf8_lossy(&key), "request");

    if method == Method::GET && !raw_query.is_empty() {
        return master.handle_query(&key, &raw_query).await;
    }

    let mutating = matches!(
        method.as_str(),
        "PUT" | "PATCH" | "DELETE" | "UNLINK" | "REBALANCE"
    );
    let _guard = if mutating {
        match master.locks.try_lock(&key) {
            Some(guard) => Some(guard),
            // Another operation is in flight on this key; retry later.
            None => return empty_status(StatusCode::CONFLICT),
        }
    } else {
        None
    };

    match method.as_str() {
        "GET" | "HEAD" => master.handle_read(&key).await,
        "PUT" | "PATCH" => {
            let body = match to_bytes(req.into_body(), usize::MAX).await {
                Ok(body) => body,
                Err(err) => {
                    error!("failed to read request body: {err}");
                    return empty_status(StatusCode::INTERNAL_SERVER_ERROR);
                }
            };
            master.handle_write(&key, body, method == Method::PUT).await
        }
        "DELETE" | "UNLINK" => {
            empty_status(master.delete_key(&key, method.as_str() == "UNLINK").await)
        }
        "REBALANCE" => master.handle_rebalance(&key).await,
        _ => empty_status(StatusCode::METHOD_NOT_ALLOWED),
    }
}

impl Master {
    /// GET/HEAD: redirect to a live replica holding the blob.
    async fn handle_read(&self, key: &[u8]) -> Response {
        let rec = match self.record(key).await {
            Ok(rec) => rec,
            Err(err) => {
                error!("index read failed: {err}");
                return empty_status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        let mut builder = Response::builder();
        if let Some(hash) = &rec.hash {
            // Always the digest of the whole blob, not of any range the
            // client may go on to request from the volume.
            builder = builder.header("Content-Md5", hash.as_str());
        }
        if rec.deleted != Deleted::No {
            return finish(
                builder
                    .status(StatusCode::NOT_FOUND)
                    .header(header::CONTENT_LENGTH, "0"),
            );
        }

        let kvolumes = self.placement(key);
        let balance = if needs_rebalance(&rec.volumes, &kvolumes) {
            "unbalanced"
        } else {
            "balanced"
        };
        builder = builder
            .header("Key-Volumes", rec.volumes.join(","))
            .header("Key-Balance", balance);

        // Probe the replicas in a random order and redirect to the first
        // one that answers. This can race a concurrent mutation and point
        // at a stale copy; the client handles the retry.
        let path = key2path(key);
        let mut order: Vec<usize> = (0..rec.volumes.len()).collect();
        order.shuffle(&mut rand::thread_rng());
        let mut location = None;
        for i in order {
            let url = volume_url(&rec.volumes[i], &path);
            let (found, _) = self.volumes.head(&url).await;
            if found {
                location = Some(url);
                break;
            }
        }

        match location {
            Some(url) => finish(
                builder
                    .status(StatusCode::FOUND)
                    .header(header::LOCATION, url)
                    .header(header::CONTENT_LENGTH, "0"),
            ),
            None => finish(
                builder
                    .status(StatusCode::NOT_FOUND)
                    .header(header::CONTENT_LENGTH, "0"),
            ),
        }
    }

    /// PUT/PATCH: write through the replication engine. PUT refuses to
    /// overwrite a live key; PATCH skips that check.
    async fn handle_write(&self, key: &[u8], body: Bytes, no_overwrite: bool) -> Response {
        if body.is_empty() {
            return empty_status(StatusCode::LENGTH_REQUIRED);
        }

        if no_overwrite {
            match self.record(key).await {
                Ok(rec) if rec.deleted == Deleted::No => {
                    return empty_status(StatusCode::FORBIDDEN);
                }
                Ok(_) => {}
                Err(err) => {
                    error!("index read failed: {err}");
                    return empty_status(StatusCode::INTERNAL_SERVER_ERROR);
                }
            }
        }

        empty_status(self.write_to_replicas(key, body).await)
    }

    /// REBALANCE: move a live key onto its canonical volumes.
    async fn handle_rebalance(&self, key: &[u8]) -> Response {
        let rec = match self.record(key).await {
            Ok(rec) => rec,
            Err(err) => {
                error!("index read failed: {err}");
                return empty_status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };
        if rec.deleted != Deleted::No {
            return empty_status(StatusCode::NOT_FOUND);
        }

        let request = RebalanceRequest {
            key: key.to_vec(),
            volumes: rec.volumes,
            kvolumes: self.placement(key),
        };
        if rebalance(self, request).await {
            empty_status(StatusCode::NO_CONTENT)
        } else {
            empty_status(StatusCode::BAD_REQUEST)
        }
    }

    /// GET with a query string: list keys under the request path by
    /// lifecycle state. The first query token selects the mode.
    async fn handle_query(&self, key: &[u8], raw_query: &str) -> Response {
        let operation = raw_query.split('&').next().unwrap_or_default();
        let wanted = match operation {
            "list" => Deleted::No,
            "writing" => Deleted::Init,
            "unlinked" => Deleted::Soft,
            _ => return empty_status(StatusCode::FORBIDDEN),
        };

        let mut start = None;
        // Signed on purpose: a zero or negative limit means unlimited.
        let mut limit = 0i64;
        for pair in raw_query.split('&') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            match name {
                "start" if !value.is_empty() => start = Some(value.to_string()),
                "limit" if !value.is_empty() => match value.parse::<i64>() {
                    Ok(n) => limit = n,
                    Err(_) => return empty_status(StatusCode::BAD_REQUEST),
                },
                _ => {}
            }
        }

        let entries = match self
            .index
            .scan_prefix(key, start.as_deref().map(str::as_bytes))
            .await
        {
            Ok(entries) => entries,
            Err(err) => {
                error!("index scan failed: {err}");
                return empty_status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        let mut keys = Vec::new();
        let mut next = String::new();
        for (entry_key, rec) in entries {
            if rec.deleted != wanted {
                continue;
            }
            if keys.len() > LIST_HARD_CAP {
                return empty_status(StatusCode::PAYLOAD_TOO_LARGE);
            }
            if limit > 0 && keys.len() == limit as usize {
                next = String::from_utf8_lossy(&entry_key).into_owned();
                break;
            }
            keys.push(String::from_utf8_lossy(&entry_key).into_owned());
        }

        let body = match serde_json::to_vec(&ListResponse { next, keys }) {
            Ok(body) => body,
            Err(err) => {
                error!("failed to encode list response: {err}");
                return empty_status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };
        match Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
        {
            Ok(res) => res,
            Err(err) => {
                error!("failed to build response: {err}");
                empty_status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

fn empty_status(status: StatusCode) -> Response {
    let mut res = Response::new(Body::empty());
    *res.status_mut() = status;
    res
}

fn finish(builder: axum::http::response::Builder) -> Response {
    match builder.body(Body::empty()) {
        Ok(res) => res,
        Err(err) => {
            error!("failed to build response: {err}");
            empty_status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
