//! Concurrent fan-out to replicas for writes and hard deletes.
//!
//! Both operations run under the caller's key lock. The pattern is the
//! same: 2·R outbound requests (blob + key sidecar per replica) spawned
//! concurrently, drained to completion, then a single index write as the
//! commit point. On any fan-out failure the record is left `Soft`, since
//! some replicas may have taken the operation and soft-deleted is the
//! honest description of that state.

use axum::http::StatusCode;
use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{error, warn};
use volt_core::placement::key2path;
use volt_core::record::{Deleted, Record};

use crate::Master;
use crate::volume::volume_url;

impl Master {
    /// Writes `body` to every replica the key places on, promoting the
    /// record from `Init` to `No` once all of them acknowledge.
    pub(crate) async fn write_to_replicas(&self, key: &[u8], body: Bytes) -> StatusCode {
        let kvolumes = self.placement(key);

        // Commit intent first, without a hash since we don't have one yet.
        let init = Record::new(kvolumes.clone(), Deleted::Init, None);
        if let Err(err) = self.index.put(key, &init).await {
            error!("index write failed for initializing record: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }

        let path = key2path(key);
        let mut requests = FuturesUnordered::new();
        for volume in &kvolumes {
            let client = self.volumes.clone();
            let url = volume_url(volume, &path);
            let blob = body.clone();
            requests.push(tokio::spawn(
                async move { client.put(&url, blob).await },
            ));

            let client = self.volumes.clone();
            let key_url = volume_url(volume, &format!("{path}.key"));
            let key_body = Bytes::copy_from_slice(key);
            requests.push(tokio::spawn(
                async move { client.put(&key_url, key_body).await },
            ));
        }

        let mut failed = false;
        while let Some(joined) = requests.next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!("replica write failed: {err}");
                    failed = true;
                }
                Err(err) => {
                    warn!("replica write task failed: {err}");
                    failed = true;
                }
            }
        }

        if failed {
            // Try not to leave the key in the initializing state; some
            // replicas may hold data, so soft-deleted it is.
            let unwind = Record::new(kvolumes, Deleted::Soft, None);
            if let Err(err) = self.index.put(key, &unwind).await {
                error!("index write failed while unwinding a failed write: {err}");
            }
            return StatusCode::INTERNAL_SERVER_ERROR;
        }

        let hash = self
            .config
            .md5sum
            .then(|| format!("{:x}", md5::compute(&body)));

        // The commit point. The key is locked, so nobody else wrote the
        // record under us.
        let committed = Record::new(kvolumes, Deleted::No, hash);
        if let Err(err) = self.index.put(key, &committed).await {
            error!("index write failed for committed record: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }

        StatusCode::CREATED
    }

    /// Deletes a key: always a soft-delete of the record, and for a full
    /// delete (`unlink == false`) also the remote blobs and the index
    /// entry.
    pub(crate) async fn delete_key(&self, key: &[u8], unlink: bool) -> StatusCode {
        let rec = match self.record(key).await {
            Ok(rec) => rec,
            Err(err) => {
                error!("index read failed: {err}");
                return StatusCode::INTERNAL_SERVER_ERROR;
            }
        };

        if rec.deleted == Deleted::Hard || (unlink && rec.deleted == Deleted::Soft) {
            return StatusCode::NOT_FOUND;
        }
        if !unlink && self.config.protect && rec.deleted == Deleted::No {
            return StatusCode::FORBIDDEN;
        }

        let soft = Record::new(rec.volumes.clone(), Deleted::Soft, rec.hash.clone());
        if let Err(err) = self.index.put(key, &soft).await {
            error!("index write failed for soft-deleted record: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }

        if unlink {
            return StatusCode::NO_CONTENT;
        }

        // Hard delete: clear the remote replicas, then drop the record.
        let path = key2path(key);
        let mut requests = FuturesUnordered::new();
        for volume in &rec.volumes {
            for target in [volume_url(volume, &path), volume_url(volume, &format!("{path}.key"))] {
                let client = self.volumes.clone();
                requests.push(tokio::spawn(async move { client.delete(&target).await }));
            }
        }

        let mut failed = false;
        while let Some(joined) = requests.next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    // An orphan blob may remain on the volume; the record
                    // stays soft-deleted so a retry can finish the job.
                    warn!("replica delete failed: {err}");
                    failed = true;
                }
                Err(err) => {
                    warn!("replica delete task failed: {err}");
                    failed = true;
                }
            }
        }
        if failed {
            return StatusCode::INTERNAL_SERVER_ERROR;
        }

        if let Err(err) = self.index.remove(key).await {
            error!("index remove failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }

        StatusCode::NO_CONTENT
    }
}
