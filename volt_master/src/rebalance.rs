//! Moving a key's replicas onto their canonical volumes.
//!
//! The executor runs under the key's lock. It copies from a live current
//! replica to every canonical volume that lacks the blob, commits the new
//! placement to the index, and only then clears the stray copies, so a
//! failure at any step leaves at least one readable replica behind.

use tracing::{info, warn};
use volt_core::placement::{key2path, needs_rebalance};
use volt_core::record::{Deleted, Record};

use crate::Master;
use crate::volume::volume_url;

/// A single key move, as handed to the executor: where the replicas are
/// now and where placement says they belong.
#[derive(Debug, Clone)]
pub struct RebalanceRequest {
    pub key: Vec<u8>,
    pub volumes: Vec<String>,
    pub kvolumes: Vec<String>,
}

/// Executes one move. Returns false if the key could not be brought onto
/// its canonical volumes; the record is only rewritten once every
/// canonical volume holds the blob.
pub async fn rebalance(master: &Master, req: RebalanceRequest) -> bool {
    let path = key2path(&req.key);
    let key_path = format!("{path}.key");

    // Trust only volumes that can actually serve the blob right now.
    let mut live = Vec::new();
    for volume in &req.volumes {
        let (found, _) = master.volumes.head(&volume_url(volume, &path)).await;
        if found {
            live.push(volume.clone());
        }
    }
    if live.is_empty() {
        warn!("rebalance impossible: no live replica");
        return false;
    }

    if !needs_rebalance(&live, &req.kvolumes) {
        return true;
    }

    info!(
        key = %String::from_utf8_lossy(&req.key),
        from = ?live,
        to = ?req.kvolumes,
        "rebalancing"
    );

    // Read once from the first live replica.
    let blob = match master.volumes.get(&volume_url(&live[0], &path)).await {
        Ok(blob) => blob,
        Err(err) => {
            warn!("rebalance read failed: {err}");
            return false;
        }
    };

    let mut write_failed = false;
    for volume in &req.kvolumes {
        if live.contains(volume) {
            continue;
        }
        let url = volume_url(volume, &path);
        if let Err(err) = master.volumes.put(&url, blob.clone()).await {
            warn!("rebalance write failed: {err}");
            write_failed = true;
            continue;
        }
        let sidecar = volume_url(volume, &key_path);
        if let Err(err) = master
            .volumes
            .put(&sidecar, bytes::Bytes::copy_from_slice(&req.key))
            .await
        {
            warn!("rebalance sidecar write failed: {err}");
            write_failed = true;
        }
    }
    if write_failed {
        return false;
    }

    // Commit the new placement before touching the old copies.
    let moved = Record::new(req.kvolumes.clone(), Deleted::No, None);
    if let Err(err) = master.index.put(&req.key, &moved).await {
        warn!("rebalance index write failed: {err}");
        return false;
    }

    let mut delete_failed = false;
    for volume in &live {
        if req.kvolumes.contains(volume) {
            continue;
        }
        for target in [volume_url(volume, &path), volume_url(volume, &key_path)] {
            if let Err(err) = master.volumes.delete(&target).await {
                warn!("rebalance cleanup failed: {err}");
                delete_failed = true;
            }
        }
    }

    !delete_failed
}
