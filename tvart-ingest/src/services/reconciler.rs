//! Device synchronization
//!
//! The device assigns its own content ids and forgets nothing we can rely
//! on, so every run re-derives which remote item shows which ready file:
//!
//! 1. List the category and fetch every thumbnail.
//! 2. Forget all cached content ids.
//! 3. Match by cached thumbnail digest, then perceptually. A cached digest
//!    counts only for the ready file it was confirmed against. A remote
//!    item and a local item are each claimed at most once.
//! 4. Delete unclaimed remote items in one call.
//! 5. Upload what is still unmatched, retrying transient transport errors,
//!    then select the new item and record its thumbnail digest.
//!
//! Only the `remote_*` fields of each artwork are written.

use crate::device::{strip_extension, ArtStore, DeviceError, MediaType};
use crate::models::{ArtSet, ManifestError};
use crate::services::perceptual::{content_hash, PerceptualDigest};
use crate::utils::retry_transient;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tvart_common::FolderLayout;

const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Ready files already carry their mat
const DEVICE_MATTE: Option<&str> = None;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Listing device content failed: {0}")]
    List(#[source] DeviceError),

    #[error("Fetching device thumbnails failed: {0}")]
    Thumbnails(#[source] DeviceError),

    #[error("Deleting orphaned device content failed: {0}")]
    Delete(#[source] DeviceError),

    #[error("Upload of {url} failed: {source}")]
    Upload {
        url: String,
        #[source]
        source: DeviceError,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Where one local item ended up in this run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Unsynced,
    Matched,
    Uploaded,
}

#[derive(Debug, Default, Clone)]
pub struct SyncReport {
    pub matched: usize,
    pub uploaded: usize,
    /// Remote ids removed as orphans
    pub deleted: Vec<String>,
    /// Items without a ready file
    pub skipped: usize,
    /// `(url, cause)` for uploads that exhausted their retries
    pub failed: Vec<(String, String)>,
    pub cancelled: bool,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }
}

struct RemoteCandidate {
    content_id: String,
    hash: Option<String>,
    digest: Option<PerceptualDigest>,
    claimed: bool,
}

struct LocalItem {
    set: usize,
    index: usize,
    ready: PathBuf,
    state: SyncState,
}

pub struct Reconciler {
    store: Arc<dyn ArtStore>,
    layout: FolderLayout,
    category: String,
    threshold: f32,
    upload_attempts: u32,
    retry_delay: Duration,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ArtStore>,
        layout: FolderLayout,
        category: impl Into<String>,
        threshold: f32,
        upload_attempts: u32,
    ) -> Self {
        Self {
            store,
            layout,
            category: category.into(),
            threshold,
            upload_attempts,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Bring the device in line with the ready files of `sets`
    pub async fn sync(
        &self,
        sets: &mut [ArtSet],
        cancel: &CancellationToken,
    ) -> Result<SyncReport, ReconcileError> {
        let mut report = SyncReport::default();
        let mut remotes = self.fetch_remote().await?;

        let mut locals = Vec::new();
        for (s, set) in sets.iter_mut().enumerate() {
            for (i, art) in set.art.iter_mut().enumerate() {
                art.clear_remote();
                match art.ready_path(&self.layout).filter(|p| p.is_file()) {
                    Some(ready) => locals.push(LocalItem {
                        set: s,
                        index: i,
                        ready,
                        state: SyncState::Unsynced,
                    }),
                    None => report.skipped += 1,
                }
            }
        }

        // Cheap pass: cached thumbnail digest
        for local in locals.iter_mut() {
            let art = &mut sets[local.set].art[local.index];
            let Some(cached) = art.cached_thumbnail_hash() else {
                continue;
            };
            if let Some(remote) = remotes
                .iter_mut()
                .find(|r| !r.claimed && r.hash.as_deref() == Some(cached))
            {
                remote.claimed = true;
                art.record_remote(remote.content_id.clone(), remote.hash.clone());
                local.state = SyncState::Matched;
                debug!(url = %art.url, content_id = %remote.content_id, "Matched by digest");
            }
        }

        // Perceptual pass
        let mut digests: HashMap<PathBuf, Option<PerceptualDigest>> = HashMap::new();
        for local in locals.iter_mut().filter(|l| l.state == SyncState::Unsynced) {
            if !remotes.iter().any(|r| !r.claimed && r.digest.is_some()) {
                break;
            }
            let digest = digests
                .entry(local.ready.clone())
                .or_insert_with(|| match PerceptualDigest::from_path(&local.ready) {
                    Ok(d) => Some(d),
                    Err(e) => {
                        warn!(path = %local.ready.display(), error = %e, "Cannot read ready file");
                        None
                    }
                });
            let Some(digest) = digest.as_ref() else {
                continue;
            };

            let art = &mut sets[local.set].art[local.index];
            if let Some(remote) = remotes.iter_mut().find(|r| {
                !r.claimed
                    && r.digest
                        .as_ref()
                        .is_some_and(|d| digest.matches(d, self.threshold))
            }) {
                remote.claimed = true;
                art.record_remote(remote.content_id.clone(), remote.hash.clone());
                local.state = SyncState::Matched;
                debug!(url = %art.url, content_id = %remote.content_id, "Matched perceptually");
            }
        }

        report.matched = locals
            .iter()
            .filter(|l| l.state == SyncState::Matched)
            .count();
        for set in sets.iter() {
            set.save()?;
        }

        let orphans: Vec<String> = remotes
            .iter()
            .filter(|r| !r.claimed)
            .map(|r| r.content_id.clone())
            .collect();
        if !orphans.is_empty() {
            info!(count = orphans.len(), "Deleting orphaned device content");
            self.store
                .delete(&orphans)
                .await
                .map_err(ReconcileError::Delete)?;
            report.deleted = orphans;
        }

        // Items sharing a ready file share its remote copy
        let mut by_ready: HashMap<PathBuf, (String, Option<String>)> = locals
            .iter()
            .filter(|l| l.state == SyncState::Matched)
            .filter_map(|l| {
                let art = &sets[l.set].art[l.index];
                art.remote_content_id
                    .clone()
                    .map(|id| (l.ready.clone(), (id, art.remote_thumbnail_hash.clone())))
            })
            .collect();

        for local in locals.iter_mut().filter(|l| l.state == SyncState::Unsynced) {
            if cancel.is_cancelled() {
                info!("Sync cancelled before all uploads finished");
                report.cancelled = true;
                break;
            }

            let set = &mut sets[local.set];
            let art = &mut set.art[local.index];

            if let Some((id, hash)) = by_ready.get(&local.ready) {
                art.record_remote(id.clone(), hash.clone());
                local.state = SyncState::Matched;
                report.matched += 1;
                set.save()?;
                continue;
            }

            let data = match tokio::fs::read(&local.ready).await {
                Ok(d) => d,
                Err(e) => {
                    warn!(url = %art.url, error = %e, "Cannot read ready file");
                    report.failed.push((art.url.clone(), e.to_string()));
                    continue;
                }
            };
            let media_type = MediaType::from_path(&local.ready);

            let uploaded = retry_transient(
                "upload",
                self.upload_attempts,
                self.retry_delay,
                DeviceError::is_transient,
                || self.store.upload(data.clone(), media_type, DEVICE_MATTE),
            )
            .await;

            let content_id = match uploaded {
                Ok(id) => id,
                Err(e) if e.is_transient() => {
                    error!(url = %art.url, error = %e, "Upload failed after retries");
                    report.failed.push((art.url.clone(), e.to_string()));
                    continue;
                }
                Err(e) => {
                    return Err(ReconcileError::Upload {
                        url: art.url.clone(),
                        source: e,
                    })
                }
            };

            info!(url = %art.url, content_id = %content_id, "Uploaded");
            art.record_remote(content_id.clone(), None);

            if let Err(e) = self.store.select(&content_id).await {
                warn!(content_id = %content_id, error = %e, "Select after upload failed");
            }
            match self
                .store
                .thumbnails(std::slice::from_ref(&content_id))
                .await
            {
                Ok(thumbs) => {
                    let hash = thumbs.values().next().map(|t| content_hash(t));
                    art.record_remote(content_id.clone(), hash);
                }
                Err(e) => {
                    warn!(content_id = %content_id, error = %e, "Thumbnail after upload failed")
                }
            }

            by_ready.insert(
                local.ready.clone(),
                (content_id, art.remote_thumbnail_hash.clone()),
            );
            local.state = SyncState::Uploaded;
            report.uploaded += 1;
            set.save()?;
        }

        info!(
            matched = report.matched,
            uploaded = report.uploaded,
            deleted = report.deleted.len(),
            skipped = report.skipped,
            failed = report.failed.len(),
            "Sync finished"
        );
        Ok(report)
    }

    async fn fetch_remote(&self) -> Result<Vec<RemoteCandidate>, ReconcileError> {
        let listing = self
            .store
            .list(&self.category)
            .await
            .map_err(ReconcileError::List)?;
        let ids: Vec<String> = listing.into_iter().map(|i| i.content_id).collect();
        info!(category = %self.category, remote = ids.len(), "Listed device content");
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let fetched = self
            .store
            .thumbnails(&ids)
            .await
            .map_err(ReconcileError::Thumbnails)?;
        let mut thumbnails: HashMap<String, Vec<u8>> = HashMap::with_capacity(fetched.len());
        for (key, bytes) in fetched {
            match cache_file_name(&key) {
                Some(name) => {
                    if let Err(e) = tokio::fs::write(self.layout.thumbs.join(name), &bytes).await {
                        debug!(key = %key, error = %e, "Thumbnail not cached");
                    }
                }
                None => warn!(key = %key, "Thumbnail key is not a plain file name, not cached"),
            }
            thumbnails.insert(strip_extension(&key).to_string(), bytes);
        }

        Ok(ids
            .into_iter()
            .map(|content_id| {
                let (hash, digest) = match thumbnails.get(&content_id) {
                    Some(bytes) => {
                        let digest = PerceptualDigest::from_bytes(bytes)
                            .map_err(|e| {
                                warn!(content_id = %content_id, error = %e, "Undecodable thumbnail")
                            })
                            .ok();
                        (Some(content_hash(bytes)), digest)
                    }
                    None => {
                        warn!(content_id = %content_id, "No thumbnail returned");
                        (None, None)
                    }
                };
                RemoteCandidate {
                    content_id,
                    hash,
                    digest,
                    claimed: false,
                }
            })
            .collect())
    }
}

/// Device thumbnail key as a file name directly under the cache folder
fn cache_file_name(key: &str) -> Option<&str> {
    let name = Path::new(key).file_name()?.to_str()?;
    (name == key).then_some(name)
}

/// Content ids currently in `category`
pub async fn list_uploaded(
    store: &dyn ArtStore,
    category: &str,
) -> Result<Vec<String>, ReconcileError> {
    Ok(store
        .list(category)
        .await
        .map_err(ReconcileError::List)?
        .into_iter()
        .map(|i| i.content_id)
        .collect())
}

/// Remove everything in `category` and forget the ids in `sets`
pub async fn delete_all(
    store: &dyn ArtStore,
    category: &str,
    sets: &mut [ArtSet],
) -> Result<Vec<String>, ReconcileError> {
    let ids = list_uploaded(store, category).await?;
    if !ids.is_empty() {
        store.delete(&ids).await.map_err(ReconcileError::Delete)?;
    }
    for set in sets.iter_mut() {
        for art in set.art.iter_mut() {
            art.forget_remote();
        }
        set.save()?;
    }
    info!(category = %category, deleted = ids.len(), "Deleted all device content");
    Ok(ids)
}
