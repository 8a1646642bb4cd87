//! Concurrent upload and deletion of the binary assets of a bhajan.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, error, o, warn, Logger};
use url::Url;

use crate::bhajan::AssetSlot;
use crate::errors::{StoreError, UploadFailure};
use crate::store::{BlobStore, Reference, Upload};

/// A file submitted for one asset slot.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetPayload {
    pub data: Vec<u8>,
    pub content_type: String,
}

impl AssetPayload {
    pub fn new(data: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        AssetPayload {
            data: data.into(),
            content_type: content_type.into(),
        }
    }
}

/// The files submitted with a request, keyed by slot.
pub type AssetPayloads = BTreeMap<AssetSlot, AssetPayload>;

/// Uploads batches of assets to a [`BlobStore`] and removes them again.
#[derive(Clone)]
pub struct UploadCoordinator {
    store: Arc<dyn BlobStore>,
    upload_timeout: Duration,
    delete_timeout: Duration,
    logger: Arc<Logger>,
}

impl UploadCoordinator {
    pub fn new(
        store: Arc<dyn BlobStore>,
        upload_timeout: Duration,
        delete_timeout: Duration,
        logger: Arc<Logger>,
    ) -> Self {
        UploadCoordinator {
            store,
            upload_timeout,
            delete_timeout,
            logger,
        }
    }

    /// Uploads every payload concurrently and waits for all of them.
    ///
    /// Either every slot ends up with a reference, or none does: if any
    /// upload fails, the ones that succeeded are deleted before the
    /// failure is returned. An empty batch succeeds without touching the
    /// store.
    pub async fn upload_all(
        &self,
        payloads: AssetPayloads,
    ) -> Result<BTreeMap<AssetSlot, Reference>, UploadFailure> {
        if payloads.is_empty() {
            return Ok(BTreeMap::new());
        }

        let uploads = payloads.into_iter().map(|(slot, payload)| async move {
            let upload = Upload::new(payload.data, payload.content_type, slot.resource_type());
            (slot, self.upload_one(slot, upload).await)
        });

        let mut succeeded = BTreeMap::new();
        let mut failed = BTreeMap::new();

        // results come back in slot order
        for (slot, result) in join_all(uploads).await {
            match result {
                Ok(reference) => {
                    succeeded.insert(slot, reference);
                }
                Err(e) => {
                    failed.insert(slot, e);
                }
            }
        }

        let mut failed = failed.into_iter();
        let (slot, source) = match failed.next() {
            None => return Ok(succeeded),
            Some(first) => first,
        };

        let rolled_back = succeeded.keys().copied().collect::<Vec<_>>();
        warn!(self.logger, "Rolling back uploads after failure"; "slot" => %slot, "error" => %source, "rolled_back" => ?rolled_back);

        self.discard(succeeded.into_iter().map(|(_, reference)| reference.url))
            .await;

        let failed = std::iter::once(slot)
            .chain(failed.map(|(slot, _)| slot))
            .collect();

        Err(UploadFailure {
            slot,
            source,
            failed,
            rolled_back,
        })
    }

    /// Deletes every referenced object concurrently, returning the ones
    /// that could not be deleted. Failures are logged but otherwise
    /// tolerated.
    pub async fn discard(
        &self,
        urls: impl IntoIterator<Item = Url>,
    ) -> Vec<(Url, StoreError)> {
        let deletions = urls.into_iter().map(|url| async move {
            let result = self.delete_one(&url).await;
            (url, result)
        });

        join_all(deletions)
            .await
            .into_iter()
            .filter_map(|(url, result)| match result {
                Ok(()) => None,
                Err(e) => {
                    error!(self.logger, "Failed to delete asset"; "url" => %url, "error" => %e);
                    Some((url, e))
                }
            })
            .collect()
    }

    async fn upload_one(&self, slot: AssetSlot, upload: Upload) -> Result<Reference, StoreError> {
        let logger = self.logger.new(o!("slot" => slot.name()));
        debug!(logger, "Uploading asset..."; "content_type" => &upload.content_type, "size" => upload.data.len());

        let reference = tokio::time::timeout(self.upload_timeout, self.store.upload(upload))
            .await
            .map_err(|_| StoreError::TimedOut {
                operation: "upload",
                after: self.upload_timeout,
            })??;

        debug!(logger, "Uploaded asset"; "url" => %reference.url);
        Ok(reference)
    }

    async fn delete_one(&self, url: &Url) -> Result<(), StoreError> {
        debug!(self.logger, "Deleting asset..."; "url" => %url);

        tokio::time::timeout(self.delete_timeout, self.store.delete(url))
            .await
            .map_err(|_| StoreError::TimedOut {
                operation: "delete",
                after: self.delete_timeout,
            })?
    }
}
