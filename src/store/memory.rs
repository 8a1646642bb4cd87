//! A blob store that keeps objects in process memory. Used by tests and
//! for running the service without S3; it can be told to fail or stall.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use url::Url;

use crate::errors::StoreError;
use crate::store::{key_for, new_key, BlobStore, Reference, ResourceType, Upload};

const DEFAULT_BASE_URL: &str = "https://blobs.invalid/";

/// What was stored under a key.
#[derive(Clone, Debug)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
    pub resource_type: ResourceType,
}

pub struct MemoryStore {
    base_url: Url,
    objects: RwLock<HashMap<String, StoredObject>>,
    uploads: RwLock<Vec<Reference>>,
    deletions: RwLock<Vec<Url>>,
    rejected_content_types: RwLock<HashSet<String>>,
    reject_deletes: RwLock<bool>,
    upload_delay: RwLock<Option<Duration>>,
    delete_delay: RwLock<Option<Duration>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        // the constant is a valid absolute URL ending in a slash
        let base_url = Url::parse(DEFAULT_BASE_URL).unwrap_or_else(|_| unreachable!());

        MemoryStore::new(base_url)
    }
}

impl MemoryStore {
    pub fn new(base_url: Url) -> Self {
        MemoryStore {
            base_url,
            objects: Default::default(),
            uploads: Default::default(),
            deletions: Default::default(),
            rejected_content_types: Default::default(),
            reject_deletes: RwLock::new(false),
            upload_delay: RwLock::new(None),
            delete_delay: RwLock::new(None),
        }
    }

    /// Makes every later upload with this content type fail.
    pub fn reject_uploads_of(&self, content_type: impl Into<String>) {
        write(&self.rejected_content_types).insert(content_type.into());
    }

    /// Makes every later deletion fail (after being recorded).
    pub fn reject_deletes(&self) {
        *write(&self.reject_deletes) = true;
    }

    /// Makes every later upload wait this long before completing.
    pub fn delay_uploads(&self, delay: Duration) {
        *write(&self.upload_delay) = Some(delay);
    }

    /// Makes every later deletion wait this long before it is recorded.
    pub fn delay_deletes(&self, delay: Duration) {
        *write(&self.delete_delay) = Some(delay);
    }

    pub fn contains(&self, url: &Url) -> bool {
        key_for(&self.base_url, url)
            .map(|key| read(&self.objects).contains_key(key))
            .unwrap_or(false)
    }

    pub fn get(&self, url: &Url) -> Option<StoredObject> {
        let key = key_for(&self.base_url, url).ok()?;

        read(&self.objects).get(key).cloned()
    }

    /// The number of objects currently stored.
    pub fn len(&self) -> usize {
        read(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every successful upload so far, in completion order.
    pub fn uploads(&self) -> Vec<Reference> {
        read(&self.uploads).clone()
    }

    /// Every deletion attempted so far, successful or not.
    pub fn deletions(&self) -> Vec<Url> {
        read(&self.deletions).clone()
    }
}

impl BlobStore for MemoryStore {
    fn upload(&self, upload: Upload) -> BoxFuture<'_, Result<Reference, StoreError>> {
        async move {
            let delay = *read(&self.upload_delay);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            if read(&self.rejected_content_types).contains(&upload.content_type) {
                return Err(StoreError::Rejected(format!(
                    "uploads of {} are disabled",
                    upload.content_type
                )));
            }

            let key = new_key(&upload);
            let url = self
                .base_url
                .join(&key)
                .map_err(|source| StoreError::FailedToGenerateUrl { source })?;
            let reference = Reference { url, key };

            let Upload {
                data,
                content_type,
                resource_type,
            } = upload;
            write(&self.objects).insert(
                reference.key.clone(),
                StoredObject {
                    data,
                    content_type,
                    resource_type,
                },
            );
            write(&self.uploads).push(reference.clone());

            Ok(reference)
        }
        .boxed()
    }

    fn delete(&self, url: &Url) -> BoxFuture<'_, Result<(), StoreError>> {
        let url = url.clone();

        async move {
            let delay = *read(&self.delete_delay);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            write(&self.deletions).push(url.clone());

            if *read(&self.reject_deletes) {
                return Err(StoreError::Rejected(format!("deletion of {} refused", url)));
            }

            let key = key_for(&self.base_url, &url)?;

            match write(&self.objects).remove(key) {
                Some(_) => Ok(()),
                None => Err(StoreError::UnknownReference(url.clone())),
            }
        }
        .boxed()
    }
}

// a panic while holding one of these locks cannot leave the maps
// half-written, so poisoning is ignored
fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
