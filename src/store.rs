use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use rusoto_s3::{DeleteObjectRequest, PutObjectRequest, S3Client, StreamingBody, S3};
use url::Url;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::mime_type;

pub mod memory;

/// How the remote store should treat an uploaded object.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResourceType {
    /// Let the store decide from the content.
    Auto,
    Video,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Auto => "auto",
            ResourceType::Video => "video",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A buffer to save to the store.
#[derive(Clone, Debug)]
pub struct Upload {
    pub data: Vec<u8>,
    pub content_type: String,
    pub resource_type: ResourceType,
}

impl Upload {
    pub fn new(data: Vec<u8>, content_type: impl Into<String>, resource_type: ResourceType) -> Self {
        Upload {
            data,
            content_type: content_type.into(),
            resource_type,
        }
    }
}

/// A durable pointer to a stored object.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reference {
    /// The public URL of the object.
    pub url: Url,

    /// The identifier of the object within the store.
    pub key: String,
}

pub trait BlobStore: Send + Sync {
    /// Saves the given data under a fresh key.
    fn upload(&self, upload: Upload) -> BoxFuture<'_, Result<Reference, StoreError>>;

    /// Deletes the object the URL points to.
    fn delete(&self, url: &Url) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// Generates a fresh object key, grouped by resource type.
pub(crate) fn new_key(upload: &Upload) -> String {
    let id = Uuid::new_v4();

    match mime_type::extension_for(&upload.content_type) {
        Some(extension) => format!("{}/{}.{}", upload.resource_type, id, extension),
        None => format!("{}/{}", upload.resource_type, id),
    }
}

/// Maps a URL back to the key it was generated from, provided it lies
/// under `base_url`.
pub(crate) fn key_for<'a>(base_url: &Url, url: &'a Url) -> Result<&'a str, StoreError> {
    url.as_str()
        .strip_prefix(base_url.as_str())
        .filter(|key| !key.is_empty())
        .ok_or_else(|| StoreError::ForeignReference(url.clone()))
}

/// A store that saves its data to S3.
pub struct S3Store {
    client: Arc<S3Client>,
    acl: String,
    bucket: String,
    cache_control: Option<String>,
    base_url: Url,
}

impl S3Store {
    /// Creates a new instance. `base_url` must end with a slash.
    pub fn new(
        client: Arc<S3Client>,
        acl: String,
        bucket: String,
        cache_control: Option<String>,
        base_url: Url,
    ) -> Self {
        Self {
            client,
            acl,
            bucket,
            cache_control,
            base_url,
        }
    }

    pub fn from_settings(
        settings: &crate::config::S3Settings,
    ) -> Result<Self, rusoto_core::request::TlsError> {
        use rusoto_core::request::HttpClient;
        use rusoto_core::Region;
        use rusoto_credential::StaticProvider;

        let region = Region::Custom {
            name: settings.region_name.clone(),
            endpoint: settings.endpoint.clone(),
        };

        let client = Arc::new(S3Client::new_with(
            HttpClient::new()?,
            StaticProvider::new_minimal(
                settings.access_key.clone(),
                settings.secret_access_key.clone(),
            ),
            region,
        ));

        Ok(S3Store::new(
            client,
            settings.acl.clone(),
            settings.bucket.clone(),
            settings.cache_control.clone(),
            settings.base_url.clone(),
        ))
    }
}

impl BlobStore for S3Store {
    fn upload(&self, upload: Upload) -> BoxFuture<'_, Result<Reference, StoreError>> {
        self::upload(self, upload).boxed()
    }

    fn delete(&self, url: &Url) -> BoxFuture<'_, Result<(), StoreError>> {
        let url = url.clone();

        async move { delete(self, &url).await }.boxed()
    }
}

async fn delete(store: &S3Store, url: &Url) -> Result<(), StoreError> {
    let key = key_for(&store.base_url, url)?;

    let request = DeleteObjectRequest {
        bucket: store.bucket.clone(),
        key: key.to_owned(),
        ..Default::default()
    };

    store
        .client
        .delete_object(request)
        .await
        .map(|_| ())
        .map_err(|source| StoreError::DeleteFailed { source })
}

async fn upload(store: &S3Store, upload: Upload) -> Result<Reference, StoreError> {
    let key = new_key(&upload);
    let url = store
        .base_url
        .join(&key)
        .map_err(|source| StoreError::FailedToGenerateUrl { source })?;

    let Upload {
        data, content_type, ..
    } = upload;
    let len = data.len() as i64;

    let request = PutObjectRequest {
        acl: Some(store.acl.clone()),
        body: Some(StreamingBody::from(data)),
        bucket: store.bucket.clone(),
        cache_control: store.cache_control.clone(),
        content_length: Some(len),
        content_type: Some(content_type),
        key: key.clone(),
        ..Default::default()
    };

    store
        .client
        .put_object(request)
        .await
        .map_err(|source| StoreError::UploadFailed { source })?;

    Ok(Reference { url, key })
}

#[cfg(test)]
mod test {
    use super::*;

    fn base() -> Url {
        Url::parse("https://media.example.com/bhajans/").expect("parse base URL")
    }

    #[test]
    fn keys_are_grouped_by_resource_type() {
        let video = new_key(&Upload::new(vec![], "video/mp4", ResourceType::Video));
        let audio = new_key(&Upload::new(vec![], "audio/mpeg", ResourceType::Auto));
        let unknown = new_key(&Upload::new(vec![], "application/x-unknown", ResourceType::Auto));

        assert!(video.starts_with("video/") && video.ends_with(".mp4"), "{}", video);
        assert!(audio.starts_with("auto/") && audio.ends_with(".mp3"), "{}", audio);
        assert!(!unknown.contains('.'), "{}", unknown);
    }

    #[test]
    fn urls_map_back_to_keys() {
        let url = base().join("auto/abc.mp3").unwrap();

        assert_eq!(key_for(&base(), &url).unwrap(), "auto/abc.mp3");
    }

    #[test]
    fn foreign_urls_are_refused() {
        let url = Url::parse("https://elsewhere.example.com/bhajans/auto/abc.mp3").unwrap();

        assert!(matches!(
            key_for(&base(), &url),
            Err(StoreError::ForeignReference(_))
        ));
        assert!(key_for(&base(), &base()).is_err());
    }
}
