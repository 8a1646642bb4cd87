use std::time::Duration;

use rusoto_core::RusotoError;
use rusoto_s3::{DeleteObjectError, PutObjectError};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::bhajan::AssetSlot;

/// Enumerates high-level errors returned by this library.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The submitted fields are missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// No bhajan exists with the given ID.
    #[error("bhajan {0} not found")]
    NonExistentId(Uuid),

    /// The given ID is not a valid identifier.
    #[error("invalid bhajan ID {0:?}")]
    InvalidId(String),

    /// An asset could not be saved to the store.
    #[error("failed to upload {}", .0.slot)]
    Ingestion(#[from] UploadFailure),

    /// The metadata repository failed for reasons outside the caller's
    /// control.
    #[error("database error")]
    Database { source: RepositoryError },

    /// The form submission could not be decoded.
    #[error("malformed form submission")]
    MalformedFormSubmission,

    /// A form field could not be read as text.
    #[error("field {0} is not valid UTF-8")]
    MalformedField(String),

    /// A file part was sent under a name that is not an asset slot.
    #[error("unexpected file field {0}")]
    UnexpectedFile(String),

    /// The same asset slot was sent more than once.
    #[error("more than one file submitted for {0}")]
    DuplicateFile(AssetSlot),

    /// More files were sent than the configured limit.
    #[error("at most {0} files may be submitted")]
    TooManyFiles(usize),

    /// A file exceeded the configured size limit.
    #[error("{slot} exceeds the maximum size of {limit} bytes")]
    FileTooLarge { slot: AssetSlot, limit: u64 },

    /// A file was sent with a content type not accepted for its slot.
    #[error("invalid file type {content_type} for {slot}; allowed types: {allowed}")]
    DisallowedContentType {
        slot: AssetSlot,
        content_type: String,
        allowed: String,
    },
}

impl BackendError {
    /// A stable name for the category of error, for clients to match on.
    pub fn kind(&self) -> &'static str {
        use BackendError::*;

        match self {
            Validation(..)
            | MalformedFormSubmission
            | MalformedField(..)
            | UnexpectedFile(..)
            | DuplicateFile(..)
            | TooManyFiles(..)
            | FileTooLarge { .. }
            | DisallowedContentType { .. } => "ValidationError",
            NonExistentId(..) => "NotFound",
            InvalidId(..) => "InvalidIdentifier",
            Ingestion(..) => "IngestionFailure",
            Database { .. } => "ServerError",
        }
    }

    /// Whether the error was caused by the caller rather than by the
    /// service or one of its dependencies.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, BackendError::Ingestion(..) | BackendError::Database { .. })
    }
}

/// Translates repository failures into the public taxonomy.
impl From<RepositoryError> for BackendError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(id) => BackendError::NonExistentId(id),
            RepositoryError::Validation(message) => BackendError::Validation(message),
            source => BackendError::Database { source },
        }
    }
}

/// Enumerates errors returned by the blob store subsystem.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Represents an error returned by the remote server when uploading.
    #[error("upload error")]
    UploadFailed { source: RusotoError<PutObjectError> },

    /// Represents an error returned by the remote server when deleting.
    #[error("delete error")]
    DeleteFailed {
        source: RusotoError<DeleteObjectError>,
    },

    /// The remote operation did not finish in time.
    #[error("{operation} timed out after {after:?}")]
    TimedOut {
        operation: &'static str,
        after: Duration,
    },

    /// The URL does not point into this store.
    #[error("{0} is not a reference into this store")]
    ForeignReference(Url),

    /// The URL points into this store but nothing is stored there.
    #[error("no object stored at {0}")]
    UnknownReference(Url),

    /// A URL could not be generated for a new object.
    #[error("failed to generate URL")]
    FailedToGenerateUrl { source: url::ParseError },

    /// The store refused the operation.
    #[error("store rejected request: {0}")]
    Rejected(String),
}

/// Enumerates errors returned by the metadata repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No record exists with the given ID.
    #[error("no record with ID {0}")]
    NotFound(Uuid),

    /// The record violates the schema.
    #[error("validation error: {0}")]
    Validation(String),

    /// Represents an SQL error.
    #[error("SQLx error")]
    Sqlx { source: sqlx::Error },

    /// A stored value could not be read back.
    #[error("corrupt value in column {column}: {message}")]
    Corrupt { column: &'static str, message: String },
}

/// The outcome of a batch upload in which at least one asset failed.
/// Assets that did upload have already been removed from the store by
/// the time this is returned.
#[derive(Debug, Error)]
#[error("failed to upload {slot}")]
pub struct UploadFailure {
    /// The first slot (in slot order) that failed.
    pub slot: AssetSlot,

    /// Why that slot failed.
    #[source]
    pub source: StoreError,

    /// Every slot that failed.
    pub failed: Vec<AssetSlot>,

    /// The slots that uploaded successfully and were rolled back.
    pub rolled_back: Vec<AssetSlot>,
}
