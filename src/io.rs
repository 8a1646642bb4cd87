use std::io;

use bytes::{Buf, Bytes};
use futures::pin_mut;
use futures::stream::{StreamExt, TryStreamExt};
use warp::multipart::{FormData, Part};

use crate::assets::{AssetPayload, AssetPayloads};
use crate::bhajan::{AssetSlot, BhajanChanges};
use crate::errors::BackendError;
use crate::mime_type;

/// The largest text field accepted, in bytes.
const MAX_FIELD_SIZE: u64 = 1024 * 1024;

/// Space reserved in a form body for everything but the files.
const FORM_OVERHEAD: u64 = 16 * MAX_FIELD_SIZE;

/// Bounds on the files accepted in one submission.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UploadLimits {
    /// The largest file accepted, in bytes.
    pub max_file_size: u64,

    pub max_files: usize,
}

impl UploadLimits {
    /// The largest form body that can satisfy these limits: every file at
    /// its largest, plus room for the text fields and multipart framing.
    pub fn max_content_length(&self) -> u64 {
        self.max_file_size
            .saturating_mul(self.max_files as u64)
            .saturating_add(FORM_OVERHEAD)
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        UploadLimits {
            max_file_size: 100 * 1024 * 1024,
            max_files: AssetSlot::ALL.len(),
        }
    }
}

/// A decoded form submission.
#[derive(Debug, Default)]
pub struct Submission {
    pub changes: BhajanChanges,
    pub payloads: AssetPayloads,
}

enum PartError {
    TooLarge,
    Malformed,
}

/// Decodes a multipart form into field changes and asset payloads.
///
/// Parts with a filename are files and must be named after an asset
/// slot; everything else is a text field. Text fields that are not
/// bhajan fields are ignored.
pub async fn parse_submission(
    form: FormData,
    limits: UploadLimits,
) -> Result<Submission, BackendError> {
    let mut submission = Submission::default();
    let mut file_count = 0;

    pin_mut!(form);

    while let Some(part) = form
        .try_next()
        .await
        .map_err(|_| BackendError::MalformedFormSubmission)?
    {
        let name = part.name().to_owned();

        if part.filename().is_none() {
            let value = read_part(part, MAX_FIELD_SIZE)
                .await
                .map_err(|e| match e {
                    PartError::TooLarge => BackendError::Validation(format!(
                        "{} exceeds the maximum size of {} bytes",
                        name, MAX_FIELD_SIZE
                    )),
                    PartError::Malformed => BackendError::MalformedFormSubmission,
                })?;
            let value = String::from_utf8(value)
                .map_err(|_| BackendError::MalformedField(name.clone()))?;

            apply_field(&mut submission.changes, &name, value)?;
            continue;
        }

        let slot: AssetSlot = name
            .parse()
            .map_err(|_| BackendError::UnexpectedFile(name.clone()))?;

        if submission.payloads.contains_key(&slot) {
            return Err(BackendError::DuplicateFile(slot));
        }

        file_count += 1;
        if file_count > limits.max_files {
            return Err(BackendError::TooManyFiles(limits.max_files));
        }

        let content_type = mime_type::check(slot, part.content_type())?;

        let data = read_part(part, limits.max_file_size)
            .await
            .map_err(|e| match e {
                PartError::TooLarge => BackendError::FileTooLarge {
                    slot,
                    limit: limits.max_file_size,
                },
                PartError::Malformed => BackendError::MalformedFormSubmission,
            })?;

        submission
            .payloads
            .insert(slot, AssetPayload::new(data, content_type));
    }

    Ok(submission)
}

/// Sets the bhajan field named `name` from its form value.
pub fn apply_field(
    changes: &mut BhajanChanges,
    name: &str,
    value: String,
) -> Result<(), BackendError> {
    match name {
        "title" => changes.title = Some(value),
        "artist" => changes.artist = Some(value),
        "language" => changes.language = Some(value),
        "duration" => changes.duration = Some(parse_duration(&value)?),
        "lyrics" => changes.lyrics = Some(value),
        "genre" => changes.genre = Some(value),
        "album" => changes.album = Some(value),
        "releaseYear" => {
            if !value.trim().is_empty() {
                changes.release_year = Some(value.trim().parse().map_err(|_| {
                    BackendError::Validation(format!("releaseYear {:?} is not a year", value))
                })?);
            }
        }
        "tags" => {
            let tags = parse_tags(&value)?;
            changes.tags.get_or_insert_with(Vec::new).extend(tags);
        }
        "isFeatured" => changes.is_featured = Some(parse_flag(&value)?),
        "uploadedBy" => {
            changes.uploaded_by = Some(value.parse().map_err(BackendError::Validation)?)
        }
        _ => {}
    }

    Ok(())
}

fn parse_duration(value: &str) -> Result<u32, BackendError> {
    value.trim().parse().map_err(|_| {
        BackendError::Validation(format!(
            "duration {:?} is not a whole number of seconds",
            value
        ))
    })
}

/// Accepts either a single tag or a JSON array of tags.
fn parse_tags(value: &str) -> Result<Vec<String>, BackendError> {
    if value.trim_start().starts_with('[') {
        serde_json::from_str(value)
            .map_err(|e| BackendError::Validation(format!("tags is not a list of text: {}", e)))
    } else {
        Ok(vec![value.to_owned()])
    }
}

fn parse_flag(value: &str) -> Result<bool, BackendError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(BackendError::Validation(format!(
            "isFeatured {:?} is not true or false",
            value
        ))),
    }
}

async fn read_part(part: Part, limit: u64) -> Result<Vec<u8>, PartError> {
    let stream = part_as_stream(part);
    pin_mut!(stream);

    let mut data = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|_| PartError::Malformed)?;

        if (data.len() + chunk.len()) as u64 > limit {
            return Err(PartError::TooLarge);
        }

        data.extend_from_slice(&chunk);
    }

    Ok(data)
}

/// Collects raw data from [`Part`].
pub fn part_as_stream(raw: Part) -> impl futures::Stream<Item = Result<Bytes, io::Error>> {
    raw.stream().map(|r| {
        r.map(|mut x| x.copy_to_bytes(x.remaining()))
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "could not retrieve chunk"))
    })
}
