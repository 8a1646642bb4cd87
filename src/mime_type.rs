use std::collections::HashMap;

use lazy_static::lazy_static;
use mime::Mime;

use crate::bhajan::AssetSlot;
use crate::errors::BackendError;

/// An accepted content type and the file extension objects of that type
/// are stored under.
#[derive(Clone, Debug)]
pub struct MimeType {
    pub essence: &'static str,
    pub extension: &'static str,
}

impl MimeType {
    const fn new(essence: &'static str, extension: &'static str) -> Self {
        Self { essence, extension }
    }
}

const AUDIO: &[MimeType] = &[
    MimeType::new("audio/mpeg", "mp3"),
    MimeType::new("audio/mp3", "mp3"),
    MimeType::new("audio/wav", "wav"),
];

const VIDEO: &[MimeType] = &[
    MimeType::new("video/mp4", "mp4"),
    MimeType::new("video/mpeg", "mpeg"),
];

const THUMBNAIL: &[MimeType] = &[
    MimeType::new("image/jpeg", "jpg"),
    MimeType::new("image/png", "png"),
    MimeType::new("image/jpg", "jpg"),
];

lazy_static! {
    static ref EXTENSIONS: HashMap<&'static str, &'static str> = AUDIO
        .iter()
        .chain(VIDEO)
        .chain(THUMBNAIL)
        .map(|m| (m.essence, m.extension))
        .collect();
}

/// The content types accepted for `slot`.
pub fn allowed_for(slot: AssetSlot) -> &'static [MimeType] {
    match slot {
        AssetSlot::Audio => AUDIO,
        AssetSlot::Video => VIDEO,
        AssetSlot::Thumbnail => THUMBNAIL,
    }
}

/// The file extension for a content type, if it is one we accept.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    essence_of(content_type).and_then(|essence| EXTENSIONS.get(essence.as_str()).copied())
}

/// Checks that `content_type` may be stored in `slot`, returning its
/// essence (the type without parameters) if so.
pub fn check(slot: AssetSlot, content_type: Option<&str>) -> Result<String, BackendError> {
    let allowed = allowed_for(slot);
    let essence = content_type.and_then(essence_of);

    match essence {
        Some(essence) if allowed.iter().any(|m| m.essence == essence) => Ok(essence),
        _ => Err(BackendError::DisallowedContentType {
            slot,
            content_type: content_type.unwrap_or("none").to_owned(),
            allowed: allowed
                .iter()
                .map(|m| m.essence)
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

fn essence_of(content_type: &str) -> Option<String> {
    content_type
        .parse::<Mime>()
        .ok()
        .map(|mime| mime.essence_str().to_ascii_lowercase())
}
