use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use crate::normalization::{normalize_optional, normalize_tags, normalize_text};
use crate::store::ResourceType;

const ANONYMOUS: &str = "anonymous";

/// The longest duration, in seconds, the `duration` column can hold.
pub const MAX_DURATION: u32 = i32::MAX as u32;

/// One of the fixed positions a binary asset can occupy.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetSlot {
    Audio,
    Video,
    Thumbnail,
}

impl AssetSlot {
    pub const ALL: &'static [AssetSlot] = &[AssetSlot::Audio, AssetSlot::Video, AssetSlot::Thumbnail];

    /// The form field and JSON key for the slot.
    pub fn name(self) -> &'static str {
        match self {
            AssetSlot::Audio => "audio",
            AssetSlot::Video => "video",
            AssetSlot::Thumbnail => "thumbnail",
        }
    }

    /// How the blob store should treat uploads to this slot.
    pub fn resource_type(self) -> ResourceType {
        match self {
            AssetSlot::Video => ResourceType::Video,
            AssetSlot::Audio | AssetSlot::Thumbnail => ResourceType::Auto,
        }
    }
}

impl fmt::Display for AssetSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AssetSlot {
    type Err = UnknownSlot;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetSlot::ALL
            .iter()
            .copied()
            .find(|slot| slot.name() == s)
            .ok_or(UnknownSlot)
    }
}

#[derive(Debug)]
pub struct UnknownSlot;

/// Who uploaded a bhajan.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Uploader {
    Anonymous,
    User(Uuid),
}

impl Default for Uploader {
    fn default() -> Self {
        Uploader::Anonymous
    }
}

impl fmt::Display for Uploader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uploader::Anonymous => f.write_str(ANONYMOUS),
            Uploader::User(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for Uploader {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if s.is_empty() || s.eq_ignore_ascii_case(ANONYMOUS) {
            return Ok(Uploader::Anonymous);
        }

        Uuid::parse_str(s)
            .map(Uploader::User)
            .map_err(|_| format!("uploadedBy must be a user ID or {:?}, not {:?}", ANONYMOUS, s))
    }
}

impl Serialize for Uploader {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The descriptive metadata of a bhajan.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BhajanDetails {
    pub title: String,
    pub artist: String,
    pub language: String,

    /// The length in seconds.
    pub duration: u32,

    pub lyrics: Option<String>,

    /// For example "Kirtan" or "Aarti".
    pub genre: Option<String>,

    pub album: Option<String>,
    pub release_year: Option<i32>,
    pub tags: Vec<String>,
    pub is_featured: bool,
    pub uploaded_by: Uploader,
}

impl BhajanDetails {
    /// Builds the details for a new bhajan, failing if any required
    /// field is missing or blank.
    pub fn from_changes(changes: &BhajanChanges) -> Result<Self, String> {
        let required_text = |value: &Option<String>| {
            value
                .as_deref()
                .map(normalize_text)
                .filter(|text| !text.is_empty())
        };

        let title = required_text(&changes.title);
        let artist = required_text(&changes.artist);
        let language = required_text(&changes.language);

        let (title, artist, language, duration) =
            match (title, artist, language, changes.duration) {
                (Some(title), Some(artist), Some(language), Some(duration)) => {
                    (title, artist, language, duration)
                }
                (title, artist, language, duration) => {
                    let missing = [
                        ("title", title.is_none()),
                        ("artist", artist.is_none()),
                        ("language", language.is_none()),
                        ("duration", duration.is_none()),
                    ]
                    .iter()
                    .filter(|(_, missing)| *missing)
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>();

                    return Err(format!(
                        "title, artist, language, and duration are required (missing: {})",
                        missing.join(", ")
                    ));
                }
            };

        let mut details = BhajanDetails {
            title,
            artist,
            language,
            duration,
            lyrics: None,
            genre: None,
            album: None,
            release_year: None,
            tags: vec![],
            is_featured: false,
            uploaded_by: Uploader::Anonymous,
        };
        details.apply(changes);
        details.validate()?;

        Ok(details)
    }

    /// Overwrites every field present in `changes`, leaving the rest
    /// untouched.
    pub fn apply(&mut self, changes: &BhajanChanges) {
        if let Some(title) = &changes.title {
            self.title = normalize_text(title);
        }
        if let Some(artist) = &changes.artist {
            self.artist = normalize_text(artist);
        }
        if let Some(language) = &changes.language {
            self.language = normalize_text(language);
        }
        if let Some(duration) = changes.duration {
            self.duration = duration;
        }
        if let Some(lyrics) = &changes.lyrics {
            self.lyrics = normalize_optional(lyrics);
        }
        if let Some(genre) = &changes.genre {
            self.genre = normalize_optional(genre);
        }
        if let Some(album) = &changes.album {
            self.album = normalize_optional(album);
        }
        if let Some(release_year) = changes.release_year {
            self.release_year = Some(release_year);
        }
        if let Some(tags) = &changes.tags {
            self.tags = normalize_tags(tags.clone());
        }
        if let Some(is_featured) = changes.is_featured {
            self.is_featured = is_featured;
        }
        if let Some(uploaded_by) = changes.uploaded_by {
            self.uploaded_by = uploaded_by;
        }
    }

    /// Checks the rules every stored bhajan must satisfy.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in &[
            ("title", &self.title),
            ("artist", &self.artist),
            ("language", &self.language),
        ] {
            if value.is_empty() {
                return Err(format!("{} must not be empty", name));
            }
        }

        if self.duration > MAX_DURATION {
            return Err(format!("duration {} is too long", self.duration));
        }

        match self.release_year {
            Some(year) if !(1..=9999).contains(&year) => {
                Err(format!("releaseYear {} is out of range", year))
            }
            _ => Ok(()),
        }
    }
}

/// A set of descriptive fields to write. `None` means the field was not
/// supplied; `Some` overwrites, so `Some(vec![])` clears the tags.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BhajanChanges {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub language: Option<String>,
    pub duration: Option<u32>,
    pub lyrics: Option<String>,
    pub genre: Option<String>,
    pub album: Option<String>,
    pub release_year: Option<i32>,
    pub tags: Option<Vec<String>>,
    pub is_featured: Option<bool>,
    pub uploaded_by: Option<Uploader>,
}

/// Pointers to the assets of a bhajan in the blob store.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AssetReferences {
    pub audio: Option<Url>,
    pub video: Option<Url>,
    pub thumbnail: Option<Url>,
}

impl AssetReferences {
    pub fn get(&self, slot: AssetSlot) -> Option<&Url> {
        match slot {
            AssetSlot::Audio => self.audio.as_ref(),
            AssetSlot::Video => self.video.as_ref(),
            AssetSlot::Thumbnail => self.thumbnail.as_ref(),
        }
    }

    /// Points `slot` at `url`, returning what it pointed at before.
    pub fn replace(&mut self, slot: AssetSlot, url: Url) -> Option<Url> {
        let target = match slot {
            AssetSlot::Audio => &mut self.audio,
            AssetSlot::Video => &mut self.video,
            AssetSlot::Thumbnail => &mut self.thumbnail,
        };

        target.replace(url)
    }

    /// The populated slots, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (AssetSlot, &Url)> + '_ {
        AssetSlot::ALL
            .iter()
            .filter_map(move |&slot| self.get(slot).map(|url| (slot, url)))
    }
}

impl From<BTreeMap<AssetSlot, Url>> for AssetReferences {
    fn from(map: BTreeMap<AssetSlot, Url>) -> Self {
        let mut references = AssetReferences::default();

        for (slot, url) in map {
            references.replace(slot, url);
        }

        references
    }
}

/// A single bhajan in the repository.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bhajan {
    id: Uuid,

    #[serde(flatten)]
    details: BhajanDetails,

    #[serde(flatten)]
    assets: AssetReferences,

    views: i64,
    likes: i64,

    #[serde(with = "time::serde::timestamp")]
    created_at: OffsetDateTime,
}

impl Bhajan {
    pub fn new(
        id: Uuid,
        details: BhajanDetails,
        assets: AssetReferences,
        views: i64,
        likes: i64,
        created_at: OffsetDateTime,
    ) -> Self {
        Bhajan {
            id,
            details,
            assets,
            views,
            likes,
            created_at,
        }
    }

    pub fn id(&self) -> &Uuid {
        &self.id
    }

    pub fn details(&self) -> &BhajanDetails {
        &self.details
    }

    pub fn assets(&self) -> &AssetReferences {
        &self.assets
    }

    pub fn views(&self) -> i64 {
        self.views
    }

    pub fn likes(&self) -> i64 {
        self.likes
    }

    /// Applies `patch` and re-validates the result. The ID, counters
    /// and creation time never change.
    pub fn patch(&mut self, patch: &BhajanPatch) -> Result<(), String> {
        let mut details = self.details.clone();
        details.apply(&patch.changes);
        details.validate()?;

        self.details = details;
        for (slot, url) in &patch.assets {
            self.assets.replace(*slot, url.clone());
        }

        Ok(())
    }
}

/// A bhajan that has not yet been given an ID.
#[derive(Clone, Debug, PartialEq)]
pub struct NewBhajan {
    pub details: BhajanDetails,
    pub assets: AssetReferences,
}

/// A partial update: the descriptive fields to overwrite and the asset
/// slots to repoint.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BhajanPatch {
    pub changes: BhajanChanges,
    pub assets: BTreeMap<AssetSlot, Url>,
}
