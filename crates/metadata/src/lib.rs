use std::path::Path;

use lofty::error::LoftyError;
use lofty::prelude::{AudioFile, ItemKey, TaggedFileExt};

/// Raw tag fields for one audio file, exactly as read from the container.
/// Absent or unparseable fields stay `None`; interpretation happens later.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RawTags {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub track_number: Option<u32>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub duration_seconds: Option<f64>,
    pub bitrate: Option<u32>,
}

/// Tag extraction failed; the file is skipped and the scan continues.
#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

/// The external collaborator that turns a file path into a tag record.
/// Scanning is written against this trait so tests can substitute a stub.
pub trait TagSource {
    fn read(&self, path: &Path) -> Result<RawTags, MetadataError>;
}

/// Lofty-backed reader used by the real scanner.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagSource;

impl TagSource for LoftyTagSource {
    fn read(&self, path: &Path) -> Result<RawTags, MetadataError> {
        read_tags(path)
    }
}

pub fn read_tags(path: &Path) -> Result<RawTags, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let properties = tagged_file.properties();

    let mut tags = RawTags::default();

    let duration = properties.duration();
    if !duration.is_zero() {
        tags.duration_seconds = Some(duration.as_secs_f64());
    }
    tags.bitrate = properties.audio_bitrate().or(properties.overall_bitrate());

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        tags.title = tag.get_string(&ItemKey::TrackTitle).map(|v| v.to_string());
        tags.album = tag.get_string(&ItemKey::AlbumTitle).map(|v| v.to_string());
        let album_artist = tag.get_string(&ItemKey::AlbumArtist).map(|v| v.to_string());
        let track_artist = tag.get_string(&ItemKey::TrackArtist).map(|v| v.to_string());
        tags.artist = track_artist.or(album_artist);
        tags.track_number = tag.get_string(&ItemKey::TrackNumber).and_then(parse_track_no);
        tags.year = tag.get_string(&ItemKey::Year).and_then(parse_year);
        tags.genre = tag
            .get_string(&ItemKey::Genre)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
    }

    Ok(tags)
}

fn parse_track_no(text: &str) -> Option<u32> {
    // Tags commonly carry "3/12"; only the position matters here.
    let head = match text.split_once('/') {
        Some((position, _total)) => position,
        None => text,
    };
    head.trim().parse().ok()
}

/// First run of digits, capped at four: "1972-05-01" -> 1972.
fn parse_year(text: &str) -> Option<i32> {
    let digits: String = text
        .chars()
        .skip_while(|ch| !ch.is_ascii_digit())
        .take_while(|ch| ch.is_ascii_digit())
        .take(4)
        .collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}
