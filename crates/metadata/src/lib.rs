use std::path::Path;

use common::collapse_ws;
use lofty::error::LoftyError;
use lofty::prelude::{AudioFile, ItemKey, TaggedFileExt};

/// Fixed-shape record crossing the indexer/tag-reader boundary. Every
/// field is optional; an unreadable file maps to `TagRecord::default()`
/// on the caller's side, never to a scan failure.
#[derive(Debug, Default, Clone)]
pub struct TagRecord {
    pub artist: Option<String>,
    pub artist_sort: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub genre: Option<String>,
    pub tracknumber: Option<u32>,
    pub year: Option<i32>,
    pub duration: Option<f64>,
    pub bitrate: Option<u32>,
    pub samplerate: Option<u32>,
    pub channels: Option<u8>,
}

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

pub fn read_tags(path: &Path) -> Result<TagRecord, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let properties = tagged_file.properties();

    let mut record = TagRecord::default();

    let duration = properties.duration().as_secs_f64();
    if duration > 0.0 {
        record.duration = Some(duration);
    }
    record.samplerate = properties.sample_rate();
    record.channels = properties.channels();
    record.bitrate = properties.audio_bitrate().or(properties.overall_bitrate());

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        record.title = tag.get_string(&ItemKey::TrackTitle).and_then(collapse_ws);
        record.album = tag.get_string(&ItemKey::AlbumTitle).and_then(collapse_ws);
        let album_artist = tag.get_string(&ItemKey::AlbumArtist).and_then(collapse_ws);
        let track_artist = tag.get_string(&ItemKey::TrackArtist).and_then(collapse_ws);
        record.artist = track_artist.or(album_artist);
        record.artist_sort = tag
            .get_string(&ItemKey::TrackArtistSortOrder)
            .and_then(collapse_ws);
        record.genre = tag.get_string(&ItemKey::Genre).and_then(first_genre);
        record.tracknumber = tag.get_string(&ItemKey::TrackNumber).and_then(parse_track_no);
        record.year = pick_year(tag);
    }

    Ok(record)
}

/// Release year by priority: original release date, then recording
/// date, then the bare year field. Reissues commonly carry the reissue
/// year in the date field and the real one in originaldate.
fn pick_year(tag: &lofty::tag::Tag) -> Option<i32> {
    let keys = [
        ItemKey::OriginalReleaseDate,
        ItemKey::RecordingDate,
        ItemKey::Year,
    ];
    for key in keys {
        if let Some(year) = tag.get_string(&key).and_then(parse_year) {
            return Some(year);
        }
    }
    None
}

/// First four consecutive digits, so "1967-12-27" and "1967" both
/// parse; non-numeric values yield `None` rather than an error.
fn parse_year(text: &str) -> Option<i32> {
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 4 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.len() < 4 {
        return None;
    }
    let year: i32 = digits.parse().ok()?;
    if (1000..=3000).contains(&year) {
        Some(year)
    } else {
        None
    }
}

/// Track numbers arrive as "7", "7/12", or garbage; take the head and
/// give up quietly on anything unparseable.
fn parse_track_no(text: &str) -> Option<u32> {
    let head = text.split('/').next().unwrap_or(text).trim();
    head.parse().ok()
}

fn first_genre(text: &str) -> Option<String> {
    text.split(&[';', ',', '/', '|', '\0'][..])
        .map(str::trim)
        .find(|part| !part.is_empty())
        .map(str::to_string)
        .and_then(|part| collapse_ws(&part))
}
