use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// One row per filesystem path. `path` is the sole identity; the
/// `(mtime, size)` pair is the freshness signature. A stored
/// `mtime == 0` marks a row that was never successfully tagged (legacy
/// import sentinel) and always forces re-extraction.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Track {
    pub path: String,
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
    pub ext: String,
    pub mtime: i64,
    pub size: u64,
    pub added_at: i64,
    pub updated_at: i64,
}

impl Track {
    pub fn signature_matches(&self, mtime: i64, size: u64) -> bool {
        self.mtime == mtime && self.size == size && self.mtime != 0
    }
}

pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Trim and collapse internal whitespace; empty results become `None`.
pub fn collapse_ws(value: &str) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Canonical form used on both sides of every artist comparison:
/// lowercase, keep only `[a-z0-9+& ]`, collapse runs of whitespace.
pub fn normalize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_space = true;
    for ch in value.chars() {
        let lowered = ch.to_ascii_lowercase();
        if lowered.is_ascii_lowercase()
            || lowered.is_ascii_digit()
            || lowered == '+'
            || lowered == '&'
        {
            out.push(lowered);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim_end().to_string()
}

/// True when any path segment is the reserved `Playlists` folder.
/// Segment match, not substring, so "My Playlists Vol 2" is untouched.
pub fn is_playlists_path(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str().to_str() == Some("Playlists"))
}

pub fn lower_ext(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("  Miles   Davis!  "), "miles davis");
        assert_eq!(normalize("AC/DC"), "ac dc");
        assert_eq!(normalize("Simon & Garfunkel"), "simon & garfunkel");
        assert_eq!(normalize("90's music"), "90 s music");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn collapse_ws_handles_blanks() {
        assert_eq!(collapse_ws("  The   Band "), Some("The Band".to_string()));
        assert_eq!(collapse_ws("   "), None);
    }

    #[test]
    fn playlists_match_is_segment_based() {
        assert!(is_playlists_path(&PathBuf::from("/mnt/music/Playlists/a.mp3")));
        assert!(is_playlists_path(&PathBuf::from("/mnt/music/Playlists")));
        assert!(!is_playlists_path(&PathBuf::from(
            "/mnt/music/My Playlists Vol 2/a.mp3"
        )));
        assert!(!is_playlists_path(&PathBuf::from("/mnt/music/playlists/a.mp3")));
    }

    #[test]
    fn signature_zero_mtime_never_matches() {
        let track = Track {
            path: "/a.mp3".into(),
            mtime: 0,
            size: 10,
            ..Track::default()
        };
        assert!(!track.signature_matches(0, 10));
    }
}
