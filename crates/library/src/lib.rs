mod import;
mod scan;

pub use import::import_legacy_json;
pub use scan::{prune, sync, SyncReport, AUDIO_EXTS};

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::{normalize, now_secs, Track};
use rand::seq::SliceRandom;
use redb::{
    CommitError, Database, DatabaseError, ReadableTable, StorageError, TableDefinition, TableError,
    TransactionError,
};
use serde::{Deserialize, Serialize};

const TRACKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tracks");
const SCAN_STATE_TABLE: TableDefinition<&str, &str> = TableDefinition::new("scan_state");

/// Bumped whenever the row shape or tag extraction rules change; a
/// mismatch forces the next sync to re-extract every file.
pub const INDEX_VERSION: u32 = 1;

pub const STATE_INDEX_VERSION: &str = "index_version";
pub const STATE_LAST_SCAN_AT: &str = "last_scan_at";
pub const STATE_LAST_PRUNE_AT: &str = "last_prune_at";
pub const STATE_MIGRATED_AT: &str = "migrated_from_json_at";

/// Tracks shorter than this never enter a playlist pool; fragments and
/// interludes make poor shuffle material.
pub const MIN_CANDIDATE_SECS: f64 = 30.0;

/// Last-known freshness signature of a stored row, snapshotted up
/// front so a scan pass never holds a read transaction open.
#[derive(Clone, Copy, Debug)]
pub struct Signature {
    pub mtime: i64,
    pub size: u64,
    pub added_at: i64,
}

/// Persistent track index. The only writer is the indexer; short-lived
/// readers see a consistent snapshot while a write batch is open.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, LibraryError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let db = if path.exists() {
            Database::open(path)?
        } else {
            Database::create(path)?
        };
        Ok(Self { db: Arc::new(db) })
    }

    pub fn get(&self, path: &str) -> Result<Option<Track>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(TRACKS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let track = match table.get(path)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(track)
    }

    /// Idempotent upsert of a batch of rows in one committed
    /// transaction. Callers resolve `added_at` before handing rows in.
    pub fn upsert_batch(&self, tracks: &[Track]) -> Result<(), LibraryError> {
        if tracks.is_empty() {
            return Ok(());
        }
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TRACKS_TABLE)?;
            for track in tracks {
                let bytes = encode_value(track)?;
                table.insert(track.path.as_str(), bytes.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn remove_batch(&self, paths: &[String]) -> Result<(), LibraryError> {
        if paths.is_empty() {
            return Ok(());
        }
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TRACKS_TABLE)?;
            for path in paths {
                table.remove(path.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Snapshot of every stored freshness signature, keyed by path.
    pub fn signatures(&self) -> Result<HashMap<String, Signature>, LibraryError> {
        let mut out = HashMap::new();
        self.for_each_track(|track| {
            out.insert(
                track.path.clone(),
                Signature {
                    mtime: track.mtime,
                    size: track.size,
                    added_at: track.added_at,
                },
            );
            Ok(())
        })?;
        Ok(out)
    }

    pub fn all_paths(&self) -> Result<Vec<String>, LibraryError> {
        let mut out = Vec::new();
        self.for_each_track(|track| {
            out.push(track.path.clone());
            Ok(())
        })?;
        Ok(out)
    }

    pub fn track_count(&self) -> Result<usize, LibraryError> {
        let mut count = 0usize;
        self.for_each_track(|_| {
            count += 1;
            Ok(())
        })?;
        Ok(count)
    }

    /// Distinct artist names, first-seen casing, ordered by their
    /// normalized form. This is the known-artist list fed to the
    /// intent parser.
    pub fn artists(&self) -> Result<Vec<String>, LibraryError> {
        let mut by_norm: BTreeMap<String, String> = BTreeMap::new();
        self.for_each_track(|track| {
            if let Some(artist) = &track.artist {
                let key = normalize(artist);
                if !key.is_empty() {
                    by_norm.entry(key).or_insert_with(|| artist.clone());
                }
            }
            Ok(())
        })?;
        Ok(by_norm.into_values().collect())
    }

    /// Playable tracks for one artist, optionally restricted to an
    /// inclusive year range. Matching is on normalized artist names so
    /// transcription casing and punctuation never miss.
    pub fn tracks_for_artist(
        &self,
        artist: &str,
        years: Option<(i32, i32)>,
    ) -> Result<Vec<Track>, LibraryError> {
        let wanted = normalize(artist);
        let mut out = Vec::new();
        self.for_each_track(|track| {
            let candidate = match &track.artist {
                Some(name) => name,
                None => return Ok(()),
            };
            if normalize(candidate) != wanted {
                return Ok(());
            }
            if let Some((start, end)) = years {
                match track.year {
                    Some(year) if year >= start && year <= end => {}
                    _ => return Ok(()),
                }
            }
            if is_playable(track) {
                out.push(track.clone());
            }
            Ok(())
        })?;
        Ok(out)
    }

    /// Random sample of playable tracks across the whole index, the
    /// pool behind "surprise me" requests.
    pub fn random_pool(&self, limit: usize) -> Result<Vec<Track>, LibraryError> {
        let mut pool = Vec::new();
        self.for_each_track(|track| {
            if is_playable(track) {
                pool.push(track.clone());
            }
            Ok(())
        })?;
        let mut rng = rand::rng();
        pool.shuffle(&mut rng);
        pool.truncate(limit);
        Ok(pool)
    }

    pub fn state_get(&self, key: &str) -> Result<Option<String>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(SCAN_STATE_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let value = table.get(key)?.map(|v| v.value().to_string());
        Ok(value)
    }

    pub fn state_set(&self, key: &str, value: &str) -> Result<(), LibraryError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SCAN_STATE_TABLE)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn mark_state_now(&self, key: &str) -> Result<(), LibraryError> {
        self.state_set(key, &now_secs().to_string())
    }

    fn for_each_track<F>(&self, mut visit: F) -> Result<(), LibraryError>
    where
        F: FnMut(&Track) -> Result<(), LibraryError>,
    {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(TRACKS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        for entry in table.iter()? {
            let entry = entry?;
            let track: Track = decode_value(entry.1.value())?;
            visit(&track)?;
        }
        Ok(())
    }
}

fn is_playable(track: &Track) -> bool {
    let duration = track.duration.unwrap_or(0.0);
    duration > MIN_CANDIDATE_SECS && !common::is_playlists_path(Path::new(&track.path))
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, LibraryError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, LibraryError> {
    Ok(bincode::deserialize(bytes)?)
}

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Redb(redb::Error),
    Bincode(Box<bincode::ErrorKind>),
    Json(serde_json::Error),
    LegacyFormat(String),
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::Redb(err) => write!(f, "store error: {}", err),
            LibraryError::Bincode(err) => write!(f, "row encoding error: {}", err),
            LibraryError::Json(err) => write!(f, "json error: {}", err),
            LibraryError::LegacyFormat(msg) => write!(f, "legacy index format: {}", msg),
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<redb::Error> for LibraryError {
    fn from(err: redb::Error) -> Self {
        LibraryError::Redb(err)
    }
}

impl From<DatabaseError> for LibraryError {
    fn from(err: DatabaseError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<TableError> for LibraryError {
    fn from(err: TableError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<TransactionError> for LibraryError {
    fn from(err: TransactionError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<StorageError> for LibraryError {
    fn from(err: StorageError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<CommitError> for LibraryError {
    fn from(err: CommitError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for LibraryError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        LibraryError::Bincode(err)
    }
}

impl From<serde_json::Error> for LibraryError {
    fn from(err: serde_json::Error) -> Self {
        LibraryError::Json(err)
    }
}

#[cfg(test)]
pub(crate) fn test_store(dir: &Path) -> Store {
    Store::open(&dir.join("index.redb")).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn track(path: &str, artist: Option<&str>, year: Option<i32>, duration: f64) -> Track {
        Track {
            path: path.to_string(),
            artist: artist.map(str::to_string),
            year,
            duration: Some(duration),
            mtime: 100,
            size: 1,
            added_at: 1,
            updated_at: 1,
            ..Track::default()
        }
    }

    #[test]
    fn upsert_is_keyed_by_path() {
        let dir = TempDir::new().unwrap();
        let store = test_store(dir.path());

        store
            .upsert_batch(&[track("/m/a.flac", Some("Miles Davis"), Some(1959), 300.0)])
            .unwrap();
        store
            .upsert_batch(&[track("/m/a.flac", Some("Miles Davis"), Some(1967), 290.0)])
            .unwrap();

        assert_eq!(store.track_count().unwrap(), 1);
        let row = store.get("/m/a.flac").unwrap().unwrap();
        assert_eq!(row.year, Some(1967));
    }

    #[test]
    fn artist_query_normalizes_and_filters_years() {
        let dir = TempDir::new().unwrap();
        let store = test_store(dir.path());
        store
            .upsert_batch(&[
                track("/m/a.flac", Some("Miles Davis"), Some(1959), 300.0),
                track("/m/b.flac", Some("MILES DAVIS"), Some(1986), 300.0),
                track("/m/c.flac", Some("John Coltrane"), Some(1959), 300.0),
                // too short for any pool
                track("/m/d.flac", Some("Miles Davis"), Some(1959), 20.0),
                // no year: excluded once a range is requested
                track("/m/e.flac", Some("Miles Davis"), None, 300.0),
            ])
            .unwrap();

        let all = store.tracks_for_artist("miles davis", None).unwrap();
        assert_eq!(all.len(), 3);

        let fifties = store
            .tracks_for_artist("Miles Davis", Some((1950, 1959)))
            .unwrap();
        assert_eq!(fifties.len(), 1);
        assert_eq!(fifties[0].path, "/m/a.flac");
    }

    #[test]
    fn playlists_rows_never_enter_pools() {
        let dir = TempDir::new().unwrap();
        let store = test_store(dir.path());
        store
            .upsert_batch(&[
                track("/m/Playlists/x.mp3", Some("Miles Davis"), Some(1959), 300.0),
                track("/m/ok.mp3", Some("Miles Davis"), Some(1959), 300.0),
            ])
            .unwrap();

        let pool = store.tracks_for_artist("Miles Davis", None).unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].path, "/m/ok.mp3");

        let random = store.random_pool(10).unwrap();
        assert_eq!(random.len(), 1);
    }

    #[test]
    fn artists_are_distinct_with_first_seen_casing() {
        let dir = TempDir::new().unwrap();
        let store = test_store(dir.path());
        store
            .upsert_batch(&[
                track("/m/1.mp3", Some("Miles Davis"), None, 300.0),
                track("/m/2.mp3", Some("miles davis"), None, 300.0),
                track("/m/3.mp3", Some("John Coltrane"), None, 300.0),
                track("/m/4.mp3", None, None, 300.0),
            ])
            .unwrap();

        let artists = store.artists().unwrap();
        assert_eq!(artists, vec!["John Coltrane", "Miles Davis"]);
    }

    #[test]
    fn scan_state_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = test_store(dir.path());
        assert_eq!(store.state_get(STATE_LAST_SCAN_AT).unwrap(), None);
        store.state_set(STATE_LAST_SCAN_AT, "123").unwrap();
        assert_eq!(
            store.state_get(STATE_LAST_SCAN_AT).unwrap().as_deref(),
            Some("123")
        );
    }

    #[test]
    fn empty_store_reads_are_not_errors() {
        let dir = TempDir::new().unwrap();
        let store = test_store(dir.path());
        assert!(store.get("/nope").unwrap().is_none());
        assert!(store.artists().unwrap().is_empty());
        assert_eq!(store.track_count().unwrap(), 0);
    }
}
