use std::path::Path;
use std::time::UNIX_EPOCH;

use common::{is_playlists_path, lower_ext, now_secs, Track};
use metadata::{read_tags, TagRecord};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::{
    LibraryError, Store, INDEX_VERSION, STATE_INDEX_VERSION, STATE_LAST_PRUNE_AT,
    STATE_LAST_SCAN_AT,
};

pub const AUDIO_EXTS: [&str; 9] = [
    "flac", "mp3", "m4a", "aac", "ogg", "opus", "wav", "aiff", "alac",
];

/// Mutated rows per committed batch. A crash mid-scan loses at most
/// one batch, and the freshness check makes the re-run cheap.
const COMMIT_BATCH: usize = 250;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub scanned: u64,
    pub inserted: u64,
    pub changed: u64,
    pub skipped: u64,
}

/// Reconcile the store with the filesystem under `root`. Unchanged
/// files (matching freshness signature) are skipped without touching
/// the tag reader; `force` re-extracts everything.
pub fn sync(store: &Store, root: &Path, force: bool) -> Result<SyncReport, LibraryError> {
    let mut force = force;
    match store.state_get(STATE_INDEX_VERSION)? {
        Some(version) if version == INDEX_VERSION.to_string() => {}
        Some(version) => {
            warn!("Index version mismatch ({}); re-extracting all files", version);
            force = true;
        }
        None => {}
    }

    let existing = store.signatures()?;
    let now = now_secs();

    let mut report = SyncReport::default();
    let mut batch: Vec<Track> = Vec::with_capacity(COMMIT_BATCH);

    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_playlists_dir(e))
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let ext = lower_ext(path);
        if !AUDIO_EXTS.contains(&ext.as_str()) {
            continue;
        }
        if is_playlists_path(path) {
            continue;
        }

        // File may vanish between enumeration and stat; never fatal.
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(err) => {
                debug!("Skipping {:?}: stat failed ({})", path, err);
                continue;
            }
        };
        let mtime = mtime_secs(&meta);
        let size = meta.len();

        report.scanned += 1;

        let path_str = path.to_string_lossy().into_owned();
        let prev = existing.get(&path_str);
        if !force {
            if let Some(sig) = prev {
                if sig.mtime == mtime && sig.size == size && sig.mtime != 0 {
                    report.skipped += 1;
                    continue;
                }
            }
        }

        let tags = match read_tags(path) {
            Ok(tags) => tags,
            Err(err) => {
                // Unreadable metadata is a successful scan of an
                // untagged file; the row still gets written.
                warn!("Failed to read tags for {:?}: {}", path, err);
                TagRecord::default()
            }
        };

        let added_at = prev.map(|sig| sig.added_at).unwrap_or(now);
        batch.push(Track {
            path: path_str,
            artist: tags.artist,
            artist_sort: tags.artist_sort,
            album: tags.album,
            title: tags.title,
            genre: tags.genre,
            tracknumber: tags.tracknumber,
            year: tags.year,
            duration: tags.duration,
            bitrate: tags.bitrate,
            samplerate: tags.samplerate,
            channels: tags.channels,
            ext,
            mtime,
            size,
            added_at,
            updated_at: now,
        });

        if prev.is_some() {
            report.changed += 1;
        } else {
            report.inserted += 1;
        }

        if batch.len() >= COMMIT_BATCH {
            store.upsert_batch(&batch)?;
            batch.clear();
        }
    }

    store.upsert_batch(&batch)?;
    store.state_set(STATE_INDEX_VERSION, &INDEX_VERSION.to_string())?;
    store.state_set(STATE_LAST_SCAN_AT, &now.to_string())?;

    info!(
        "Sync done: scanned={} inserted={} changed={} skipped={}",
        report.scanned, report.inserted, report.changed, report.skipped
    );
    Ok(report)
}

/// Drop rows whose file no longer exists on disk. Deliberately a
/// separate pass: sync never deletes, so a flaky mount cannot empty
/// the index as a side effect of scanning.
pub fn prune(store: &Store, root: &Path) -> Result<usize, LibraryError> {
    let mut missing = Vec::new();
    for path in store.all_paths()? {
        let on_disk = Path::new(&path);
        if on_disk.starts_with(root) && !on_disk.is_file() {
            missing.push(path);
        }
    }

    for chunk in missing.chunks(COMMIT_BATCH) {
        store.remove_batch(chunk)?;
    }
    store.state_set(STATE_LAST_PRUNE_AT, &now_secs().to_string())?;

    info!("Prune done: removed={}", missing.len());
    Ok(missing.len())
}

fn is_playlists_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name() == "Playlists"
}

fn mtime_secs(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_store;
    use std::fs;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn second_sync_skips_everything() {
        let music = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let store = test_store(data.path());

        write_file(music.path(), "a.mp3", b"aaaa");
        write_file(music.path(), "b.flac", b"bbbb");
        write_file(music.path(), "sub/c.ogg", b"cccc");
        write_file(music.path(), "notes.txt", b"not audio");

        let first = sync(&store, music.path(), false).unwrap();
        assert_eq!(first.scanned, 3);
        assert_eq!(first.inserted, 3);
        assert_eq!(first.changed, 0);
        assert_eq!(first.skipped, 0);

        let second = sync(&store, music.path(), false).unwrap();
        assert_eq!(second.scanned, 3);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.changed, 0);
        assert_eq!(second.skipped, 3);
    }

    #[test]
    fn changed_signature_triggers_reextraction() {
        let music = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let store = test_store(data.path());

        write_file(music.path(), "a.mp3", b"aaaa");
        write_file(music.path(), "b.mp3", b"bbbb");
        write_file(music.path(), "c.mp3", b"cccc");
        sync(&store, music.path(), false).unwrap();

        // size change implies a new signature
        write_file(music.path(), "b.mp3", b"bbbb-and-more");

        let report = sync(&store, music.path(), false).unwrap();
        assert_eq!(report.scanned, 3);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.changed, 1);
        assert_eq!(report.inserted, 0);
    }

    #[test]
    fn zero_mtime_row_is_always_reextracted() {
        let music = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let store = test_store(data.path());

        // Row with the 0 sentinel (a legacy import) and a size that
        // happens to match the file on disk: never counted as fresh.
        write_file(music.path(), "a.mp3", b"aaaa");
        let path = music.path().join("a.mp3");
        store
            .upsert_batch(&[Track {
                path: path.to_string_lossy().into_owned(),
                mtime: 0,
                size: 4,
                ..Track::default()
            }])
            .unwrap();

        let report = sync(&store, music.path(), false).unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.changed, 1);
        assert_eq!(report.skipped, 0);

        let row = store.get(&path.to_string_lossy()).unwrap().unwrap();
        assert!(row.mtime != 0);
    }

    #[test]
    fn force_bypasses_freshness_check() {
        let music = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let store = test_store(data.path());

        write_file(music.path(), "a.mp3", b"aaaa");
        sync(&store, music.path(), false).unwrap();

        let report = sync(&store, music.path(), true).unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.changed, 1);
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn playlists_subtree_is_excluded() {
        let music = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let store = test_store(data.path());

        write_file(music.path(), "a.mp3", b"aaaa");
        write_file(music.path(), "Playlists/mix.mp3", b"mmmm");
        write_file(music.path(), "My Playlists Vol 2/ok.mp3", b"oooo");

        let report = sync(&store, music.path(), false).unwrap();
        assert_eq!(report.scanned, 2);
        assert!(store
            .get(&music.path().join("Playlists/mix.mp3").to_string_lossy())
            .unwrap()
            .is_none());
    }

    #[test]
    fn unreadable_files_still_get_rows() {
        let music = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let store = test_store(data.path());

        // not valid audio: tag reader fails, row written with null
        // metadata and a real freshness signature
        write_file(music.path(), "junk.mp3", b"not really an mp3");
        sync(&store, music.path(), false).unwrap();

        let path = music.path().join("junk.mp3");
        let row = store.get(&path.to_string_lossy()).unwrap().unwrap();
        assert!(row.artist.is_none());
        assert!(row.duration.is_none());
        assert!(row.mtime != 0);
        assert_eq!(row.ext, "mp3");
    }

    #[test]
    fn added_at_survives_rescans() {
        let music = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let store = test_store(data.path());

        write_file(music.path(), "a.mp3", b"aaaa");
        sync(&store, music.path(), false).unwrap();
        let path = music.path().join("a.mp3");
        let first = store.get(&path.to_string_lossy()).unwrap().unwrap();

        write_file(music.path(), "a.mp3", b"aaaa-changed");
        sync(&store, music.path(), false).unwrap();
        let second = store.get(&path.to_string_lossy()).unwrap().unwrap();

        assert_eq!(first.added_at, second.added_at);
        assert!(second.size != first.size);
    }

    #[test]
    fn prune_removes_only_vanished_rows() {
        let music = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let store = test_store(data.path());

        write_file(music.path(), "keep.mp3", b"kkkk");
        write_file(music.path(), "gone.mp3", b"gggg");
        sync(&store, music.path(), false).unwrap();

        fs::remove_file(music.path().join("gone.mp3")).unwrap();

        let removed = prune(&store, music.path()).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.track_count().unwrap(), 1);
        assert!(store
            .get(&music.path().join("keep.mp3").to_string_lossy())
            .unwrap()
            .is_some());
        assert!(store.state_get(STATE_LAST_PRUNE_AT).unwrap().is_some());
    }
}
