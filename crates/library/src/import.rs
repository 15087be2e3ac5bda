use std::fs;
use std::path::Path;

use common::{collapse_ws, lower_ext, now_secs, Track};
use serde_json::Value;
use tracing::{info, warn};

use crate::{LibraryError, Store, STATE_MIGRATED_AT};

const IMPORT_BATCH: usize = 250;

/// One-time migration from the flat legacy JSON index. Accepts either
/// `{"tracks": [...]}` or a bare array. Numeric fields are coerced
/// leniently (blank, garbage, or a zero year/tracknumber becomes
/// "unknown"); missing mtime/size
/// are stored as the 0 sentinel so the next sync re-extracts, but a
/// real signature already in the store is never clobbered by a 0.
pub fn import_legacy_json(store: &Store, json_path: &Path) -> Result<usize, LibraryError> {
    let contents = fs::read_to_string(json_path)?;
    let data: Value = serde_json::from_str(&contents)?;

    let tracks = match &data {
        Value::Object(map) => match map.get("tracks") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => {
                return Err(LibraryError::LegacyFormat(
                    "expected a \"tracks\" array".to_string(),
                ))
            }
        },
        Value::Array(items) => items.as_slice(),
        _ => {
            return Err(LibraryError::LegacyFormat(
                "expected an object or an array".to_string(),
            ))
        }
    };

    let now = now_secs();
    let mut imported = 0usize;
    let mut batch: Vec<Track> = Vec::with_capacity(IMPORT_BATCH);

    for item in tracks {
        let path = match str_field(item, &["path", "filepath", "file"]) {
            Some(path) => path,
            None => {
                warn!("Skipping legacy entry without a path");
                continue;
            }
        };

        let incoming_mtime = int_field(item, &["mtime"]).unwrap_or(0);
        let incoming_size = int_field(item, &["size"]).unwrap_or(0).max(0) as u64;

        let prior = store.get(&path)?;
        let (mtime, size, added_at) = match &prior {
            Some(row) => (
                if incoming_mtime != 0 { incoming_mtime } else { row.mtime },
                if incoming_size != 0 { incoming_size } else { row.size },
                row.added_at,
            ),
            None => (incoming_mtime, incoming_size, now),
        };

        let ext = lower_ext(Path::new(&path));
        batch.push(Track {
            path,
            artist: str_field(item, &["artist"]),
            artist_sort: str_field(item, &["artist_sort"]),
            album: str_field(item, &["album"]),
            title: str_field(item, &["title"]),
            genre: str_field(item, &["genre"]),
            tracknumber: int_field(item, &["tracknumber", "track"])
                .filter(|&n| n != 0)
                .and_then(|n| u32::try_from(n).ok()),
            year: int_field(item, &["year", "date"])
                .filter(|&n| n != 0)
                .and_then(|n| i32::try_from(n).ok()),
            duration: float_field(item, &["duration"]),
            bitrate: int_field(item, &["bitrate"]).and_then(|n| u32::try_from(n).ok()),
            samplerate: int_field(item, &["samplerate"]).and_then(|n| u32::try_from(n).ok()),
            channels: int_field(item, &["channels"]).and_then(|n| u8::try_from(n).ok()),
            ext,
            mtime,
            size,
            added_at,
            updated_at: now,
        });
        imported += 1;

        if batch.len() >= IMPORT_BATCH {
            store.upsert_batch(&batch)?;
            batch.clear();
        }
    }

    store.upsert_batch(&batch)?;
    store.state_set(STATE_MIGRATED_AT, &now.to_string())?;

    info!("Imported {} legacy rows from {:?}", imported, json_path);
    Ok(imported)
}

fn str_field(item: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(value) = item.get(key).and_then(Value::as_str) {
            if let Some(cleaned) = collapse_ws(value) {
                return Some(cleaned);
            }
        }
    }
    None
}

/// Legacy values show up as numbers, numeric strings, blanks, and the
/// occasional word; only the first two count.
fn int_field(item: &Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        let value = match item.get(key) {
            Some(value) => value,
            None => continue,
        };
        match value {
            Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    return Some(v);
                }
                if let Some(v) = n.as_f64() {
                    return Some(v as i64);
                }
            }
            Value::String(s) => {
                if let Ok(v) = s.trim().parse::<i64>() {
                    return Some(v);
                }
            }
            _ => {}
        }
    }
    None
}

fn float_field(item: &Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        let value = match item.get(key) {
            Some(value) => value,
            None => continue,
        };
        match value {
            Value::Number(n) => {
                if let Some(v) = n.as_f64() {
                    return Some(v);
                }
            }
            Value::String(s) => {
                if let Ok(v) = s.trim().parse::<f64>() {
                    return Some(v);
                }
            }
            _ => {}
        }
    }
    None
}
