//! Playback dispatch boundary. The core never plays audio; it talks
//! to a backend satisfying [`PlayerControl`]. The shipped backend
//! drives an mpv process over its JSON IPC socket, fire-and-forget
//! with a bounded wait, so an unreachable player degrades to a logged
//! no-op instead of blocking the dispatch loop.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const DEFAULT_SOCKET: &str = "/tmp/radio_mpv.sock";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Contract every playback backend must satisfy. The assembler and
/// parser never learn how playback is realized; a new load replaces
/// whatever is currently playing.
pub trait PlayerControl {
    fn shuffle_folder(&mut self, path: &Path) -> Result<(), PlayerError>;
    fn load_playlist(&mut self, paths: &[String], shuffle: bool) -> Result<(), PlayerError>;
    fn enqueue_next(&mut self, paths: &[String]) -> Result<usize, PlayerError>;
    fn set_volume(&mut self, level: i64) -> Result<(), PlayerError>;
    fn skip(&mut self) -> Result<(), PlayerError>;
}

#[derive(Debug)]
pub enum PlayerError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Unreachable(String),
}

impl std::fmt::Display for PlayerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerError::Io(err) => write!(f, "io error: {}", err),
            PlayerError::Json(err) => write!(f, "ipc decode error: {}", err),
            PlayerError::Unreachable(msg) => write!(f, "player unreachable: {}", msg),
        }
    }
}

impl std::error::Error for PlayerError {}

impl From<std::io::Error> for PlayerError {
    fn from(err: std::io::Error) -> Self {
        PlayerError::Io(err)
    }
}

impl From<serde_json::Error> for PlayerError {
    fn from(err: serde_json::Error) -> Self {
        PlayerError::Json(err)
    }
}

/// Newline-delimited absolute paths, one per line: the hand-off format
/// the playback backend consumes. The file is kept (not deleted on
/// drop) because the backend reads it after we return.
pub fn write_playlist(paths: &[String]) -> Result<PathBuf, PlayerError> {
    let mut file = tempfile::Builder::new()
        .prefix("jukebox_")
        .suffix(".m3u")
        .tempfile()?;
    for path in paths {
        writeln!(file, "{}", path)?;
    }
    let (_, kept) = file.keep().map_err(|e| PlayerError::Io(e.error))?;
    Ok(kept)
}

/// mpv JSON IPC over a unix socket: one `{"command": [...]}` object
/// per line. Each call opens a fresh connection; mpv restarts must not
/// leave us holding a dead stream.
pub struct MpvIpc {
    socket_path: PathBuf,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct IpcReply {
    error: Option<String>,
    data: Option<Value>,
    event: Option<String>,
}

impl MpvIpc {
    pub fn new(socket_path: PathBuf, timeout: Duration) -> Self {
        Self {
            socket_path,
            timeout,
        }
    }

    fn command(&self, args: &[Value]) -> Result<Option<Value>, PlayerError> {
        let stream = UnixStream::connect(&self.socket_path)
            .map_err(|err| PlayerError::Unreachable(format!("{:?}: {}", self.socket_path, err)))?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        let mut writer = stream.try_clone()?;
        let line = serde_json::to_string(&json!({ "command": args }))?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;

        // mpv interleaves async event lines with the reply; read until
        // a line carrying an `error` field or the stream goes quiet.
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            let reply: IpcReply = match serde_json::from_str(&line) {
                Ok(reply) => reply,
                Err(_) => continue,
            };
            if reply.event.is_some() {
                continue;
            }
            if let Some(error) = reply.error {
                if error == "success" {
                    return Ok(reply.data);
                }
                debug!("mpv refused {:?}: {}", args, error);
                return Ok(None);
            }
        }
        Ok(None)
    }

    fn get_property(&self, name: &str) -> Result<Option<Value>, PlayerError> {
        self.command(&[json!("get_property"), json!(name)])
    }
}

impl PlayerControl for MpvIpc {
    fn shuffle_folder(&mut self, path: &Path) -> Result<(), PlayerError> {
        self.command(&[
            json!("loadfile"),
            json!(path.to_string_lossy()),
            json!("replace"),
        ])?;
        self.command(&[json!("playlist-shuffle")])?;
        Ok(())
    }

    fn load_playlist(&mut self, paths: &[String], shuffle: bool) -> Result<(), PlayerError> {
        let playlist = write_playlist(paths)?;
        self.command(&[
            json!("loadlist"),
            json!(playlist.to_string_lossy()),
            json!("replace"),
        ])?;
        if shuffle {
            self.command(&[json!("playlist-shuffle")])?;
        }
        Ok(())
    }

    fn enqueue_next(&mut self, paths: &[String]) -> Result<usize, PlayerError> {
        let position = match self.get_property("playlist-pos")?.and_then(|v| v.as_i64()) {
            Some(position) => position,
            None => {
                warn!("Could not read playlist position; nothing queued");
                return Ok(0);
            }
        };

        let mut insert_at = position + 1;
        let mut added = 0usize;
        for path in paths {
            let count = match self.get_property("playlist-count")?.and_then(|v| v.as_i64()) {
                Some(count) => count,
                None => break,
            };
            self.command(&[json!("loadfile"), json!(path), json!("append")])?;
            self.command(&[json!("playlist-move"), json!(count), json!(insert_at)])?;
            insert_at += 1;
            added += 1;
        }
        Ok(added)
    }

    fn set_volume(&mut self, level: i64) -> Result<(), PlayerError> {
        self.command(&[json!("set_property"), json!("volume"), json!(level)])?;
        Ok(())
    }

    fn skip(&mut self) -> Result<(), PlayerError> {
        self.command(&[json!("playlist-next")])?;
        Ok(())
    }
}
