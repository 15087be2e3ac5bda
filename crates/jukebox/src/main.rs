mod config;
mod session;

use std::env;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{config_path_from_env, load_or_create_config, resolve_path};
use intent::Intent;
use library::{import_legacy_json, prune, sync, Store};
use player::MpvIpc;
use session::PlaybackSession;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Upper bound on the candidate pool for a random mix; plenty for an
/// hour of music without walking the whole index into memory twice.
const RANDOM_POOL_LIMIT: usize = 5000;

fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (cfg, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    }

    let index_path = resolve_path(&config_path, &cfg.index_path);
    let music_root = PathBuf::from(&cfg.music_root);

    let args: Vec<String> = env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("");

    match command {
        "sync" => {
            let force = args.iter().any(|a| a == "--force");
            let store = Store::open(&index_path)?;
            let report = sync(&store, &music_root, force)?;
            println!(
                "Scanned: {} | Inserted: {} | Changed: {} | Skipped: {}",
                report.scanned, report.inserted, report.changed, report.skipped
            );
        }
        "import" => {
            let json_path = args
                .get(1)
                .ok_or("usage: jukebox import <legacy-json-path>")?;
            let store = Store::open(&index_path)?;
            let imported = import_legacy_json(&store, Path::new(json_path))?;
            println!("Imported {} tracks from {}", imported, json_path);
        }
        "prune" => {
            let store = Store::open(&index_path)?;
            let removed = prune(&store, &music_root)?;
            println!("Removed {} vanished tracks", removed);
        }
        "play" => {
            let text = args[1..].join(" ");
            let store = Store::open(&index_path)?;
            let mut session = open_session(&cfg);
            handle_utterance(&store, &mut session, &cfg, &music_root, &text, false)?;
        }
        "queue" => {
            let text = args[1..].join(" ");
            let store = Store::open(&index_path)?;
            let mut session = open_session(&cfg);
            handle_utterance(&store, &mut session, &cfg, &music_root, &text, true)?;
        }
        "volume" => {
            let level: i64 = args
                .get(1)
                .ok_or("usage: jukebox volume <0-100>")?
                .parse()?;
            let mut session = open_session(&cfg);
            session.set_volume(level);
        }
        "skip" => {
            let mut session = open_session(&cfg);
            session.skip();
        }
        "stats" => {
            let store = Store::open(&index_path)?;
            println!("Tracks:  {}", store.track_count()?);
            println!("Artists: {}", store.artists()?.len());
            if let Some(at) = store.state_get(library::STATE_LAST_SCAN_AT)? {
                println!("Last scan at: {}", at);
            }
        }
        _ => {
            eprintln!(
                "usage: jukebox <sync [--force] | import <json> | prune | \
                 play <words…> | queue <words…> | volume <n> | skip | stats>"
            );
            std::process::exit(2);
        }
    }

    Ok(())
}

fn open_session(cfg: &config::JukeboxConfig) -> PlaybackSession {
    let player = MpvIpc::new(
        PathBuf::from(&cfg.mpv_socket),
        Duration::from_secs(cfg.dispatch_timeout_secs),
    );
    PlaybackSession::new(Box::new(player))
}

/// One spoken command, processed to completion: parse the transcribed
/// text, query the index, assemble, dispatch. `enqueue` switches from
/// replace-and-restart to queue-after-current.
fn handle_utterance(
    store: &Store,
    session: &mut PlaybackSession,
    cfg: &config::JukeboxConfig,
    music_root: &Path,
    text: &str,
    enqueue: bool,
) -> Result<(), Box<dyn Error>> {
    let artists = store.artists()?;
    info!("You: {}", text);

    match intent::parse(text, &artists) {
        Intent::NoMatch => {
            info!("No confident match.");
        }
        Intent::Random => {
            let pool = store.random_pool(RANDOM_POOL_LIMIT)?;
            let candidates = to_candidates(pool);
            let (paths, total) = playlist::assemble(candidates, cfg.playlist_target_secs);
            if paths.is_empty() {
                warn!("No tracks available for random play.");
            } else if enqueue {
                session.enqueue(&paths);
            } else {
                info!("Random mix: {} tracks (~{}s)", paths.len(), total as i64);
                session.replace_with_playlist(&paths, total, true);
            }
        }
        Intent::Artist {
            name,
            years: Some(range),
        } => {
            let rows = store.tracks_for_artist(&name, Some((range.start, range.end)))?;
            let candidates = to_candidates(rows);
            if candidates.is_empty() {
                info!(
                    "No indexed tracks for {} in {}-{}.",
                    name, range.start, range.end
                );
                return Ok(());
            }
            info!("Building playlist: {} {}", range.label, name);
            let (paths, total) = playlist::assemble(candidates, cfg.playlist_target_secs);
            if enqueue {
                session.enqueue(&paths);
            } else {
                session.replace_with_playlist(&paths, total, true);
            }
        }
        Intent::Artist { name, years: None } => {
            if enqueue {
                let rows = store.tracks_for_artist(&name, None)?;
                let (paths, _) =
                    playlist::assemble(to_candidates(rows), cfg.playlist_target_secs);
                if paths.is_empty() {
                    info!("No indexed tracks for {}.", name);
                } else {
                    session.enqueue(&paths);
                }
            } else {
                session.replace_with_folder(&music_root.join(&name));
            }
        }
    }

    Ok(())
}

fn to_candidates(rows: Vec<common::Track>) -> Vec<(String, f64)> {
    rows.into_iter()
        .map(|t| {
            let duration = t.duration.unwrap_or(0.0);
            (t.path, duration)
        })
        .collect()
}
