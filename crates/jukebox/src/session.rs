use std::path::{Path, PathBuf};

use player::{PlayerControl, PlayerError};
use tracing::{info, warn};

/// What the session last handed to the backend. Informational only;
/// the backend owns actual playback state.
#[derive(Clone, Debug, PartialEq)]
pub enum Current {
    Idle,
    Folder(PathBuf),
    Playlist { tracks: usize, seconds: f64 },
}

/// Owns the playback backend for the dispatch loop. Every transition
/// is replace-and-restart: dispatching a new load is also how an old
/// one is cancelled. An unreachable backend degrades to a logged
/// no-op; the session never blocks or crashes on it.
pub struct PlaybackSession {
    player: Box<dyn PlayerControl>,
    current: Current,
}

impl PlaybackSession {
    pub fn new(player: Box<dyn PlayerControl>) -> Self {
        Self {
            player,
            current: Current::Idle,
        }
    }

    pub fn current(&self) -> &Current {
        &self.current
    }

    pub fn replace_with_folder(&mut self, path: &Path) -> bool {
        match self.player.shuffle_folder(path) {
            Ok(()) => {
                info!("Playing (folder shuffle): {:?}", path);
                self.current = Current::Folder(path.to_path_buf());
                true
            }
            Err(err) => degraded(err),
        }
    }

    pub fn replace_with_playlist(
        &mut self,
        paths: &[String],
        seconds: f64,
        shuffle: bool,
    ) -> bool {
        if paths.is_empty() {
            warn!("Nothing playable; not dispatching an empty playlist");
            return false;
        }
        match self.player.load_playlist(paths, shuffle) {
            Ok(()) => {
                info!(
                    "Playing (playlist): {} tracks, ~{} min",
                    paths.len(),
                    (seconds / 60.0) as i64
                );
                self.current = Current::Playlist {
                    tracks: paths.len(),
                    seconds,
                };
                true
            }
            Err(err) => degraded(err),
        }
    }

    /// Queue after the currently playing entry without replacing it.
    pub fn enqueue(&mut self, paths: &[String]) -> usize {
        if paths.is_empty() {
            return 0;
        }
        match self.player.enqueue_next(paths) {
            Ok(added) => {
                info!("Queued next: {} track(s)", added);
                added
            }
            Err(err) => {
                degraded(err);
                0
            }
        }
    }

    pub fn set_volume(&mut self, level: i64) -> bool {
        match self.player.set_volume(level) {
            Ok(()) => true,
            Err(err) => degraded(err),
        }
    }

    pub fn skip(&mut self) -> bool {
        match self.player.skip() {
            Ok(()) => true,
            Err(err) => degraded(err),
        }
    }
}

fn degraded(err: PlayerError) -> bool {
    warn!("Playback backend unavailable, nothing queued: {}", err);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        calls: Rc<RefCell<Vec<String>>>,
        reachable: bool,
    }

    impl PlayerControl for Recorder {
        fn shuffle_folder(&mut self, path: &Path) -> Result<(), PlayerError> {
            self.fail_if_down()?;
            self.calls
                .borrow_mut()
                .push(format!("folder {}", path.display()));
            Ok(())
        }

        fn load_playlist(&mut self, paths: &[String], shuffle: bool) -> Result<(), PlayerError> {
            self.fail_if_down()?;
            self.calls
                .borrow_mut()
                .push(format!("playlist {} shuffle={}", paths.len(), shuffle));
            Ok(())
        }

        fn enqueue_next(&mut self, paths: &[String]) -> Result<usize, PlayerError> {
            self.fail_if_down()?;
            self.calls
                .borrow_mut()
                .push(format!("enqueue {}", paths.len()));
            Ok(paths.len())
        }

        fn set_volume(&mut self, level: i64) -> Result<(), PlayerError> {
            self.fail_if_down()?;
            self.calls.borrow_mut().push(format!("volume {}", level));
            Ok(())
        }

        fn skip(&mut self) -> Result<(), PlayerError> {
            self.fail_if_down()?;
            self.calls.borrow_mut().push("skip".to_string());
            Ok(())
        }
    }

    impl Recorder {
        fn up(calls: Rc<RefCell<Vec<String>>>) -> Self {
            Self {
                calls,
                reachable: true,
            }
        }

        fn down() -> Self {
            Self {
                calls: Rc::default(),
                reachable: false,
            }
        }

        fn fail_if_down(&self) -> Result<(), PlayerError> {
            if self.reachable {
                Ok(())
            } else {
                Err(PlayerError::Unreachable("test".to_string()))
            }
        }
    }

    #[test]
    fn transitions_replace_current_state() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut session = PlaybackSession::new(Box::new(Recorder::up(Rc::clone(&calls))));
        assert_eq!(session.current(), &Current::Idle);

        assert!(session.replace_with_folder(Path::new("/m/Miles Davis")));
        assert_eq!(
            session.current(),
            &Current::Folder(PathBuf::from("/m/Miles Davis"))
        );

        let paths = vec!["/m/a.flac".to_string(), "/m/b.flac".to_string()];
        assert!(session.replace_with_playlist(&paths, 600.0, true));
        assert_eq!(
            session.current(),
            &Current::Playlist {
                tracks: 2,
                seconds: 600.0
            }
        );

        assert_eq!(
            calls.borrow().as_slice(),
            ["folder /m/Miles Davis", "playlist 2 shuffle=true"]
        );
    }

    #[test]
    fn empty_playlist_is_never_dispatched() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut session = PlaybackSession::new(Box::new(Recorder::up(Rc::clone(&calls))));
        assert!(!session.replace_with_playlist(&[], 0.0, true));
        assert_eq!(session.current(), &Current::Idle);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn unreachable_backend_degrades_to_noop() {
        let mut session = PlaybackSession::new(Box::new(Recorder::down()));
        assert!(!session.replace_with_folder(Path::new("/m/x")));
        assert_eq!(session.enqueue(&["/m/a.flac".to_string()]), 0);
        assert!(!session.set_volume(40));
        assert!(!session.skip());
        // state stays where it was: nothing was handed over
        assert_eq!(session.current(), &Current::Idle);
    }
}
