//! Queue and transport persistence across restarts.
//!
//! A JSON document `{status, repeat, shuffle, current_track, tracks}` is
//! rewritten after every published change (from a dedicated saver thread;
//! bus callbacks must not touch the disk) and restored once after login.
//! The restorer resolves tracks by URI and keeps polling from the event
//! loop until all of them are loaded before applying anything.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, TrySendError};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::PlaybackStatus;
use crate::services::catalog::{CatalogSession, TrackRef};
use crate::services::notify::NotifyBus;
use crate::services::player::Player;
use crate::services::session::LoginTask;

#[derive(Debug, Serialize, Deserialize)]
struct SavedState {
    status: PlaybackStatus,
    repeat: bool,
    shuffle: bool,
    /// Queue index of the current track, -1 when unset.
    current_track: i64,
    tracks: Vec<String>,
}

/// Snapshot the player into the state file.
pub fn save(path: &Path, player: &Player) -> Result<()> {
    let snapshot = player.snapshot();
    let mut tracks = Vec::new();
    for (i, track) in player.tracks().iter().enumerate() {
        if !track.is_loaded() {
            tracing::warn!("queue track {} is not loaded, skipping state save", i);
            return Ok(());
        }
        tracks.push(track.uri());
    }

    let state = SavedState {
        status: snapshot.status,
        repeat: snapshot.repeat,
        shuffle: snapshot.shuffle,
        current_track: snapshot.current_track.map(|i| i as i64).unwrap_or(-1),
        tracks,
    };

    let body = serde_json::to_string(&state).map_err(anyhow::Error::from)?;
    std::fs::write(path, body)?;
    tracing::debug!("state saved to {:?}", path);
    Ok(())
}

/// Subscribe to the bus and rewrite the state file after each change.
/// Saves are coalesced: a publish during a write only schedules one more.
pub fn spawn_saver(bus: &NotifyBus, path: PathBuf, player: Arc<Player>) {
    let (tx, rx) = sync_channel::<()>(1);

    std::thread::Builder::new()
        .name("state-saver".to_string())
        .spawn(move || {
            while rx.recv().is_ok() {
                if let Err(e) = save(&path, &player) {
                    tracing::warn!("unable to save state to {:?}: {}", path, e);
                }
            }
        })
        .expect("spawn state saver");

    bus.add(Arc::new(move |_| {
        match tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                tracing::warn!("state saver thread is gone");
            }
        }
    }));
}

struct PendingRestore {
    state: SavedState,
    tracks: Vec<TrackRef>,
}

/// Build the task that restores the saved state after login. It runs once
/// per event-loop iteration and reports completion; until every resolved
/// track is loaded it just keeps waiting.
pub fn restore_task(
    path: PathBuf,
    catalog: Arc<dyn CatalogSession>,
    player: Arc<Player>,
) -> LoginTask {
    let mut pending: Option<PendingRestore> = None;
    let mut started = false;

    Box::new(move || {
        if !started {
            started = true;
            pending = match read_state(&path, catalog.as_ref()) {
                Some(pending) => Some(pending),
                None => return true,
            };
            tracing::debug!("waiting for {} tracks to load", pending.as_ref().unwrap().tracks.len());
        }

        let Some(restore) = pending.as_ref() else {
            return true;
        };
        if restore.tracks.iter().any(|t| !t.is_loaded()) {
            return false;
        }

        let restore = pending.take().unwrap();
        apply(restore, &player);
        true
    })
}

fn read_state(path: &Path, catalog: &dyn CatalogSession) -> Option<PendingRestore> {
    let body = match std::fs::read_to_string(path) {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("no saved state at {:?}", path);
            return None;
        }
        Err(e) => {
            tracing::warn!("cannot read state file {:?}: {}", path, e);
            return None;
        }
    };

    let state: SavedState = match serde_json::from_str(&body) {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!("cannot parse state file {:?}: {}", path, e);
            return None;
        }
    };

    if state.current_track >= state.tracks.len() as i64 {
        tracing::warn!("incoherent state file: current_track >= tracks");
        return None;
    }

    let mut tracks = Vec::with_capacity(state.tracks.len());
    for uri in &state.tracks {
        match catalog.track_by_uri(uri) {
            Some(track) => tracks.push(track),
            None => {
                tracing::warn!("saved track {} does not resolve, not restoring", uri);
                return None;
            }
        }
    }

    Some(PendingRestore { state, tracks })
}

fn apply(restore: PendingRestore, player: &Player) {
    let mut current = restore.state.current_track;
    let mut status = restore.state.status;

    // Drop tracks that went unavailable since the save, shifting the saved
    // cursor the same way a queue removal would.
    let mut kept = Vec::with_capacity(restore.tracks.len());
    for (i, track) in restore.tracks.into_iter().enumerate() {
        if track.is_available() {
            kept.push(track);
        } else {
            tracing::info!("saved track {} is no longer available", track.uri());
            if current == i as i64 {
                current = -1;
                status = PlaybackStatus::Stopped;
            } else if current > i as i64 {
                current -= 1;
            }
        }
    }

    let current = (current >= 0).then_some(current as usize);
    player.restore(kept, current, status, restore.state.repeat, restore.state.shuffle);
    tracing::info!("state restored");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::channel;
    use std::time::Duration;

    use super::*;
    use crate::services::catalog::{CatalogTrack, Playlist, SearchCallback};
    use crate::services::session::{Notify, SessionHandle};

    struct RestoreTrack {
        uri: String,
        loaded: Arc<AtomicBool>,
        available: bool,
    }

    impl CatalogTrack for RestoreTrack {
        fn uri(&self) -> String {
            self.uri.clone()
        }
        fn is_loaded(&self) -> bool {
            self.loaded.load(Ordering::SeqCst)
        }
        fn is_available(&self) -> bool {
            self.available
        }
        fn duration_ms(&self) -> u32 {
            1000
        }
        fn title(&self) -> String {
            self.uri.clone()
        }
        fn artists(&self) -> Vec<String> {
            vec![]
        }
        fn album(&self) -> String {
            String::new()
        }
        fn cover_uri(&self) -> Option<String> {
            None
        }
        fn popularity(&self) -> Option<u8> {
            None
        }
        fn starred(&self) -> bool {
            false
        }
    }

    struct UriCatalog {
        tracks: Vec<TrackRef>,
    }

    impl CatalogSession for UriCatalog {
        fn login(&self, _u: &str, _p: &str) -> Result<()> {
            Ok(())
        }
        fn process_events(&self) -> Duration {
            Duration::from_millis(100)
        }
        fn player_load(&self, _t: &TrackRef) -> Result<()> {
            Ok(())
        }
        fn player_play(&self, _p: bool) {}
        fn player_seek(&self, _ms: u32) {}
        fn player_unload(&self) {}
        fn play_time_ms(&self) -> u32 {
            0
        }
        fn container_loaded(&self) -> bool {
            true
        }
        fn playlist_count(&self) -> usize {
            0
        }
        fn playlist(&self, _i: usize) -> Option<Playlist> {
            None
        }
        fn track_by_uri(&self, uri: &str) -> Option<TrackRef> {
            self.tracks.iter().find(|t| t.uri() == uri).cloned()
        }
        fn search(&self, _q: &str, _d: SearchCallback) {}
    }

    fn restore_track(n: usize, loaded: bool, available: bool) -> (TrackRef, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(loaded));
        (
            Arc::new(RestoreTrack {
                uri: format!("test:track:{}", n),
                loaded: flag.clone(),
                available,
            }) as TrackRef,
            flag,
        )
    }

    fn player_with(catalog: Arc<dyn CatalogSession>) -> Arc<Player> {
        let (tx, _rx) = channel();
        let notify = Arc::new(Notify::new());
        let session = SessionHandle::new(tx, notify, catalog);
        Player::new(Arc::new(crate::services::notify::NotifyBus::new()), session)
    }

    fn temp_state_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("jukeboxd-state-{}-{}.json", tag, std::process::id()))
    }

    #[test]
    fn save_then_restore_round_trips_the_queue() {
        let tracks: Vec<TrackRef> = (0..3).map(|i| restore_track(i, true, true).0).collect();
        let catalog = Arc::new(UriCatalog {
            tracks: tracks.clone(),
        });

        let source = player_with(catalog.clone());
        source.add_tracks(tracks);
        source.toggle_repeat();
        source.goto(1).unwrap();
        let saved_snapshot = source.snapshot();

        let path = temp_state_path("roundtrip");
        save(&path, &source).unwrap();

        let target = player_with(catalog.clone());
        let mut task = restore_task(path.clone(), catalog, target.clone());
        assert!(task());

        let restored = target.snapshot();
        assert_eq!(restored.status, saved_snapshot.status);
        assert_eq!(restored.repeat, saved_snapshot.repeat);
        assert_eq!(restored.shuffle, saved_snapshot.shuffle);
        assert_eq!(restored.total_tracks, saved_snapshot.total_tracks);
        assert_eq!(restored.current_track, saved_snapshot.current_track);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn restore_waits_for_tracks_to_load() {
        let (track, loaded) = restore_track(0, false, true);
        let catalog = Arc::new(UriCatalog {
            tracks: vec![track],
        });

        let path = temp_state_path("waits");
        std::fs::write(
            &path,
            r#"{"status":"stopped","repeat":false,"shuffle":false,"current_track":-1,"tracks":["test:track:0"]}"#,
        )
        .unwrap();

        let player = player_with(catalog.clone());
        let mut task = restore_task(path.clone(), catalog, player.clone());
        assert!(!task());
        assert!(!task());
        loaded.store(true, Ordering::SeqCst);
        assert!(task());
        assert_eq!(player.snapshot().total_tracks, 1);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unavailable_current_track_restores_stopped() {
        let tracks: Vec<TrackRef> = vec![
            restore_track(0, true, true).0,
            restore_track(1, true, false).0,
            restore_track(2, true, true).0,
        ];
        let catalog = Arc::new(UriCatalog { tracks });

        let path = temp_state_path("unavailable");
        std::fs::write(
            &path,
            r#"{"status":"playing","repeat":false,"shuffle":false,"current_track":1,"tracks":["test:track:0","test:track:1","test:track:2"]}"#,
        )
        .unwrap();

        let player = player_with(catalog.clone());
        let mut task = restore_task(path.clone(), catalog, player.clone());
        assert!(task());

        let snap = player.snapshot();
        assert_eq!(snap.status, PlaybackStatus::Stopped);
        assert_eq!(snap.current_track, None);
        assert_eq!(snap.total_tracks, 2);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_state_file_is_not_an_error() {
        let catalog = Arc::new(UriCatalog { tracks: vec![] });
        let player = player_with(catalog.clone());
        let mut task = restore_task(temp_state_path("missing"), catalog, player);
        assert!(task());
    }

    #[test]
    fn saver_thread_writes_after_publish() {
        let tracks: Vec<TrackRef> = vec![restore_track(0, true, true).0];
        let catalog = Arc::new(UriCatalog {
            tracks: tracks.clone(),
        });
        let player = player_with(catalog);

        let path = temp_state_path("saver");
        let _ = std::fs::remove_file(&path);
        spawn_saver(player.bus(), path.clone(), player.clone());

        player.add_tracks(tracks);

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        let mut state: Option<SavedState> = None;
        while std::time::Instant::now() < deadline {
            if let Ok(body) = std::fs::read_to_string(&path) {
                if let Ok(parsed) = serde_json::from_str::<SavedState>(&body) {
                    if parsed.tracks.len() == 1 {
                        state = Some(parsed);
                        break;
                    }
                }
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        let state = state.expect("state file written");
        assert_eq!(state.tracks, vec!["test:track:0"]);
        assert_eq!(state.current_track, -1);
        let _ = std::fs::remove_file(&path);
    }
}
