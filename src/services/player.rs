//! Transport state machine over the queue.
//!
//! One mutex guards queue and transport together, so every command is a
//! single linearizable transition. Catalog player calls are submitted
//! through the session handle (the event-loop thread applies them), and the
//! snapshot for an accepted transition is published only after the lock is
//! released, so subscribers can issue commands of their own.

use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::models::{PlaybackStatus, PlayerSnapshot, TrackInfo};
use crate::services::catalog::TrackRef;
use crate::services::notify::NotifyBus;
use crate::services::queue::{Queue, RemoveOutcome};
use crate::services::session::SessionHandle;

pub struct Player {
    state: Mutex<PlayerState>,
    bus: Arc<NotifyBus>,
    session: SessionHandle,
}

struct PlayerState {
    queue: Queue,
    status: PlaybackStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    Applied,
    OutOfRange,
    /// Nothing loaded; ignored with a warning, not an error.
    NotPlaying,
}

impl Player {
    pub fn new(bus: Arc<NotifyBus>, session: SessionHandle) -> Arc<Self> {
        Arc::new(Player {
            state: Mutex::new(PlayerState {
                queue: Queue::new(),
                status: PlaybackStatus::Stopped,
            }),
            bus,
            session,
        })
    }

    pub fn bus(&self) -> &Arc<NotifyBus> {
        &self.bus
    }

    // ------------------------------------------------------------------
    // Transport commands
    // ------------------------------------------------------------------

    pub fn play(&self) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            self.play_locked(&mut state);
            self.snapshot_locked(&state)
        };
        self.bus.publish(&snapshot);
    }

    pub fn toggle(&self) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            match state.status {
                PlaybackStatus::Playing => {
                    self.session.play(false);
                    state.status = PlaybackStatus::Paused;
                }
                PlaybackStatus::Paused => {
                    self.session.play(true);
                    state.status = PlaybackStatus::Playing;
                }
                PlaybackStatus::Stopped => self.play_locked(&mut state),
            }
            self.snapshot_locked(&state)
        };
        self.bus.publish(&snapshot);
    }

    pub fn stop(&self) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            self.stop_locked(&mut state);
            self.snapshot_locked(&state)
        };
        self.bus.publish(&snapshot);
    }

    pub fn seek(&self, position_ms: u32) -> SeekOutcome {
        let (outcome, snapshot) = {
            let state = self.state.lock().unwrap();
            match state.status {
                PlaybackStatus::Stopped => {
                    tracing::warn!("seek while stopped, ignoring");
                    (SeekOutcome::NotPlaying, None)
                }
                _ => {
                    let duration = state
                        .queue
                        .current_track()
                        .map(|t| t.duration_ms())
                        .unwrap_or(0);
                    if position_ms > duration {
                        (SeekOutcome::OutOfRange, None)
                    } else {
                        self.session.seek(position_ms);
                        (SeekOutcome::Applied, Some(self.snapshot_locked(&state)))
                    }
                }
            }
        };
        if let Some(snapshot) = snapshot {
            self.bus.publish(&snapshot);
        }
        outcome
    }

    pub fn next(&self) {
        self.skip(1)
    }

    pub fn prev(&self) {
        self.skip(-1)
    }

    fn skip(&self, step: i32) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            match state.queue.advance(step) {
                Some(index) => self.start_track_locked(&mut state, index),
                None => self.stop_locked(&mut state),
            }
            self.snapshot_locked(&state)
        };
        self.bus.publish(&snapshot);
    }

    /// Jump to a queue index and start playing it.
    pub fn goto(&self, index: usize) -> Result<()> {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            if index >= state.queue.len() {
                return Err(Error::OutOfRange(index));
            }
            self.stop_locked(&mut state);
            state.queue.goto(index);
            self.play_locked(&mut state);
            self.snapshot_locked(&state)
        };
        self.bus.publish(&snapshot);
        Ok(())
    }

    /// Reaction to the library's end-of-track callback. Runs on the
    /// event-loop thread.
    pub fn end_of_track(&self) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            if state.status != PlaybackStatus::Playing {
                // Stale event from a track unloaded by a faster command.
                return;
            }
            match state.queue.advance(1) {
                Some(index) => self.start_track_locked(&mut state, index),
                None => self.stop_locked(&mut state),
            }
            self.snapshot_locked(&state)
        };
        self.bus.publish(&snapshot);
    }

    /// Another client grabbed the account's playback; keep our position but
    /// stop asking for audio.
    pub fn pause_for_token_loss(&self) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            if state.status != PlaybackStatus::Playing {
                return;
            }
            self.session.play(false);
            state.status = PlaybackStatus::Paused;
            self.snapshot_locked(&state)
        };
        self.bus.publish(&snapshot);
    }

    // ------------------------------------------------------------------
    // Queue commands
    // ------------------------------------------------------------------

    /// Append tracks; unloaded or unavailable ones are skipped. Returns the
    /// number actually added.
    pub fn add_tracks(&self, tracks: Vec<TrackRef>) -> usize {
        let (added, snapshot) = {
            let mut state = self.state.lock().unwrap();
            let mut added = 0;
            for track in tracks {
                if state.queue.append(track) {
                    added += 1;
                }
            }
            (added, self.snapshot_locked(&state))
        };
        self.bus.publish(&snapshot);
        added
    }

    /// Stop playback and replace the whole queue.
    pub fn replace_tracks(&self, tracks: Vec<TrackRef>) -> usize {
        let (added, snapshot) = {
            let mut state = self.state.lock().unwrap();
            self.stop_locked(&mut state);
            let added = state.queue.replace_with(tracks);
            (added, self.snapshot_locked(&state))
        };
        self.bus.publish(&snapshot);
        added
    }

    pub fn remove_range(&self, start: usize, count: usize) -> Result<()> {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            if start >= state.queue.len() {
                return Err(Error::OutOfRange(start));
            }
            if state.queue.remove_range(start, count) == RemoveOutcome::RemovedCurrent {
                self.stop_session_locked(&mut state);
            }
            self.snapshot_locked(&state)
        };
        self.bus.publish(&snapshot);
        Ok(())
    }

    pub fn clear(&self) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            if state.queue.clear() == RemoveOutcome::RemovedCurrent {
                self.stop_session_locked(&mut state);
            }
            self.snapshot_locked(&state)
        };
        self.bus.publish(&snapshot);
    }

    pub fn toggle_repeat(&self) -> bool {
        let (on, snapshot) = {
            let mut state = self.state.lock().unwrap();
            let on = !state.queue.repeat();
            state.queue.set_repeat(on);
            (on, self.snapshot_locked(&state))
        };
        self.bus.publish(&snapshot);
        on
    }

    pub fn toggle_shuffle(&self) -> bool {
        let (on, snapshot) = {
            let mut state = self.state.lock().unwrap();
            let on = !state.queue.shuffle();
            state.queue.set_shuffle(on);
            (on, self.snapshot_locked(&state))
        };
        self.bus.publish(&snapshot);
        on
    }

    /// Apply a restored queue and transport state in one transition.
    pub fn restore(
        &self,
        tracks: Vec<TrackRef>,
        current: Option<usize>,
        status: PlaybackStatus,
        repeat: bool,
        shuffle: bool,
    ) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            self.stop_locked(&mut state);
            state.queue.replace_with(tracks);
            state.queue.set_repeat(repeat);
            state.queue.set_shuffle(shuffle);
            if let Some(index) = current {
                if state.queue.goto(index) && status != PlaybackStatus::Stopped {
                    self.play_locked(&mut state);
                    if status == PlaybackStatus::Paused {
                        self.session.play(false);
                        state.status = PlaybackStatus::Paused;
                    }
                }
            }
            self.snapshot_locked(&state)
        };
        self.bus.publish(&snapshot);
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> PlayerSnapshot {
        let state = self.state.lock().unwrap();
        self.snapshot_locked(&state)
    }

    /// Queue contents with their handles.
    pub fn tracks(&self) -> Vec<TrackRef> {
        self.state.lock().unwrap().queue.tracks()
    }

    pub fn current_track(&self) -> Option<TrackRef> {
        self.state.lock().unwrap().queue.current_track().cloned()
    }

    // ------------------------------------------------------------------
    // Internal transitions. All run under the state lock and never publish.
    // ------------------------------------------------------------------

    fn play_locked(&self, state: &mut PlayerState) {
        match state.status {
            PlaybackStatus::Stopped => match state.queue.cursor_for_play() {
                Some(index) => self.start_track_locked(state, index),
                None => tracing::debug!("nothing to play: queue is empty"),
            },
            PlaybackStatus::Paused => {
                self.session.play(true);
                state.status = PlaybackStatus::Playing;
            }
            PlaybackStatus::Playing => {}
        }
    }

    /// Load and start the track at `index`, which must be in range.
    fn start_track_locked(&self, state: &mut PlayerState, index: usize) {
        let track = state
            .queue
            .track_at(index)
            .expect("start_track index in range")
            .clone();
        tracing::debug!("playing track {} ({})", index, track.uri());
        self.session.load(&track);
        self.session.play(true);
        state.status = PlaybackStatus::Playing;
    }

    fn stop_locked(&self, state: &mut PlayerState) {
        self.stop_session_locked(state);
        state.queue.unset_cursor();
    }

    /// Stop playback without touching the cursor; used when the cursor was
    /// already adjusted by a queue mutation.
    fn stop_session_locked(&self, state: &mut PlayerState) {
        if state.status != PlaybackStatus::Stopped {
            self.session.unload();
            state.status = PlaybackStatus::Stopped;
        }
    }

    fn snapshot_locked(&self, state: &PlayerState) -> PlayerSnapshot {
        let position_ms = match state.status {
            PlaybackStatus::Stopped => 0,
            _ => self.session.position_ms(),
        };
        PlayerSnapshot {
            status: state.status,
            repeat: state.queue.repeat(),
            shuffle: state.queue.shuffle(),
            total_tracks: state.queue.len(),
            current_track: state.queue.cursor(),
            position_ms,
            track: state.queue.current_track().map(TrackInfo::from),
        }
    }
}
