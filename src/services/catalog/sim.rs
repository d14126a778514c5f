//! Built-in simulated catalog backend.
//!
//! Stands in for the real catalog client so the daemon runs end-to-end with
//! no network: a fixed playlist container of synthesized tracks, wall-clock
//! paced PCM delivery through the `music_delivery` callback, and
//! `end_of_track` when a track runs out.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};

use super::{
    CatalogSession, CatalogTrack, PcmFormat, Playlist, SearchCallback, SessionCallbacks, TrackRef,
};

/// Frames handed to `music_delivery` per call while catching up to the clock.
const DELIVERY_CHUNK_FRAMES: usize = 2048;

const PLAYLIST_NAMES: [&str; 4] = ["Morning Static", "Night Drive", "Back Catalog", "Unsorted"];
const ARTISTS: [&str; 4] = ["The Wire Brigade", "Maud Lin", "Parallax Motel", "Ferric Oxide"];
const TITLE_A: [&str; 8] = [
    "Cold", "Paper", "Second", "Broken", "Quiet", "Neon", "Last", "Hollow",
];
const TITLE_B: [&str; 8] = [
    "Harbor", "Signal", "Arcade", "Winter", "Mirror", "Engine", "Orchard", "Relay",
];

struct SimTrack {
    id: u32,
    title: String,
    artist: String,
    album: String,
    duration_ms: u32,
    popularity: u8,
}

impl CatalogTrack for SimTrack {
    fn uri(&self) -> String {
        format!("jukebox:track:{}", self.id)
    }

    fn is_loaded(&self) -> bool {
        true
    }

    fn is_available(&self) -> bool {
        // One track per playlist is region-locked, like real catalogs.
        self.id % 8 != 7
    }

    fn duration_ms(&self) -> u32 {
        self.duration_ms
    }

    fn title(&self) -> String {
        self.title.clone()
    }

    fn artists(&self) -> Vec<String> {
        vec![self.artist.clone()]
    }

    fn album(&self) -> String {
        self.album.clone()
    }

    fn cover_uri(&self) -> Option<String> {
        Some(format!("jukebox:image:{}", self.id))
    }

    fn popularity(&self) -> Option<u8> {
        Some(self.popularity)
    }

    fn starred(&self) -> bool {
        self.id % 5 == 0
    }
}

struct LoadedPlayer {
    track: TrackRef,
    format: PcmFormat,
    total_frames: u64,
    sent_frames: u64,
    playing: bool,
    resumed_at: Option<Instant>,
    played_before_resume: Duration,
    tone_hz: f32,
    phase: f32,
    finished: bool,
}

impl LoadedPlayer {
    fn target_frames(&self) -> u64 {
        let mut played = self.played_before_resume;
        if let Some(at) = self.resumed_at {
            played += at.elapsed();
        }
        (played.as_secs_f64() * self.format.sample_rate as f64) as u64
    }
}

struct SimState {
    playlists: Vec<Playlist>,
    library: Vec<TrackRef>,
    pending_login: Option<std::result::Result<(), String>>,
    container_announced: bool,
    pending_searches: Vec<(String, SearchCallback)>,
    player: Option<LoadedPlayer>,
}

pub struct SimCatalog {
    callbacks: Arc<dyn SessionCallbacks>,
    state: Mutex<SimState>,
    position_ms: AtomicU32,
}

impl SimCatalog {
    pub fn new(callbacks: Arc<dyn SessionCallbacks>) -> Self {
        let mut library: Vec<TrackRef> = Vec::new();
        let mut playlists = Vec::new();

        for (pl_idx, name) in PLAYLIST_NAMES.iter().enumerate() {
            let mut tracks: Vec<TrackRef> = Vec::new();
            for tr_idx in 0..8u32 {
                let id = pl_idx as u32 * 8 + tr_idx;
                let track: TrackRef = Arc::new(SimTrack {
                    id,
                    title: format!(
                        "{} {}",
                        TITLE_A[(id as usize * 3) % TITLE_A.len()],
                        TITLE_B[(id as usize * 5) % TITLE_B.len()]
                    ),
                    artist: ARTISTS[pl_idx].to_string(),
                    album: format!("{} Sessions", ARTISTS[pl_idx]),
                    duration_ms: 150_000 + (id * 7919) % 120_000,
                    popularity: ((id * 37) % 100) as u8,
                });
                library.push(track.clone());
                tracks.push(track);
            }
            playlists.push(Playlist {
                name: name.to_string(),
                tracks,
            });
        }

        SimCatalog {
            callbacks,
            state: Mutex::new(SimState {
                playlists,
                library,
                pending_login: None,
                container_announced: false,
                pending_searches: Vec::new(),
                player: None,
            }),
            position_ms: AtomicU32::new(0),
        }
    }

    /// Generate one chunk of interleaved i16 PCM for the loaded track.
    fn synthesize(player: &mut LoadedPlayer, frames: usize) -> BytesMut {
        let mut buf = BytesMut::with_capacity(frames * player.format.frame_size());
        let step = 2.0 * std::f32::consts::PI * player.tone_hz / player.format.sample_rate as f32;
        for _ in 0..frames {
            let sample = (player.phase.sin() * 0.2 * i16::MAX as f32) as i16;
            player.phase = (player.phase + step) % (2.0 * std::f32::consts::PI);
            for _ in 0..player.format.channels {
                buf.put_i16_ne(sample);
            }
        }
        buf
    }

    /// Deliver PCM until the loaded track has caught up with the wall clock,
    /// the downstream is saturated, or the track ends.
    fn pump_delivery(&self, state: &mut SimState) {
        let Some(player) = state.player.as_mut() else {
            return;
        };
        if !player.playing || player.finished {
            return;
        }

        let target = player.target_frames().min(player.total_frames);
        while player.sent_frames < target {
            let frames = DELIVERY_CHUNK_FRAMES.min((target - player.sent_frames) as usize);
            let chunk = Self::synthesize(player, frames);
            let accepted = self
                .callbacks
                .music_delivery(&player.format, &chunk, frames);
            if accepted == 0 {
                // Downstream full; retry on the next pump.
                break;
            }
            player.sent_frames += accepted as u64;
            self.position_ms.store(
                (player.sent_frames * 1000 / player.format.sample_rate as u64) as u32,
                Ordering::Relaxed,
            );
        }

        if player.sent_frames >= player.total_frames {
            player.finished = true;
            player.playing = false;
            self.callbacks.end_of_track();
        }
    }
}

impl CatalogSession for SimCatalog {
    fn login(&self, username: &str, password: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if username.is_empty() || password.is_empty() {
            state.pending_login = Some(Err("empty credentials".to_string()));
        } else {
            tracing::debug!("sim catalog: accepting login for {}", username);
            state.pending_login = Some(Ok(()));
        }
        drop(state);
        self.callbacks.notify_main_thread();
        Ok(())
    }

    fn process_events(&self) -> Duration {
        let mut state = self.state.lock().unwrap();

        if let Some(result) = state.pending_login.take() {
            let announce = result.is_ok() && !state.container_announced;
            if announce {
                state.container_announced = true;
            }
            drop(state);
            self.callbacks.logged_in(result);
            if announce {
                self.callbacks.container_loaded();
            }
            state = self.state.lock().unwrap();
        }

        let searches: Vec<_> = state.pending_searches.drain(..).collect();
        if !searches.is_empty() {
            let library = state.library.clone();
            drop(state);
            for (query, deliver) in searches {
                let needle = query.to_lowercase();
                let hits: Vec<TrackRef> = library
                    .iter()
                    .filter(|t| {
                        t.title().to_lowercase().contains(&needle)
                            || t.album().to_lowercase().contains(&needle)
                            || t.artists().iter().any(|a| a.to_lowercase().contains(&needle))
                    })
                    .cloned()
                    .collect();
                deliver(hits);
            }
            state = self.state.lock().unwrap();
        }

        self.pump_delivery(&mut state);

        match state.player.as_ref() {
            Some(p) if p.playing => Duration::from_millis(10),
            _ => Duration::from_millis(100),
        }
    }

    fn player_load(&self, track: &TrackRef) -> Result<()> {
        if !track.is_available() {
            return Err(Error::Catalog(format!(
                "track {} is not available",
                track.uri()
            )));
        }
        let format = PcmFormat::stereo_44100();
        let total_frames =
            track.duration_ms() as u64 * format.sample_rate as u64 / 1000;
        let tone_hz = 220.0
            + 20.0
                * track
                    .uri()
                    .rsplit(':')
                    .next()
                    .and_then(|s| s.parse::<u32>().ok())
                    .map(|id| (id % 24) as f32)
                    .unwrap_or(0.0);

        let mut state = self.state.lock().unwrap();
        state.player = Some(LoadedPlayer {
            track: track.clone(),
            format,
            total_frames,
            sent_frames: 0,
            playing: false,
            resumed_at: None,
            played_before_resume: Duration::ZERO,
            tone_hz,
            phase: 0.0,
            finished: false,
        });
        self.position_ms.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn player_play(&self, play: bool) {
        let mut state = self.state.lock().unwrap();
        let mut flush = false;
        if let Some(player) = state.player.as_mut() {
            if play && !player.playing && !player.finished {
                player.resumed_at = Some(Instant::now());
                player.playing = true;
            } else if !play && player.playing {
                if let Some(at) = player.resumed_at.take() {
                    player.played_before_resume += at.elapsed();
                }
                player.playing = false;
                flush = true;
            }
        }
        drop(state);
        if flush {
            // The library signals a pause with an empty delivery.
            self.callbacks
                .music_delivery(&PcmFormat::stereo_44100(), &[], 0);
        }
        self.callbacks.notify_main_thread();
    }

    fn player_seek(&self, position_ms: u32) {
        let mut state = self.state.lock().unwrap();
        if let Some(player) = state.player.as_mut() {
            let position_ms = position_ms.min(player.track.duration_ms());
            player.sent_frames =
                position_ms as u64 * player.format.sample_rate as u64 / 1000;
            player.played_before_resume = Duration::from_millis(position_ms as u64);
            if player.playing {
                player.resumed_at = Some(Instant::now());
            }
            player.finished = false;
            self.position_ms.store(position_ms, Ordering::Relaxed);
        }
    }

    fn player_unload(&self) {
        let mut state = self.state.lock().unwrap();
        state.player = None;
        self.position_ms.store(0, Ordering::Relaxed);
    }

    fn play_time_ms(&self) -> u32 {
        self.position_ms.load(Ordering::Relaxed)
    }

    fn container_loaded(&self) -> bool {
        self.state.lock().unwrap().container_announced
    }

    fn playlist_count(&self) -> usize {
        self.state.lock().unwrap().playlists.len()
    }

    fn playlist(&self, index: usize) -> Option<Playlist> {
        self.state.lock().unwrap().playlists.get(index).cloned()
    }

    fn track_by_uri(&self, uri: &str) -> Option<TrackRef> {
        let id: u32 = uri.strip_prefix("jukebox:track:")?.parse().ok()?;
        let state = self.state.lock().unwrap();
        state.library.get(id as usize).cloned()
    }

    fn search(&self, query: &str, deliver: SearchCallback) {
        let mut state = self.state.lock().unwrap();
        state.pending_searches.push((query.to_string(), deliver));
        drop(state);
        self.callbacks.notify_main_thread();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullCallbacks;

    impl SessionCallbacks for NullCallbacks {
        fn logged_in(&self, _result: std::result::Result<(), String>) {}
        fn notify_main_thread(&self) {}
        fn music_delivery(&self, _format: &PcmFormat, _frames: &[u8], num_frames: usize) -> usize {
            num_frames
        }
        fn end_of_track(&self) {}
        fn play_token_lost(&self) {}
        fn connection_error(&self, _message: &str) {}
        fn message_to_user(&self, _message: &str) {}
        fn log_message(&self, _message: &str) {}
    }

    #[test]
    fn library_resolves_by_uri() {
        let sim = SimCatalog::new(Arc::new(NullCallbacks));
        let track = sim.track_by_uri("jukebox:track:3").expect("track 3");
        assert_eq!(track.uri(), "jukebox:track:3");
        assert!(track.is_loaded());
        assert!(sim.track_by_uri("jukebox:track:999").is_none());
        assert!(sim.track_by_uri("bogus:thing").is_none());
    }

    #[test]
    fn playlists_are_stable() {
        let sim = SimCatalog::new(Arc::new(NullCallbacks));
        assert_eq!(sim.playlist_count(), 4);
        let pl = sim.playlist(1).expect("playlist 1");
        assert_eq!(pl.tracks.len(), 8);
        assert_eq!(pl.name, "Night Drive");
    }

    #[test]
    fn unavailable_track_refuses_load() {
        let sim = SimCatalog::new(Arc::new(NullCallbacks));
        let locked = sim.track_by_uri("jukebox:track:7").unwrap();
        assert!(!locked.is_available());
        assert!(sim.player_load(&locked).is_err());
    }

    #[test]
    fn seek_moves_the_play_position() {
        let sim = SimCatalog::new(Arc::new(NullCallbacks));
        let track = sim.track_by_uri("jukebox:track:1").unwrap();
        sim.player_load(&track).unwrap();
        sim.player_play(true);
        sim.player_seek(5000);
        assert_eq!(sim.play_time_ms(), 5000);

        sim.process_events();
        let position = sim.play_time_ms();
        assert!((5000..=5200).contains(&position), "position {}", position);
    }

    #[test]
    fn delivery_is_paced_by_the_clock() {
        struct Counting {
            frames: std::sync::atomic::AtomicUsize,
        }

        impl SessionCallbacks for Counting {
            fn logged_in(&self, _result: std::result::Result<(), String>) {}
            fn notify_main_thread(&self) {}
            fn music_delivery(
                &self,
                _format: &PcmFormat,
                _frames: &[u8],
                num_frames: usize,
            ) -> usize {
                self.frames
                    .fetch_add(num_frames, std::sync::atomic::Ordering::SeqCst);
                num_frames
            }
            fn end_of_track(&self) {}
            fn play_token_lost(&self) {}
            fn connection_error(&self, _message: &str) {}
            fn message_to_user(&self, _message: &str) {}
            fn log_message(&self, _message: &str) {}
        }

        let counting = Arc::new(Counting {
            frames: std::sync::atomic::AtomicUsize::new(0),
        });
        let sim = SimCatalog::new(counting.clone());
        let track = sim.track_by_uri("jukebox:track:0").unwrap();
        sim.player_load(&track).unwrap();
        sim.player_play(true);

        std::thread::sleep(Duration::from_millis(100));
        sim.process_events();

        // Roughly 100 ms of audio at 44.1 kHz, with generous slack for a
        // busy test machine.
        let frames = counting.frames.load(std::sync::atomic::Ordering::SeqCst);
        assert!(frames >= 2_000, "only {} frames delivered", frames);
        assert!(frames <= 44_100, "{} frames is over a second", frames);
    }
}
