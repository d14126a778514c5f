//! Catalog session ownership and the event-pump loop.
//!
//! The event-loop thread is the only thread that calls the catalog's
//! mutating API. Player-control calls coming from front-end threads are
//! enqueued as work items and drained between pumps; library callbacks that
//! must not re-enter the library (end-of-track, token loss) are posted the
//! same way. The `notify_main_thread` callback posts a semaphore so the
//! loop wakes immediately instead of sleeping out its timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::services::audio_pipeline::AudioPipeline;
use crate::services::catalog::{CatalogSession, PcmFormat, SessionCallbacks, TrackRef};
use crate::services::player::Player;

/// Counting semaphore used to wake the event loop.
pub struct Notify {
    count: Mutex<u32>,
    cond: Condvar,
}

impl Notify {
    pub fn new() -> Self {
        Notify {
            count: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    pub fn post(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.cond.notify_one();
    }

    /// Wait until posted or the timeout elapses. Consumes one post.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut count = self.count.lock().unwrap();
        let deadline = std::time::Instant::now() + timeout;
        while *count == 0 {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self.cond.wait_timeout(count, deadline - now).unwrap();
            count = guard;
        }
        *count -= 1;
        true
    }
}

/// Cooperative shutdown: handlers trigger it, every thread observes it.
#[derive(Clone)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownToken {
    pub fn new(notify: Arc<Notify>) -> Self {
        ShutdownToken {
            flag: Arc::new(AtomicBool::new(false)),
            notify,
        }
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.post();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Work drained by the event-loop thread between pumps.
pub enum Work {
    Load(TrackRef),
    Play(bool),
    Seek(u32),
    Unload,
    EndOfTrack,
    PlayTokenLost,
    LoggedIn(std::result::Result<(), String>),
}

/// Cheap handle for submitting player-control work from other threads.
/// `position_ms` reads the catalog directly; it is documented callback-safe.
#[derive(Clone)]
pub struct SessionHandle {
    tx: Arc<Mutex<Sender<Work>>>,
    notify: Arc<Notify>,
    catalog: Arc<dyn CatalogSession>,
}

impl SessionHandle {
    pub fn new(tx: Sender<Work>, notify: Arc<Notify>, catalog: Arc<dyn CatalogSession>) -> Self {
        SessionHandle {
            tx: Arc::new(Mutex::new(tx)),
            notify,
            catalog,
        }
    }

    fn submit(&self, work: Work) {
        if self.tx.lock().unwrap().send(work).is_err() {
            tracing::warn!("session work queue is gone; dropping command");
        }
        self.notify.post();
    }

    pub fn load(&self, track: &TrackRef) {
        self.submit(Work::Load(track.clone()));
    }

    pub fn play(&self, play: bool) {
        self.submit(Work::Play(play));
    }

    pub fn seek(&self, position_ms: u32) {
        self.submit(Work::Seek(position_ms));
    }

    pub fn unload(&self) {
        self.submit(Work::Unload);
    }

    pub fn position_ms(&self) -> u32 {
        self.catalog.play_time_ms()
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogSession> {
        &self.catalog
    }
}

/// Translates library callbacks into core events. `music_delivery` runs on
/// the library's delivery thread and touches only the pipeline.
pub struct LibraryCallbacks {
    pipeline: Arc<AudioPipeline>,
    tx: Mutex<Sender<Work>>,
    notify: Arc<Notify>,
}

impl LibraryCallbacks {
    pub fn new(pipeline: Arc<AudioPipeline>, tx: Sender<Work>, notify: Arc<Notify>) -> Self {
        LibraryCallbacks {
            pipeline,
            tx: Mutex::new(tx),
            notify,
        }
    }

    fn post(&self, work: Work) {
        let _ = self.tx.lock().unwrap().send(work);
        self.notify.post();
    }
}

impl SessionCallbacks for LibraryCallbacks {
    fn logged_in(&self, result: std::result::Result<(), String>) {
        self.post(Work::LoggedIn(result));
    }

    fn notify_main_thread(&self) {
        self.notify.post();
    }

    fn music_delivery(&self, format: &PcmFormat, frames: &[u8], num_frames: usize) -> usize {
        self.pipeline.deliver(format, frames, num_frames)
    }

    fn end_of_track(&self) {
        self.post(Work::EndOfTrack);
    }

    fn play_token_lost(&self) {
        tracing::warn!("play token lost: another client started playback");
        self.post(Work::PlayTokenLost);
    }

    fn connection_error(&self, message: &str) {
        tracing::warn!("catalog connection error: {}", message);
    }

    fn message_to_user(&self, message: &str) {
        tracing::info!("message from catalog: {}", message);
    }

    fn log_message(&self, message: &str) {
        tracing::debug!("catalog: {}", message.trim_end());
    }

    fn container_loaded(&self) {
        tracing::info!("playlist container loaded");
        self.notify.post();
    }
}

/// Runs once per loop iteration after a successful login until it reports
/// completion. Used by the state restorer, which may have to wait for track
/// metadata without stalling the pump.
pub type LoginTask = Box<dyn FnMut() -> bool + Send>;

pub struct Session {
    catalog: Arc<dyn CatalogSession>,
    rx: Receiver<Work>,
    notify: Arc<Notify>,
    shutdown: ShutdownToken,
    login_task: Option<LoginTask>,
    login_task_armed: bool,
}

impl Session {
    pub fn new(
        catalog: Arc<dyn CatalogSession>,
        rx: Receiver<Work>,
        notify: Arc<Notify>,
        shutdown: ShutdownToken,
        login_task: Option<LoginTask>,
    ) -> Self {
        Session {
            catalog,
            rx,
            notify,
            shutdown,
            login_task,
            login_task_armed: false,
        }
    }

    pub fn login(&self, username: &str, password: &str) -> crate::error::Result<()> {
        self.catalog.login(username, password)
    }

    /// Event pump; runs on the calling thread until shutdown. Processes
    /// library events until the library asks for a wait, drains the work
    /// queue, then sleeps on the semaphore for at most the suggested
    /// timeout.
    pub fn run(&mut self, player: &Arc<Player>, pipeline: &Arc<AudioPipeline>) {
        loop {
            let mut timeout = self.catalog.process_events();
            while timeout.is_zero() {
                timeout = self.catalog.process_events();
            }

            self.drain_work(player);

            if self.login_task_armed {
                if let Some(task) = self.login_task.as_mut() {
                    if task() {
                        self.login_task = None;
                        self.login_task_armed = false;
                    }
                }
            }

            if self.shutdown.is_triggered() {
                break;
            }

            self.notify.wait_timeout(timeout);
        }

        tracing::info!("shutting down: stopping playback");
        player.stop();
        self.drain_work(player);
        pipeline.shutdown();
    }

    fn drain_work(&mut self, player: &Arc<Player>) {
        while let Ok(work) = self.rx.try_recv() {
            match work {
                Work::Load(track) => {
                    if let Err(e) = self.catalog.player_load(&track) {
                        tracing::error!("failed to load {}: {}", track.uri(), e);
                        player.stop();
                    }
                }
                Work::Play(play) => self.catalog.player_play(play),
                Work::Seek(position_ms) => self.catalog.player_seek(position_ms),
                Work::Unload => self.catalog.player_unload(),
                Work::EndOfTrack => player.end_of_track(),
                Work::PlayTokenLost => player.pause_for_token_loss(),
                Work::LoggedIn(Ok(())) => {
                    tracing::info!("logged in to catalog");
                    if self.login_task.is_some() {
                        self.login_task_armed = true;
                    }
                }
                Work::LoggedIn(Err(message)) => {
                    tracing::error!("login failed: {}", message);
                    self.shutdown.trigger();
                }
            }
        }
    }
}
