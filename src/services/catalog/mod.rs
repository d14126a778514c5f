//! Capability traits for the music-catalog library.
//!
//! The daemon never links the catalog client directly: everything it needs
//! is expressed here, so the queue and transport can be driven against a
//! simulated or mock backend. The contract mirrors the real library:
//! session lifecycle and player control are invoked from the event-loop
//! thread, callbacks arrive either from the event pump or from the
//! library's internal delivery thread.

pub mod sim;

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// PCM format descriptor attached to every delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_type: SampleType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    /// Signed 16-bit, native byte order. The only type the pipeline accepts.
    Int16NativeEndian,
}

impl PcmFormat {
    pub fn stereo_44100() -> Self {
        PcmFormat {
            sample_rate: 44100,
            channels: 2,
            sample_type: SampleType::Int16NativeEndian,
        }
    }

    /// One frame = one sample across all channels.
    pub fn frame_size(&self) -> usize {
        2 * self.channels as usize
    }
}

/// Opaque, reference-counted handle to a catalog track. Cloning acquires a
/// reference, dropping releases it.
pub type TrackRef = Arc<dyn CatalogTrack>;

pub trait CatalogTrack: Send + Sync {
    fn uri(&self) -> String;
    /// Metadata may arrive after the handle; accessors return placeholders
    /// until this is true.
    fn is_loaded(&self) -> bool;
    fn is_available(&self) -> bool;
    fn duration_ms(&self) -> u32;
    fn title(&self) -> String;
    fn artists(&self) -> Vec<String>;
    fn album(&self) -> String;
    fn cover_uri(&self) -> Option<String>;
    fn popularity(&self) -> Option<u8>;
    fn starred(&self) -> bool;
}

/// A named, ordered list of tracks from the catalog's playlist container.
/// Read-only: the daemon copies tracks out of playlists into its queue.
#[derive(Clone)]
pub struct Playlist {
    pub name: String,
    pub tracks: Vec<TrackRef>,
}

/// Completion for an asynchronous metadata search.
pub type SearchCallback = Box<dyn FnOnce(Vec<TrackRef>) + Send>;

/// Callbacks the catalog library fires into the daemon.
///
/// `music_delivery` may be called from the library's internal audio thread
/// and must not call back into the session. All other callbacks arrive from
/// within `process_events`.
pub trait SessionCallbacks: Send + Sync {
    fn logged_in(&self, result: std::result::Result<(), String>);
    /// The library has work pending; wake the event-loop thread.
    fn notify_main_thread(&self);
    /// Returns how many frames were consumed; 0 both on saturation and on
    /// the empty delivery that signals a pause.
    fn music_delivery(&self, format: &PcmFormat, frames: &[u8], num_frames: usize) -> usize;
    fn end_of_track(&self);
    fn play_token_lost(&self);
    fn connection_error(&self, message: &str);
    fn message_to_user(&self, message: &str);
    fn log_message(&self, message: &str);
    fn container_loaded(&self) {}
    /// Playlists or their tracks were added, removed, or moved.
    fn playlists_changed(&self) {}
}

/// The catalog session itself.
pub trait CatalogSession: Send + Sync {
    fn login(&self, username: &str, password: &str) -> Result<()>;

    /// Pump pending library work. Returns the suggested wait before the
    /// next pump; the library shortens it via `notify_main_thread`.
    fn process_events(&self) -> Duration;

    fn player_load(&self, track: &TrackRef) -> Result<()>;
    fn player_play(&self, play: bool);
    fn player_seek(&self, position_ms: u32);
    fn player_unload(&self);
    /// Playback position of the loaded track. Callable from any thread.
    fn play_time_ms(&self) -> u32;

    fn container_loaded(&self) -> bool;
    fn playlist_count(&self) -> usize;
    fn playlist(&self, index: usize) -> Option<Playlist>;
    fn track_by_uri(&self, uri: &str) -> Option<TrackRef>;
    fn search(&self, query: &str, deliver: SearchCallback);
}
