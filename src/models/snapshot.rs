use serde::{Deserialize, Serialize};

use crate::models::TrackInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Stopped,
    Playing,
    Paused,
}

/// Immutable description of queue + transport state at a publish instant.
/// Built under the player lock, distributed to subscribers after release;
/// subscribers never see live player state.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerSnapshot {
    pub status: PlaybackStatus,
    pub repeat: bool,
    pub shuffle: bool,
    pub total_tracks: usize,
    /// Queue index of the current track, absent when stopped.
    pub current_track: Option<usize>,
    pub position_ms: u32,
    pub track: Option<TrackInfo>,
}

