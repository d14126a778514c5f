use serde::{Deserialize, Serialize};

use crate::services::catalog::TrackRef;

/// Display metadata for a track, detached from its catalog handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackInfo {
    pub uri: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_ms: u32,
    pub starred: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popularity: Option<u8>,
}

impl From<&TrackRef> for TrackInfo {
    fn from(track: &TrackRef) -> Self {
        TrackInfo {
            uri: track.uri(),
            title: track.title(),
            artist: track.artists().join(", "),
            album: track.album(),
            duration_ms: track.duration_ms(),
            starred: track.starred(),
            available: Some(track.is_available()),
            popularity: track.popularity(),
        }
    }
}
