pub mod snapshot;
pub mod track;

pub use snapshot::{PlaybackStatus, PlayerSnapshot};
pub use track::TrackInfo;
