pub mod audio_pipeline;
pub mod catalog;
pub mod commands;
pub mod interface;
pub mod notify;
pub mod output;
pub mod player;
pub mod queue;
pub mod savestate;
pub mod session;

pub use audio_pipeline::AudioPipeline;
pub use commands::CommandDispatcher;
pub use notify::NotifyBus;
pub use player::Player;
pub use session::{LibraryCallbacks, Notify, Session, SessionHandle, ShutdownToken};
