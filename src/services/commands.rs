//! Table-driven remote-control command dispatcher.
//!
//! Front-ends hand over a command name and raw string arguments; parsing
//! and validation happen here, before anything touches the player. Every
//! command answers through a `Finalize` continuation: synchronous handlers
//! invoke it before returning, finalized handlers fire it when the catalog
//! delivers, and the idle form completes it from the next published
//! snapshot.

use std::sync::mpsc;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::models::TrackInfo;
use crate::services::audio_pipeline::AudioPipeline;
use crate::services::catalog::TrackRef;
use crate::services::player::{Player, SeekOutcome};
use crate::services::session::{SessionHandle, ShutdownToken};

pub type Finalize = Box<dyn FnOnce(Result<Value>) + Send>;

#[derive(Debug, Clone)]
pub enum Arg {
    Int(i64),
    Str(String),
}

impl Arg {
    fn as_index(&self) -> Result<usize> {
        match self {
            Arg::Int(i) if *i >= 0 => Ok(*i as usize),
            Arg::Int(i) => Err(Error::BadArgument(format!("negative index {}", i))),
            Arg::Str(s) => Err(Error::BadArgument(format!("expected an index, got \"{}\"", s))),
        }
    }

    fn as_str(&self) -> Result<&str> {
        match self {
            Arg::Str(s) => Ok(s),
            Arg::Int(i) => Err(Error::BadArgument(format!("expected a string, got {}", i))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Int,
    Uri,
    Str,
    /// Integer or string; the handler disambiguates.
    Any,
}

enum Form {
    Sync(fn(&CommandDispatcher, &[Arg]) -> Result<Value>),
    Finalized(fn(&CommandDispatcher, &[Arg], Finalize)),
    /// Answered by the next snapshot on the notify bus.
    Idle,
}

struct CommandSpec {
    name: &'static str,
    required: &'static [Kind],
    optional: &'static [Kind],
    form: Form,
}

static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "list-playlists",
        required: &[],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_list_playlists),
    },
    CommandSpec {
        name: "list-tracks",
        required: &[Kind::Int],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_list_tracks),
    },
    CommandSpec {
        name: "play",
        required: &[],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_play),
    },
    CommandSpec {
        name: "toggle",
        required: &[],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_toggle),
    },
    CommandSpec {
        name: "stop",
        required: &[],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_stop),
    },
    CommandSpec {
        name: "seek",
        required: &[Kind::Int],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_seek),
    },
    CommandSpec {
        name: "next",
        required: &[],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_next),
    },
    CommandSpec {
        name: "prev",
        required: &[],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_prev),
    },
    CommandSpec {
        name: "goto",
        required: &[Kind::Int],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_goto),
    },
    CommandSpec {
        name: "queue-add",
        required: &[Kind::Any],
        optional: &[Kind::Int],
        form: Form::Sync(CommandDispatcher::cmd_queue_add),
    },
    CommandSpec {
        name: "queue-replace",
        required: &[Kind::Any],
        optional: &[Kind::Int],
        form: Form::Sync(CommandDispatcher::cmd_queue_replace),
    },
    CommandSpec {
        name: "queue-clear",
        required: &[],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_queue_clear),
    },
    CommandSpec {
        name: "queue-remove",
        required: &[Kind::Int],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_queue_remove),
    },
    CommandSpec {
        name: "queue-remove-range",
        required: &[Kind::Int, Kind::Int],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_queue_remove_range),
    },
    CommandSpec {
        name: "queue-list",
        required: &[],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_queue_list),
    },
    CommandSpec {
        name: "status",
        required: &[],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_status),
    },
    CommandSpec {
        name: "notify",
        required: &[],
        optional: &[],
        form: Form::Idle,
    },
    CommandSpec {
        name: "repeat",
        required: &[],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_repeat),
    },
    CommandSpec {
        name: "shuffle",
        required: &[],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_shuffle),
    },
    CommandSpec {
        name: "uri-info",
        required: &[Kind::Uri],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_uri_info),
    },
    CommandSpec {
        name: "uri-play",
        required: &[Kind::Uri],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_uri_play),
    },
    CommandSpec {
        name: "uri-add",
        required: &[Kind::Uri],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_uri_add),
    },
    CommandSpec {
        name: "image",
        required: &[],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_image),
    },
    CommandSpec {
        name: "search",
        required: &[Kind::Str],
        optional: &[],
        form: Form::Finalized(CommandDispatcher::cmd_search),
    },
    CommandSpec {
        name: "stats",
        required: &[],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_stats),
    },
    CommandSpec {
        name: "quit",
        required: &[],
        optional: &[],
        form: Form::Sync(CommandDispatcher::cmd_quit),
    },
];

pub struct CommandDispatcher {
    player: Arc<Player>,
    session: SessionHandle,
    pipeline: Arc<AudioPipeline>,
    shutdown: ShutdownToken,
}

impl CommandDispatcher {
    pub fn new(
        player: Arc<Player>,
        session: SessionHandle,
        pipeline: Arc<AudioPipeline>,
        shutdown: ShutdownToken,
    ) -> Self {
        CommandDispatcher {
            player,
            session,
            pipeline,
            shutdown,
        }
    }

    /// Dispatch one command. The continuation is always invoked exactly
    /// once, possibly before this returns (sync commands and all errors).
    pub fn dispatch(&self, name: &str, raw_args: &[String], finalize: Finalize) {
        let spec = match COMMANDS.iter().find(|c| c.name == name) {
            Some(spec) => spec,
            None => {
                finalize(Err(Error::UnknownCommand(name.to_string())));
                return;
            }
        };

        let args = match Self::parse_args(spec, raw_args) {
            Ok(args) => args,
            Err(e) => {
                finalize(Err(e));
                return;
            }
        };

        match &spec.form {
            Form::Sync(handler) => finalize(handler(self, &args)),
            Form::Finalized(handler) => handler(self, &args, finalize),
            Form::Idle => {
                self.player.bus().add_one_shot(Box::new(move |snapshot| {
                    finalize(serde_json::to_value(snapshot).map_err(|e| Error::Internal(e.into())));
                }));
            }
        }
    }

    /// Dispatch and wait for the response. Safe from front-end threads; do
    /// not call from a notify-bus subscriber (an idle command would wait
    /// for the publish that is already in progress).
    pub fn dispatch_blocking(&self, name: &str, raw_args: &[String]) -> Result<Value> {
        let (tx, rx) = mpsc::channel();
        self.dispatch(
            name,
            raw_args,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        rx.recv()
            .map_err(|_| Error::Internal(anyhow::anyhow!("command response channel dropped")))?
    }

    fn parse_args(spec: &CommandSpec, raw: &[String]) -> Result<Vec<Arg>> {
        let min = spec.required.len();
        let max = min + spec.optional.len();
        if raw.len() < min || raw.len() > max {
            return Err(Error::BadArgument(format!(
                "{} takes {}..{} arguments, got {}",
                spec.name,
                min,
                max,
                raw.len()
            )));
        }

        let kinds = spec.required.iter().chain(spec.optional.iter());
        raw.iter()
            .zip(kinds)
            .map(|(token, kind)| match kind {
                Kind::Int => token
                    .parse::<i64>()
                    .map(Arg::Int)
                    .map_err(|_| Error::BadArgument(format!("\"{}\" is not an integer", token))),
                Kind::Uri => {
                    if token.contains(':') {
                        Ok(Arg::Str(token.clone()))
                    } else {
                        Err(Error::BadArgument(format!("\"{}\" is not a URI", token)))
                    }
                }
                Kind::Str => Ok(Arg::Str(token.clone())),
                Kind::Any => Ok(token
                    .parse::<i64>()
                    .map(Arg::Int)
                    .unwrap_or_else(|_| Arg::Str(token.clone()))),
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------

    fn status_value(&self) -> Result<Value> {
        serde_json::to_value(self.player.snapshot()).map_err(|e| Error::Internal(e.into()))
    }

    fn cmd_list_playlists(&self, _args: &[Arg]) -> Result<Value> {
        let catalog = self.session.catalog();
        if !catalog.container_loaded() {
            return Err(Error::Catalog("playlist container not loaded yet".to_string()));
        }
        let playlists: Vec<Value> = (0..catalog.playlist_count())
            .filter_map(|i| catalog.playlist(i))
            .enumerate()
            .map(|(index, pl)| {
                json!({
                    "index": index,
                    "name": pl.name,
                    "tracks": pl.tracks.len(),
                })
            })
            .collect();
        Ok(json!({ "playlists": playlists }))
    }

    fn cmd_list_tracks(&self, args: &[Arg]) -> Result<Value> {
        let index = args[0].as_index()?;
        let playlist = self
            .session
            .catalog()
            .playlist(index)
            .ok_or(Error::OutOfRange(index))?;
        Ok(json!({
            "name": playlist.name,
            "tracks": track_list(&playlist.tracks),
        }))
    }

    fn cmd_play(&self, _args: &[Arg]) -> Result<Value> {
        self.player.play();
        self.status_value()
    }

    fn cmd_toggle(&self, _args: &[Arg]) -> Result<Value> {
        self.player.toggle();
        self.status_value()
    }

    fn cmd_stop(&self, _args: &[Arg]) -> Result<Value> {
        self.player.stop();
        self.status_value()
    }

    fn cmd_seek(&self, args: &[Arg]) -> Result<Value> {
        let seconds = args[0].as_index()?;
        match self.player.seek((seconds as u32).saturating_mul(1000)) {
            SeekOutcome::OutOfRange => Err(Error::BadArgument(format!(
                "seek position {}s is out of range",
                seconds
            ))),
            _ => self.status_value(),
        }
    }

    fn cmd_next(&self, _args: &[Arg]) -> Result<Value> {
        self.player.next();
        self.status_value()
    }

    fn cmd_prev(&self, _args: &[Arg]) -> Result<Value> {
        self.player.prev();
        self.status_value()
    }

    fn cmd_goto(&self, args: &[Arg]) -> Result<Value> {
        self.player.goto(args[0].as_index()?)?;
        self.status_value()
    }

    fn cmd_queue_add(&self, args: &[Arg]) -> Result<Value> {
        let tracks = self.tracks_from_args(args)?;
        let added = self.player.add_tracks(tracks);
        Ok(json!({ "added": added, "total": self.player.snapshot().total_tracks }))
    }

    fn cmd_queue_replace(&self, args: &[Arg]) -> Result<Value> {
        let tracks = self.tracks_from_args(args)?;
        let added = self.player.replace_tracks(tracks);
        Ok(json!({ "added": added, "total": added }))
    }

    fn cmd_queue_clear(&self, _args: &[Arg]) -> Result<Value> {
        self.player.clear();
        self.status_value()
    }

    fn cmd_queue_remove(&self, args: &[Arg]) -> Result<Value> {
        self.player.remove_range(args[0].as_index()?, 1)?;
        self.status_value()
    }

    fn cmd_queue_remove_range(&self, args: &[Arg]) -> Result<Value> {
        let first = args[0].as_index()?;
        let last = args[1].as_index()?;
        if last < first {
            return Err(Error::BadArgument(format!(
                "invalid range {}..{}",
                first, last
            )));
        }
        self.player.remove_range(first, last - first + 1)?;
        self.status_value()
    }

    fn cmd_queue_list(&self, _args: &[Arg]) -> Result<Value> {
        let snapshot = self.player.snapshot();
        Ok(json!({
            "current": snapshot.current_track,
            "tracks": track_list(&self.player.tracks()),
        }))
    }

    fn cmd_status(&self, _args: &[Arg]) -> Result<Value> {
        self.status_value()
    }

    fn cmd_repeat(&self, _args: &[Arg]) -> Result<Value> {
        self.player.toggle_repeat();
        self.status_value()
    }

    fn cmd_shuffle(&self, _args: &[Arg]) -> Result<Value> {
        self.player.toggle_shuffle();
        self.status_value()
    }

    fn cmd_uri_info(&self, args: &[Arg]) -> Result<Value> {
        let track = self.resolve_uri(args[0].as_str()?)?;
        serde_json::to_value(TrackInfo::from(&track)).map_err(|e| Error::Internal(e.into()))
    }

    fn cmd_uri_play(&self, args: &[Arg]) -> Result<Value> {
        let track = self.resolve_uri(args[0].as_str()?)?;
        self.player.replace_tracks(vec![track]);
        self.player.play();
        self.status_value()
    }

    fn cmd_uri_add(&self, args: &[Arg]) -> Result<Value> {
        let track = self.resolve_uri(args[0].as_str()?)?;
        let added = self.player.add_tracks(vec![track]);
        Ok(json!({ "added": added, "total": self.player.snapshot().total_tracks }))
    }

    fn cmd_image(&self, _args: &[Arg]) -> Result<Value> {
        let track = self
            .player
            .current_track()
            .ok_or_else(|| Error::NotFound("no current track".to_string()))?;
        let image = track
            .cover_uri()
            .ok_or_else(|| Error::NotFound("track has no cover art".to_string()))?;
        Ok(json!({ "image": image }))
    }

    fn cmd_search(&self, args: &[Arg], finalize: Finalize) {
        let query = match args[0].as_str() {
            Ok(query) => query.to_string(),
            Err(e) => return finalize(Err(e)),
        };
        self.session.catalog().search(
            &query.clone(),
            Box::new(move |tracks| {
                finalize(Ok(json!({
                    "query": query,
                    "tracks": track_list(&tracks),
                })));
            }),
        );
    }

    fn cmd_stats(&self, _args: &[Arg]) -> Result<Value> {
        let stats = self.pipeline.stats();
        Ok(json!({
            "queued_frames": stats.queued_frames,
            "stutters": stats.stutters,
        }))
    }

    fn cmd_quit(&self, _args: &[Arg]) -> Result<Value> {
        tracing::info!("quit requested");
        self.shutdown.trigger();
        Ok(json!({ "quitting": true }))
    }

    // ------------------------------------------------------------------
    // Argument resolution
    // ------------------------------------------------------------------

    fn resolve_uri(&self, uri: &str) -> Result<TrackRef> {
        self.session
            .catalog()
            .track_by_uri(uri)
            .ok_or_else(|| Error::NotFound(format!("no track for URI {}", uri)))
    }

    /// `queue-add`/`queue-replace` accept a playlist index, a playlist and
    /// track index pair, or a track URI.
    fn tracks_from_args(&self, args: &[Arg]) -> Result<Vec<TrackRef>> {
        match args {
            [Arg::Str(uri)] => Ok(vec![self.resolve_uri(uri)?]),
            [Arg::Int(_)] | [Arg::Int(_), Arg::Int(_)] => {
                let playlist_idx = args[0].as_index()?;
                let playlist = self
                    .session
                    .catalog()
                    .playlist(playlist_idx)
                    .ok_or(Error::OutOfRange(playlist_idx))?;
                match args.get(1) {
                    None => Ok(playlist.tracks),
                    Some(arg) => {
                        let track_idx = arg.as_index()?;
                        playlist
                            .tracks
                            .get(track_idx)
                            .cloned()
                            .map(|t| vec![t])
                            .ok_or(Error::OutOfRange(track_idx))
                    }
                }
            }
            _ => Err(Error::BadArgument(
                "expected a playlist index, a playlist and track index, or a URI".to_string(),
            )),
        }
    }
}

fn track_list(tracks: &[TrackRef]) -> Vec<Value> {
    tracks
        .iter()
        .enumerate()
        .map(|(index, track)| {
            let mut value = serde_json::to_value(TrackInfo::from(track)).unwrap_or(Value::Null);
            if let Value::Object(map) = &mut value {
                map.insert("index".to_string(), json!(index));
            }
            value
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::channel;
    use std::time::Duration;

    use super::*;
    use crate::services::catalog::{
        CatalogSession, CatalogTrack, Playlist, SearchCallback,
    };
    use crate::services::notify::NotifyBus;
    use crate::services::output::OutputSink;
    use crate::services::session::Notify;

    struct NullSink;

    impl OutputSink for NullSink {
        fn write(&mut self, data: &[u8], format: &crate::services::catalog::PcmFormat) -> Result<usize> {
            Ok(data.len() / format.frame_size())
        }
        fn flush(&mut self) {}
        fn close(&mut self) {}
    }

    struct FakeTrack {
        uri: String,
    }

    impl CatalogTrack for FakeTrack {
        fn uri(&self) -> String {
            self.uri.clone()
        }
        fn is_loaded(&self) -> bool {
            true
        }
        fn is_available(&self) -> bool {
            true
        }
        fn duration_ms(&self) -> u32 {
            60_000
        }
        fn title(&self) -> String {
            format!("title {}", self.uri)
        }
        fn artists(&self) -> Vec<String> {
            vec!["artist".to_string()]
        }
        fn album(&self) -> String {
            "album".to_string()
        }
        fn cover_uri(&self) -> Option<String> {
            Some(format!("image:{}", self.uri))
        }
        fn popularity(&self) -> Option<u8> {
            None
        }
        fn starred(&self) -> bool {
            false
        }
    }

    struct TestCatalog {
        playlists: Vec<Playlist>,
    }

    impl TestCatalog {
        fn new() -> Self {
            let tracks: Vec<TrackRef> = (0..4)
                .map(|i| {
                    Arc::new(FakeTrack {
                        uri: format!("test:track:{}", i),
                    }) as TrackRef
                })
                .collect();
            TestCatalog {
                playlists: vec![
                    Playlist {
                        name: "One".to_string(),
                        tracks: tracks[..2].to_vec(),
                    },
                    Playlist {
                        name: "Two".to_string(),
                        tracks: tracks[2..].to_vec(),
                    },
                ],
            }
        }
    }

    impl CatalogSession for TestCatalog {
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
            self.playlists.len()
        }
        fn playlist(&self, index: usize) -> Option<Playlist> {
            self.playlists.get(index).cloned()
        }
        fn track_by_uri(&self, uri: &str) -> Option<TrackRef> {
            self.playlists
                .iter()
                .flat_map(|p| p.tracks.iter())
                .find(|t| t.uri() == uri)
                .cloned()
        }
        fn search(&self, query: &str, deliver: SearchCallback) {
            let needle = query.to_lowercase();
            let hits = self
                .playlists
                .iter()
                .flat_map(|p| p.tracks.iter())
                .filter(|t| t.title().to_lowercase().contains(&needle))
                .cloned()
                .collect();
            deliver(hits);
        }
    }

    fn dispatcher() -> (CommandDispatcher, ShutdownToken) {
        let (tx, _rx) = channel();
        let notify = Arc::new(Notify::new());
        let session = SessionHandle::new(tx, notify.clone(), Arc::new(TestCatalog::new()));
        let player = Player::new(Arc::new(NotifyBus::new()), session.clone());
        let pipeline = crate::services::audio_pipeline::AudioPipeline::new(Box::new(|| {
            Box::new(NullSink)
        }));
        let shutdown = ShutdownToken::new(notify);
        (
            CommandDispatcher::new(player, session, pipeline, shutdown.clone()),
            shutdown,
        )
    }

    fn run(d: &CommandDispatcher, name: &str, args: &[&str]) -> Result<Value> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        d.dispatch_blocking(name, &args)
    }

    #[test]
    fn unknown_command_is_a_typed_error() {
        let (d, _) = dispatcher();
        assert!(matches!(
            run(&d, "blorp", &[]),
            Err(Error::UnknownCommand(_))
        ));
    }

    #[test]
    fn arity_and_kind_are_validated_before_dispatch() {
        let (d, _) = dispatcher();
        assert!(matches!(run(&d, "goto", &[]), Err(Error::BadArgument(_))));
        assert!(matches!(
            run(&d, "goto", &["one"]),
            Err(Error::BadArgument(_))
        ));
        assert!(matches!(
            run(&d, "uri-add", &["nocolon"]),
            Err(Error::BadArgument(_))
        ));
        // Player state untouched by rejected commands.
        assert_eq!(d.player.snapshot().total_tracks, 0);
    }

    #[test]
    fn list_playlists_and_tracks() {
        let (d, _) = dispatcher();
        let value = run(&d, "list-playlists", &[]).unwrap();
        let playlists = value["playlists"].as_array().unwrap();
        assert_eq!(playlists.len(), 2);
        assert_eq!(playlists[1]["name"], "Two");

        let value = run(&d, "list-tracks", &["0"]).unwrap();
        assert_eq!(value["tracks"].as_array().unwrap().len(), 2);
        assert!(matches!(
            run(&d, "list-tracks", &["9"]),
            Err(Error::OutOfRange(9))
        ));
    }

    #[test]
    fn queue_add_forms() {
        let (d, _) = dispatcher();
        let value = run(&d, "queue-add", &["0"]).unwrap();
        assert_eq!(value["added"], 2);

        let value = run(&d, "queue-add", &["1", "0"]).unwrap();
        assert_eq!(value["added"], 1);
        assert_eq!(value["total"], 3);

        let value = run(&d, "queue-add", &["test:track:3"]).unwrap();
        assert_eq!(value["total"], 4);

        assert!(matches!(
            run(&d, "queue-add", &["test:track:99"]),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn play_and_status_round_trip() {
        let (d, _) = dispatcher();
        run(&d, "queue-add", &["0"]).unwrap();
        let value = run(&d, "play", &[]).unwrap();
        assert_eq!(value["status"], "playing");
        assert_eq!(value["current_track"], 0);

        let value = run(&d, "status", &[]).unwrap();
        assert_eq!(value["status"], "playing");
        assert_eq!(value["track"]["uri"], "test:track:0");
    }

    #[test]
    fn uri_play_replaces_the_queue() {
        let (d, _) = dispatcher();
        run(&d, "queue-add", &["0"]).unwrap();
        let value = run(&d, "uri-play", &["test:track:2"]).unwrap();
        assert_eq!(value["status"], "playing");
        assert_eq!(value["total_tracks"], 1);
        assert_eq!(value["track"]["uri"], "test:track:2");
    }

    #[test]
    fn remove_range_is_inclusive() {
        let (d, _) = dispatcher();
        run(&d, "queue-add", &["0"]).unwrap();
        run(&d, "queue-add", &["1"]).unwrap();
        let value = run(&d, "queue-remove-range", &["1", "2"]).unwrap();
        assert_eq!(value["total_tracks"], 2);
        assert!(matches!(
            run(&d, "queue-remove-range", &["2", "1"]),
            Err(Error::BadArgument(_))
        ));
    }

    #[test]
    fn notify_completes_on_next_publish() {
        let (d, _) = dispatcher();
        let (tx, rx) = channel();
        d.dispatch(
            "notify",
            &[],
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        // Not yet: nothing was published.
        assert!(rx.try_recv().is_err());

        run(&d, "play", &[]).unwrap();
        let value = rx
            .recv_timeout(Duration::from_secs(1))
            .unwrap()
            .unwrap();
        assert_eq!(value["status"], "stopped"); // empty queue: play is a no-op
    }

    #[test]
    fn search_finalizes_with_matches() {
        let (d, _) = dispatcher();
        let value = run(&d, "search", &["title test:track:1"]).unwrap();
        assert_eq!(value["tracks"].as_array().unwrap().len(), 1);
        assert_eq!(value["tracks"][0]["uri"], "test:track:1");
    }

    #[test]
    fn image_needs_a_current_track() {
        let (d, _) = dispatcher();
        assert!(matches!(run(&d, "image", &[]), Err(Error::NotFound(_))));
        run(&d, "uri-play", &["test:track:1"]).unwrap();
        let value = run(&d, "image", &[]).unwrap();
        assert_eq!(value["image"], "image:test:track:1");
    }

    #[test]
    fn quit_triggers_the_shutdown_token() {
        let (d, shutdown) = dispatcher();
        assert!(!shutdown.is_triggered());
        run(&d, "quit", &[]).unwrap();
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn seek_out_of_range_is_an_error() {
        let (d, _) = dispatcher();
        run(&d, "uri-play", &["test:track:0"]).unwrap();
        assert!(run(&d, "seek", &["30"]).is_ok());
        assert!(matches!(
            run(&d, "seek", &["61"]),
            Err(Error::BadArgument(_))
        ));
    }
}
