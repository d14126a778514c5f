mod config;
mod error;
mod models;
mod services;

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::services::catalog::sim::SimCatalog;
use crate::services::catalog::CatalogSession;
use crate::services::output::{device::DeviceSink, raw::RawSink, OutputSink, SinkFactory};
use crate::services::{
    savestate, AudioPipeline, CommandDispatcher, LibraryCallbacks, Notify, NotifyBus, Player,
    Session, SessionHandle, ShutdownToken,
};

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,jukeboxd=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Event-loop plumbing: the work queue and the semaphore that wakes it.
    let notify = Arc::new(Notify::new());
    let (work_tx, work_rx) = mpsc::channel();
    let shutdown = ShutdownToken::new(notify.clone());

    // Audio pipeline; the sink is built lazily on the consumer thread.
    let sink_factory: SinkFactory = {
        let backend = config.audio_output.clone();
        let raw_path = config.raw_output_path.clone();
        Box::new(move || -> Box<dyn OutputSink> {
            match backend.as_str() {
                "raw" => Box::new(RawSink::new(raw_path)),
                _ => Box::new(DeviceSink::new()),
            }
        })
    };
    let pipeline = AudioPipeline::new(sink_factory);
    tracing::info!("Audio output backend: {}", config.audio_output);

    // Catalog session. The built-in simulator stands in for the real
    // catalog client library.
    let callbacks = Arc::new(LibraryCallbacks::new(
        pipeline.clone(),
        work_tx.clone(),
        notify.clone(),
    ));
    let catalog: Arc<dyn CatalogSession> = Arc::new(SimCatalog::new(callbacks));
    tracing::info!("Using simulated catalog backend");

    // Core state: queue + transport behind one player, snapshots fanned out
    // over the notify bus.
    let bus = Arc::new(NotifyBus::new());
    let session_handle = SessionHandle::new(work_tx, notify.clone(), catalog.clone());
    let player = Player::new(bus.clone(), session_handle.clone());

    // Optional state persistence.
    let login_task = config.state_file.as_ref().map(|path| {
        let path = PathBuf::from(path);
        savestate::spawn_saver(&bus, path.clone(), player.clone());
        tracing::info!("Persisting state to {:?}", path);
        savestate::restore_task(path, catalog.clone(), player.clone())
    });

    // Remote-control front-end.
    let dispatcher = Arc::new(CommandDispatcher::new(
        player.clone(),
        session_handle,
        pipeline.clone(),
        shutdown.clone(),
    ));
    services::interface::serve(&config.listen_address, config.listen_port, dispatcher)?;

    // Log in and drive the catalog event loop on this thread until quit.
    let mut session = Session::new(catalog, work_rx, notify, shutdown, login_task);
    session.login(&config.catalog_user, &config.catalog_password)?;
    tracing::info!("jukeboxd running");

    session.run(&player, &pipeline);

    if let Some(path) = config.state_file.as_ref() {
        if let Err(e) = savestate::save(std::path::Path::new(path), &player) {
            tracing::warn!("final state save failed: {}", e);
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
