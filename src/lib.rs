// Module declarations for the application's core components
pub mod channels;      // Inter-component communication channels
pub mod config;        // Configuration management
pub mod connection;    // Per-connection line handling
pub mod engine;        // Periodic power derivation
pub mod error;         // Error handling and types
pub mod listener;      // TCP accept loop
pub mod options;       // Command line options parsing
pub mod plotter;       // Read-only plot snapshot feed
pub mod power_log;     // Append-only derived power log
pub mod prelude;       // Common imports and types
pub mod protocol;      // Wire line codec
pub mod registry;      // Device registry
pub mod simulator;     // Synthetic device client
pub mod stats;         // Ingest counters
pub mod store;         // Shared measurement store
pub mod validator;     // Reading validation

// Get the package version from Cargo.toml
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::engine::PowerEngine;
use crate::listener::Listener;
use crate::plotter::PlotFeed;
use crate::power_log::PowerLog;
use crate::prelude::*;
use crate::simulator::Simulator;

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Sets up `env_logger` with `level` as the default filter. `RUST_LOG` wins
/// when set. Later calls are ignored.
pub fn init_logging(level: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init();
}

/// Long-running components of the server and their shutdown.
#[derive(Clone)]
pub struct Components {
    pub listener: Arc<Listener>,
    pub engine: Arc<PowerEngine>,
    pub plot_feed: Option<Arc<PlotFeed>>,
    pub channels: Channels,
}

impl Components {
    /// Stop accepting first, then the engine, then the plot feed.
    pub fn stop(&self) {
        info!("Stopping all components...");

        self.listener.stop();
        self.engine.stop();
        if let Some(plot_feed) = &self.plot_feed {
            plot_feed.stop();
        }
    }
}

/// Runs the ingestion server until `shutdown_rx` fires or `runtime` elapses.
///
/// Fails only on startup problems: unreadable registry, unusable power log
/// or a listen address that cannot be bound.
pub async fn app(
    mut shutdown_rx: broadcast::Receiver<()>,
    config: Config,
    runtime: Option<Duration>,
) -> Result<Arc<Mutex<IngestStats>>> {
    init_logging(config.loglevel());

    info!("meterlink {} starting", CARGO_PKG_VERSION);
    config.log_summary();

    let registry = Arc::new(
        Registry::load(config.registry_file())
            .map_err(|e| file_error_with_source!(e, "cannot load device registry"))?,
    );

    let power_log = PowerLog::for_run(config.log_path(), chrono::Local::now().naive_local())
        .map_err(|e| file_error_with_source!(e, "cannot open power log"))?;
    let store = Store::with_history_limit(power_log, config.power().history_limit());
    let stats = Arc::new(Mutex::new(IngestStats::default()));

    info!("Initializing channels...");
    let channels = Channels::new();

    info!("Initializing components...");
    info!("  Creating Listener...");
    let listener = Arc::new(
        Listener::bind(
            config.server().clone(),
            registry.clone(),
            store.clone(),
            stats.clone(),
            channels.clone(),
        )
        .await?,
    );

    info!("  Creating PowerEngine...");
    let engine = Arc::new(PowerEngine::new(
        config.power(),
        store.clone(),
        channels.clone(),
        stats.clone(),
    ));

    let plot_feed = if config.plot().enabled() {
        info!("  Creating PlotFeed...");
        Some(Arc::new(PlotFeed::new(
            config.plot(),
            store.clone(),
            channels.clone(),
        )))
    } else {
        None
    };

    let mut handles = Vec::new();

    let listener_task = listener.clone();
    handles.push(tokio::spawn(async move {
        if let Err(e) = listener_task.run().await {
            error!("Listener task failed: {}", e);
        }
    }));

    let engine_task = engine.clone();
    handles.push(tokio::spawn(async move {
        if let Err(e) = engine_task.start().await {
            error!("PowerEngine task failed: {}", e);
        }
    }));

    if let Some(plot_feed) = &plot_feed {
        let plot_task = plot_feed.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = plot_task.start().await {
                error!("PlotFeed task failed: {}", e);
            }
        }));
    }

    let components = Components {
        listener,
        engine,
        plot_feed,
        channels,
    };

    info!("Waiting for shutdown signal...");
    wait_for_shutdown(&mut shutdown_rx, runtime).await;

    components.stop();
    for result in futures::future::join_all(handles).await {
        if let Err(e) = result {
            error!("Error waiting for task: {}", e);
        }
    }

    info!(
        "Power samples written to {}: {}",
        store.power_log().path().display(),
        store.power_log().samples_written()
    );
    IngestStats::lock(&stats).print_summary();

    info!("Shutdown complete");
    Ok(stats)
}

/// Runs the synthetic device client until `shutdown_rx` fires, `runtime`
/// elapses or the connection drops.
pub async fn simulator(
    mut shutdown_rx: broadcast::Receiver<()>,
    config: Config,
    runtime: Option<Duration>,
) -> Result<()> {
    init_logging(config.loglevel());

    info!("meterlink-sim {} starting", CARGO_PKG_VERSION);
    info!(
        "  Simulating {} devices against {}",
        config.simulator().devices().len(),
        config.simulator().address()
    );

    let simulator = Simulator::new(config.simulator().clone(), Channels::new());

    let run = simulator.run();
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => return result,
        _ = wait_for_shutdown(&mut shutdown_rx, runtime) => simulator.stop(),
    }

    run.await
}

async fn wait_for_shutdown(shutdown_rx: &mut broadcast::Receiver<()>, runtime: Option<Duration>) {
    match runtime {
        Some(limit) => tokio::select! {
            _ = shutdown_rx.recv() => info!("Shutdown signal received"),
            _ = tokio::time::sleep(limit) => info!("Runtime limit of {}s reached", limit.as_secs()),
        },
        None => {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received");
        }
    }
}
