//! moodwatch CLI
//!
//! Runs the analytics server or a single camera loop.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use moodwatch::{
    camera::{CameraLoop, CameraStatus, RecognitionSink},
    config::Config,
    core::observation::ObservationSummary,
    detection::{Detector, FaceGallery, NoopDetector, ReplayDetector},
    store::RecognitionStore,
    telemetry::{PipelineCounters, PipelineStats, SharedCounters},
    VERSION,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "moodwatch")]
#[command(version = VERSION)]
#[command(about = "Per-camera mood stabilization and emotion analytics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingestion and analytics HTTP server
    Serve {
        /// Port to listen on (0 for random)
        #[arg(long)]
        port: Option<u16>,

        /// SQLite database file
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Run one camera loop and post recognitions to the server
    Watch {
        /// JSONL file of precomputed detections, one frame per line
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Start the replay over when it runs out
        #[arg(long = "loop", requires = "replay")]
        looping: bool,

        /// JSON map of labeled face descriptors
        #[arg(long)]
        gallery: Option<PathBuf>,

        /// Camera id attached to every recognition
        #[arg(long)]
        camera_id: Option<String>,

        /// Run an observation session for this many seconds and print a summary
        #[arg(long)]
        observe: Option<u64>,
    },

    /// Show pipeline counters and server reachability
    Status,

    /// Show configuration
    Config,

    /// Delete all recognitions and minute snapshots
    Clear {
        /// SQLite database file
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { port, db } => cmd_serve(port, db),
        Commands::Watch {
            replay,
            looping,
            gallery,
            camera_id,
            observe,
        } => cmd_watch(replay, looping, gallery, camera_id, observe),
        Commands::Status => cmd_status(),
        Commands::Config => cmd_config(),
        Commands::Clear { db } => cmd_clear(db),
    };

    if let Err(e) = result {
        tracing::error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins, then `MOODWATCH_LOG`, then `info`.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("MOODWATCH_LOG"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config() -> anyhow::Result<Config> {
    Config::load().with_context(|| format!("loading {:?}", Config::config_path()))
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create runtime")
}

#[cfg(feature = "server")]
fn cmd_serve(port: Option<u16>, db: Option<PathBuf>) -> anyhow::Result<()> {
    let mut config = load_config()?;
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(db) = db {
        config.server.database_path = db;
    }

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    println!("moodwatch v{VERSION}");
    println!("  Database: {:?}", config.server.database_path);

    runtime()?.block_on(async move {
        let (addr, shutdown_tx) = moodwatch::server::run(config).await?;
        println!("  Listening on http://{addr}");
        println!();
        println!("Press Ctrl+C to stop");

        while running.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        let _ = shutdown_tx.send(());
        // Let in-flight requests drain
        tokio::time::sleep(Duration::from_millis(200)).await;
        anyhow::Ok(())
    })?;

    println!("Server stopped.");
    Ok(())
}

#[cfg(not(feature = "server"))]
fn cmd_serve(_port: Option<u16>, _db: Option<PathBuf>) -> anyhow::Result<()> {
    anyhow::bail!("the server feature is not enabled in this build")
}

#[cfg(feature = "ingest")]
fn make_sink(config: &Config, counters: SharedCounters) -> anyhow::Result<Box<dyn RecognitionSink>> {
    let client = moodwatch::ingest::IngestClient::new(&config.ingest)?;
    println!("  Posting to: {}", client.recognitions_url());
    Ok(Box::new(moodwatch::ingest::HttpSink::new(client, counters)))
}

#[cfg(not(feature = "ingest"))]
fn make_sink(_config: &Config, counters: SharedCounters) -> anyhow::Result<Box<dyn RecognitionSink>> {
    let (sink, receiver) = moodwatch::camera::ChannelSink::new(256);
    std::thread::spawn(move || {
        for recognition in receiver {
            println!("{} -> {}", recognition.name, recognition.mood);
        }
    });
    Ok(Box::new(sink.with_counters(counters)))
}

fn cmd_watch(
    replay: Option<PathBuf>,
    looping: bool,
    gallery: Option<PathBuf>,
    camera_id: Option<String>,
    observe: Option<u64>,
) -> anyhow::Result<()> {
    let mut config = load_config()?;
    if let Some(id) = camera_id {
        config.camera.camera_id = id;
    }

    println!("moodwatch v{VERSION}");
    println!("  Camera: {}", config.camera.camera_id);

    let gallery = match gallery {
        Some(path) => {
            let gallery = FaceGallery::load(&path, config.camera.match_distance)
                .with_context(|| format!("loading gallery {path:?}"))?;
            println!("  Gallery: {} descriptor(s)", gallery.len());
            Some(gallery)
        }
        None => None,
    };

    let counters: SharedCounters = Arc::new(PipelineCounters::with_persistence(
        PipelineCounters::default_path(),
    ));

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    runtime()?.block_on(async move {
        let sink = make_sink(&config, counters.clone())?;

        // Mirror Ctrl+C into the loop's stop flag
        let watcher = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            stop_flag.store(true, Ordering::SeqCst);
        });

        println!();
        println!("Press Ctrl+C to stop");
        println!();

        let result = match replay {
            Some(path) => {
                println!("  Source: replay {path:?}{}", if looping { " (looping)" } else { "" });
                let detector = ReplayDetector::new(path).repeating(looping);
                watch(&config, detector, gallery, sink, &counters, &stop, observe).await
            }
            None => {
                println!("  Source: none (no detector configured)");
                watch(&config, NoopDetector, gallery, sink, &counters, &stop, observe).await
            }
        };
        watcher.abort();
        result?;

        println!();
        println!("{}", counters.summary());
        anyhow::Ok(())
    })
}

async fn watch<D: Detector>(
    config: &Config,
    detector: D,
    gallery: Option<FaceGallery>,
    sink: Box<dyn RecognitionSink>,
    counters: &SharedCounters,
    stop: &AtomicBool,
    observe: Option<u64>,
) -> anyhow::Result<()> {
    let mut camera = CameraLoop::new(config, detector, sink, counters.clone());
    if let Some(gallery) = gallery {
        camera = camera.with_gallery(gallery);
    }

    let deadline = observe.map(|secs| {
        let now = Utc::now();
        camera.session_mut().start(now);
        now + chrono::Duration::seconds(secs as i64)
    });

    camera.run(stop, deadline).await;

    if let CameraStatus::Unavailable(reason) = camera.status() {
        anyhow::bail!("camera unavailable: {reason}");
    }

    if let Some(summary) = camera.session_mut().stop(Utc::now()) {
        print_observation(&summary);
    }
    Ok(())
}

fn print_observation(summary: &ObservationSummary) {
    println!();
    println!("Observation ({}s)", summary.elapsed().num_seconds());
    println!("===========");
    if summary.people.is_empty() {
        println!("Nobody was seen.");
        return;
    }
    for person in &summary.people {
        let top = person
            .top_mood
            .map(|t| format!("{} ({:.1}s)", t.mood, t.duration_ms as f64 / 1000.0))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {}: {:.1}s seen, mostly {}",
            person.name,
            person.total_ms() as f64 / 1000.0,
            top
        );
    }
    if let Some(top) = summary.overall_top_mood {
        println!("  Overall: {}", top.mood);
    }
}

fn cmd_status() -> anyhow::Result<()> {
    let config = load_config()?;

    println!("moodwatch Status");
    println!("================");
    println!();
    println!("Camera: {}", config.camera.camera_id);
    println!("Database: {:?}", config.server.database_path);
    println!();

    let stats_path = PipelineCounters::default_path();
    match PipelineStats::load(&stats_path) {
        Ok(stats) => println!("{}", stats.summary()),
        Err(_) => println!("No previous camera session found."),
    }

    #[cfg(feature = "ingest")]
    {
        println!();
        let client = moodwatch::ingest::IngestClient::new(&config.ingest)?;
        let reachable = runtime()?.block_on(client.test_connection());
        match reachable {
            Ok(true) => println!("Server {}: OK", client.base_url()),
            Ok(false) => println!("Server {}: unhealthy", client.base_url()),
            Err(e) => println!("Server {}: unreachable ({e})", client.base_url()),
        }
    }

    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = load_config()?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_clear(db: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config()?;
    let path = db.unwrap_or(config.server.database_path);

    let store = RecognitionStore::open(&path).with_context(|| format!("opening {path:?}"))?;
    let report = store.clear_all()?;
    println!(
        "Deleted {} recognition(s) and {} snapshot(s) from {:?}",
        report.recognitions, report.snapshots, path
    );
    Ok(())
}
