//! multiwin window
//!
//! One window of a multiwin desktop. Run several of these against the same
//! data directory and they agree on which windows are open and on one shared
//! display configuration.
//!
//! Responsibilities:
//! - Register this window in the shared registry
//! - Refresh its shape and prune closed windows on a timer
//! - React to other windows' writes
//! - Accept commands on stdin (`open`, `reset`, `shape torus`, ...)

use anyhow::{Context, Result};
use clap::Parser;
use multiwin_coordinator::config::Config;
use multiwin_coordinator::{driver, parse_command, ManagerOptions, WindowCommand, WindowManager};
use multiwin_core::scene::{self, ScenePlacement};
use multiwin_core::{Metadata, Rect};
use multiwin_host::process::ProcessHost;
use multiwin_host::{paths, FileSessionStorage, IdentityStore, MemorySessionStorage, SessionStorage};
use multiwin_registry::{default_data_dir, FileStore, Registry, SharedStore};
use serde_json::json;
use std::io::BufRead;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "multiwin")]
#[command(author, version, about = "A window that shares its scene with every other open window")]
struct Args {
    /// Config file to use instead of the standard locations
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory shared by all windows
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Named session; restarting with the same name keeps the window id
    #[arg(long)]
    session: Option<String>,

    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    x: i32,

    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    y: i32,

    #[arg(long)]
    width: Option<i32>,

    #[arg(long)]
    height: Option<i32>,

    /// Wipe the shared store and exit
    #[arg(long)]
    clear: bool,
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first (needed for log level)
    let loaded = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };
    let mut config = loaded.unwrap_or_else(|e| {
        // Can't use tracing yet, fall back to eprintln
        eprintln!("Failed to load configuration: {}. Using defaults.", e);
        Config::default()
    });

    let log_level = match config.behavior.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    for w in &config.validate() {
        warn!("Config: {} - {}", w.field, w.message);
    }

    info!("multiwin starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let data_dir = args
        .data_dir
        .clone()
        .or_else(|| config.storage.dir.clone())
        .unwrap_or_else(default_data_dir);
    info!("Data directory: {}", data_dir.display());

    let store = FileStore::open(paths::store_dir(&data_dir))
        .context("Failed to open shared store")?;

    if args.clear {
        store.clear().context("Failed to clear shared store")?;
        info!("Shared store cleared");
        return Ok(());
    }

    let launch_shape = Rect::new(
        args.x,
        args.y,
        args.width.unwrap_or(config.window.default_width),
        args.height.unwrap_or(config.window.default_height),
    );

    // New windows share our data dir and config but never our session
    let mut forwarded = vec!["--data-dir".to_string(), data_dir.display().to_string()];
    if let Some(path) = &args.config {
        forwarded.push("--config".to_string());
        forwarded.push(path.display().to_string());
    }
    let program = std::env::current_exe().context("Failed to locate own executable")?;
    let host = ProcessHost::new(&data_dir, launch_shape).with_program(program, forwarded);

    let session: Box<dyn SessionStorage> = match &args.session {
        Some(name) => Box::new(FileSessionStorage::new(&data_dir, name)),
        None => Box::new(MemorySessionStorage::new()),
    };
    let identity = IdentityStore::new(session);

    let registry = Registry::new(store, config.display.to_display_config());
    let options = ManagerOptions {
        liveness: config.sync.liveness.into(),
        new_window_offset: (
            config.window.new_window_offset_x,
            config.window.new_window_offset_y,
        ),
    };
    let mut manager = WindowManager::new(registry, host, options);

    manager.set_win_shape_change_callback(|shape| {
        let (dx, dy) = scene::scene_offset(shape);
        info!(
            "Window at ({}, {}) {}x{}, scene offset ({}, {})",
            shape.x, shape.y, shape.width, shape.height, dx, dy
        );
    });
    manager.set_win_change_callback(|windows| {
        for placement in scene::placements(windows) {
            info!(
                "  {} center=({:.0}, {:.0}) size={:.0} hue={:.2}",
                placement.id, placement.center.0, placement.center.1, placement.size, placement.hue
            );
        }
    });
    manager.set_config_change_callback(|config| {
        info!(
            "Scene: {} wireframe={} rotation_speed={} background={} (clock {:.1}s)",
            config.shape,
            config.wireframe,
            config.rotation_speed,
            config.background,
            scene::seconds_since_midnight(SystemTime::now())
        );
    });

    // Hosts report unreliable positions right after a window opens
    tokio::time::sleep(config.sync.startup_delay()).await;

    let mut metadata = Metadata::new();
    metadata.insert("createdAt".to_string(), json!(unix_seconds()));
    metadata.insert("pid".to_string(), json!(std::process::id()));
    manager.init(&identity, metadata)?;

    let (tx, rx) = mpsc::unbounded_channel();
    // A plain thread: tokio's stdin would hold up runtime shutdown
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Some(command) => {
                        let quit = command == WindowCommand::Quit;
                        if tx.send(command).is_err() || quit {
                            break;
                        }
                    }
                    None => warn!("Unknown command: {}", line.trim()),
                }
            }
        })
        .context("Failed to start stdin reader")?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let own_id = manager.window_id().cloned();
    let print_list = |placements: &[ScenePlacement]| {
        for placement in placements {
            let own = own_id.as_ref() == Some(&placement.id);
            println!(
                "{}{} center=({:.0}, {:.0}) size={:.0} hue={:.2}",
                if own { "* " } else { "  " },
                placement.id,
                placement.center.0,
                placement.center.1,
                placement.size,
                placement.hue
            );
        }
    };

    driver::run(&mut manager, config.sync.refresh_interval(), rx, shutdown, print_list).await;

    manager.host().withdraw();
    info!("multiwin stopped");
    Ok(())
}
