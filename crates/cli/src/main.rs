//! multiwin CLI
//!
//! Command-line interface for the shared multiwin registry.
//!
//! Works directly on the data directory the windows share: edits made here
//! reach running windows through the same change notifications their own
//! writes use.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use multiwin_core::{scene, Background, DisplayConfig, Rect, RegistrySnapshot, ShapeKind, WindowId};
use multiwin_host::process::{write_geometry, ProcessHost};
use multiwin_host::{paths, WindowHost};
use multiwin_registry::{default_data_dir, FileStore, Registry, SharedStore};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "multiwin-ctl")]
#[command(author, version, about = "Inspect and steer multiwin windows")]
struct Cli {
    /// Data directory shared by all windows
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered windows
    List {
        /// Print the raw registry as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or change the shared display configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Clear the registry; open windows register again
    Reset,
    /// Move or resize a window
    Move {
        /// Window id as shown by `list`
        id: String,
        #[arg(long, allow_negative_numbers = true)]
        x: i32,
        #[arg(long, allow_negative_numbers = true)]
        y: i32,
        /// New width (default: unchanged)
        #[arg(long)]
        width: Option<i32>,
        /// New height (default: unchanged)
        #[arg(long)]
        height: Option<i32>,
    },
    /// Open a new window
    Open {
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        x: i32,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        y: i32,
        #[arg(long, default_value_t = 800)]
        width: i32,
        #[arg(long, default_value_t = 600)]
        height: i32,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current configuration
    Show,
    /// Change one or more options
    Set {
        #[arg(long)]
        shape: Option<ShapeKind>,
        #[arg(long)]
        wireframe: Option<bool>,
        #[arg(long)]
        rotation_speed: Option<f64>,
        #[arg(long)]
        background: Option<Background>,
    },
}

/// Options to change with `config set`.
#[derive(Debug, Default, Clone, PartialEq)]
struct ConfigEdit {
    shape: Option<ShapeKind>,
    wireframe: Option<bool>,
    rotation_speed: Option<f64>,
    background: Option<Background>,
}

impl ConfigEdit {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn apply(&self, config: &mut DisplayConfig) {
        if let Some(shape) = self.shape {
            config.shape = shape;
        }
        if let Some(wireframe) = self.wireframe {
            config.wireframe = wireframe;
        }
        if let Some(speed) = self.rotation_speed {
            config.rotation_speed = speed;
        }
        if let Some(background) = self.background {
            config.background = background;
        }
    }
}

fn format_windows(snapshot: &RegistrySnapshot) -> String {
    if snapshot.windows.is_empty() {
        return "No windows registered.".to_string();
    }
    let mut out = String::new();
    for (record, placement) in snapshot.windows.iter().zip(scene::placements(&snapshot.windows)) {
        let s = record.shape;
        out.push_str(&format!(
            "{}  {}x{} at ({}, {})  hue={:.2} size={:.0}\n",
            record.id, s.width, s.height, s.x, s.y, placement.hue, placement.size
        ));
    }
    out
}

fn format_config(config: &DisplayConfig) -> String {
    format!(
        "shape:          {}\nwireframe:      {}\nrotation_speed: {}\nbackground:     {}",
        config.shape, config.wireframe, config.rotation_speed, config.background
    )
}

/// Read the latest snapshot, edit its config and write it back.
fn set_config<S: SharedStore>(registry: &Registry<S>, edit: &ConfigEdit) -> Result<DisplayConfig> {
    if edit.is_empty() {
        bail!("Nothing to set; pass at least one option");
    }
    if let Some(speed) = edit.rotation_speed {
        if !DisplayConfig::is_valid_rotation_speed(speed) {
            bail!(
                "Rotation speed must be between 0 and {}",
                DisplayConfig::MAX_ROTATION_SPEED
            );
        }
    }
    let mut snapshot = registry.read();
    edit.apply(&mut snapshot.config);
    registry.write(&snapshot).context("Failed to write registry")?;
    Ok(snapshot.config)
}

/// Shape a window should take after a move, keeping its size unless given.
fn moved_shape<S: SharedStore>(
    registry: &Registry<S>,
    id: &WindowId,
    x: i32,
    y: i32,
    width: Option<i32>,
    height: Option<i32>,
) -> Result<Rect> {
    let snapshot = registry.read();
    let Some(record) = snapshot.find(id) else {
        bail!("No window with id {}", id);
    };
    let shape = Rect::new(
        x,
        y,
        width.unwrap_or(record.shape.width),
        height.unwrap_or(record.shape.height),
    );
    if shape.is_degenerate() {
        bail!("Width and height must be positive");
    }
    Ok(shape)
}

/// The window binary installed next to this one.
fn window_program() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate own executable")?;
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join(format!("multiwin{}", std::env::consts::EXE_SUFFIX)))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let store = FileStore::open(paths::store_dir(&data_dir)).context("Failed to open shared store")?;
    let registry = Registry::new(store, DisplayConfig::default());

    match cli.command {
        Commands::List { json } => {
            let snapshot = registry.read();
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print!("{}", format_windows(&snapshot));
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("{}", format_config(&registry.read().config));
            }
            ConfigAction::Set {
                shape,
                wireframe,
                rotation_speed,
                background,
            } => {
                let edit = ConfigEdit {
                    shape,
                    wireframe,
                    rotation_speed,
                    background,
                };
                let config = set_config(&registry, &edit)?;
                println!("{}", format_config(&config));
            }
        },
        Commands::Reset => {
            registry.reset().context("Failed to reset registry")?;
            println!("Registry cleared. Open windows will register again.");
        }
        Commands::Move {
            id,
            x,
            y,
            width,
            height,
        } => {
            let id = WindowId::new(id);
            let shape = moved_shape(&registry, &id, x, y, width, height)?;
            write_geometry(&data_dir, &id, shape)?;
            println!(
                "Moved {} to ({}, {}) {}x{}",
                id, shape.x, shape.y, shape.width, shape.height
            );
        }
        Commands::Open {
            x,
            y,
            width,
            height,
        } => {
            let shape = Rect::new(x, y, width, height);
            if shape.is_degenerate() {
                bail!("Width and height must be positive");
            }
            let host = ProcessHost::new(&data_dir, shape).with_program(
                window_program()?,
                vec!["--data-dir".to_string(), data_dir.display().to_string()],
            );
            host.open_window(shape)?;
            println!("Opened window at ({}, {}) {}x{}", x, y, width, height);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiwin_core::Metadata;
    use multiwin_registry::{MemoryOrigin, MemoryStore};

    fn registry_with(ids: &[&str]) -> Registry<MemoryStore> {
        let registry = Registry::new(MemoryOrigin::new().context(), DisplayConfig::default());
        let mut snapshot = registry.empty_snapshot();
        for (i, id) in ids.iter().enumerate() {
            snapshot.upsert(
                &WindowId::new(*id),
                Rect::new(i as i32 * 100, 0, 100, 80),
                Some(&Metadata::new()),
            );
        }
        registry.write(&snapshot).unwrap();
        registry
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "multiwin-ctl",
            "config",
            "set",
            "--shape",
            "torus",
            "--background",
            "stars",
        ])
        .unwrap();
        match cli.command {
            Commands::Config {
                action: ConfigAction::Set { shape, background, wireframe, .. },
            } => {
                assert_eq!(shape, Some(ShapeKind::Torus));
                assert_eq!(background, Some(Background::Stars));
                assert_eq!(wireframe, None);
            }
            _ => panic!("Expected config set"),
        }

        assert!(Cli::try_parse_from(["multiwin-ctl", "config", "set", "--shape", "hexagon"]).is_err());
        assert!(Cli::try_parse_from(["multiwin-ctl", "move", "w1", "--x", "-20", "--y", "5"]).is_ok());
    }

    #[test]
    fn test_set_config_keeps_windows() {
        let registry = registry_with(&["a", "b"]);
        let edit = ConfigEdit {
            rotation_speed: Some(2.5),
            wireframe: Some(false),
            ..Default::default()
        };

        let config = set_config(&registry, &edit).unwrap();

        assert_eq!(config.rotation_speed, 2.5);
        assert!(!config.wireframe);
        let stored = registry.read();
        assert_eq!(stored.config, config);
        assert_eq!(stored.ids(), vec![WindowId::new("a"), WindowId::new("b")]);
    }

    #[test]
    fn test_set_config_rejects_empty_edit() {
        let registry = registry_with(&[]);
        assert!(set_config(&registry, &ConfigEdit::default()).is_err());
    }

    #[test]
    fn test_set_config_rejects_out_of_range_speed() {
        let registry = registry_with(&["a"]);
        for speed in [-1.0, 11.0, f64::INFINITY] {
            let edit = ConfigEdit {
                rotation_speed: Some(speed),
                ..Default::default()
            };
            assert!(set_config(&registry, &edit).is_err());
        }
        assert_eq!(registry.read().config.rotation_speed, 1.0);
    }

    #[test]
    fn test_moved_shape_keeps_size() {
        let registry = registry_with(&["a"]);
        let shape = moved_shape(&registry, &WindowId::new("a"), 30, 40, None, Some(200)).unwrap();
        assert_eq!(shape, Rect::new(30, 40, 100, 200));
    }

    #[test]
    fn test_moved_shape_unknown_window() {
        let registry = registry_with(&["a"]);
        assert!(moved_shape(&registry, &WindowId::new("zz"), 0, 0, None, None).is_err());
        assert!(moved_shape(&registry, &WindowId::new("a"), 0, 0, Some(0), None).is_err());
    }

    #[test]
    fn test_format_windows() {
        assert_eq!(format_windows(&registry_with(&[]).read()), "No windows registered.");
        let listing = format_windows(&registry_with(&["a", "b"]).read());
        let lines: Vec<_> = listing.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("a  100x80 at (0, 0)"));
        assert!(lines[1].starts_with("b  100x80 at (100, 0)"));
    }

    #[test]
    fn test_config_commands_on_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new(FileStore::open(dir.path()).unwrap(), DisplayConfig::default());
        let edit = ConfigEdit {
            shape: Some(ShapeKind::Cone),
            ..Default::default()
        };
        set_config(&registry, &edit).unwrap();

        let reopened = Registry::new(FileStore::open(dir.path()).unwrap(), DisplayConfig::default());
        assert_eq!(reopened.read().config.shape, ShapeKind::Cone);
    }
}
