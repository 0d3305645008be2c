//! Configuration management for multiwin windows.
//!
//! Configuration is loaded from TOML files in the following locations (in order):
//! 1. `<config dir>/multiwin/config.toml` (platform standard, via `directories`)
//! 2. `~/.config/multiwin/config.toml`
//! 3. `./config.toml` (current directory, for development)

use crate::manager::LivenessPolicy;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use multiwin_core::{Background, DisplayConfig, ShapeKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MIN_INTERVAL_MS: u64 = 16;
const MAX_INTERVAL_MS: u64 = 60_000;

/// Main configuration structure for a multiwin window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Refresh loop and membership settings.
    pub sync: SyncConfig,
    /// Geometry of this window and the windows it opens.
    pub window: WindowConfig,
    /// Where the shared store lives.
    pub storage: StorageConfig,
    /// Built-in defaults for the shared display configuration.
    pub display: DisplayDefaults,
    /// Process behavior.
    pub behavior: BehaviorConfig,
}

/// Refresh loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Interval between refreshes in milliseconds.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,

    /// Delay before the first shape sample in milliseconds.
    /// Hosts report bogus positions for a short while after a window opens.
    #[serde(default = "default_startup_delay")]
    pub startup_delay_ms: u64,

    /// How closed windows are detected.
    #[serde(default)]
    pub liveness: LivenessConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval(),
            startup_delay_ms: default_startup_delay(),
            liveness: LivenessConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }
}

/// Liveness mode (wrapper for serialization).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LivenessConfig {
    /// Prune windows the host confirms are closed.
    #[default]
    Host,
    /// Never prune. Closed windows linger until a reset.
    Disabled,
}

impl From<LivenessConfig> for LivenessPolicy {
    fn from(config: LivenessConfig) -> Self {
        match config {
            LivenessConfig::Host => LivenessPolicy::Host,
            LivenessConfig::Disabled => LivenessPolicy::Disabled,
        }
    }
}

/// Window geometry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Horizontal offset of a newly opened window from its opener.
    #[serde(default = "default_offset")]
    pub new_window_offset_x: i32,

    /// Vertical offset of a newly opened window from its opener.
    #[serde(default = "default_offset")]
    pub new_window_offset_y: i32,

    /// Width used when none is given on the command line.
    #[serde(default = "default_width")]
    pub default_width: i32,

    /// Height used when none is given on the command line.
    #[serde(default = "default_height")]
    pub default_height: i32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            new_window_offset_x: default_offset(),
            new_window_offset_y: default_offset(),
            default_width: default_width(),
            default_height: default_height(),
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory. Defaults to the platform data dir.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Defaults for the shared display configuration, used until a window writes one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayDefaults {
    #[serde(default)]
    pub shape: ShapeKind,

    #[serde(default = "default_true")]
    pub wireframe: bool,

    #[serde(default = "default_rotation_speed")]
    pub rotation_speed: f64,

    #[serde(default)]
    pub background: Background,
}

impl Default for DisplayDefaults {
    fn default() -> Self {
        Self {
            shape: ShapeKind::default(),
            wireframe: true,
            rotation_speed: default_rotation_speed(),
            background: Background::default(),
        }
    }
}

impl DisplayDefaults {
    pub fn to_display_config(&self) -> DisplayConfig {
        DisplayConfig {
            shape: self.shape,
            wireframe: self.wireframe,
            rotation_speed: self.rotation_speed,
            background: self.background,
            ..Default::default()
        }
    }
}

/// Behavior-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions for serde
fn default_refresh_interval() -> u64 {
    250
}

fn default_startup_delay() -> u64 {
    500
}

fn default_offset() -> i32 {
    50
}

fn default_width() -> i32 {
    800
}

fn default_height() -> i32 {
    600
}

fn default_true() -> bool {
    true
}

fn default_rotation_speed() -> f64 {
    1.0
}

fn default_log_level() -> String {
    "info".to_string()
}

/// A value that was out of range and has been corrected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub field: &'static str,
    pub message: String,
}

impl ConfigWarning {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

fn clamp_interval(field: &'static str, value: &mut u64, warnings: &mut Vec<ConfigWarning>) {
    let clamped = (*value).clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS);
    if clamped != *value {
        warnings.push(ConfigWarning::new(
            field,
            format!("{} ms out of range, using {} ms", value, clamped),
        ));
        *value = clamped;
    }
}

impl Config {
    /// Load configuration from standard locations.
    ///
    /// Returns default config if no file is found.
    pub fn load() -> Result<Self> {
        let paths = config_paths();

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Clamp out-of-range values in place and report what was changed.
    pub fn validate(&mut self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        clamp_interval("sync.refresh_interval_ms", &mut self.sync.refresh_interval_ms, &mut warnings);

        if self.sync.startup_delay_ms > MAX_INTERVAL_MS {
            warnings.push(ConfigWarning::new(
                "sync.startup_delay_ms",
                format!("{} ms is too long, using {} ms", self.sync.startup_delay_ms, MAX_INTERVAL_MS),
            ));
            self.sync.startup_delay_ms = MAX_INTERVAL_MS;
        }

        let speed = self.display.rotation_speed;
        if !DisplayConfig::is_valid_rotation_speed(speed) {
            let fixed = if speed.is_finite() {
                speed.clamp(0.0, DisplayConfig::MAX_ROTATION_SPEED)
            } else {
                default_rotation_speed()
            };
            warnings.push(ConfigWarning::new(
                "display.rotation_speed",
                format!("{} out of range, using {}", speed, fixed),
            ));
            self.display.rotation_speed = fixed;
        }

        if self.window.default_width <= 0 {
            warnings.push(ConfigWarning::new("window.default_width", "must be positive"));
            self.window.default_width = default_width();
        }
        if self.window.default_height <= 0 {
            warnings.push(ConfigWarning::new("window.default_height", "must be positive"));
            self.window.default_height = default_height();
        }

        warnings
    }
}

/// Get all possible config file paths in priority order.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(proj_dirs) = ProjectDirs::from("com", "multiwin", "multiwin") {
        paths.push(proj_dirs.config_dir().join("config.toml"));
    }

    if let Some(home) = dirs_home() {
        paths.push(home.join(".config").join("multiwin").join("config.toml"));
    }

    paths.push(PathBuf::from("config.toml"));

    paths
}

/// Get the user's home directory.
fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}
