//! Host for windows that run as OS processes on one machine.
//!
//! - Presence: each running window writes `presence/<id>.json` with its pid.
//!   Enumeration reads that directory and keeps the entries whose process is
//!   still running. Liveness is checked with `kill(pid, 0)`, so enumeration is
//!   only available on unix; elsewhere it reports [`Liveness::Unknown`].
//! - Shape: `geometry/<id>.json` overrides the launch geometry when present.
//! - New windows: the current executable is spawned again with the new
//!   geometry and no session, so the child gets its own id. The host keeps
//!   the children it spawned and reaps the ones that exited before each
//!   enumeration; an unreaped child still answers `kill(pid, 0)`.

use crate::{paths, HostError, ShapeProbe, WindowHost};
use multiwin_core::{Liveness, Rect, WindowId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, OnceLock};
use tracing::{debug, info, warn};

/// Contents of a presence file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Presence {
    pid: u32,
}

/// Host for one window process.
#[derive(Debug)]
pub struct ProcessHost {
    data_dir: PathBuf,
    launch_shape: Rect,
    program: PathBuf,
    args: Vec<String>,
    window_id: OnceLock<WindowId>,
    children: Mutex<Vec<Child>>,
}

impl ProcessHost {
    /// Host for a window launched at `launch_shape`, keeping state under `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>, launch_shape: Rect) -> Self {
        let program = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("multiwin"));
        Self {
            data_dir: data_dir.into(),
            launch_shape,
            program,
            args: Vec::new(),
            window_id: OnceLock::new(),
            children: Mutex::new(Vec::new()),
        }
    }

    /// Program and leading arguments used to open new windows.
    pub fn with_program(mut self, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        self.program = program.into();
        self.args = args;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Remove this window's presence file. Called on orderly shutdown; an
    /// abrupt exit leaves it for enumeration to clean up.
    pub fn withdraw(&self) {
        if let Some(id) = self.window_id.get() {
            let path = paths::presence_file(&self.data_dir, id);
            if let Err(e) = fs::remove_file(&path) {
                debug!("Failed to remove presence file {}: {}", path.display(), e);
            }
        }
    }

    /// Collect exit status of spawned windows that have finished.
    fn reap_children(&self) {
        let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
        children.retain_mut(|child| match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!("Window process {} exited with {}", child.id(), status);
                false
            }
            Err(e) => {
                warn!("Failed to check window process {}: {}", child.id(), e);
                false
            }
        });
    }

    fn read_geometry(&self, id: &WindowId) -> Option<Rect> {
        let json = fs::read_to_string(paths::geometry_file(&self.data_dir, id)).ok()?;
        match serde_json::from_str::<Rect>(&json) {
            Ok(rect) => Some(rect),
            Err(e) => {
                warn!("Ignoring malformed geometry for {}: {}", id, e);
                None
            }
        }
    }
}

/// Store a shape override for a window. Its process picks it up on its next refresh.
pub fn write_geometry(data_dir: &Path, id: &WindowId, shape: Rect) -> Result<(), HostError> {
    fs::create_dir_all(paths::geometry_dir(data_dir))?;
    fs::write(
        paths::geometry_file(data_dir, id),
        serde_json::to_string(&shape)?,
    )?;
    Ok(())
}

impl ShapeProbe for ProcessHost {
    fn shape(&self) -> Rect {
        self.window_id
            .get()
            .and_then(|id| self.read_geometry(id))
            .unwrap_or(self.launch_shape)
    }
}

impl WindowHost for ProcessHost {
    fn open_window(&self, shape: Rect) -> Result<(), HostError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .args([
                "--x".to_string(),
                shape.x.to_string(),
                "--y".to_string(),
                shape.y.to_string(),
                "--width".to_string(),
                shape.width.to_string(),
                "--height".to_string(),
                shape.height.to_string(),
            ])
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| HostError::Spawn(format!("{}: {}", self.program.display(), e)))?;
        info!("Opened window process {} at ({}, {})", child.id(), shape.x, shape.y);
        self.children
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(child);
        Ok(())
    }

    fn announce(&self, id: &WindowId) -> Result<(), HostError> {
        let _ = self.window_id.set(id.clone());
        fs::create_dir_all(paths::presence_dir(&self.data_dir))?;
        let presence = Presence {
            pid: std::process::id(),
        };
        fs::write(
            paths::presence_file(&self.data_dir, id),
            serde_json::to_string(&presence)?,
        )?;
        Ok(())
    }

    fn live_windows(&self) -> Liveness {
        if !cfg!(unix) {
            return Liveness::Unknown;
        }
        self.reap_children();

        let dir = paths::presence_dir(&self.data_dir);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                // Without a readable presence dir nothing can be confirmed gone.
                debug!("Cannot enumerate {}: {}", dir.display(), e);
                return Liveness::Unknown;
            }
        };

        let mut open = HashSet::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let id = WindowId::new(stem);
            let presence = fs::read_to_string(&path)
                .ok()
                .and_then(|json| serde_json::from_str::<Presence>(&json).ok());
            match presence {
                Some(p) if pid_alive(p.pid) => {
                    open.insert(id);
                }
                Some(p) => {
                    debug!("Window {} (pid {}) has exited", id, p.pid);
                    let _ = fs::remove_file(&path);
                }
                // Being written right now; treat as open
                None => {
                    open.insert(id);
                }
            }
        }
        if let Some(own) = self.window_id.get() {
            open.insert(own.clone());
        }
        Liveness::Confirmed(open)
    }
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        // Exists but belongs to someone else
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    true
}
