//! Layout of the multiwin data directory.
//!
//! ```text
//! <data_dir>/store/      shared registry (FileStore)
//! <data_dir>/sessions/   per-session identity
//! <data_dir>/presence/   one file per running window process
//! <data_dir>/geometry/   shape overrides written by multiwin-ctl
//! ```

use multiwin_core::WindowId;
use std::path::{Path, PathBuf};

pub fn store_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("store")
}

pub fn sessions_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("sessions")
}

pub fn presence_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("presence")
}

pub fn geometry_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("geometry")
}

pub fn presence_file(data_dir: &Path, id: &WindowId) -> PathBuf {
    presence_dir(data_dir).join(format!("{}.json", id))
}

pub fn geometry_file(data_dir: &Path, id: &WindowId) -> PathBuf {
    geometry_dir(data_dir).join(format!("{}.json", id))
}
