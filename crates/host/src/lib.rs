//! multiwin Host
//!
//! Everything that talks to the environment a window lives in.
//!
//! This crate handles:
//! - Reading the window's current screen shape ([`ShapeProbe`])
//! - Opening new windows of the same origin and enumerating open ones ([`WindowHost`])
//! - Binding a stable id to a window session ([`identity`])
//!
//! Two hosts are provided: [`process::ProcessHost`] runs each window as an OS
//! process, and [`sim::Desktop`] simulates a set of windows in memory.

pub mod identity;
pub mod paths;
pub mod process;
pub mod sim;

pub use identity::{
    FileSessionStorage, IdentityStore, MemorySessionStorage, SessionStorage, WINDOW_ID_KEY,
};

use multiwin_core::{Liveness, Rect, WindowId};
use thiserror::Error;

/// Errors that can occur during host operations.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Failed to open window: {0}")]
    Spawn(String),

    #[error("Host I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode host state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Reads the hosting window's position and size.
///
/// Called fresh on every refresh: the user or the OS may move a window at any
/// time without telling the application.
pub trait ShapeProbe {
    fn shape(&self) -> Rect;
}

/// Window-level services of the host environment.
pub trait WindowHost {
    /// Open a new window of the same origin at the given shape.
    fn open_window(&self, shape: Rect) -> Result<(), HostError>;

    /// Tell the host which id the current window goes by, so that enumeration
    /// can report it.
    fn announce(&self, id: &WindowId) -> Result<(), HostError>;

    /// Enumerate the windows of this origin that are still open.
    fn live_windows(&self) -> Liveness;
}

impl<T: ShapeProbe + ?Sized> ShapeProbe for &T {
    fn shape(&self) -> Rect {
        (**self).shape()
    }
}

impl<T: WindowHost + ?Sized> WindowHost for &T {
    fn open_window(&self, shape: Rect) -> Result<(), HostError> {
        (**self).open_window(shape)
    }

    fn announce(&self, id: &WindowId) -> Result<(), HostError> {
        (**self).announce(id)
    }

    fn live_windows(&self) -> Liveness {
        (**self).live_windows()
    }
}
