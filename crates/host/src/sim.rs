//! A simulated desktop of same-origin windows.
//!
//! Each [`SimWindow`] is one window (a browser tab, say) with a session that
//! survives reloads. The desktop answers shape queries from its own record of
//! window geometry and enumerates the windows that are still open.

use crate::{HostError, MemorySessionStorage, ShapeProbe, WindowHost};
use multiwin_core::{Liveness, Rect, WindowId};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

type TabId = u64;

#[derive(Debug)]
struct Tab {
    shape: Rect,
    window_id: Option<WindowId>,
    open: bool,
    session: MemorySessionStorage,
}

#[derive(Debug)]
struct DesktopState {
    tabs: BTreeMap<TabId, Tab>,
    next_tab: TabId,
    enumeration: bool,
    open_requests: Vec<Rect>,
}

impl Default for DesktopState {
    fn default() -> Self {
        Self {
            tabs: BTreeMap::new(),
            next_tab: 0,
            enumeration: true,
            open_requests: Vec::new(),
        }
    }
}

/// Shared state of all simulated windows.
#[derive(Debug, Clone, Default)]
pub struct Desktop {
    inner: Arc<Mutex<DesktopState>>,
}

impl Desktop {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DesktopState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a window with a fresh session.
    pub fn open(&self, shape: Rect) -> SimWindow {
        let mut state = self.lock();
        let tab = state.next_tab;
        state.next_tab += 1;
        state.tabs.insert(
            tab,
            Tab {
                shape,
                window_id: None,
                open: true,
                session: MemorySessionStorage::new(),
            },
        );
        SimWindow {
            desktop: self.clone(),
            tab,
        }
    }

    /// Close a window. It disappears from enumeration immediately.
    pub fn close(&self, window: &SimWindow) {
        if let Some(tab) = self.lock().tabs.get_mut(&window.tab) {
            tab.open = false;
        }
    }

    /// Move or resize a window.
    pub fn move_to(&self, window: &SimWindow, shape: Rect) {
        if let Some(tab) = self.lock().tabs.get_mut(&window.tab) {
            tab.shape = shape;
        }
    }

    /// Turn window enumeration on or off. While off, liveness is unknown.
    pub fn set_enumeration(&self, enabled: bool) {
        self.lock().enumeration = enabled;
    }

    /// Shapes requested through [`WindowHost::open_window`] since the last call.
    pub fn take_open_requests(&self) -> Vec<Rect> {
        std::mem::take(&mut self.lock().open_requests)
    }
}

/// Handle to one simulated window.
#[derive(Debug, Clone)]
pub struct SimWindow {
    desktop: Desktop,
    tab: TabId,
}

impl SimWindow {
    /// The window's session storage. Shared across reloads of this window.
    pub fn session(&self) -> MemorySessionStorage {
        self.desktop
            .lock()
            .tabs
            .get(&self.tab)
            .map(|t| t.session.clone())
            .unwrap_or_default()
    }

    pub fn is_open(&self) -> bool {
        self.desktop
            .lock()
            .tabs
            .get(&self.tab)
            .is_some_and(|t| t.open)
    }
}

impl ShapeProbe for SimWindow {
    fn shape(&self) -> Rect {
        self.desktop
            .lock()
            .tabs
            .get(&self.tab)
            .map(|t| t.shape)
            .unwrap_or_default()
    }
}

impl WindowHost for SimWindow {
    fn open_window(&self, shape: Rect) -> Result<(), HostError> {
        self.desktop.lock().open_requests.push(shape);
        Ok(())
    }

    fn announce(&self, id: &WindowId) -> Result<(), HostError> {
        if let Some(tab) = self.desktop.lock().tabs.get_mut(&self.tab) {
            tab.window_id = Some(id.clone());
        }
        Ok(())
    }

    fn live_windows(&self) -> Liveness {
        let state = self.desktop.lock();
        if !state.enumeration {
            return Liveness::Unknown;
        }
        Liveness::Confirmed(
            state
                .tabs
                .values()
                .filter(|t| t.open)
                .filter_map(|t| t.window_id.clone())
                .collect(),
        )
    }
}
