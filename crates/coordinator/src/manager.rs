//! The window manager: one instance per window.
//!
//! The manager owns this window's record in the shared registry and keeps a
//! live view of every other window. All of its work is read-merge-write:
//! 1. Read the whole snapshot
//! 2. Upsert our own record, prune windows the host confirms are closed
//! 3. Write the snapshot back
//! 4. Diff the result against the previous view and fire callbacks
//!
//! Notifications only tell the manager *that* something changed. It always
//! re-reads the registry instead of trusting a payload, so duplicate or missed
//! notifications heal on the next refresh.

use multiwin_core::{
    view_changed, DisplayConfig, Liveness, Metadata, Rect, RegistrySnapshot, Upsert, WindowId,
    WindowRecord,
};
use multiwin_host::{HostError, IdentityStore, SessionStorage, ShapeProbe, WindowHost};
use multiwin_registry::{ChangeReceiver, Registry, SharedStore};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Called with this window's shape whenever it changes.
pub type ShapeCallback = Box<dyn FnMut(&Rect) + Send>;
/// Called with the live window list whenever it changes.
pub type WindowsCallback = Box<dyn FnMut(&[WindowRecord]) + Send>;
/// Called with the shared configuration whenever it changes.
pub type ConfigCallback = Box<dyn FnMut(&DisplayConfig) + Send>;

/// Errors returned by window manager operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Window manager is not initialized")]
    NotInitialized,

    #[error("Window manager is already running as {0}")]
    AlreadyInitialized(WindowId),

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Whether a registry write reached the store.
///
/// A deferred write is not an error: the local view stays authoritative and
/// the next refresh writes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Persisted,
    Deferred,
}

/// How closed windows are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LivenessPolicy {
    /// Ask the host which windows are open and prune the rest.
    #[default]
    Host,
    /// Never prune.
    Disabled,
}

/// Tunables for a window manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerOptions {
    pub liveness: LivenessPolicy,
    /// Offset of a newly opened window from this one.
    pub new_window_offset: (i32, i32),
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            liveness: LivenessPolicy::Host,
            new_window_offset: (50, 50),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Uninitialized,
    Running { id: WindowId },
}

/// Coordinates one window with every other window of the origin.
pub struct WindowManager<S, H> {
    registry: Registry<S>,
    host: H,
    options: ManagerOptions,
    state: State,
    metadata: Metadata,
    /// Last sampled shape of this window.
    shape: Option<Rect>,
    /// Live view from the last read.
    windows: Vec<WindowRecord>,
    config: DisplayConfig,
    /// A local config edit whose write failed. Re-applied until a write lands.
    pending_config: Option<DisplayConfig>,
    changes: Option<ChangeReceiver>,
    on_shape_change: Option<ShapeCallback>,
    on_windows_change: Option<WindowsCallback>,
    on_config_change: Option<ConfigCallback>,
}

impl<S, H> WindowManager<S, H>
where
    S: SharedStore,
    H: ShapeProbe + WindowHost,
{
    pub fn new(registry: Registry<S>, host: H, options: ManagerOptions) -> Self {
        let config = registry.defaults().clone();
        Self {
            registry,
            host,
            options,
            state: State::Uninitialized,
            metadata: Metadata::new(),
            shape: None,
            windows: Vec::new(),
            config,
            pending_config: None,
            changes: None,
            on_shape_change: None,
            on_windows_change: None,
            on_config_change: None,
        }
    }

    pub fn set_win_shape_change_callback(&mut self, callback: impl FnMut(&Rect) + Send + 'static) {
        self.on_shape_change = Some(Box::new(callback));
    }

    pub fn set_win_change_callback(
        &mut self,
        callback: impl FnMut(&[WindowRecord]) + Send + 'static,
    ) {
        self.on_windows_change = Some(Box::new(callback));
    }

    pub fn set_config_change_callback(
        &mut self,
        callback: impl FnMut(&DisplayConfig) + Send + 'static,
    ) {
        self.on_config_change = Some(Box::new(callback));
    }

    /// Join the registry.
    ///
    /// Registers this window (or updates its record after a reload), writes the
    /// snapshot and subscribes to other windows' writes.
    pub fn init<I: SessionStorage>(
        &mut self,
        identity: &IdentityStore<I>,
        metadata: Metadata,
    ) -> Result<WriteOutcome, CoordinatorError> {
        if let State::Running { id } = &self.state {
            return Err(CoordinatorError::AlreadyInitialized(id.clone()));
        }

        let id = identity.get_or_create_id();
        if let Err(e) = self.host.announce(&id) {
            warn!("Host did not accept window {}: {}", id, e);
        }
        self.metadata = metadata;
        let shape = self.sample_shape();

        // Subscribe first so no write between our read and write goes unnoticed
        self.changes = Some(self.registry.subscribe());

        let mut snapshot = self.registry.read();
        let upsert = snapshot.upsert(&id, shape, Some(&self.metadata));
        info!(
            "Window {} {} at ({}, {}) {}x{}, {} window(s) known",
            id,
            if upsert == Upsert::Inserted { "registered" } else { "rejoined" },
            shape.x,
            shape.y,
            shape.width,
            shape.height,
            snapshot.windows.len()
        );

        self.state = State::Running { id };
        let outcome = self.persist(&snapshot);
        self.apply(snapshot);
        Ok(outcome)
    }

    /// One tick of the refresh loop.
    pub fn refresh(&mut self) {
        let Some(id) = self.window_id().cloned() else {
            debug!("Refresh skipped: not initialized");
            return;
        };

        let shape = self.sample_shape();
        let mut snapshot = self.registry.read();
        snapshot.upsert(&id, shape, Some(&self.metadata));
        self.prune(&mut snapshot, &id);
        self.restore_pending_config(&mut snapshot);
        self.persist(&snapshot);
        self.apply(snapshot);
    }

    /// React to another window's write.
    ///
    /// Writes back only when something of ours changed: our record vanished
    /// (a reset), a closed window had to be pruned, or a config edit is still
    /// waiting to be written.
    pub fn handle_external_change(&mut self) {
        let Some(id) = self.window_id().cloned() else {
            return;
        };

        let mut snapshot = self.registry.read();
        let mut dirty = false;

        if !snapshot.contains(&id) {
            let shape = self.shape.unwrap_or_else(|| self.host.shape());
            snapshot.upsert(&id, shape, Some(&self.metadata));
            info!("Window {} missing from registry, re-registering", id);
            dirty = true;
        }
        if !self.prune(&mut snapshot, &id).is_empty() {
            dirty = true;
        }
        if self.restore_pending_config(&mut snapshot) {
            dirty = true;
        }

        if dirty {
            self.persist(&snapshot);
        }
        self.apply(snapshot);
    }

    /// Handle every pending notification with a single re-read.
    ///
    /// Returns whether there was anything pending.
    pub fn drain_external_changes(&mut self) -> bool {
        let Some(changes) = self.changes.as_mut() else {
            return false;
        };
        let mut pending = false;
        while changes.try_recv().is_ok() {
            pending = true;
        }
        if pending {
            self.handle_external_change();
        }
        pending
    }

    /// Hand the notification receiver to an event loop.
    pub fn take_changes(&mut self) -> Option<ChangeReceiver> {
        self.changes.take()
    }

    /// The live view from the last refresh. No I/O.
    pub fn get_windows(&self) -> &[WindowRecord] {
        &self.windows
    }

    /// The shared configuration from the last read. No I/O.
    pub fn get_config(&self) -> &DisplayConfig {
        &self.config
    }

    /// Replace the shared configuration.
    ///
    /// The latest snapshot is read first so concurrent window-list edits
    /// survive. The config-changed callback fires before this returns.
    pub fn update_config(&mut self, config: DisplayConfig) -> Result<WriteOutcome, CoordinatorError> {
        self.modify_config(move |current| *current = config)
    }

    /// Edit the latest shared configuration in place.
    pub fn modify_config(
        &mut self,
        edit: impl FnOnce(&mut DisplayConfig),
    ) -> Result<WriteOutcome, CoordinatorError> {
        let id = self.running_id()?.clone();

        let mut snapshot = self.registry.read();
        // An earlier edit that never reached the store is still the latest
        if let Some(pending) = self.pending_config.take() {
            snapshot.config = pending;
        }
        edit(&mut snapshot.config);
        if !snapshot.contains(&id) {
            let shape = self.shape.unwrap_or_else(|| self.host.shape());
            snapshot.upsert(&id, shape, Some(&self.metadata));
        }

        let outcome = self.persist(&snapshot);
        if outcome == WriteOutcome::Deferred {
            self.pending_config = Some(snapshot.config.clone());
        }
        self.apply(snapshot);
        Ok(outcome)
    }

    /// Ask the host for a new window next to this one. Returns its shape.
    ///
    /// The new window registers itself once it starts.
    pub fn open_new_window(&self) -> Result<Rect, CoordinatorError> {
        self.running_id()?;
        let base = self.shape.unwrap_or_else(|| self.host.shape());
        let (dx, dy) = self.options.new_window_offset;
        let shape = base.offset(dx, dy);
        self.host.open_window(shape)?;
        Ok(shape)
    }

    /// Clear the registry and register this window again.
    ///
    /// Every other open window sees the write, finds its record missing and
    /// re-registers, which leaves exactly the open windows behind.
    pub fn reset_all_windows(&mut self) -> Result<WriteOutcome, CoordinatorError> {
        let id = self.running_id()?.clone();

        if let Err(e) = self.registry.reset() {
            warn!("Registry reset failed: {}", e);
            return Ok(WriteOutcome::Deferred);
        }
        info!("Registry reset by window {}", id);
        self.pending_config = None;

        let shape = self.sample_shape();
        let mut snapshot = self.registry.empty_snapshot();
        snapshot.upsert(&id, shape, Some(&self.metadata));
        let outcome = self.persist(&snapshot);
        self.apply(snapshot);
        Ok(outcome)
    }

    pub fn window_id(&self) -> Option<&WindowId> {
        match &self.state {
            State::Running { id } => Some(id),
            State::Uninitialized => None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.window_id().is_some()
    }

    /// Last sampled shape of this window.
    pub fn shape(&self) -> Option<Rect> {
        self.shape
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn registry(&self) -> &Registry<S> {
        &self.registry
    }

    fn running_id(&self) -> Result<&WindowId, CoordinatorError> {
        self.window_id().ok_or(CoordinatorError::NotInitialized)
    }

    /// Ask the host for the shape. A degenerate answer keeps the previous shape.
    fn sample_shape(&mut self) -> Rect {
        let sampled = self.host.shape();
        if sampled.is_degenerate() {
            if let Some(previous) = self.shape {
                debug!("Ignoring degenerate shape {:?}", sampled);
                return previous;
            }
        }
        if self.shape != Some(sampled) {
            self.shape = Some(sampled);
            if let Some(callback) = self.on_shape_change.as_mut() {
                callback(&sampled);
            }
        }
        sampled
    }

    fn prune(&self, snapshot: &mut RegistrySnapshot, id: &WindowId) -> Vec<WindowId> {
        let liveness = match self.options.liveness {
            LivenessPolicy::Host => self.host.live_windows(),
            LivenessPolicy::Disabled => Liveness::Unknown,
        };
        let removed = snapshot.prune(&liveness, id);
        if !removed.is_empty() {
            let names: Vec<&str> = removed.iter().map(WindowId::as_str).collect();
            info!("Pruned closed window(s): {}", names.join(", "));
        }
        removed
    }

    /// Put a deferred config edit back into a freshly read snapshot.
    /// Returns whether there was one.
    fn restore_pending_config(&self, snapshot: &mut RegistrySnapshot) -> bool {
        match &self.pending_config {
            Some(pending) => {
                snapshot.config = pending.clone();
                true
            }
            None => false,
        }
    }

    fn persist(&mut self, snapshot: &RegistrySnapshot) -> WriteOutcome {
        match self.registry.write(snapshot) {
            Ok(()) => {
                if self.pending_config.as_ref() == Some(&snapshot.config) {
                    debug!("Deferred config edit written");
                    self.pending_config = None;
                }
                WriteOutcome::Persisted
            }
            Err(e) => {
                warn!("Registry write failed, keeping local view: {}", e);
                WriteOutcome::Deferred
            }
        }
    }

    /// Adopt a freshly merged snapshot as the local view.
    fn apply(&mut self, snapshot: RegistrySnapshot) {
        let RegistrySnapshot { windows, config } = snapshot;

        if config != self.config {
            info!(
                "Display config: shape={} wireframe={} rotation_speed={} background={}",
                config.shape, config.wireframe, config.rotation_speed, config.background
            );
            self.config = config;
            if let Some(callback) = self.on_config_change.as_mut() {
                callback(&self.config);
            }
        }

        let changed = view_changed(&self.windows, &windows);
        if changed && windows.len() != self.windows.len() {
            info!("{} window(s) open", windows.len());
        }
        self.windows = windows;
        if changed {
            debug!(
                "Live windows: [{}]",
                self.windows
                    .iter()
                    .map(|w| w.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            if let Some(callback) = self.on_windows_change.as_mut() {
                callback(&self.windows);
            }
        }
    }
}
