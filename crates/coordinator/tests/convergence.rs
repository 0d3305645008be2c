//! Several windows of one origin converging on the same registry.
//!
//! Each test drives the managers by hand, one operation at a time, the way a
//! single-threaded host would interleave them.

use multiwin_coordinator::{LivenessPolicy, ManagerOptions, WindowManager, WriteOutcome};
use multiwin_core::{Background, DisplayConfig, Metadata, Rect, ShapeKind, WindowId};
use multiwin_host::sim::{Desktop, SimWindow};
use multiwin_host::IdentityStore;
use multiwin_registry::{FileStore, MemoryOrigin, MemoryStore, Registry, SharedStore};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

type Manager = WindowManager<MemoryStore, SimWindow>;

struct Harness {
    origin: MemoryOrigin,
    desktop: Desktop,
}

impl Harness {
    fn new() -> Self {
        Self {
            origin: MemoryOrigin::new(),
            desktop: Desktop::new(),
        }
    }

    fn manager(&self, window: &SimWindow, options: ManagerOptions) -> Manager {
        WindowManager::new(
            Registry::new(self.origin.context(), DisplayConfig::default()),
            window.clone(),
            options,
        )
    }

    /// Open a window and initialize its manager.
    fn launch(&self, shape: Rect) -> (SimWindow, Manager) {
        let window = self.desktop.open(shape);
        let manager = self.relaunch(&window);
        (window, manager)
    }

    /// Start a manager for an existing window, as after a reload.
    fn relaunch(&self, window: &SimWindow) -> Manager {
        let mut manager = self.manager(window, ManagerOptions::default());
        manager
            .init(&IdentityStore::new(window.session()), Metadata::new())
            .unwrap();
        manager
    }

    fn stored(&self) -> Vec<WindowId> {
        Registry::new(self.origin.context(), DisplayConfig::default())
            .read()
            .ids()
    }
}

fn ids<S: SharedStore>(manager: &WindowManager<S, SimWindow>) -> Vec<WindowId> {
    manager.get_windows().iter().map(|w| w.id.clone()).collect()
}

fn own_id<S: SharedStore>(manager: &WindowManager<S, SimWindow>) -> WindowId {
    manager.window_id().unwrap().clone()
}

#[test]
fn test_windows_agree_on_open_order() {
    let h = Harness::new();
    let (_a, mut wm_a) = h.launch(Rect::new(0, 0, 400, 300));
    let (_b, mut wm_b) = h.launch(Rect::new(450, 0, 400, 300));
    let (_c, mut wm_c) = h.launch(Rect::new(900, 0, 400, 300));

    wm_a.refresh();
    wm_b.refresh();
    wm_c.refresh();

    let expected = vec![own_id(&wm_a), own_id(&wm_b), own_id(&wm_c)];
    assert_eq!(ids(&wm_a), expected);
    assert_eq!(ids(&wm_b), expected);
    assert_eq!(ids(&wm_c), expected);
    assert_eq!(h.stored(), expected);
}

#[test]
fn test_closed_window_is_pruned_everywhere() {
    let h = Harness::new();
    let (_a, mut wm_a) = h.launch(Rect::new(0, 0, 400, 300));
    let (b, wm_b) = h.launch(Rect::new(450, 0, 400, 300));
    let (_c, mut wm_c) = h.launch(Rect::new(900, 0, 400, 300));
    let id_b = own_id(&wm_b);

    h.desktop.close(&b);
    drop(wm_b);
    wm_a.refresh();

    assert_eq!(ids(&wm_a), vec![own_id(&wm_a), own_id(&wm_c)]);

    // The prune write reaches the other window as a notification
    assert!(wm_c.drain_external_changes());
    assert_eq!(ids(&wm_c), vec![own_id(&wm_a), own_id(&wm_c)]);
    assert!(!h.stored().contains(&id_b));
}

#[test]
fn test_config_change_reaches_other_windows() {
    let h = Harness::new();
    let (_a, mut wm_a) = h.launch(Rect::new(0, 0, 400, 300));
    let (_b, mut wm_b) = h.launch(Rect::new(450, 0, 400, 300));
    let (_c, mut wm_c) = h.launch(Rect::new(900, 0, 400, 300));
    wm_a.drain_external_changes();
    wm_b.drain_external_changes();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = Arc::clone(&seen);
    wm_c.set_config_change_callback(move |c| seen_cb.lock().unwrap().push(c.background));

    wm_a.modify_config(|c| c.background = Background::Stars).unwrap();

    assert!(wm_c.drain_external_changes());
    assert_eq!(*seen.lock().unwrap(), vec![Background::Stars]);
    assert_eq!(wm_c.get_config().background, Background::Stars);

    // A second drain with nothing new does not fire again
    assert!(!wm_c.drain_external_changes());
    assert_eq!(seen.lock().unwrap().len(), 1);

    wm_b.drain_external_changes();
    assert_eq!(wm_b.get_config().background, Background::Stars);
}

#[test]
fn test_last_config_write_wins() {
    let h = Harness::new();
    let (_a, mut wm_a) = h.launch(Rect::new(0, 0, 400, 300));
    let (_b, mut wm_b) = h.launch(Rect::new(450, 0, 400, 300));

    wm_a.modify_config(|c| c.rotation_speed = 2.0).unwrap();
    wm_b.modify_config(|c| c.rotation_speed = 3.0).unwrap();
    wm_a.drain_external_changes();

    assert_eq!(wm_a.get_config().rotation_speed, 3.0);
    assert_eq!(wm_b.get_config().rotation_speed, 3.0);
}

#[test]
fn test_config_update_keeps_window_list() {
    let h = Harness::new();
    let (_a, mut wm_a) = h.launch(Rect::new(0, 0, 400, 300));
    let (_b, wm_b) = h.launch(Rect::new(450, 0, 400, 300));

    // wm_a has not seen wm_b yet, but the update reads the latest snapshot
    let config = DisplayConfig {
        shape: ShapeKind::Cylinder,
        ..DisplayConfig::default()
    };
    wm_a.update_config(config).unwrap();

    assert_eq!(h.stored(), vec![own_id(&wm_a), own_id(&wm_b)]);
}

#[test]
fn test_reload_keeps_id_and_record() {
    let h = Harness::new();
    let (a, wm_a) = h.launch(Rect::new(0, 0, 400, 300));
    let (_b, _wm_b) = h.launch(Rect::new(450, 0, 400, 300));
    let before = own_id(&wm_a);
    drop(wm_a);

    h.desktop.move_to(&a, Rect::new(20, 20, 400, 300));
    let reloaded = h.relaunch(&a);

    assert_eq!(own_id(&reloaded), before);
    assert_eq!(h.stored().len(), 2);
    assert_eq!(
        reloaded.get_windows()[0].shape,
        Rect::new(20, 20, 400, 300)
    );
}

#[test]
fn test_reset_leaves_one_record_per_open_window() {
    let h = Harness::new();
    let (_a, mut wm_a) = h.launch(Rect::new(0, 0, 400, 300));
    let (_b, mut wm_b) = h.launch(Rect::new(450, 0, 400, 300));
    let (_c, mut wm_c) = h.launch(Rect::new(900, 0, 400, 300));

    assert_eq!(wm_a.reset_all_windows().unwrap(), WriteOutcome::Persisted);
    assert_eq!(h.stored(), vec![own_id(&wm_a)]);

    wm_b.drain_external_changes();
    wm_c.drain_external_changes();
    wm_a.drain_external_changes();

    let expected = vec![own_id(&wm_a), own_id(&wm_b), own_id(&wm_c)];
    assert_eq!(h.stored(), expected);
    assert_eq!(ids(&wm_a), expected);
    assert_eq!(ids(&wm_c), expected);
}

#[test]
fn test_reset_restores_default_config() {
    let h = Harness::new();
    let (_a, mut wm_a) = h.launch(Rect::new(0, 0, 400, 300));
    wm_a.modify_config(|c| c.wireframe = false).unwrap();

    wm_a.reset_all_windows().unwrap();

    assert_eq!(wm_a.get_config(), &DisplayConfig::default());
}

#[test]
fn test_storage_failure_is_not_fatal() {
    let h = Harness::new();
    let (_a, mut wm_a) = h.launch(Rect::new(0, 0, 400, 300));

    h.origin.set_available(false);
    let window = h.desktop.open(Rect::new(450, 0, 400, 300));
    let mut wm_b = h.manager(&window, ManagerOptions::default());
    let outcome = wm_b
        .init(&IdentityStore::new(window.session()), Metadata::new())
        .unwrap();
    assert_eq!(outcome, WriteOutcome::Deferred);
    assert_eq!(
        wm_b.modify_config(|c| c.shape = ShapeKind::Sphere).unwrap(),
        WriteOutcome::Deferred
    );
    assert!(wm_b.is_running());

    // The next refresh after recovery writes our record
    h.origin.set_available(true);
    wm_b.refresh();
    wm_a.drain_external_changes();
    assert_eq!(ids(&wm_a), vec![own_id(&wm_a), own_id(&wm_b)]);

    // The deferred config edit went out with that write
    assert_eq!(wm_b.get_config().shape, ShapeKind::Sphere);
    assert_eq!(wm_a.get_config().shape, ShapeKind::Sphere);
}

#[test]
fn test_quota_exceeded_is_deferred() {
    let h = Harness::new();
    let (_a, mut wm_a) = h.launch(Rect::new(0, 0, 400, 300));

    h.origin.set_quota(Some(16));
    assert_eq!(
        wm_a.modify_config(|c| c.background = Background::Gradient).unwrap(),
        WriteOutcome::Deferred
    );
    // The local view still reflects the edit
    assert_eq!(wm_a.get_config().background, Background::Gradient);

    h.origin.set_quota(None);
    wm_a.refresh();
    assert_eq!(wm_a.get_config().background, Background::Gradient);
    assert_eq!(
        Registry::new(h.origin.context(), DisplayConfig::default())
            .read()
            .config
            .background,
        Background::Gradient
    );
}

#[test]
fn test_unknown_liveness_never_prunes() {
    let h = Harness::new();
    let (_a, mut wm_a) = h.launch(Rect::new(0, 0, 400, 300));
    let (b, _wm_b) = h.launch(Rect::new(450, 0, 400, 300));

    h.desktop.set_enumeration(false);
    h.desktop.close(&b);
    wm_a.refresh();
    assert_eq!(wm_a.get_windows().len(), 2);

    h.desktop.set_enumeration(true);
    wm_a.refresh();
    assert_eq!(wm_a.get_windows().len(), 1);
}

#[test]
fn test_disabled_liveness_keeps_closed_windows() {
    let h = Harness::new();
    let a = h.desktop.open(Rect::new(0, 0, 400, 300));
    let mut wm_a = h.manager(
        &a,
        ManagerOptions {
            liveness: LivenessPolicy::Disabled,
            ..Default::default()
        },
    );
    wm_a.init(&IdentityStore::new(a.session()), Metadata::new())
        .unwrap();
    let (b, _wm_b) = h.launch(Rect::new(450, 0, 400, 300));

    h.desktop.close(&b);
    wm_a.refresh();

    assert_eq!(wm_a.get_windows().len(), 2);
}

#[test]
fn test_interleaved_refreshes_never_duplicate() {
    let h = Harness::new();
    let mut managers: Vec<(SimWindow, Manager)> = (0..4)
        .map(|i| h.launch(Rect::new(i * 100, 0, 100, 100)))
        .collect();

    for round in 0..5 {
        for (i, (window, manager)) in managers.iter_mut().enumerate() {
            h.desktop
                .move_to(window, Rect::new(i as i32 * 100 + round, round, 100, 100));
            manager.refresh();
            manager.drain_external_changes();
        }
    }

    let stored = h.stored();
    let unique: HashSet<_> = stored.iter().collect();
    assert_eq!(stored.len(), 4);
    assert_eq!(unique.len(), 4);
    for (_, manager) in &managers {
        assert_eq!(manager.get_windows().len(), 4);
    }
}

#[test]
fn test_open_new_window_offsets_from_current_shape() {
    let h = Harness::new();
    let (a, wm_a) = h.launch(Rect::new(100, 100, 400, 300));
    h.desktop.move_to(&a, Rect::new(200, 100, 400, 300));

    // The offset applies to the last sampled shape
    let requested = wm_a.open_new_window().unwrap();
    assert_eq!(requested, Rect::new(150, 150, 400, 300));
    assert_eq!(h.desktop.take_open_requests(), vec![requested]);
}

#[test]
fn test_file_store_windows_converge() {
    use std::time::{Duration, Instant};

    let dir = tempfile::tempdir().unwrap();
    let desktop = Desktop::new();
    let launch = |shape: Rect| {
        let window = desktop.open(shape);
        let mut manager = WindowManager::new(
            Registry::new(FileStore::open(dir.path()).unwrap(), DisplayConfig::default()),
            window.clone(),
            ManagerOptions::default(),
        );
        manager
            .init(&IdentityStore::new(window.session()), Metadata::new())
            .unwrap();
        (window, manager)
    };
    let (_a, mut wm_a) = launch(Rect::new(0, 0, 400, 300));
    let (_b, mut wm_b) = launch(Rect::new(450, 0, 400, 300));

    wm_a.modify_config(|c| c.background = Background::Stars).unwrap();

    // The write reaches the other handle through its directory watcher
    let deadline = Instant::now() + Duration::from_secs(2);
    while wm_b.get_config().background != Background::Stars {
        assert!(Instant::now() < deadline, "no change notification from the file store");
        wm_b.drain_external_changes();
        std::thread::sleep(Duration::from_millis(20));
    }

    wm_a.refresh();
    wm_b.refresh();
    let expected = vec![own_id(&wm_a), own_id(&wm_b)];
    assert_eq!(ids(&wm_a), expected);
    assert_eq!(ids(&wm_b), expected);
}
