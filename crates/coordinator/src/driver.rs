//! Event loop driving one window manager.
//!
//! Everything runs on the calling task, so the manager never sees two
//! operations at once: refresh ticks, registry notifications and console
//! commands are handled one after another. Output for the user goes through
//! the `on_list` sink the caller passes in.

use crate::command::WindowCommand;
use crate::manager::WindowManager;
use multiwin_core::scene::{self, ScenePlacement};
use multiwin_host::{ShapeProbe, WindowHost};
use multiwin_registry::{ChangeReceiver, SharedStore, StoreChange};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Run the refresh loop until `shutdown` resolves or a `Quit` command arrives.
///
/// The manager must already be initialized. `on_list` receives the scene
/// placements whenever a `List` command asks for them.
pub async fn run<S, H, F, L>(
    manager: &mut WindowManager<S, H>,
    refresh_interval: Duration,
    mut commands: mpsc::UnboundedReceiver<WindowCommand>,
    shutdown: F,
    mut on_list: L,
) where
    S: SharedStore,
    H: ShapeProbe + WindowHost,
    F: Future<Output = ()>,
    L: FnMut(&[ScenePlacement]),
{
    let mut changes = manager.take_changes();
    let mut commands_open = true;

    let mut ticker = time::interval(refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
            _ = ticker.tick() => {
                manager.refresh();
            }
            change = next_change(&mut changes) => {
                match change {
                    Some(change) => {
                        // Coalesce a burst of writes into one re-read
                        let mut pending = 1;
                        if let Some(rx) = changes.as_mut() {
                            while rx.try_recv().is_ok() {
                                pending += 1;
                            }
                        }
                        debug!("{} change(s) to {}", pending, change.key);
                        manager.handle_external_change();
                    }
                    None => {
                        warn!("Registry notifications closed, relying on refresh");
                        changes = None;
                    }
                }
            }
            command = commands.recv(), if commands_open => {
                match command {
                    Some(command) => match apply_command(manager, command) {
                        CommandOutcome::Continue => {}
                        CommandOutcome::List(placements) => on_list(&placements),
                        CommandOutcome::Quit => break,
                    },
                    None => commands_open = false,
                }
            }
        }
    }
}

async fn next_change(changes: &mut Option<ChangeReceiver>) -> Option<StoreChange> {
    match changes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// What the loop does after a command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Continue,
    /// Show these placements to the user.
    List(Vec<ScenePlacement>),
    Quit,
}

/// Apply one console command.
pub fn apply_command<S, H>(manager: &mut WindowManager<S, H>, command: WindowCommand) -> CommandOutcome
where
    S: SharedStore,
    H: ShapeProbe + WindowHost,
{
    let result = match command {
        WindowCommand::Quit => return CommandOutcome::Quit,
        WindowCommand::Refresh => {
            manager.refresh();
            return CommandOutcome::Continue;
        }
        WindowCommand::List => {
            return CommandOutcome::List(scene::placements(manager.get_windows()));
        }
        WindowCommand::OpenWindow => manager.open_new_window().map(|shape| {
            info!(
                "Requested new window at ({}, {}) {}x{}",
                shape.x, shape.y, shape.width, shape.height
            );
        }),
        WindowCommand::ResetAll => manager.reset_all_windows().map(drop),
        WindowCommand::SetShape(shape) => manager.modify_config(|c| c.shape = shape).map(drop),
        WindowCommand::SetWireframe(on) => manager.modify_config(|c| c.wireframe = on).map(drop),
        WindowCommand::SetRotationSpeed(speed) => {
            manager.modify_config(|c| c.rotation_speed = speed).map(drop)
        }
        WindowCommand::SetBackground(background) => {
            manager.modify_config(|c| c.background = background).map(drop)
        }
    };

    if let Err(e) = result {
        warn!("Command failed: {}", e);
    }
    CommandOutcome::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::ManagerOptions;
    use multiwin_core::{DisplayConfig, Metadata, Rect, ShapeKind};
    use multiwin_host::sim::{Desktop, SimWindow};
    use multiwin_host::IdentityStore;
    use multiwin_registry::{MemoryOrigin, MemoryStore, Registry};
    use std::sync::{Arc, Mutex};

    fn running(origin: &MemoryOrigin, window: &SimWindow) -> WindowManager<MemoryStore, SimWindow> {
        let mut wm = WindowManager::new(
            Registry::new(origin.context(), DisplayConfig::default()),
            window.clone(),
            ManagerOptions::default(),
        );
        wm.init(&IdentityStore::new(window.session()), Metadata::new())
            .unwrap();
        wm
    }

    #[tokio::test]
    async fn test_quit_command_stops_loop() {
        let origin = MemoryOrigin::new();
        let desktop = Desktop::new();
        let mut wm = running(&origin, &desktop.open(Rect::new(0, 0, 100, 100)));
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(WindowCommand::SetShape(ShapeKind::Cone)).unwrap();
        tx.send(WindowCommand::Quit).unwrap();
        run(&mut wm, Duration::from_millis(10), rx, std::future::pending(), |_| {}).await;

        assert_eq!(wm.get_config().shape, ShapeKind::Cone);
        assert_eq!(wm.registry().read().config.shape, ShapeKind::Cone);
    }

    #[tokio::test]
    async fn test_loop_sees_other_windows() {
        let origin = MemoryOrigin::new();
        let desktop = Desktop::new();
        let a = desktop.open(Rect::new(0, 0, 100, 100));
        let b = desktop.open(Rect::new(200, 0, 100, 100));
        let mut wm_a = running(&origin, &a);

        let configs = Arc::new(Mutex::new(Vec::new()));
        let configs_cb = Arc::clone(&configs);
        wm_a.set_config_change_callback(move |c| configs_cb.lock().unwrap().push(c.shape));

        let (_tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            run(
                &mut wm_a,
                Duration::from_millis(10),
                rx,
                time::sleep(Duration::from_millis(200)),
                |_| {},
            )
            .await;
            wm_a
        });

        time::sleep(Duration::from_millis(30)).await;
        let mut wm_b = running(&origin, &b);
        wm_b.modify_config(|c| c.shape = ShapeKind::Sphere).unwrap();

        let wm_a = handle.await.unwrap();
        assert_eq!(wm_a.get_windows().len(), 2);
        assert_eq!(*configs.lock().unwrap(), vec![ShapeKind::Sphere]);
    }

    #[tokio::test]
    async fn test_closed_command_channel_keeps_running() {
        let origin = MemoryOrigin::new();
        let desktop = Desktop::new();
        let window = desktop.open(Rect::new(0, 0, 100, 100));
        let mut wm = running(&origin, &window);
        let (tx, rx) = mpsc::unbounded_channel::<WindowCommand>();
        drop(tx);

        desktop.move_to(&window, Rect::new(60, 0, 100, 100));
        run(
            &mut wm,
            Duration::from_millis(10),
            rx,
            time::sleep(Duration::from_millis(50)),
            |_| {},
        )
        .await;

        assert_eq!(wm.get_windows()[0].shape, Rect::new(60, 0, 100, 100));
    }

    #[tokio::test]
    async fn test_list_goes_to_sink() {
        let origin = MemoryOrigin::new();
        let desktop = Desktop::new();
        let mut wm_a = running(&origin, &desktop.open(Rect::new(0, 0, 100, 100)));
        let _wm_b = running(&origin, &desktop.open(Rect::new(200, 0, 100, 100)));
        wm_a.refresh();
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(WindowCommand::List).unwrap();
        tx.send(WindowCommand::Quit).unwrap();
        let mut listed = Vec::new();
        run(&mut wm_a, Duration::from_secs(60), rx, std::future::pending(), |p| {
            listed.push(p.to_vec())
        })
        .await;

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], scene::placements(wm_a.get_windows()));
        assert_eq!(listed[0].len(), 2);
    }

    #[test]
    fn test_apply_command_outcomes() {
        let origin = MemoryOrigin::new();
        let desktop = Desktop::new();
        let mut wm = running(&origin, &desktop.open(Rect::new(0, 0, 100, 100)));

        assert_eq!(apply_command(&mut wm, WindowCommand::Quit), CommandOutcome::Quit);
        assert_eq!(
            apply_command(&mut wm, WindowCommand::SetWireframe(false)),
            CommandOutcome::Continue
        );
        assert!(!wm.get_config().wireframe);
        let CommandOutcome::List(placements) = apply_command(&mut wm, WindowCommand::List) else {
            panic!("Expected a listing");
        };
        assert_eq!(placements[0].id, *wm.window_id().unwrap());
    }
}
