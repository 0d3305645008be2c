//! Commands a running window accepts on its console.

use multiwin_core::{Background, DisplayConfig, ShapeKind};

/// An action requested by the user of one window.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowCommand {
    /// Open another window next to this one.
    OpenWindow,
    /// Clear the registry; every open window registers again.
    ResetAll,
    SetShape(ShapeKind),
    SetWireframe(bool),
    SetRotationSpeed(f64),
    SetBackground(Background),
    /// Print the live window list.
    List,
    /// Run a refresh now instead of waiting for the next tick.
    Refresh,
    Quit,
}

/// Parse a console line such as `open`, `shape torus` or `speed 2.5`.
///
/// Returns `None` for unknown commands or bad arguments.
pub fn parse_command(line: &str) -> Option<WindowCommand> {
    let mut parts = line.split_whitespace();
    let name = parts.next()?.to_lowercase();
    let arg = parts.next();
    if parts.next().is_some() {
        return None;
    }

    match (name.as_str(), arg) {
        ("open" | "new", None) => Some(WindowCommand::OpenWindow),
        ("reset", None) => Some(WindowCommand::ResetAll),
        ("list" | "ls", None) => Some(WindowCommand::List),
        ("refresh", None) => Some(WindowCommand::Refresh),
        ("quit" | "exit", None) => Some(WindowCommand::Quit),
        ("shape", Some(value)) => value.parse().ok().map(WindowCommand::SetShape),
        ("background" | "bg", Some(value)) => value.parse().ok().map(WindowCommand::SetBackground),
        ("wireframe", Some(value)) => parse_toggle(value).map(WindowCommand::SetWireframe),
        ("speed", Some(value)) => value
            .parse::<f64>()
            .ok()
            .filter(|speed| DisplayConfig::is_valid_rotation_speed(*speed))
            .map(WindowCommand::SetRotationSpeed),
        _ => None,
    }
}

fn parse_toggle(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}
