//! multiwin Coordinator
//!
//! Keeps a set of same-origin windows in agreement about which windows are
//! open, where they are, and how the shared scene is configured.
//!
//! This crate handles:
//! - Window membership and the refresh cycle ([`manager::WindowManager`])
//! - Driving a manager from timers, notifications and console input ([`driver`])
//! - Loading the `config.toml` ([`config`])

pub mod command;
pub mod config;
pub mod driver;
pub mod manager;

pub use command::{parse_command, WindowCommand};
pub use driver::CommandOutcome;
pub use config::{Config, ConfigWarning};
pub use manager::{
    CoordinatorError, LivenessPolicy, ManagerOptions, WindowManager, WriteOutcome,
};
