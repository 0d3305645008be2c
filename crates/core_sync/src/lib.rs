//! multiwin Core
//!
//! Platform-agnostic data model and merge logic for multi-window coordination.
//!
//! Every open window keeps a replica of one shared registry snapshot:
//! - Each window owns exactly one record, keyed by its id
//! - Records are ordered by first observation, not by screen position
//! - A record is removed only once its window is confirmed gone
//!
//! Nothing in this crate performs I/O. The merge functions are applied by the
//! coordinator to a freshly read snapshot before it is written back.

pub mod scene;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Free-form metadata attached to a window record by its owner.
pub type Metadata = Map<String, Value>;

/// Errors that can occur while decoding or encoding a registry snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Malformed registry snapshot: {0}")]
    Malformed(serde_json::Error),

    #[error("Failed to encode registry snapshot: {0}")]
    Encode(serde_json::Error),

    #[error("Unknown {kind} value: {value}")]
    UnknownValue { kind: &'static str, value: String },
}

/// Opaque identifier of one window, stable for the lifetime of its session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(String);

impl WindowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WindowId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for WindowId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A rectangle in screen coordinates (pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    /// Create a new rectangle.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Whether the rectangle has no usable area.
    ///
    /// Hosts report zero sizes for a short while after a window opens.
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Centre point of the rectangle.
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 * 0.5,
            self.y as f64 + self.height as f64 * 0.5,
        )
    }

    /// Same size, moved by the given delta.
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// One window's entry in the shared registry.
///
/// Only the window whose id it carries may change it. Every other window
/// holds a read-only replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRecord {
    pub id: WindowId,
    pub shape: Rect,
    #[serde(default)]
    pub metadata: Metadata,
}

impl WindowRecord {
    pub fn new(id: WindowId, shape: Rect, metadata: Metadata) -> Self {
        Self { id, shape, metadata }
    }
}

/// Geometry drawn for every window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    #[default]
    Cube,
    Sphere,
    Torus,
    Cone,
    Cylinder,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 5] = [
        ShapeKind::Cube,
        ShapeKind::Sphere,
        ShapeKind::Torus,
        ShapeKind::Cone,
        ShapeKind::Cylinder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeKind::Cube => "cube",
            ShapeKind::Sphere => "sphere",
            ShapeKind::Torus => "torus",
            ShapeKind::Cone => "cone",
            ShapeKind::Cylinder => "cylinder",
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShapeKind {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|shape| shape.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| SnapshotError::UnknownValue {
                kind: "shape",
                value: s.to_string(),
            })
    }
}

/// Scene background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Background {
    #[default]
    Black,
    Gradient,
    Stars,
}

impl Background {
    pub const ALL: [Background; 3] = [Background::Black, Background::Gradient, Background::Stars];

    pub fn as_str(&self) -> &'static str {
        match self {
            Background::Black => "black",
            Background::Gradient => "gradient",
            Background::Stars => "stars",
        }
    }
}

impl fmt::Display for Background {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Background {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|bg| bg.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| SnapshotError::UnknownValue {
                kind: "background",
                value: s.to_string(),
            })
    }
}

/// The single shared display configuration. Last writer wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DisplayConfig {
    pub shape: ShapeKind,
    pub wireframe: bool,
    pub rotation_speed: f64,
    pub background: Background,
    /// Options written by other builds that this one does not know about.
    /// Carried through untouched so a rewrite does not drop them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DisplayConfig {
    /// Fastest rotation any window accepts.
    pub const MAX_ROTATION_SPEED: f64 = 10.0;

    /// Whether `speed` is a usable rotation speed.
    pub fn is_valid_rotation_speed(speed: f64) -> bool {
        speed.is_finite() && (0.0..=Self::MAX_ROTATION_SPEED).contains(&speed)
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            shape: ShapeKind::Cube,
            wireframe: true,
            rotation_speed: 1.0,
            background: Background::Black,
            extra: Map::new(),
        }
    }
}

/// Result of upserting the local record into a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// The id was absent and a record was appended.
    Inserted,
    /// The record existed and its shape or metadata changed.
    Updated,
    /// The record existed and already matched.
    Unchanged,
}

/// What the host can tell us about which windows are still open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Liveness {
    /// The host enumerated every open window of this origin.
    Confirmed(HashSet<WindowId>),
    /// The host cannot enumerate windows. Nothing may be pruned.
    Unknown,
}

impl Liveness {
    /// Whether the window is positively known to be closed.
    pub fn is_confirmed_gone(&self, id: &WindowId) -> bool {
        match self {
            Liveness::Confirmed(open) => !open.contains(id),
            Liveness::Unknown => false,
        }
    }
}

/// The whole contents of the shared store, read and written as one unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default)]
    pub windows: Vec<WindowRecord>,
    #[serde(default)]
    pub config: DisplayConfig,
}

impl RegistrySnapshot {
    /// An empty snapshot carrying the given configuration.
    pub fn empty(config: DisplayConfig) -> Self {
        Self {
            windows: Vec::new(),
            config,
        }
    }

    /// Decode a stored value. Duplicate ids are collapsed to their first occurrence.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let mut snapshot: RegistrySnapshot =
            serde_json::from_str(json).map_err(SnapshotError::Malformed)?;
        snapshot.dedup();
        Ok(snapshot)
    }

    /// Encode for storage.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(self).map_err(SnapshotError::Encode)
    }

    pub fn find(&self, id: &WindowId) -> Option<&WindowRecord> {
        self.windows.iter().find(|w| &w.id == id)
    }

    pub fn contains(&self, id: &WindowId) -> bool {
        self.find(id).is_some()
    }

    /// Ids in registry order.
    pub fn ids(&self) -> Vec<WindowId> {
        self.windows.iter().map(|w| w.id.clone()).collect()
    }

    /// Insert or update the record owned by `id`.
    ///
    /// A new record is appended at the end, so registry order is the order in
    /// which windows were first observed. `metadata` of `None` leaves existing
    /// metadata alone.
    pub fn upsert(&mut self, id: &WindowId, shape: Rect, metadata: Option<&Metadata>) -> Upsert {
        match self.windows.iter_mut().find(|w| &w.id == id) {
            Some(record) => {
                let mut changed = false;
                if record.shape != shape {
                    record.shape = shape;
                    changed = true;
                }
                if let Some(metadata) = metadata {
                    if &record.metadata != metadata {
                        record.metadata = metadata.clone();
                        changed = true;
                    }
                }
                if changed {
                    Upsert::Updated
                } else {
                    Upsert::Unchanged
                }
            }
            None => {
                self.windows.push(WindowRecord::new(
                    id.clone(),
                    shape,
                    metadata.cloned().unwrap_or_default(),
                ));
                Upsert::Inserted
            }
        }
    }

    /// Drop every record whose window is confirmed closed.
    ///
    /// The record of `local` is never dropped: a window is always alive to itself.
    /// Returns the removed ids in registry order.
    pub fn prune(&mut self, liveness: &Liveness, local: &WindowId) -> Vec<WindowId> {
        let mut removed = Vec::new();
        self.windows.retain(|w| {
            if &w.id != local && liveness.is_confirmed_gone(&w.id) {
                removed.push(w.id.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Collapse duplicate ids, keeping the first occurrence. Returns how many were dropped.
    pub fn dedup(&mut self) -> usize {
        let before = self.windows.len();
        let mut seen = HashSet::new();
        self.windows.retain(|w| seen.insert(w.id.clone()));
        before - self.windows.len()
    }
}

/// Whether the live view changed in a way the presentation layer must see.
///
/// Compares id order and shapes. Metadata changes alone do not count.
pub fn view_changed(previous: &[WindowRecord], next: &[WindowRecord]) -> bool {
    previous.len() != next.len()
        || previous
            .iter()
            .zip(next)
            .any(|(a, b)| a.id != b.id || a.shape != b.shape)
}
