//! Scene placement derived from the live window list.
//!
//! Every window draws one object per live window. Because the live list has the
//! same order everywhere, an object's colour and size depend only on its index,
//! and all windows agree on them without talking to each other.

use crate::{Rect, WindowId, WindowRecord};
use std::time::{SystemTime, UNIX_EPOCH};

const SECONDS_PER_DAY: u64 = 86_400;

/// Where and how one window's object is drawn, in screen coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenePlacement {
    pub id: WindowId,
    /// Object centre (the centre of the owning window).
    pub center: (f64, f64),
    /// Hue in `[0, 1)`.
    pub hue: f64,
    /// Edge length of the object.
    pub size: f64,
}

/// Compute placements for every live window, by index.
pub fn placements(windows: &[WindowRecord]) -> Vec<ScenePlacement> {
    windows
        .iter()
        .enumerate()
        .map(|(i, w)| ScenePlacement {
            id: w.id.clone(),
            center: w.shape.center(),
            hue: (i as f64 * 0.1).rem_euclid(1.0),
            size: 100.0 + i as f64 * 50.0,
        })
        .collect()
}

/// Translation that maps screen coordinates into the local window.
pub fn scene_offset(shape: &Rect) -> (f64, f64) {
    (-(shape.x as f64), -(shape.y as f64))
}

/// Seconds since midnight UTC, shared by every window on the machine so
/// rotations stay in phase.
pub fn seconds_since_midnight(now: SystemTime) -> f64 {
    let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();
    let day_start = since_epoch.as_secs() - since_epoch.as_secs() % SECONDS_PER_DAY;
    since_epoch.as_secs_f64() - day_start as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Metadata;
    use std::time::Duration;

    fn record(id: &str, shape: Rect) -> WindowRecord {
        WindowRecord::new(WindowId::new(id), shape, Metadata::new())
    }

    #[test]
    fn test_placements_by_index() {
        let windows = vec![
            record("a", Rect::new(0, 0, 200, 100)),
            record("b", Rect::new(300, 300, 100, 100)),
        ];
        let placed = placements(&windows);

        assert_eq!(placed.len(), 2);
        assert_eq!(placed[0].center, (100.0, 50.0));
        assert_eq!(placed[0].hue, 0.0);
        assert_eq!(placed[0].size, 100.0);
        assert_eq!(placed[1].center, (350.0, 350.0));
        assert!((placed[1].hue - 0.1).abs() < 1e-9);
        assert_eq!(placed[1].size, 150.0);
    }

    #[test]
    fn test_hue_wraps() {
        let windows: Vec<_> = (0..12)
            .map(|i| record(&i.to_string(), Rect::new(0, 0, 10, 10)))
            .collect();
        let placed = placements(&windows);
        assert!(placed.iter().all(|p| (0.0..1.0).contains(&p.hue)));
        assert!((placed[11].hue - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_scene_offset() {
        assert_eq!(scene_offset(&Rect::new(120, -40, 10, 10)), (-120.0, 40.0));
    }

    #[test]
    fn test_seconds_since_midnight() {
        let t = UNIX_EPOCH + Duration::from_secs(3 * SECONDS_PER_DAY + 3661);
        assert_eq!(seconds_since_midnight(t), 3661.0);
        assert_eq!(seconds_since_midnight(UNIX_EPOCH), 0.0);
    }
}
