//! Per-frame track bookkeeping: turning a tracker's detections into the
//! distinct-entity count that feeds occupancy sampling.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Persistent label a tracker assigns to follow one entity across frames.
pub type TrackId = u64;

/// One detected entity in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// `[x1, y1, x2, y2]` in pixels.
    pub bbox: [f32; 4],
    pub score: f32,
    pub class_id: u32,
    /// `None` until the tracker has established a track for this detection.
    pub track_id: Option<TrackId>,
}

impl Detection {
    pub fn tracked(track_id: TrackId) -> Self {
        Self {
            bbox: [0.0; 4],
            score: 1.0,
            class_id: 0,
            track_id: Some(track_id),
        }
    }

    pub fn untracked() -> Self {
        Self {
            bbox: [0.0; 4],
            score: 1.0,
            class_id: 0,
            track_id: None,
        }
    }
}

/// Collects the track identifiers of a frame's detections.
///
/// Returns `None` when no detection carries an identifier (tracking not yet
/// established, or nothing detected). Untagged detections are ignored when
/// at least one detection is tagged.
pub fn frame_track_ids(detections: &[Detection]) -> Option<Vec<TrackId>> {
    let ids: Vec<TrackId> = detections.iter().filter_map(|d| d.track_id).collect();
    if ids.is_empty() {
        None
    } else {
        Some(ids)
    }
}

/// Number of distinct identifiers visible in one frame.
///
/// An entity split across several boxes reports the same id more than once;
/// those collapse to one. Absent identifiers count as zero occupancy.
pub fn count_distinct(track_ids: Option<&[TrackId]>) -> usize {
    match track_ids {
        Some(ids) => ids.iter().collect::<HashSet<_>>().len(),
        None => 0,
    }
}
