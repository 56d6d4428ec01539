//! Recorded track logs standing in for a camera and detection model.
//!
//! A recording is JSON lines, one object per frame:
//! `{"track_ids": [1, 2, 2]}` or `{"track_ids": null}` when the tracker had
//! not established any tracks yet.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    sync::Arc,
    thread,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::detection::{DetectionModel, Frame, FrameSource, Tracker};
use crate::tracking::{Detection, TrackId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub track_ids: Option<Vec<TrackId>>,
}

/// Detection model answering from a recording, loaded once and shared.
#[derive(Debug, Clone)]
pub struct ReplayModel {
    name: String,
    frames: Arc<Vec<RecordedFrame>>,
}

impl ReplayModel {
    pub fn from_frames(name: impl Into<String>, frames: Vec<RecordedFrame>) -> Self {
        Self {
            name: name.into(),
            frames: Arc::new(frames),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open recording {}", path.display()))?;
        let frames = read_recording(BufReader::new(file))
            .with_context(|| format!("failed to read recording {}", path.display()))?;
        Ok(Self::from_frames(path.display().to_string(), frames))
    }

    pub fn frame_count(&self) -> u64 {
        self.frames.len() as u64
    }
}

pub fn read_recording<R: BufRead>(reader: R) -> Result<Vec<RecordedFrame>> {
    let mut frames = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: RecordedFrame = serde_json::from_str(&line)
            .with_context(|| format!("invalid frame record on line {}", index + 1))?;
        frames.push(frame);
    }
    Ok(frames)
}

impl DetectionModel for ReplayModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn tracker(&self) -> Result<Box<dyn Tracker>> {
        Ok(Box::new(ReplayTracker {
            frames: Arc::clone(&self.frames),
        }))
    }
}

struct ReplayTracker {
    frames: Arc<Vec<RecordedFrame>>,
}

impl Tracker for ReplayTracker {
    fn track(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let Some(recorded) = usize::try_from(frame.index)
            .ok()
            .and_then(|index| self.frames.get(index))
        else {
            bail!("recording has no frame {}", frame.index);
        };

        let detections = match &recorded.track_ids {
            Some(ids) => ids.iter().copied().map(Detection::tracked).collect(),
            None => Vec::new(),
        };
        Ok(detections)
    }
}

/// Yields placeholder frames for a recording, paced like a live feed.
pub struct ReplaySource {
    label: String,
    next_index: u64,
    total_frames: u64,
    frame_interval: Option<Duration>,
}

impl ReplaySource {
    /// `fps` of `None` replays as fast as the loop can go.
    pub fn new(model: &ReplayModel, fps: Option<f64>) -> Result<Self> {
        let frame_interval = match fps {
            Some(fps) if fps.is_finite() && fps > 0.0 => Some(Duration::from_secs_f64(1.0 / fps)),
            Some(fps) => bail!("replay fps must be positive, got {fps}"),
            None => None,
        };

        Ok(Self {
            label: format!("replay of {}", model.name()),
            next_index: 0,
            total_frames: model.frame_count(),
            frame_interval,
        })
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.next_index >= self.total_frames {
            return Ok(None);
        }
        if self.next_index > 0 {
            if let Some(interval) = self.frame_interval {
                thread::sleep(interval);
            }
        }

        let frame = Frame {
            index: self.next_index,
            image: RgbImage::new(1, 1),
        };
        self.next_index += 1;
        Ok(Some(frame))
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}
