//! Seams to the external frame source and detection model, plus the run
//! loop and controller that drive a sampling session from them.

pub mod controller;
pub mod loop_worker;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Local};
use image::RgbImage;

use crate::tracking::Detection;

pub use controller::{DetectionController, RunReport};
pub use loop_worker::{detection_loop, LiveFrame, RunEnd, RunOutcome};

/// A decoded frame. The pixels are opaque to the analytics pipeline.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in the stream, starting at 0.
    pub index: u64,
    pub image: RgbImage,
}

/// Yields frames from a video file or camera.
///
/// `next_frame` may block (camera read, file I/O). `Ok(None)` marks the end
/// of a finite stream; live sources only end when stopped.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn label(&self) -> String {
        "frame source".into()
    }
}

/// Per-run tracking state. Track ids persist across calls within one run.
pub trait Tracker: Send {
    fn track(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// A loaded detection model, built once at startup and shared by reference
/// across runs.
pub trait DetectionModel: Send + Sync {
    fn name(&self) -> &str;

    /// Creates fresh tracking state for a new run.
    fn tracker(&self) -> Result<Box<dyn Tracker>>;
}

/// Wall-clock source for sampling instants.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    };

    use anyhow::{bail, Result};
    use chrono::{DateTime, Duration, FixedOffset};
    use image::RgbImage;

    use super::{Clock, DetectionModel, Frame, FrameSource, Tracker};
    use crate::tracking::{Detection, TrackId};

    /// Advances by a fixed step every time it is read.
    pub struct SteppingClock {
        start: DateTime<FixedOffset>,
        step_ms: i64,
        reads: AtomicI64,
    }

    impl SteppingClock {
        pub fn new(start: &str, step_ms: i64) -> Arc<Self> {
            Arc::new(Self {
                start: DateTime::parse_from_rfc3339(start).unwrap(),
                step_ms,
                reads: AtomicI64::new(0),
            })
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<FixedOffset> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            self.start + Duration::milliseconds(n * self.step_ms)
        }
    }

    /// Produces `limit` frames, or frames forever when `limit` is `None`.
    pub struct CountingSource {
        pub next: u64,
        pub limit: Option<u64>,
    }

    impl FrameSource for CountingSource {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            if self.limit.is_some_and(|limit| self.next >= limit) {
                return Ok(None);
            }
            let frame = Frame {
                index: self.next,
                image: RgbImage::new(1, 1),
            };
            self.next += 1;
            Ok(Some(frame))
        }
    }

    /// Reports the same set of track ids on every frame, failing from
    /// `fail_at` onwards when set.
    pub struct FixedModel {
        pub ids: Vec<TrackId>,
        pub fail_at: Option<u64>,
    }

    struct FixedTracker {
        ids: Vec<TrackId>,
        fail_at: Option<u64>,
    }

    impl Tracker for FixedTracker {
        fn track(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
            if self.fail_at.is_some_and(|at| frame.index >= at) {
                bail!("tracker lost frame {}", frame.index);
            }
            Ok(self.ids.iter().copied().map(Detection::tracked).collect())
        }
    }

    impl DetectionModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        fn tracker(&self) -> Result<Box<dyn Tracker>> {
            Ok(Box::new(FixedTracker {
                ids: self.ids.clone(),
                fail_at: self.fail_at,
            }))
        }
    }

    /// Tracker whose per-frame call panics from `panic_at` onwards.
    pub struct PanickingModel {
        pub panic_at: u64,
    }

    struct PanickingTracker {
        panic_at: u64,
    }

    impl Tracker for PanickingTracker {
        fn track(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
            if frame.index >= self.panic_at {
                panic!("tracker bug on frame {}", frame.index);
            }
            Ok(vec![Detection::tracked(1), Detection::tracked(2)])
        }
    }

    impl DetectionModel for PanickingModel {
        fn name(&self) -> &str {
            "panicking"
        }

        fn tracker(&self) -> Result<Box<dyn Tracker>> {
            Ok(Box::new(PanickingTracker {
                panic_at: self.panic_at,
            }))
        }
    }
}
