use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use anyhow::{anyhow, Result};
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::sampling::SamplingSession;
use crate::tracking::{frame_track_ids, Detection};

use super::{Clock, Frame, FrameSource, Tracker};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

/// Frame forwarded to the display side while a run is in progress.
#[derive(Debug, Clone)]
pub struct LiveFrame {
    pub frame: Frame,
    pub detections: Vec<Detection>,
    pub occupancy: u32,
    pub sampled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunEnd {
    /// The source ran out of frames.
    EndOfStream,
    /// A stop was requested.
    Stopped,
    /// The source or tracker failed; carries the error text.
    Failed(String),
}

/// What a finished loop hands back: the stopped session with its buffer.
#[derive(Debug)]
pub struct RunOutcome {
    pub session: SamplingSession,
    pub end: RunEnd,
    pub live_frames_dropped: u64,
}

/// Blocking frame loop: read → track → dedupe → sample, one frame at a time.
///
/// Runs on a blocking thread. Live frames go out with `try_send` so a slow
/// display never stalls sampling; frames it cannot keep up with are dropped
/// from display only. The session is always stopped and returned, whatever
/// ended the loop.
pub fn detection_loop(
    mut source: Box<dyn FrameSource>,
    mut tracker: Box<dyn Tracker>,
    clock: Arc<dyn Clock>,
    mut session: SamplingSession,
    live_tx: mpsc::Sender<LiveFrame>,
    cancel_token: CancellationToken,
) -> RunOutcome {
    let source_label = source.label();
    let mut live_frames_dropped = 0u64;
    log_info!(
        "detection loop started on {} (session {})",
        source_label,
        session.id()
    );

    let end = loop {
        if cancel_token.is_cancelled() {
            break RunEnd::Stopped;
        }

        let frame = match guarded("frame source", || source.next_frame()) {
            Ok(Some(frame)) => frame,
            Ok(None) => break RunEnd::EndOfStream,
            Err(err) => {
                log_error!("frame source {} failed: {err:?}", source_label);
                break RunEnd::Failed(format!("{err:#}"));
            }
        };

        // A stop that arrived while the source was blocked wins over the frame.
        if cancel_token.is_cancelled() {
            break RunEnd::Stopped;
        }

        let detections = match guarded("tracker", || tracker.track(&frame)) {
            Ok(detections) => detections,
            Err(err) => {
                log_error!("tracking failed on frame {}: {err:?}", frame.index);
                break RunEnd::Failed(format!("{err:#}"));
            }
        };

        let track_ids = frame_track_ids(&detections);
        let sample = match session.frame(clock.now(), track_ids.as_deref()) {
            Ok(sample) => sample,
            Err(err) => break RunEnd::Failed(format!("{err:#}")),
        };

        if let Some(observation) = sample.observation {
            log_debug!(
                "sampled occupancy {} at {} (frame {})",
                observation.occupancy,
                observation.timestamp.to_rfc3339(),
                frame.index
            );
        }

        let live = LiveFrame {
            frame,
            detections,
            occupancy: sample.occupancy,
            sampled: sample.observation.is_some(),
        };
        match live_tx.try_send(live) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => live_frames_dropped += 1,
            // Nobody is watching; keep sampling.
            Err(TrySendError::Closed(_)) => {}
        }
    };

    session.stop();
    log_info!(
        "detection loop on {} ended ({:?}) after {} frames",
        source_label,
        end,
        session.frames_seen()
    );

    RunOutcome {
        session,
        end,
        live_frames_dropped,
    }
}

/// Runs a call into an external collaborator, turning a panic into an error
/// so the session still makes it back to the controller.
fn guarded<T>(what: &str, call: impl FnOnce() -> Result<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow!("{what} panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
