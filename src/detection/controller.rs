use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::{info, warn};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::Database;
use crate::sampling::{SamplingConfig, SamplingSession};

use super::loop_worker::{detection_loop, LiveFrame, RunEnd, RunOutcome};
use super::{Clock, DetectionModel, FrameSource, SystemClock};

/// Summary of a finished run once its buffer reached the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub session_id: String,
    pub frames: u64,
    pub observations_flushed: usize,
    pub live_frames_dropped: u64,
    pub end: RunEnd,
}

/// Owns at most one detection run at a time and guarantees its observations
/// are flushed to the store when it ends, whether by stop or end of stream.
pub struct DetectionController {
    db: Database,
    model: Arc<dyn DetectionModel>,
    clock: Arc<dyn Clock>,
    config: SamplingConfig,
    live_queue_depth: usize,
    handle: Option<JoinHandle<RunOutcome>>,
    cancel_token: Option<CancellationToken>,
    pending: Option<SamplingSession>,
}

impl DetectionController {
    pub fn new(
        db: Database,
        model: Arc<dyn DetectionModel>,
        config: SamplingConfig,
        live_queue_depth: usize,
    ) -> Self {
        Self {
            db,
            model,
            clock: Arc::new(SystemClock),
            config,
            live_queue_depth: live_queue_depth.max(1),
            handle: None,
            cancel_token: None,
            pending: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Observations from an earlier run whose flush failed.
    pub fn pending_observations(&self) -> usize {
        self.pending
            .as_ref()
            .map(|session| session.buffered().len())
            .unwrap_or(0)
    }

    /// Starts a run over `source` on a blocking thread and returns the live
    /// frame feed for display.
    pub fn start(&mut self, source: Box<dyn FrameSource>) -> Result<mpsc::Receiver<LiveFrame>> {
        if self.handle.is_some() {
            bail!("detection already active");
        }
        if self.pending.is_some() {
            bail!(
                "{} observations from the previous run are waiting to be flushed",
                self.pending_observations()
            );
        }

        let tracker = self
            .model
            .tracker()
            .with_context(|| format!("failed to create tracker for model {}", self.model.name()))?;
        let session = SamplingSession::start(self.config);

        let cancel_token = CancellationToken::new();
        let (live_tx, live_rx) = mpsc::channel(self.live_queue_depth);
        let clock = Arc::clone(&self.clock);
        let token_clone = cancel_token.clone();

        info!(
            "Starting detection with model {} on {}",
            self.model.name(),
            source.label()
        );
        let handle = tokio::task::spawn_blocking(move || {
            detection_loop(source, tracker, clock, session, live_tx, token_clone)
        });

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(live_rx)
    }

    /// Signals the loop to stop, waits for it, then flushes what it sampled.
    pub async fn stop(&mut self) -> Result<RunReport> {
        if let Some(token) = self.cancel_token.as_ref() {
            token.cancel();
        }
        self.finish().await
    }

    /// Waits for a finite source to run out, then flushes.
    pub async fn wait(&mut self) -> Result<RunReport> {
        self.finish().await
    }

    /// Re-attempts a flush that failed when a run ended.
    pub async fn retry_flush(&mut self) -> Result<usize> {
        let Some(session) = self.pending.as_mut() else {
            return Ok(0);
        };

        let written = session.flush(&self.db).await?;
        self.pending = None;
        Ok(written)
    }

    async fn finish(&mut self) -> Result<RunReport> {
        let Some(handle) = self.handle.take() else {
            bail!("no active detection run");
        };
        self.cancel_token = None;

        let RunOutcome {
            mut session,
            end,
            live_frames_dropped,
        } = handle.await.context("detection loop task failed to join")?;

        let observations_flushed = match session.flush(&self.db).await {
            Ok(written) => written,
            Err(err) => {
                warn!(
                    "Keeping {} observations from session {} for a later flush",
                    session.buffered().len(),
                    session.id()
                );
                self.pending = Some(session);
                return Err(err);
            }
        };

        Ok(RunReport {
            session_id: session.id().to_string(),
            frames: session.frames_seen(),
            observations_flushed,
            live_frames_dropped,
            end,
        })
    }
}
