use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{Database, Observation};
use crate::tracking::{count_distinct, TrackId};

use super::sampler::{Sampler, SamplingConfig};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Active,
    Stopped,
    Flushed,
}

/// Result of feeding one frame into a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSample {
    /// Distinct entities in this frame, sampled or not. Used for live display.
    pub occupancy: u32,
    /// Set when the frame fell on a sampling instant.
    pub observation: Option<Observation>,
}

/// State of one detection run: the sampler plus the observations buffered
/// since the run started.
///
/// Lifecycle: [`start`](Self::start) → [`frame`](Self::frame)* →
/// [`stop`](Self::stop) → [`flush`](Self::flush). The buffer only leaves the
/// session through a successful flush; a failed flush keeps it for a retry.
#[derive(Debug)]
pub struct SamplingSession {
    id: String,
    state: SessionState,
    sampler: Sampler,
    buffer: Vec<Observation>,
    frames_seen: u64,
}

impl SamplingSession {
    pub fn start(config: SamplingConfig) -> Self {
        let id = Uuid::new_v4().to_string();
        log_info!(
            "sampling session {} started (interval {}ms)",
            id,
            config.interval().num_milliseconds()
        );
        Self {
            id,
            state: SessionState::Active,
            sampler: Sampler::new(config),
            buffer: Vec::new(),
            frames_seen: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    pub fn buffered(&self) -> &[Observation] {
        &self.buffer
    }

    /// Dedupes a frame's track ids and offers the count to the sampler.
    pub fn frame(
        &mut self,
        now: DateTime<FixedOffset>,
        track_ids: Option<&[TrackId]>,
    ) -> Result<FrameSample> {
        if self.state != SessionState::Active {
            bail!("sampling session {} is not active", self.id);
        }

        let occupancy = occupancy_from_count(count_distinct(track_ids))?;
        self.frames_seen += 1;
        let observation = self.sampler.observe(now, occupancy);
        if let Some(observation) = observation {
            self.buffer.push(observation);
        }

        Ok(FrameSample {
            occupancy,
            observation,
        })
    }

    /// Ends sampling. Further frames are rejected; the buffer is kept for
    /// [`flush`](Self::flush).
    pub fn stop(&mut self) {
        if self.state == SessionState::Active {
            self.state = SessionState::Stopped;
            log_info!(
                "sampling session {} stopped after {} frames, {} observations buffered",
                self.id,
                self.frames_seen,
                self.buffer.len()
            );
        }
    }

    /// Appends the buffered observations to the store.
    ///
    /// On failure the buffer is left untouched so the caller can retry.
    pub async fn flush(&mut self, db: &Database) -> Result<usize> {
        match self.state {
            SessionState::Active => {
                bail!("sampling session {} must be stopped before flushing", self.id)
            }
            SessionState::Flushed => return Ok(0),
            SessionState::Stopped => {}
        }

        match db
            .append_observations(&self.buffer)
            .await
            .with_context(|| format!("failed to flush sampling session {}", self.id))
        {
            Ok(written) => {
                self.buffer.clear();
                self.state = SessionState::Flushed;
                log_info!("sampling session {} flushed {} observations", self.id, written);
                Ok(written)
            }
            Err(err) => {
                log_warn!(
                    "flush of session {} failed; keeping {} buffered observations",
                    self.id,
                    self.buffer.len()
                );
                Err(err)
            }
        }
    }
}

fn occupancy_from_count(count: usize) -> Result<u32> {
    u32::try_from(count)
        .with_context(|| format!("{count} distinct tracks exceed the occupancy range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::scratch_database;
    use chrono::Duration;

    fn base() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-06-01T08:00:00-04:00").unwrap()
    }

    #[test]
    fn frames_are_deduped_then_sampled() {
        let mut session = SamplingSession::start(SamplingConfig::default());

        let first = session.frame(base(), Some(&[4, 4, 5])).unwrap();
        assert_eq!(first.occupancy, 2);
        assert_eq!(first.observation, Some(Observation::new(base(), 2)));

        let skipped = session
            .frame(base() + Duration::milliseconds(300), Some(&[4, 5, 6]))
            .unwrap();
        assert_eq!(skipped.occupancy, 3);
        assert_eq!(skipped.observation, None);

        let untracked = session.frame(base() + Duration::seconds(1), None).unwrap();
        assert_eq!(untracked.observation.map(|o| o.occupancy), Some(0));

        assert_eq!(session.frames_seen(), 3);
        assert_eq!(session.buffered().len(), 2);
    }

    #[test]
    fn stopped_session_rejects_frames() {
        let mut session = SamplingSession::start(SamplingConfig::default());
        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.frame(base(), None).is_err());
    }

    #[tokio::test]
    async fn flush_requires_stop_and_moves_buffer_into_store() {
        let (db, _guard) = scratch_database();
        let mut session = SamplingSession::start(SamplingConfig::default());
        session.frame(base(), Some(&[1])).unwrap();
        session.frame(base() + Duration::seconds(2), Some(&[1, 2])).unwrap();

        assert!(session.flush(&db).await.is_err());
        assert_eq!(session.buffered().len(), 2);

        session.stop();
        assert_eq!(session.flush(&db).await.unwrap(), 2);
        assert_eq!(session.state(), SessionState::Flushed);
        assert!(session.buffered().is_empty());

        let series = db.load_observations().await.unwrap();
        assert_eq!(
            series.iter().map(|o| o.occupancy).collect::<Vec<_>>(),
            vec![1, 2]
        );

        // A second flush writes nothing.
        assert_eq!(session.flush(&db).await.unwrap(), 0);
        assert_eq!(db.count_observations().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn failed_flush_keeps_the_buffer() {
        let (db, _guard) = scratch_database();
        db.execute(|conn| {
            conn.execute_batch("DROP TABLE observations")?;
            Ok(())
        })
        .await
        .unwrap();

        let mut session = SamplingSession::start(SamplingConfig::default());
        session.frame(base(), Some(&[1, 2, 3])).unwrap();
        session.stop();

        assert!(session.flush(&db).await.is_err());
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.buffered(), &[Observation::new(base(), 3)]);
    }

    #[test]
    fn occupancy_counts_convert_without_clamping() {
        assert_eq!(occupancy_from_count(0).unwrap(), 0);
        assert_eq!(occupancy_from_count(u32::MAX as usize).unwrap(), u32::MAX);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn occupancy_beyond_u32_is_an_error() {
        let err = occupancy_from_count(u32::MAX as usize + 1).unwrap_err();
        assert!(err.to_string().contains("exceed the occupancy range"));
    }
}
