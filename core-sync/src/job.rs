//! # Sync Run State Machine
//!
//! One [`SyncRun`] is recorded per pipeline invocation.
//!
//! ```text
//! Pending → Running → Completed
//!     ↓         ↓
//!     └──────→ Failed
//! ```
//!
//! Terminal states never transition. Counters accumulate while the run is
//! `Running` and are persisted with the final status. Timestamps are read
//! from the [`Clock`] passed to each transition.

use bridge_traits::time::Clock;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::{Result, SyncError};

// ============================================================================
// ID Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncRunId(Uuid);

impl SyncRunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s).map_err(|e| SyncError::InvalidRunId(e.to_string()))?,
        ))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SyncRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Status Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl FromStr for RunStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Counters
// ============================================================================

/// Per-run tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub mines_staged: u64,
    pub collections_staged: u64,
    pub documents_staged: u64,
    pub records_promoted: u64,
    /// Records skipped after an unmappable payload, rejection, or fetch failure
    pub records_skipped: u64,
}

impl RunCounters {
    pub fn total_staged(&self) -> u64 {
        self.mines_staged + self.collections_staged + self.documents_staged
    }
}

// ============================================================================
// Sync Run Entity
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: SyncRunId,
    /// Source label, e.g. `BCMI`
    pub data_source: String,
    pub status: RunStatus,
    /// Whether the run found an empty staging store
    pub cold_start: bool,
    pub counters: RunCounters,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl SyncRun {
    pub fn new(data_source: impl Into<String>, clock: &dyn Clock) -> Self {
        Self {
            id: SyncRunId::new(),
            data_source: data_source.into(),
            status: RunStatus::Pending,
            cold_start: false,
            counters: RunCounters::default(),
            error_message: None,
            created_at: clock.unix_timestamp(),
            started_at: None,
            completed_at: None,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the run is not `Pending`
    pub fn start(mut self, clock: &dyn Clock) -> Result<Self> {
        self.validate_transition(RunStatus::Running)?;
        self.status = RunStatus::Running;
        self.started_at = Some(clock.unix_timestamp());
        Ok(self)
    }

    pub fn complete(mut self, counters: RunCounters, clock: &dyn Clock) -> Result<Self> {
        self.validate_transition(RunStatus::Completed)?;
        self.status = RunStatus::Completed;
        self.counters = counters;
        self.completed_at = Some(clock.unix_timestamp());
        Ok(self)
    }

    /// Counters gathered before the failure are kept.
    pub fn fail(
        mut self,
        error_message: impl Into<String>,
        counters: RunCounters,
        clock: &dyn Clock,
    ) -> Result<Self> {
        self.validate_transition(RunStatus::Failed)?;
        self.status = RunStatus::Failed;
        self.counters = counters;
        self.error_message = Some(error_message.into());
        self.completed_at = Some(clock.unix_timestamp());
        Ok(self)
    }

    pub fn duration_secs(&self) -> Option<u64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end.saturating_sub(start).max(0) as u64),
            _ => None,
        }
    }

    fn validate_transition(&self, to: RunStatus) -> Result<()> {
        let valid = matches!(
            (self.status, to),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Pending, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Failed)
        );

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.status.as_str(),
                    to.as_str()
                ),
            });
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::time::{FixedClock, SystemClock};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_run_id_from_string() {
        let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
        let id = SyncRunId::from_string(uuid_str).unwrap();
        assert_eq!(id.as_str(), uuid_str);
        assert!(SyncRunId::from_string("nope").is_err());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("RUNNING".parse::<RunStatus>().unwrap(), RunStatus::Running);
        assert_eq!("failed".parse::<RunStatus>().unwrap(), RunStatus::Failed);
        assert!("cancelled".parse::<RunStatus>().is_err());
        assert!(RunStatus::Completed.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }

    #[test]
    fn test_run_lifecycle() {
        let run = SyncRun::new("BCMI", &SystemClock);
        assert_eq!(run.status, RunStatus::Pending);

        let run = run.start(&SystemClock).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.started_at.is_some());

        let counters = RunCounters {
            mines_staged: 2,
            collections_staged: 3,
            documents_staged: 4,
            records_promoted: 9,
            records_skipped: 1,
        };
        let run = run.complete(counters, &SystemClock).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.counters.total_staged(), 9);
        assert!(run.duration_secs().is_some());
    }

    #[test]
    fn test_failed_run_keeps_message_and_counters() {
        let counters = RunCounters {
            mines_staged: 1,
            ..RunCounters::default()
        };
        let run = SyncRun::new("BCMI", &SystemClock)
            .start(&SystemClock)
            .unwrap()
            .fail("registry down", counters, &SystemClock)
            .unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error_message.as_deref(), Some("registry down"));
        assert_eq!(run.counters.mines_staged, 1);
    }

    #[test]
    fn test_terminal_states_do_not_transition() {
        let completed = SyncRun::new("BCMI", &SystemClock)
            .start(&SystemClock)
            .unwrap()
            .complete(RunCounters::default(), &SystemClock)
            .unwrap();
        assert!(completed.clone().fail("late", RunCounters::default(), &SystemClock).is_err());
        assert!(completed.start(&SystemClock).is_err());

        let pending = SyncRun::new("BCMI", &SystemClock);
        assert!(matches!(
            pending.complete(RunCounters::default(), &SystemClock),
            Err(SyncError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_timestamps_come_from_clock() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let finished = created + Duration::seconds(90);

        let run = SyncRun::new("BCMI", &FixedClock(created))
            .start(&FixedClock(created))
            .unwrap()
            .complete(RunCounters::default(), &FixedClock(finished))
            .unwrap();

        assert_eq!(run.created_at, created.timestamp());
        assert_eq!(run.started_at, Some(created.timestamp()));
        assert_eq!(run.completed_at, Some(finished.timestamp()));
        assert_eq!(run.duration_secs(), Some(90));
    }
}
