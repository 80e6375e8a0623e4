//! # Progress Tracker
//!
//! Ephemeral side channel reporting job liveness to polling consumers.
//! Deliberately decoupled from the job table: a dashboard hammering
//! `get()` contends on this one small map, never on the lock the workers
//! use to claim and finish jobs. Writes are last-write-wins and carry no
//! ordering guarantee relative to the queue's own progress field.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Snapshot of where a job currently is, as last reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Coarse pipeline stage, e.g. `"fetching_source"`.
    pub stage: String,
    /// Percent complete, 0–100.
    pub percent: u8,
    /// Free-form detail for display.
    pub message: String,
    /// When this record was written.
    pub updated_at: DateTime<Utc>,
}

/// Shared map of per-job progress snapshots.
///
/// All operations take one short critical section on a single mutex;
/// nothing here ever blocks on I/O or nests another lock.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    records: Mutex<HashMap<Uuid, ProgressRecord>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest stage for a job, replacing whatever was there.
    pub fn update(&self, job_id: Uuid, stage: &str, percent: u8, message: &str) {
        let record = ProgressRecord {
            stage: stage.to_owned(),
            percent: percent.min(100),
            message: message.to_owned(),
            updated_at: Utc::now(),
        };
        self.records.lock().insert(job_id, record);
    }

    /// Latest record for a job, if any has been reported.
    pub fn get(&self, job_id: &Uuid) -> Option<ProgressRecord> {
        self.records.lock().get(job_id).cloned()
    }

    /// Drop the record for a finished job.
    pub fn remove(&self, job_id: &Uuid) {
        self.records.lock().remove(job_id);
    }

    /// Remove records older than `max_age`. Returns how many were dropped.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::hours(1));
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, record| record.updated_at > cutoff);
        let removed = before - records.len();
        if removed > 0 {
            debug!(removed, "cleaned up stale progress records");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_then_get_round_trips() {
        let tracker = ProgressTracker::new();
        let job_id = Uuid::new_v4();

        tracker.update(job_id, "fetching_source", 10, "downloading transcript");

        let record = tracker.get(&job_id).unwrap();
        assert_eq!(record.stage, "fetching_source");
        assert_eq!(record.percent, 10);
        assert_eq!(record.message, "downloading transcript");
    }

    #[test]
    fn unknown_job_is_absent() {
        let tracker = ProgressTracker::new();
        assert!(tracker.get(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn last_write_wins() {
        let tracker = ProgressTracker::new();
        let job_id = Uuid::new_v4();

        tracker.update(job_id, "drafting", 40, "");
        tracker.update(job_id, "rendering", 80, "assembling sections");

        let record = tracker.get(&job_id).unwrap();
        assert_eq!(record.stage, "rendering");
        assert_eq!(record.percent, 80);
    }

    #[test]
    fn percent_is_clamped() {
        let tracker = ProgressTracker::new();
        let job_id = Uuid::new_v4();

        tracker.update(job_id, "drafting", 250, "");
        assert_eq!(tracker.get(&job_id).unwrap().percent, 100);
    }

    #[test]
    fn remove_drops_the_record() {
        let tracker = ProgressTracker::new();
        let job_id = Uuid::new_v4();

        tracker.update(job_id, "drafting", 40, "");
        tracker.remove(&job_id);
        assert!(tracker.get(&job_id).is_none());
    }

    #[test]
    fn cleanup_removes_only_stale_records() {
        let tracker = ProgressTracker::new();
        let stale = Uuid::new_v4();
        let fresh = Uuid::new_v4();

        tracker.update(stale, "drafting", 10, "");
        // Backdate the first record past the retention cutoff.
        tracker.records.lock().get_mut(&stale).unwrap().updated_at =
            Utc::now() - chrono::Duration::hours(2);
        tracker.update(fresh, "rendering", 90, "");

        let removed = tracker.cleanup(Duration::from_secs(3600));
        assert_eq!(removed, 1);
        assert!(tracker.get(&stale).is_none());
        assert!(tracker.get(&fresh).is_some());
    }
}
