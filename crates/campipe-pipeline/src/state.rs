//! Pipeline state snapshots
//!
//! A snapshot copies the lifecycle status and the request progress counters
//! at one instant, for logs and tests. The fields are read one by one, so a
//! snapshot taken under concurrent completions is not atomic as a whole.

use serde::Serialize;
use std::sync::atomic::Ordering;

use crate::lifecycle::PipelineStatus;
use crate::pipeline::Pipeline;

/// Point-in-time view of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineSnapshot {
    /// Lifecycle status
    pub status: PipelineStatus,
    /// Number of nodes
    pub node_count: usize,
    /// Slots in the request ring
    pub ring_capacity: usize,
    /// Highest admitted request
    pub last_submitted: u64,
    /// Highest completed request
    pub last_completed: u64,
    /// Highest request completed together with all earlier ones
    pub last_in_order_completed: u64,
    /// Request of the last shutter
    pub last_shutter: u64,
    /// A flush is in progress
    pub flushing: bool,
    /// Shutter ordering violations seen
    pub shutter_violations: u64,
    /// Slots reused with fences still registered
    pub fence_leaks: u64,
    /// Invalid SOFs counted by the watchdog
    pub invalid_sof_count: u32,
    /// Reference count
    pub references: u32,
}

impl Serialize for PipelineStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.description())
    }
}

impl Pipeline {
    /// Take a snapshot for debugging.
    #[must_use]
    pub fn snapshot(&self) -> PipelineSnapshot {
        let progress = &self.progress;
        PipelineSnapshot {
            status: self.status.get(),
            node_count: self.graph.node_count(),
            ring_capacity: self.ring.capacity(),
            last_submitted: progress.last_submitted.load(Ordering::Acquire),
            last_completed: progress.last_completed.load(Ordering::Acquire),
            last_in_order_completed: progress.last_in_order_completed.load(Ordering::Acquire),
            last_shutter: progress.last_shutter.load(Ordering::Acquire),
            flushing: self.is_flushing(),
            shutter_violations: self.shutter_violations.load(Ordering::Relaxed),
            fence_leaks: self.fence_leaks.load(Ordering::Relaxed),
            invalid_sof_count: self.invalid_sof_count.load(Ordering::Acquire),
            references: self.references(),
        }
    }

    /// Shutter ordering violations seen so far.
    #[must_use]
    pub fn shutter_violations(&self) -> u64 {
        self.shutter_violations.load(Ordering::Relaxed)
    }
}

impl PipelineSnapshot {
    /// Requests admitted but not yet completed in order.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.last_submitted.saturating_sub(self.last_in_order_completed)
    }

    /// Whether every admitted request completed.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.last_completed >= self.last_submitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{nid, offline_pipeline};
    use crate::types::CaptureRequest;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_snapshot_of_fresh_pipeline() -> TestResult {
        let (pipeline, _session) = offline_pipeline(2)?;
        let snapshot = pipeline.snapshot();

        assert_eq!(snapshot.status, PipelineStatus::Finalized);
        assert_eq!(snapshot.node_count, 2);
        assert_eq!(snapshot.ring_capacity, 16);
        assert!(snapshot.is_idle());
        assert_eq!(snapshot.references, 1);
        Ok(())
    }

    #[test]
    fn test_snapshot_tracks_progress() -> TestResult {
        let (pipeline, _session) = offline_pipeline(1)?;
        pipeline.process_request(&CaptureRequest::single(1))?;
        pipeline.process_request(&CaptureRequest::single(2))?;
        pipeline.notify_node_request_done(nid(1), 1)?;

        let snapshot = pipeline.snapshot();
        assert_eq!(snapshot.last_submitted, 2);
        assert_eq!(snapshot.last_in_order_completed, 1);
        assert_eq!(snapshot.in_flight(), 1);
        assert!(!snapshot.is_idle());
        Ok(())
    }

    #[test]
    fn test_snapshot_serializes_status_description() -> TestResult {
        let (pipeline, _session) = offline_pipeline(1)?;
        let value = serde_json::to_value(pipeline.snapshot())?;
        assert_eq!(value["status"], "Finalized");
        Ok(())
    }
}
