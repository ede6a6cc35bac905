//! Messages from the hardware synchronization layer.
//!
//! Frame messages carry a sync id and either a start-of-frame notification
//! or a bare tick. A notifying frame yields an SOF record, a per-node frame
//! callback and the shutter for the request admitted with that sync id. A
//! tick with no live request feeds the invalid-SOF watchdog.
//!
//! Shutters must be strictly increasing by one outside a flush. A gap is
//! counted and reported but never aborts the process.

use campipe_errors::{ProtocolViolation, RequestError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use tracing::{debug, error, info, trace, warn};

use crate::barrier::RequestSlot;
use crate::lifecycle::PipelineStatus;
use crate::pipeline::Pipeline;
use crate::session::{ErrorCode, ErrorRecord, ResultPayload};
use crate::types::INVALID_REQUEST_ID;

/// Per-frame timing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameMessage {
    /// Sync id the frame belongs to
    pub sync_id: u64,
    /// Hardware frame counter
    pub frame_count: u64,
    /// Start-of-frame timestamp in nanoseconds
    pub timestamp: u64,
    /// Whether this frame is a start-of-frame notification
    pub notify: bool,
}

/// Hardware error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HardwareErrorKind {
    /// Device failure
    Device,
    /// Whole-request failure
    Request,
    /// Single buffer failure
    Buffer,
    /// Sensor stopped producing frames
    SofFreeze,
    /// Recovery requested by the hardware
    Recovery,
    /// Sensor-level teardown requested
    FullRecovery,
}

impl HardwareErrorKind {
    /// Whether the kind asks for pipeline recovery.
    #[must_use]
    pub fn is_recovery(self) -> bool {
        matches!(self, Self::SofFreeze | Self::Recovery | Self::FullRecovery)
    }

    /// Whether the kind may arrive without a request id.
    #[must_use]
    pub fn is_device_wide(self) -> bool {
        self == Self::Device || self.is_recovery()
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Request => "request",
            Self::Buffer => "buffer",
            Self::SofFreeze => "sof-freeze",
            Self::Recovery => "recovery",
            Self::FullRecovery => "full-recovery",
        }
    }
}

/// Error reported by the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Sync id the error belongs to
    pub sync_id: u64,
    /// Error category
    pub kind: HardwareErrorKind,
    /// Device handle that reported the error
    pub device: u32,
    /// Resource handle on that device
    pub resource: u32,
}

/// Message from the synchronization layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMessage {
    /// Frame tick or start-of-frame
    Frame(FrameMessage),
    /// Hardware error
    Error(ErrorMessage),
}

impl Pipeline {
    /// Whether shutters and SOFs can be processed right now.
    ///
    /// Requires held resources, live requests in the session and no flush.
    #[must_use]
    pub fn can_process_message(&self) -> bool {
        self.status.get() != PipelineStatus::ResourcesReleased
            && self.session().live_pending_requests() > 0
            && !self.is_flushing()
    }

    /// Handle one synchronization message.
    ///
    /// # Errors
    ///
    /// Propagates shutter-ordering violations and invalid error reports.
    pub fn handle_sync_message(&self, message: &SyncMessage) -> Result<()> {
        match message {
            SyncMessage::Frame(frame) => {
                let request_id = self.request_for_sync_id(frame.sync_id);
                if !frame.notify {
                    self.check_for_recovery(request_id);
                    return Ok(());
                }
                if !self.can_process_message() {
                    debug!(pipeline = %self.identity, sync_id = frame.sync_id, "Frame message dropped");
                    return Ok(());
                }
                self.send_sof(frame, request_id);
                for node in self.graph.nodes() {
                    node.notify_frame(frame);
                }
                if request_id == INVALID_REQUEST_ID {
                    self.check_for_recovery(request_id);
                    return Ok(());
                }
                self.invalid_sof_count.store(0, Ordering::Release);
                self.send_shutter_notification(request_id, frame.timestamp)
            }
            SyncMessage::Error(err) => {
                if self.triggering_recovery.load(Ordering::Acquire) {
                    debug!(pipeline = %self.identity, kind = err.kind.as_str(), "Error dropped while recovering");
                    return Ok(());
                }
                let request_id = self.request_for_sync_id(err.sync_id);
                self.send_error_notification(request_id, err.kind)
            }
        }
    }

    /// Record an SOF for the session.
    pub fn send_sof(&self, frame: &FrameMessage, request_id: u64) {
        if self.triggering_recovery.load(Ordering::Acquire) {
            return;
        }
        let sequence_id = self
            .ring
            .owned(request_id)
            .ok()
            .map(|slot| slot.frame().first_sequence_id());
        self.deliver(
            request_id,
            ResultPayload::Sof {
                frame_number: frame.frame_count,
                timestamp: frame.timestamp,
                sequence_id,
            },
        );
    }

    /// Send the shutter for `request_id` captured at `timestamp`.
    ///
    /// Outside a flush the shutter must follow the previous one by exactly
    /// one request. A gap is counted and logged, the shutter is still
    /// delivered, and the violation is returned unless recovery is being
    /// triggered.
    ///
    /// # Errors
    ///
    /// - [`ProtocolViolation::ShutterOrder`] for an out-of-order shutter
    /// - a stale-slot violation if the slot was reused
    pub fn send_shutter_notification(&self, request_id: u64, timestamp: u64) -> Result<()> {
        if !self.can_process_message() {
            debug!(pipeline = %self.identity, request_id, "Shutter dropped");
            return Ok(());
        }

        let slot = self.ring.owned(request_id)?;
        let last = self.progress.last_shutter.load(Ordering::Acquire);
        let last_flush = self.flush_info.read().last_flush_request_id;
        let mut violation = None;
        if request_id.wrapping_sub(last) != 1 && last > last_flush {
            self.shutter_violations.fetch_add(1, Ordering::Relaxed);
            error!(
                pipeline = %self.identity,
                request_id,
                last_shutter = last,
                last_flush,
                "Shutter out of order"
            );
            if !self.triggering_recovery.load(Ordering::Acquire) {
                violation = Some(ProtocolViolation::ShutterOrder {
                    request_id,
                    last_shutter_request_id: last,
                });
            }
        }
        self.progress.last_shutter.store(request_id, Ordering::Release);

        slot.set_capture_timestamp(timestamp);
        self.emit_shutter(slot, request_id);

        match violation {
            Some(v) => Err(v.into()),
            None => Ok(()),
        }
    }

    /// Deliver shutters and resolve the metadata race for `slot`.
    pub(crate) fn emit_shutter(&self, slot: &RequestSlot, request_id: u64) {
        let frame = slot.frame();
        if slot.is_metadata_ready() {
            slot.mark_slowdown();
            info!(pipeline = %self.identity, request_id, "Shutter after metadata, pipeline slow");
        }

        if !self.triggering_recovery.load(Ordering::Acquire) {
            for (index, &sequence_id) in frame.sequence_ids.iter().enumerate() {
                self.deliver(
                    request_id,
                    ResultPayload::Shutter {
                        sequence_id,
                        timestamp: frame.timestamp_of(index),
                    },
                );
            }
        }
        slot.mark_sof_dispatched();

        if slot.claim_metadata_ready() {
            trace!(pipeline = %self.identity, request_id, "Shutter sent, metadata outstanding");
        } else if !self.is_request_in_error(request_id) {
            self.publish_metadata(slot, request_id);
        }
    }

    /// Forward a hardware error to the session.
    ///
    /// Recovery kinds are dropped while flushing. Only device-wide kinds may
    /// arrive without a request.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Hardware`] for a request-scoped kind without a
    ///   request id
    /// - a stale-slot violation if the slot was reused
    pub fn send_error_notification(&self, request_id: u64, kind: HardwareErrorKind) -> Result<()> {
        let flushing = self.is_flushing();
        if kind.is_recovery() && flushing {
            info!(pipeline = %self.identity, request_id, kind = kind.as_str(), "Recovery error dropped during flush");
            return Ok(());
        }

        let code = match kind {
            HardwareErrorKind::Device => ErrorCode::Device,
            HardwareErrorKind::Request => ErrorCode::Request,
            HardwareErrorKind::Buffer => ErrorCode::Buffer,
            HardwareErrorKind::SofFreeze | HardwareErrorKind::Recovery | HardwareErrorKind::FullRecovery => {
                ErrorCode::Recovery
            }
        };
        let full_recovery = kind == HardwareErrorKind::FullRecovery;

        if request_id == INVALID_REQUEST_ID {
            if !kind.is_device_wide() {
                error!(pipeline = %self.identity, kind = kind.as_str(), "Request error without a request");
                return Err(RequestError::Hardware {
                    request_id,
                    kind: kind.as_str().to_string(),
                }
                .into());
            }
            warn!(pipeline = %self.identity, kind = kind.as_str(), "Device-wide hardware error");
            self.deliver(
                INVALID_REQUEST_ID,
                ResultPayload::Error(ErrorRecord {
                    full_recovery,
                    ..ErrorRecord::new(code, 0)
                }),
            );
            return Ok(());
        }

        let slot = self.ring.owned(request_id)?;
        warn!(pipeline = %self.identity, request_id, kind = kind.as_str(), "Hardware error");
        for &sequence_id in &slot.frame().sequence_ids {
            self.deliver(
                request_id,
                ResultPayload::Error(ErrorRecord {
                    full_recovery,
                    ..ErrorRecord::new(code, sequence_id)
                }),
            );
        }
        Ok(())
    }

    /// Ask the session to recover from `request_id`.
    ///
    /// # Errors
    ///
    /// Returns a stale-slot violation if the slot was reused.
    pub fn send_recovery_error(&self, request_id: u64) -> Result<()> {
        let slot = self.ring.owned(request_id)?;
        for &sequence_id in &slot.frame().sequence_ids {
            self.deliver(
                request_id,
                ResultPayload::Error(ErrorRecord::new(ErrorCode::Recovery, sequence_id)),
            );
        }
        Ok(())
    }

    /// Invalid-SOF watchdog.
    ///
    /// Counts frames that map onto no live request while work is pending.
    /// After twice the request-queue depth such frames a recovery error is
    /// raised, unless some request recorded a slowdown, which defers it.
    pub fn check_for_recovery(&self, request_id: u64) {
        let completed = self.progress.last_completed.load(Ordering::Acquire);
        let submitted = self.progress.last_submitted.load(Ordering::Acquire);
        if request_id != INVALID_REQUEST_ID || completed >= submitted {
            self.invalid_sof_count.store(0, Ordering::Release);
            return;
        }
        if self.is_flushing() || !self.session().has_pending_results() {
            self.invalid_sof_count.store(0, Ordering::Release);
            return;
        }

        let depth = self.request_queue_depth().unwrap_or(self.config.default_request_queue_depth);
        let count = self.invalid_sof_count.fetch_add(1, Ordering::AcqRel);
        if count < depth.saturating_mul(2) {
            return;
        }

        let mut slowdown = false;
        for slot in self.ring.slots() {
            slowdown |= slot.take_slowdown();
        }
        self.invalid_sof_count.store(0, Ordering::Release);

        if slowdown {
            info!(pipeline = %self.identity, "Recovery deferred, pipeline reported slowdown");
            return;
        }
        if !self.config.watchdog_recovery_enabled {
            debug!(pipeline = %self.identity, "Watchdog recovery disabled");
            return;
        }

        warn!(
            pipeline = %self.identity,
            last_completed = completed,
            last_submitted = submitted,
            "No valid frame for pending requests, requesting recovery"
        );
        self.deliver(
            INVALID_REQUEST_ID,
            ResultPayload::Error(ErrorRecord {
                stream_id: Some(0),
                ..ErrorRecord::new(ErrorCode::Recovery, 0)
            }),
        );
    }

    /// Mark whether the session is driving a recovery.
    pub fn set_triggering_recovery(&self, triggering: bool) {
        self.triggering_recovery.store(triggering, Ordering::Release);
    }

    /// Frames seen since the last valid one while work was pending.
    #[must_use]
    pub fn invalid_sof_count(&self) -> u32 {
        self.invalid_sof_count.load(Ordering::Acquire)
    }
}
