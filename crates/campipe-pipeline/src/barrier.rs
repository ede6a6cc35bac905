//! Per-request completion barrier.
//!
//! The [`RequestRing`] holds one [`RequestSlot`] per in-flight request,
//! indexed by `request_id % capacity`. Capacity is twice the maximum admitted
//! depth, so a node may still report against request `n` after request
//! `n + depth` has started.
//!
//! Each slot counts node completions on four independent axes. A completion
//! increments the axis counter and the single caller that observes the
//! expected count runs the axis action. No lock is taken on this path.
//!
//! Flag roles:
//! - `metadata_ready`: arbitration between the shutter and the
//!   all-nodes-done trigger. Whoever finds it already set publishes.
//! - `sof_dispatched`: the shutter for this request was sent.
//! - `slowdown`: the shutter arrived after metadata was already ready.

use campipe_errors::{ProtocolViolation, Result};
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::fence::FenceList;
use crate::types::{CaptureRequest, INVALID_REQUEST_ID};

/// Completion axis a node reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionAxis {
    /// Node produced all outputs for the request
    Output,
    /// Node published its full metadata
    Metadata,
    /// Node published its partial metadata
    PartialMetadata,
    /// Node submitted its hardware configuration
    Config,
}

impl CompletionAxis {
    /// All axes.
    pub const ALL: [CompletionAxis; 4] = [
        CompletionAxis::Output,
        CompletionAxis::Metadata,
        CompletionAxis::PartialMetadata,
        CompletionAxis::Config,
    ];

    /// Axis name for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionAxis::Output => "output",
            CompletionAxis::Metadata => "metadata",
            CompletionAxis::PartialMetadata => "partial-metadata",
            CompletionAxis::Config => "config",
        }
    }
}

/// Number of nodes expected to report on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisTargets {
    /// Nodes reporting output completion
    pub output: u32,
    /// Nodes reporting metadata completion
    pub metadata: u32,
    /// Nodes reporting partial metadata
    pub partial_metadata: u32,
    /// Nodes submitting hardware configuration
    pub config: u32,
}

impl AxisTargets {
    /// Expected count for `axis`.
    #[must_use]
    pub fn get(&self, axis: CompletionAxis) -> u32 {
        match axis {
            CompletionAxis::Output => self.output,
            CompletionAxis::Metadata => self.metadata,
            CompletionAxis::PartialMetadata => self.partial_metadata,
            CompletionAxis::Config => self.config,
        }
    }
}

/// Frame data copied into the slot when the request is admitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotFrame {
    /// Sequence id per batched frame
    pub sequence_ids: SmallVec<[u32; 4]>,
    /// Interval between batched frames in nanoseconds
    pub batch_interval_ns: u64,
    /// Capture timestamp of the first frame, set by the shutter
    pub capture_timestamp: u64,
}

impl SlotFrame {
    /// Sequence id of the first frame.
    #[must_use]
    pub fn first_sequence_id(&self) -> u32 {
        self.sequence_ids.first().copied().unwrap_or_default()
    }

    /// Timestamp of batch `index`.
    #[must_use]
    pub fn timestamp_of(&self, index: usize) -> u64 {
        self.capture_timestamp
            .saturating_add(self.batch_interval_ns.saturating_mul(index as u64))
    }
}

/// Bookkeeping for one in-flight request.
#[derive(Debug, Default)]
pub struct RequestSlot {
    request_id: AtomicU64,
    output_done: AtomicU32,
    metadata_done: AtomicU32,
    partial_metadata_done: AtomicU32,
    config_done: AtomicU32,
    metadata_ready: AtomicBool,
    sof_dispatched: AtomicBool,
    slowdown: AtomicBool,
    buffer_done: AtomicU32,
    fences: Mutex<FenceList>,
    frame: RwLock<SlotFrame>,
}

impl RequestSlot {
    fn counter(&self, axis: CompletionAxis) -> &AtomicU32 {
        match axis {
            CompletionAxis::Output => &self.output_done,
            CompletionAxis::Metadata => &self.metadata_done,
            CompletionAxis::PartialMetadata => &self.partial_metadata_done,
            CompletionAxis::Config => &self.config_done,
        }
    }

    /// Request currently attributed to this slot.
    #[must_use]
    pub fn request_id(&self) -> u64 {
        self.request_id.load(Ordering::Acquire)
    }

    /// Record one node completion on `axis`.
    ///
    /// Returns `true` for exactly one caller: the one whose increment makes
    /// the counter equal `expected`.
    pub fn complete(&self, axis: CompletionAxis, expected: u32) -> bool {
        let count = self.counter(axis).fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        count == expected
    }

    /// Current completion count on `axis`.
    #[must_use]
    pub fn count(&self, axis: CompletionAxis) -> u32 {
        self.counter(axis).load(Ordering::Acquire)
    }

    /// Attempt to flip `metadata_ready` from unset to set.
    ///
    /// Returns `true` if this caller set the flag, meaning the other trigger
    /// is still outstanding and will publish.
    pub fn claim_metadata_ready(&self) -> bool {
        self.metadata_ready
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether `metadata_ready` is set.
    #[must_use]
    pub fn is_metadata_ready(&self) -> bool {
        self.metadata_ready.load(Ordering::Acquire)
    }

    /// Mark the shutter as dispatched.
    pub fn mark_sof_dispatched(&self) {
        self.sof_dispatched.store(true, Ordering::Release);
    }

    /// Whether the shutter was dispatched.
    #[must_use]
    pub fn is_sof_dispatched(&self) -> bool {
        self.sof_dispatched.load(Ordering::Acquire)
    }

    /// Record that the shutter arrived after metadata was ready.
    pub fn mark_slowdown(&self) {
        self.slowdown.store(true, Ordering::Release);
    }

    /// Whether slowdown was recorded.
    #[must_use]
    pub fn is_slowdown(&self) -> bool {
        self.slowdown.load(Ordering::Acquire)
    }

    /// Clear slowdown, returning whether it was set.
    pub fn take_slowdown(&self) -> bool {
        self.slowdown.swap(false, Ordering::AcqRel)
    }

    /// Count one delivered buffer, returning the new total.
    pub fn buffer_done(&self) -> u32 {
        self.buffer_done.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    /// Fence list guarded by its own lock.
    pub fn fences(&self) -> &Mutex<FenceList> {
        &self.fences
    }

    /// Copy of the frame data.
    #[must_use]
    pub fn frame(&self) -> SlotFrame {
        self.frame.read().clone()
    }

    /// Record the capture timestamp of the first frame.
    pub fn set_capture_timestamp(&self, timestamp: u64) {
        self.frame.write().capture_timestamp = timestamp;
    }

    fn reset(&self, request: &CaptureRequest, batch_interval_ns: u64) {
        for axis in CompletionAxis::ALL {
            self.counter(axis).store(0, Ordering::Release);
        }
        self.metadata_ready.store(false, Ordering::Release);
        self.sof_dispatched.store(false, Ordering::Release);
        self.slowdown.store(false, Ordering::Release);
        self.buffer_done.store(0, Ordering::Release);
        {
            let mut frame = self.frame.write();
            frame.sequence_ids = request.batches.iter().map(|b| b.sequence_id).collect();
            if frame.sequence_ids.is_empty() {
                // Ids past the sequence range saturate rather than alias a
                // low sequence id.
                frame.sequence_ids.push(u32::try_from(request.request_id).unwrap_or(u32::MAX));
            }
            frame.batch_interval_ns = batch_interval_ns;
            frame.capture_timestamp = 0;
        }
        self.request_id.store(request.request_id, Ordering::Release);
    }
}

/// Fixed ring of request slots.
#[derive(Debug)]
pub struct RequestRing {
    slots: Box<[RequestSlot]>,
}

impl RequestRing {
    /// Create a ring with `capacity` slots, at least one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity.max(1)).map(|_| RequestSlot::default()).collect();
        Self { slots }
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Every slot, in index order.
    pub fn slots(&self) -> impl Iterator<Item = &RequestSlot> {
        self.slots.iter()
    }

    /// Slot index for `request_id`.
    #[must_use]
    pub fn index_of(&self, request_id: u64) -> usize {
        (request_id % self.slots.len() as u64) as usize
    }

    /// Slot for `request_id`, regardless of which request owns it.
    #[must_use]
    pub fn slot(&self, request_id: u64) -> Option<&RequestSlot> {
        self.slots.get(self.index_of(request_id))
    }

    /// Slot owned by `request_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::StaleSlot`] if the slot has been reused
    /// by another request; the slot is left untouched.
    pub fn owned(&self, request_id: u64) -> Result<&RequestSlot> {
        let slot = self.slot(request_id).ok_or(ProtocolViolation::StaleSlot {
            request_id,
            slot_request_id: INVALID_REQUEST_ID,
        })?;
        let owner = slot.request_id();
        if owner != request_id {
            return Err(ProtocolViolation::StaleSlot {
                request_id,
                slot_request_id: owner,
            }
            .into());
        }
        Ok(slot)
    }

    /// Reset the slot for `request` and attribute it to the new request.
    ///
    /// Leftover fences from the previous owner are dropped and reported as
    /// [`ProtocolViolation::FenceLeak`] after the slot is reset, so the new
    /// request can still proceed.
    pub fn claim(
        &self,
        request: &CaptureRequest,
        batch_interval_ns: u64,
    ) -> (Option<&RequestSlot>, Option<ProtocolViolation>) {
        let Some(slot) = self.slot(request.request_id) else {
            return (None, None);
        };

        let previous = slot.request_id();
        let leaked = slot.fences.lock().clear();
        slot.reset(request, batch_interval_ns);

        let violation = (leaked > 0).then_some(ProtocolViolation::FenceLeak {
            request_id: previous,
            remaining: leaked,
        });
        (Some(slot), violation)
    }
}
