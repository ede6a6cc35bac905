//! Stream lifecycle state machine.
//!
//! ```text
//! Uninitialized -> Initialized -> Finalized
//!                                    |
//!        +---------------------------+
//!        v
//! ResourcesAcquired -> PartialStreamOn -> StreamOn -> StreamOff -> ResourcesReleased
//!        ^                                                               |
//!        +---------------------------------------------------------------+
//! ```
//!
//! Resource acquire and release are serialized by one lock so they never
//! interleave for the same pipeline. Stream-on blocks on the config-done
//! condition until every config node has submitted for the requests of the
//! current stream cycle, a timeout expires, or a flush aborts the wait.

use campipe_errors::{RequestError, Result, SystemicError};
use std::ops::BitOr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::pipeline::Pipeline;

/// Lifecycle status, in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum PipelineStatus {
    /// Allocated, not yet initialized
    #[default]
    Uninitialized = 0,
    /// Created with a graph
    Initialized = 1,
    /// Graph validated and negotiated
    Finalized = 2,
    /// Node resources held
    ResourcesAcquired = 3,
    /// Streaming with some devices held in standby
    PartialStreamOn = 4,
    /// Streaming
    StreamOn = 5,
    /// Stopped, resources still held
    StreamOff = 6,
    /// Node resources released
    ResourcesReleased = 7,
}

/// Description of every status, indexed by discriminant.
const STATUS_DESCRIPTIONS: [(PipelineStatus, &str); PipelineStatus::COUNT] = [
    (PipelineStatus::Uninitialized, "Uninitialized"),
    (PipelineStatus::Initialized, "Initialized"),
    (PipelineStatus::Finalized, "Finalized"),
    (PipelineStatus::ResourcesAcquired, "Resources Acquired"),
    (PipelineStatus::PartialStreamOn, "Partial Stream On"),
    (PipelineStatus::StreamOn, "Stream On"),
    (PipelineStatus::StreamOff, "Stream Off"),
    (PipelineStatus::ResourcesReleased, "Resources Released"),
];

const _: () = {
    let mut i = 0;
    while i < STATUS_DESCRIPTIONS.len() {
        assert!(STATUS_DESCRIPTIONS[i].0 as usize == i);
        i += 1;
    }
};

impl PipelineStatus {
    /// Number of statuses.
    pub const COUNT: usize = 8;

    /// Convert from the raw discriminant.
    #[must_use]
    pub fn from_raw(value: u8) -> Option<Self> {
        STATUS_DESCRIPTIONS.get(usize::from(value)).map(|(status, _)| *status)
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(self) -> &'static str {
        STATUS_DESCRIPTIONS
            .get(self as usize)
            .map_or("Unknown", |(_, description)| description)
    }

    /// Whether the status is one of the transient construction states.
    #[must_use]
    pub fn is_construction(self) -> bool {
        matches!(self, Self::Uninitialized | Self::Initialized)
    }
}

impl core::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Atomic holder of the lifecycle status.
#[derive(Debug, Default)]
pub struct StatusCell {
    status: AtomicU8,
}

impl StatusCell {
    /// Current status.
    #[must_use]
    pub fn get(&self) -> PipelineStatus {
        PipelineStatus::from_raw(self.status.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Store `status`, logging the change unless it is a construction state.
    pub fn set(&self, status: PipelineStatus, pipeline: &str) -> PipelineStatus {
        let previous = PipelineStatus::from_raw(self.status.swap(status as u8, Ordering::AcqRel))
            .unwrap_or_default();
        if previous != status && !status.is_construction() {
            info!(
                pipeline,
                from = previous.description(),
                to = status.description(),
                "Pipeline status changed"
            );
        }
        previous
    }

    /// Move to `to` if the current status is `from`.
    ///
    /// Returns the status observed.
    pub fn transition(&self, from: PipelineStatus, to: PipelineStatus) -> std::result::Result<(), PipelineStatus> {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|raw| PipelineStatus::from_raw(raw).unwrap_or_default())
    }
}

/// How far stream-off tears the pipeline down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeactivateMode(u32);

impl DeactivateMode {
    /// Full stop
    pub const DEFAULT: Self = Self(0);
    /// Keep the sensor powered in standby
    pub const SENSOR_STANDBY: Self = Self(1 << 0);
    /// Stop only the realtime devices
    pub const REALTIME_DEVICES: Self = Self(1 << 1);
    /// Unlink the hardware after stopping
    pub const UNLINK_PIPELINE: Self = Self(1 << 2);

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    /// Whether some devices stay active.
    #[must_use]
    pub const fn is_partial(self) -> bool {
        self.contains(Self::SENSOR_STANDBY) || self.contains(Self::REALTIME_DEVICES)
    }
}

impl BitOr for DeactivateMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// State shared with the stream-on config-done waiter.
#[derive(Debug, Default)]
pub(crate) struct ConfigDoneState {
    /// Requests whose config axis completed in this stream cycle
    pub count: u64,
    /// A stream-on is blocked waiting
    pub waiting: bool,
    /// A flush asked the waiter to give up
    pub aborted: bool,
}

/// State behind `wait_until_stream_on_done`.
#[derive(Debug, Default)]
pub(crate) struct StreamOnWait {
    pub done: bool,
    pub generation: u64,
}

impl Pipeline {
    /// Acquire resources for every node.
    ///
    /// Allowed from `Finalized`, `ResourcesReleased` and `PartialStreamOn`;
    /// a no-op when resources are already held. On a node failure the nodes
    /// that already acquired release again in reverse order.
    ///
    /// # Errors
    ///
    /// Returns [`SystemicError::ResourceAcquisition`] naming the failing
    /// node, or [`SystemicError::InvalidState`] from other states.
    pub fn acquire_resources(&self) -> Result<()> {
        let _guard = self.resource_lock.lock();
        let status = self.status.get();

        match status {
            PipelineStatus::Finalized | PipelineStatus::ResourcesReleased | PipelineStatus::PartialStreamOn => {}
            PipelineStatus::ResourcesAcquired | PipelineStatus::StreamOn | PipelineStatus::StreamOff => {
                debug!(pipeline = %self.identity, status = %status, "Resources already acquired");
                return Ok(());
            }
            _ => {
                return Err(SystemicError::InvalidState {
                    operation: "acquire resources",
                    state: status.description(),
                }
                .into());
            }
        }

        let order = self.walk_forward_order()?;
        let mut acquired = Vec::with_capacity(order.len());
        for index in order.iter() {
            let Some(node) = self.graph.node(index) else {
                continue;
            };
            if let Err(code) = node.acquire_resources() {
                error!(pipeline = %self.identity, node = node.name(), %code, "Node failed to acquire resources");
                for &done in acquired.iter().rev() {
                    if let Some(prev) = self.graph.node(done)
                        && let Err(code) = prev.release_resources(DeactivateMode::DEFAULT)
                    {
                        warn!(pipeline = %self.identity, node = prev.name(), %code, "Rollback release failed");
                    }
                }
                if status != PipelineStatus::PartialStreamOn {
                    self.status.set(PipelineStatus::ResourcesReleased, &self.identity);
                }
                return Err(SystemicError::ResourceAcquisition {
                    node: node.name().to_string(),
                    code,
                }
                .into());
            }
            acquired.push(index);
        }

        if status != PipelineStatus::PartialStreamOn {
            self.status.set(PipelineStatus::ResourcesAcquired, &self.identity);
        }
        Ok(())
    }

    /// Release resources of every node in reverse walk-forward order.
    ///
    /// Allowed from `ResourcesAcquired`, `Initialized`, `StreamOff` and
    /// `PartialStreamOn`; a no-op from other states. Every node is released
    /// even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns [`SystemicError::ResourceRelease`] for the first failing node.
    pub fn release_resources(&self, mode: DeactivateMode) -> Result<()> {
        let _guard = self.resource_lock.lock();
        let status = self.status.get();

        if !matches!(
            status,
            PipelineStatus::ResourcesAcquired
                | PipelineStatus::Initialized
                | PipelineStatus::StreamOff
                | PipelineStatus::PartialStreamOn
        ) {
            debug!(pipeline = %self.identity, status = %status, "Nothing to release");
            return Ok(());
        }

        let mut first_error = None;
        let indices: Vec<usize> = match self.walk_forward_order() {
            Ok(order) => order.iter().rev().collect(),
            Err(_) => (0..self.graph.node_count()).rev().collect(),
        };
        for index in indices {
            let Some(node) = self.graph.node(index) else {
                continue;
            };
            if let Err(code) = node.release_resources(mode) {
                warn!(pipeline = %self.identity, node = node.name(), %code, "Node failed to release resources");
                first_error.get_or_insert(SystemicError::ResourceRelease {
                    node: node.name().to_string(),
                    code,
                });
            }
        }

        if !mode.contains(DeactivateMode::SENSOR_STANDBY) {
            self.status.set(PipelineStatus::ResourcesReleased, &self.identity);
        }

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Acquire hardware resources ahead of stream-on.
    ///
    /// # Errors
    ///
    /// Returns the acquisition failure; the pipeline is left in
    /// `ResourcesReleased`.
    pub fn prepare_stream_on(&self) -> Result<()> {
        self.acquire_resources()
    }

    /// Start streaming.
    ///
    /// For realtime pipelines this links the hardware, acquires resources,
    /// waits for config-done, streams the hardware on and finally starts
    /// every node. Any failure re-arms the initial config, unlinks and
    /// releases resources.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Cancelled`] if a flush is active or aborts the
    ///   config-done wait
    /// - [`SystemicError::StreamOnTimeout`] if config-done never arrived
    /// - [`SystemicError::Hardware`] / [`SystemicError::NodeStream`] for
    ///   hardware or node failures
    pub fn stream_on(&self) -> Result<()> {
        let status = self.status.get();
        match status {
            PipelineStatus::StreamOn => return Ok(()),
            PipelineStatus::Uninitialized | PipelineStatus::Initialized => {
                return Err(SystemicError::InvalidState {
                    operation: "stream on",
                    state: status.description(),
                }
                .into());
            }
            _ => {}
        }

        if let Some(hardware) = self.hardware() {
            hardware.link().map_err(|code| SystemicError::Hardware { operation: "link", code })?;
        }

        if let Err(err) = self.acquire_resources() {
            self.unlink_quietly();
            return Err(err);
        }

        if let Err(err) = self.wait_for_config_done().and_then(|()| self.start_hardware()) {
            self.abandon_stream_on();
            return Err(err);
        }

        self.status.set(PipelineStatus::StreamOn, &self.identity);
        self.notify_stream_on_done();

        for index in self.walk_forward_order()?.iter() {
            let Some(node) = self.graph.node(index) else {
                continue;
            };
            if let Err(code) = node.on_stream_on() {
                error!(pipeline = %self.identity, node = node.name(), %code, "Node failed to stream on");
                if let Err(err) = self.stream_off(DeactivateMode::DEFAULT) {
                    warn!(pipeline = %self.identity, error = %err, "Stream off after failed stream on");
                }
                self.abandon_stream_on();
                return Err(SystemicError::NodeStream {
                    node: node.name().to_string(),
                    operation: "stream on",
                    code,
                }
                .into());
            }
        }

        info!(pipeline = %self.identity, "Stream on complete");
        Ok(())
    }

    /// Stop streaming.
    ///
    /// Only acts from `StreamOn` or `PartialStreamOn` and is safe after a
    /// stream-on that never completed. Every node is stopped even if an
    /// earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns the first node failure after the teardown has finished.
    pub fn stream_off(&self, mode: DeactivateMode) -> Result<()> {
        let status = self.status.get();
        if !matches!(status, PipelineStatus::StreamOn | PipelineStatus::PartialStreamOn) {
            debug!(pipeline = %self.identity, status = %status, "Stream off ignored");
            return Ok(());
        }

        let mut mode = mode;
        let mut first_error = None;

        for index in self.walk_forward_order()?.iter() {
            let Some(node) = self.graph.node(index) else {
                continue;
            };
            if let Err(code) = node.on_stream_off(mode) {
                warn!(pipeline = %self.identity, node = node.name(), %code, "Node failed to stream off");
                first_error.get_or_insert(SystemicError::NodeStream {
                    node: node.name().to_string(),
                    operation: "stream off",
                    code,
                });
            }
        }

        if let Some(hardware) = self.hardware()
            && let Err(code) = hardware.stream_off(mode)
        {
            warn!(pipeline = %self.identity, %code, "Hardware stream off failed, forcing full teardown");
            mode = DeactivateMode::DEFAULT;
        }

        self.config_done.lock().count = 0;
        self.initial_config_pending.store(true, Ordering::Release);

        let last_request_id = self.session().last_request_id();
        self.progress.last_request_id.store(last_request_id, Ordering::Release);
        {
            let mut flush_info = self.flush_info.write();
            flush_info.has_flush_occurred = false;
            let submitted = self.progress.last_submitted.load(Ordering::Acquire);
            flush_info.last_flush_request_id = flush_info.last_flush_request_id.max(submitted);
        }

        let next = if mode.is_partial() {
            PipelineStatus::PartialStreamOn
        } else {
            PipelineStatus::StreamOff
        };
        self.status.set(next, &self.identity);
        self.stream_on_wait.lock().done = false;

        if let Err(err) = self.release_resources(mode) {
            first_error.get_or_insert(match err {
                campipe_errors::PipelineError::Systemic(e) => e,
                other => SystemicError::Hardware {
                    operation: "release resources",
                    code: other.code(),
                },
            });
        }

        if mode.contains(DeactivateMode::UNLINK_PIPELINE) {
            self.unlink_quietly();
        }

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Block until stream-on completes.
    ///
    /// # Errors
    ///
    /// - [`SystemicError::StreamOnDoneTimeout`] after the stream-on timeout
    /// - [`SystemicError::InvalidState`] if woken by
    ///   [`notify_stream_on_wait`](Self::notify_stream_on_wait) before
    ///   stream-on completed
    pub fn wait_until_stream_on_done(&self) -> Result<()> {
        let timeout = self.config.stream_on_timeout;
        let deadline = Instant::now() + timeout;
        let mut wait = self.stream_on_wait.lock();
        let generation = wait.generation;

        while !wait.done {
            if wait.generation != generation {
                return Err(SystemicError::InvalidState {
                    operation: "wait for stream on",
                    state: self.status.get().description(),
                }
                .into());
            }
            if self.stream_on_signal.wait_until(&mut wait, deadline).timed_out() && !wait.done {
                return Err(SystemicError::StreamOnDoneTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Wake every thread blocked in
    /// [`wait_until_stream_on_done`](Self::wait_until_stream_on_done).
    pub fn notify_stream_on_wait(&self) {
        let mut wait = self.stream_on_wait.lock();
        wait.generation = wait.generation.wrapping_add(1);
        self.stream_on_signal.notify_all();
    }

    /// Whether a stream-on is blocked on config-done.
    #[must_use]
    pub fn is_waiting_for_config_done(&self) -> bool {
        self.config_done.lock().waiting
    }

    fn notify_stream_on_done(&self) {
        let mut wait = self.stream_on_wait.lock();
        wait.done = true;
        self.stream_on_signal.notify_all();
    }

    /// Wait until every request submitted in this stream cycle has its
    /// hardware configuration submitted by all config nodes.
    fn wait_for_config_done(&self) -> Result<()> {
        let targets = self.axis_targets()?;
        if !self.config.realtime || targets.config == 0 {
            return Ok(());
        }

        let expected = self
            .progress
            .last_submitted
            .load(Ordering::Acquire)
            .saturating_sub(self.progress.last_request_id.load(Ordering::Acquire));
        let timeout = self.config.stream_on_timeout;
        let deadline = Instant::now() + timeout;

        // The flush flag is stored before `abort_config_done` takes this lock,
        // so a flush that lands before the wait is seen here.
        let mut state = self.config_done.lock();
        state.waiting = true;
        while state.count < expected && !state.aborted && !self.is_flushing() {
            if self.config_done_signal.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.waiting = false;
        let aborted = std::mem::take(&mut state.aborted) || self.is_flushing();
        let done = state.count;
        let timed_out = !aborted && done < expected;
        drop(state);

        if aborted {
            info!(pipeline = %self.identity, "Stream on config wait aborted by flush");
            return Err(RequestError::cancelled(self.progress.last_submitted.load(Ordering::Acquire)).into());
        }
        if timed_out {
            error!(pipeline = %self.identity, done, expected, "Timed out waiting for config done");
            return Err(SystemicError::StreamOnTimeout {
                timeout_ms: timeout.as_millis() as u64,
                done,
                expected,
            }
            .into());
        }
        Ok(())
    }

    fn start_hardware(&self) -> Result<()> {
        if let Some(hardware) = self.hardware() {
            hardware
                .stream_on()
                .map_err(|code| SystemicError::Hardware { operation: "stream on", code })?;
        }
        Ok(())
    }

    fn abandon_stream_on(&self) {
        self.initial_config_pending.store(true, Ordering::Release);
        self.unlink_quietly();
        if let Err(err) = self.release_resources(DeactivateMode::DEFAULT) {
            warn!(pipeline = %self.identity, error = %err, "Release after failed stream on");
        }
    }

    fn unlink_quietly(&self) {
        if let Some(hardware) = self.hardware()
            && let Err(code) = hardware.unlink()
        {
            warn!(pipeline = %self.identity, %code, "Hardware unlink failed");
        }
    }
}
