//! Hardware link interface.
//!
//! Realtime pipelines own a link to the sensor and processing hardware.
//! Offline pipelines have none.

use campipe_errors::CodeResult;
use std::fmt;

use crate::lifecycle::DeactivateMode;
use crate::types::SyncMode;

/// Handle to the hardware behind a realtime pipeline.
pub trait HardwareLink: Send + Sync + fmt::Debug {
    /// Link the hardware devices of the pipeline.
    ///
    /// # Errors
    ///
    /// Returns a code if linking failed.
    fn link(&self) -> CodeResult;

    /// Unlink the hardware devices.
    ///
    /// # Errors
    ///
    /// Returns a code if unlinking failed.
    fn unlink(&self) -> CodeResult;

    /// Start streaming.
    ///
    /// # Errors
    ///
    /// Returns a code if the hardware did not start.
    fn stream_on(&self) -> CodeResult;

    /// Stop streaming.
    ///
    /// # Errors
    ///
    /// Returns a code if the hardware did not stop in `mode`.
    fn stream_off(&self, mode: DeactivateMode) -> CodeResult;

    /// Open a hardware request.
    ///
    /// # Errors
    ///
    /// Returns a code if the request could not be opened.
    fn open_request(&self, request_id: u64, sync_id: u64, mode: SyncMode, exposure_timeout_ms: u32) -> CodeResult;
}
