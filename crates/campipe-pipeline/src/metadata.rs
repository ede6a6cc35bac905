//! Metadata pool and tuning data handles exposed to nodes.

use std::fmt;

/// Kind of per-frame metadata pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PoolKind {
    /// Framework input settings
    Input,
    /// Main result pool
    Main,
    /// Early result pool for partial metadata
    EarlyResult,
    /// Use-case wide settings
    Usecase,
    /// Results private to the pipeline
    Internal,
}

/// Per-frame metadata pool owned outside the pipeline.
pub trait MetadataPool: Send + Sync + fmt::Debug {
    /// Invalidate slots for requests in `(after, up_to]`.
    fn flush(&self, after: u64, up_to: u64);

    /// Size the pool to hold `slots` requests in flight.
    fn set_depth(&self, slots: usize) {
        let _ = slots;
    }
}

/// Tuning data shared by the nodes of a pipeline.
pub trait TuningData: Send + Sync + fmt::Debug {
    /// Whether tuning data was loaded.
    fn is_loaded(&self) -> bool;
}
