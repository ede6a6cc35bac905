//! Convenience re-exports for common test utilities.
//!
//! ```rust,ignore
//! use campipe_test_helpers::prelude::*;
//! ```

pub use crate::init_test_tracing;
pub use crate::must::{must, must_err, must_some, must_with};

#[cfg(feature = "mock")]
pub use crate::mock::{
    Harness, HardwareCall, MockDependencyQueue, MockHardwareLink, MockMetadataPool, MockNode, MockTuningData, NodeCall,
    RecordingSession, chain_graph,
};

/// Return type for tests that use `?`.
pub type TestResult = Result<(), Box<dyn std::error::Error>>;
