//! Prelude module for convenient error handling imports.
//!
//! # Example
//!
//! ```
//! use campipe_errors::prelude::*;
//!
//! fn check_depth(depth: u32) -> Result<u32> {
//!     if depth == 0 {
//!         return Err(ConfigError::zero("request_queue_depth").into());
//!     }
//!     Ok(depth)
//! }
//!
//! assert!(check_depth(0).is_err());
//! ```

pub use crate::{
    CodeResult, Result,
    code::ResultCode,
    common::{ErrorCategory, ErrorContext, ErrorSeverity, PipelineError, ResultExt},
    config::ConfigError,
    construction::ConstructionError,
    protocol::ProtocolViolation,
    request::RequestError,
    systemic::SystemicError,
};

/// Macro for creating an error context.
///
/// # Example
///
/// ```
/// use campipe_errors::prelude::*;
/// use campipe_errors::error_context;
///
/// let ctx = error_context!("stream_on", "pipeline" => "Preview_0", "depth" => 8);
/// assert_eq!(ctx.context.len(), 2);
/// ```
#[macro_export]
macro_rules! error_context {
    ($operation:expr $(, $key:expr => $value:expr)* $(,)?) => {
        {
            let ctx = $crate::ErrorContext::new($operation);
            $(
                let ctx = ctx.with($key, $value);
            )*
            ctx
        }
    };
}
