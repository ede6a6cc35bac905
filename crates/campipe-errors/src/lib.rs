//! Error taxonomy for the campipe request-orchestration core.
//!
//! Failures in a capture pipeline fall into four classes, and each class
//! gets its own enum:
//!
//! - [`construction`]: graph registration, validation and negotiation errors.
//!   These are reported from creation or finalize and are never retried.
//! - [`request`]: errors scoped to one request id. They are isolated to that
//!   request and its dependents.
//! - [`systemic`]: pipeline-wide failures such as resource acquisition,
//!   bounded-wait timeouts and unrecoverable hardware faults.
//! - [`protocol`]: broken internal invariants, logged as defects.
//!
//! [`config`] covers invalid configuration, and [`code`] holds the compact
//! [`ResultCode`] used on the node-callback hot path.
//!
//! # Example
//!
//! ```
//! use campipe_errors::prelude::*;
//!
//! fn open(request_id: u64, flushing: bool) -> Result<()> {
//!     if flushing {
//!         return Err(RequestError::cancelled(request_id).into());
//!     }
//!     Ok(())
//! }
//!
//! let err = open(7, true).err();
//! assert_eq!(err.map(|e| e.code()), Some(ResultCode::Cancelled));
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod code;
pub mod common;
pub mod config;
pub mod construction;
pub mod prelude;
pub mod protocol;
pub mod request;
pub mod systemic;

pub use code::ResultCode;
pub use common::{ErrorCategory, ErrorContext, ErrorSeverity, PipelineError, ResultExt};
pub use config::ConfigError;
pub use construction::ConstructionError;
pub use protocol::ProtocolViolation;
pub use request::RequestError;
pub use systemic::SystemicError;

/// A specialized `Result` type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// A specialized `Result` type for the node-callback hot path.
pub type CodeResult<T = ()> = std::result::Result<T, ResultCode>;
