//! Unit tests for the error taxonomy.

use campipe_errors::prelude::*;
use campipe_errors::error_context;

#[test]
fn test_every_class_maps_to_its_category() {
    let cases: Vec<(PipelineError, ErrorCategory)> = vec![
        (ConstructionError::EmptyGraph.into(), ErrorCategory::Construction),
        (RequestError::cancelled(1).into(), ErrorCategory::Request),
        (
            SystemicError::StreamOnDoneTimeout { timeout_ms: 700 }.into(),
            ErrorCategory::Systemic,
        ),
        (
            ProtocolViolation::StaleSlot {
                request_id: 1,
                slot_request_id: 9,
            }
            .into(),
            ErrorCategory::Protocol,
        ),
        (ConfigError::EmptyName.into(), ErrorCategory::Config),
        (ResultCode::Busy.into(), ErrorCategory::Other),
    ];

    for (err, category) in cases {
        assert_eq!(err.category(), category, "{err}");
    }
}

#[test]
fn test_systemic_error_codes() {
    let err: PipelineError = SystemicError::AllNodesDoneTimeout {
        timeout_ms: 300,
        last_completed: 4,
        last_submitted: 6,
    }
    .into();
    assert_eq!(err.code(), ResultCode::TimedOut);
    assert!(err.code().is_retryable());
    assert_eq!(err.request_id(), None);
}

#[test]
fn test_unrecoverable_carries_request_id() {
    let err: PipelineError = SystemicError::Unrecoverable {
        request_id: Some(21),
        full_recovery: false,
    }
    .into();
    assert_eq!(err.request_id(), Some(21));
    assert_eq!(err.severity(), ErrorSeverity::Critical);
}

#[test]
fn test_cancellation_is_not_a_failure() {
    let err: PipelineError = RequestError::NoNodesEnabled { request_id: 2 }.into();
    assert!(err.is_cancelled());
    assert!(err.is_recoverable());
    assert_eq!(err.severity(), ErrorSeverity::Info);
}

#[test]
fn test_context_wraps_message() {
    let result: std::result::Result<(), ConfigError> = Err(ConfigError::zero("max_batched_frames"));
    let ctx = error_context!("create", "pipeline" => "Snapshot_1");
    let msg = result.context(ctx).err().map(|e| e.to_string());
    assert_eq!(
        msg.as_deref(),
        Some(
            "operation: create, pipeline: Snapshot_1: Configuration error: max_batched_frames must be greater than 0"
        )
    );
}

#[test]
fn test_error_context_macro_without_pairs() {
    let ctx = error_context!("flush");
    assert!(ctx.context.is_empty());
    assert_eq!(ctx.to_string(), "operation: flush");
}
