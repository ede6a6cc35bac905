//! Snapshot tests for session-visible output.
//!
//! Record formatting, error messages and the serialized pipeline snapshot are
//! read by logs and tooling, so changes to them should be deliberate.

use campipe_errors::{ProtocolViolation, ResultCode, SystemicError};
use campipe_pipeline::prelude::*;
use campipe_test_helpers::prelude::*;
use insta::{assert_debug_snapshot, assert_snapshot};

fn offline_harness(nodes: u32) -> Harness {
    let config = must(PipelineConfig::builder().name("Snapshot").realtime(false).build());
    let nodes = (1..=nodes).map(|id| MockNode::new(id, &format!("node{id}"))).collect();
    must(Harness::chain(config, nodes))
}

#[test]
fn snapshot_result_record_display() {
    let record = ResultRecord {
        pipeline_index: 0,
        request_id: 3,
        payload: ResultPayload::Shutter {
            sequence_id: 3,
            timestamp: 1_000,
        },
    };
    assert_snapshot!(record.to_string(), @"pipeline 0 request 3 shutter");
}

#[test]
fn snapshot_status_descriptions() {
    let descriptions: Vec<&str> = (0..PipelineStatus::COUNT as u8)
        .filter_map(PipelineStatus::from_raw)
        .map(PipelineStatus::description)
        .collect();
    assert_snapshot!(descriptions.join("\n"), @r"
    Uninitialized
    Initialized
    Finalized
    Resources Acquired
    Partial Stream On
    Stream On
    Stream Off
    Resources Released
    ");
}

#[test]
fn snapshot_offline_request_records() -> TestResult {
    let harness = offline_harness(1);
    harness.pipeline.process_request(&CaptureRequest::single(1))?;
    harness.complete_all(1, CompletionAxis::Metadata)?;
    harness.complete_all(1, CompletionAxis::Output)?;
    harness.pipeline.process_metadata_buffer_done(1)?;

    let lines: Vec<String> = harness.session.records().iter().map(ToString::to_string).collect();
    assert_snapshot!(lines.join("\n"), @r"
    pipeline 0 request 1 shutter
    pipeline 0 request 1 metadata
    pipeline 0 request 1 meta-buffer-done
    ");
    Ok(())
}

#[test]
fn snapshot_error_messages() {
    let errors = [
        PipelineError::from(ProtocolViolation::StaleSlot {
            request_id: 1,
            slot_request_id: 9,
        }),
        PipelineError::from(SystemicError::StreamOnTimeout {
            timeout_ms: 700,
            done: 0,
            expected: 2,
        }),
        PipelineError::from(ResultCode::Busy),
    ];
    let lines: Vec<String> = errors.iter().map(ToString::to_string).collect();
    assert_snapshot!(lines.join("\n"), @r"
    Protocol violation: Completion for request 1 hit slot owned by request 9
    Systemic error: Stream on timed out after 700ms: 0 of 2 config requests done
    Resource busy
    ");
}

#[test]
fn snapshot_error_record_debug() {
    assert_debug_snapshot!(ErrorRecord::new(ErrorCode::Buffer, 4), @r"
    ErrorRecord {
        code: Buffer,
        sequence_id: 4,
        stream_id: None,
        buffer: None,
        full_recovery: false,
    }
    ");
}

#[test]
fn snapshot_fresh_pipeline_json() -> TestResult {
    let harness = offline_harness(2);
    let json = serde_json::to_string_pretty(&harness.pipeline.snapshot())?;
    assert_snapshot!(json, @r#"
    {
      "status": "Finalized",
      "node_count": 2,
      "ring_capacity": 16,
      "last_submitted": 0,
      "last_completed": 0,
      "last_in_order_completed": 0,
      "last_shutter": 0,
      "flushing": false,
      "shutter_violations": 0,
      "fence_leaks": 0,
      "invalid_sof_count": 0,
      "references": 1
    }
    "#);
    Ok(())
}
