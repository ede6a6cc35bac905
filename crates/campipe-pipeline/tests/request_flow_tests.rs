//! Request flow tests for campipe-pipeline
//!
//! Drives pipelines over mock nodes from admission to metadata publication,
//! covering slot reuse, fences, shutter ordering, hardware errors and the
//! invalid-SOF watchdog.

use campipe_errors::{ProtocolViolation, RequestError, ResultCode};
use campipe_pipeline::prelude::*;
use campipe_test_helpers::assert_err_matches;
use campipe_test_helpers::prelude::*;

fn config(realtime: bool, depth: u32) -> PipelineConfig {
    must(
        PipelineConfig::builder()
            .name("Flow")
            .realtime(realtime)
            .request_queue_depth(depth)
            .build(),
    )
}

fn plain_nodes(count: u32) -> Vec<MockNode> {
    (1..=count).map(|id| MockNode::new(id, &format!("node{id}"))).collect()
}

fn frame(sync_id: u64, timestamp: u64) -> SyncMessage {
    SyncMessage::Frame(FrameMessage {
        sync_id,
        frame_count: sync_id,
        timestamp,
        notify: true,
    })
}

fn tick(sync_id: u64) -> SyncMessage {
    SyncMessage::Frame(FrameMessage {
        sync_id,
        ..FrameMessage::default()
    })
}

fn recovery_errors(session: &RecordingSession) -> usize {
    session
        .errors()
        .iter()
        .filter(|(request_id, record)| *request_id == INVALID_REQUEST_ID && record.code == ErrorCode::Recovery)
        .count()
}

#[test]
fn test_offline_request_end_to_end() -> TestResult {
    let harness = Harness::chain(config(false, 4), plain_nodes(3))?;
    let pipeline = &harness.pipeline;
    assert_eq!(pipeline.snapshot().ring_capacity, 8);
    assert_eq!(harness.pool.depth(), 8);

    for id in 1..=4 {
        pipeline.process_request(&CaptureRequest::single(id))?;
    }
    assert_eq!(harness.session.shutter_requests(), vec![1, 2, 3, 4]);
    assert_eq!(harness.queue.deferred().len(), 12);

    for id in 1..=4 {
        harness.complete_all(id, CompletionAxis::Metadata)?;
        harness.complete_all(id, CompletionAxis::Output)?;
    }

    assert_eq!(harness.session.done(), vec![1, 2, 3, 4]);
    for id in 1..=4 {
        assert_eq!(harness.session.count_for(id, "metadata"), 1);
    }
    assert!(pipeline.snapshot().is_idle());
    Ok(())
}

#[test]
fn test_reused_slot_rejects_stale_completion() -> TestResult {
    let harness = Harness::chain(config(false, 4), plain_nodes(3))?;
    let pipeline = &harness.pipeline;
    let first = harness.nodes.first().map(|n| n.node_id()).ok_or("no nodes")?;

    for id in 1..=9 {
        pipeline.process_request(&CaptureRequest::single(id))?;
    }

    assert!(!pipeline.is_request_live(1));
    assert!(pipeline.is_request_live(9));
    assert_err_matches!(
        pipeline.notify_node_request_done(first, 1),
        PipelineError::Protocol(ProtocolViolation::StaleSlot {
            request_id: 1,
            slot_request_id: 9
        })
    );

    // The stale completion must not count toward request 9.
    pipeline.notify_node_request_done(first, 9)?;
    assert!(harness.session.done().is_empty());
    Ok(())
}

#[test]
fn test_metadata_published_exactly_once() -> TestResult {
    let harness = Harness::chain(config(false, 4), plain_nodes(3))?;
    harness.pipeline.process_request(&CaptureRequest::single(5))?;

    harness.complete_all(5, CompletionAxis::Metadata)?;
    harness.complete_all(5, CompletionAxis::Metadata)?;

    assert_eq!(harness.session.count_for(5, "metadata"), 1);
    assert_eq!(harness.session.count_for(5, "shutter"), 1);
    Ok(())
}

#[test]
fn test_request_in_error_gets_error_metadata() -> TestResult {
    let harness = Harness::chain(config(false, 4), plain_nodes(2))?;
    harness.pipeline.process_request(&CaptureRequest::single(3))?;
    harness.queue.mark_in_error(3);

    harness.complete_all(3, CompletionAxis::Metadata)?;

    assert_eq!(harness.session.count_for(3, "metadata"), 0);
    let errors = harness.session.errors();
    assert!(errors.contains(&(3, ErrorRecord::new(ErrorCode::Result, 3))));
    Ok(())
}

#[test]
fn test_disabled_nodes_reject_request() -> TestResult {
    let nodes = vec![MockNode::new(1, "a").disabled(), MockNode::new(2, "b").disabled()];
    let harness = Harness::chain(config(false, 4), nodes)?;

    assert_err_matches!(
        harness.pipeline.process_request(&CaptureRequest::single(1)),
        PipelineError::Request(RequestError::NoNodesEnabled { request_id: 1 })
    );
    assert_eq!(harness.queue.dispatches(), 0);
    Ok(())
}

#[test]
fn test_partially_enabled_request_completes() -> TestResult {
    let nodes = vec![MockNode::new(1, "ife"), MockNode::new(2, "stats").disabled()];
    let harness = Harness::chain(config(false, 4), nodes)?;
    let pipeline = &harness.pipeline;
    let ife = NodeId::new(1, 0);

    pipeline.process_request(&CaptureRequest::single(1))?;
    assert_eq!(harness.queue.deferred(), vec![(1, ife)]);
    assert!(harness.session.done().is_empty());

    pipeline.notify_node_metadata_done(ife, 1)?;
    pipeline.notify_node_request_done(ife, 1)?;

    assert_eq!(harness.session.count_for(1, "metadata"), 1);
    assert_eq!(harness.session.done(), vec![1]);
    pipeline.wait_for_all_nodes_request()?;
    Ok(())
}

#[test]
fn test_setup_failure_reports_request_error() -> TestResult {
    let nodes = vec![
        MockNode::new(1, "ife"),
        MockNode::new(2, "ipe").failing_setup(ResultCode::InvalidArgument),
    ];
    let harness = Harness::chain(config(false, 4), nodes)?;

    assert_err_matches!(
        harness.pipeline.process_request(&CaptureRequest::single(1)),
        PipelineError::Request(RequestError::Rejected { request_id: 1, ref node, code: ResultCode::InvalidArgument })
            if node == "ipe"
    );
    assert!(harness.session.errors().contains(&(1, ErrorRecord::new(ErrorCode::Request, 1))));
    Ok(())
}

#[test]
fn test_requests_flushed_while_flushing() -> TestResult {
    let harness = Harness::chain(config(false, 4), plain_nodes(2))?;
    harness.pipeline.begin_flush(FlushType::All)?;

    harness.pipeline.process_request(&CaptureRequest::single(1))?;

    assert!(harness.queue.deferred().is_empty());
    for node in &harness.nodes {
        assert_eq!(node.count(NodeCall::Flush(1)), 1);
    }
    Ok(())
}

#[test]
fn test_fences_drain_to_queue_and_session() -> TestResult {
    let harness = Harness::chain(config(false, 4), plain_nodes(2))?;
    let pipeline = &harness.pipeline;
    let producer = NodeId::new(1, 0);
    let sink = NodeId::new(2, 0);
    pipeline.process_request(&CaptureRequest::single(1))?;

    pipeline.register_fence(1, FenceHandle(10))?;
    pipeline.register_fence(1, FenceHandle(11))?;
    assert_eq!(pipeline.pending_fences(1)?, 2);

    pipeline.on_fence_signal(&FenceSignal {
        node: producer,
        port: 0,
        fence: FenceHandle(10),
        request_id: 1,
        batch_index: 0,
        buffer: BufferDescriptor::default(),
        status: FenceStatus::Signaled,
    })?;
    assert_eq!(harness.queue.signaled(), vec![(FenceHandle(10), 1)]);

    let buffer = BufferDescriptor { handle: 77 };
    pipeline.on_fence_signal(&FenceSignal {
        node: sink,
        port: 0,
        fence: FenceHandle(11),
        request_id: 1,
        batch_index: 0,
        buffer,
        status: FenceStatus::Signaled,
    })?;

    let delivered = harness
        .session
        .records()
        .into_iter()
        .any(|r| r.payload == ResultPayload::Buffer { sequence_id: 1, stream_id: 0, buffer });
    assert!(delivered);
    pipeline.verify_fences_drained(1)?;
    Ok(())
}

#[test]
fn test_fence_error_during_flush() -> TestResult {
    let harness = Harness::chain(config(false, 4), plain_nodes(2))?;
    let pipeline = &harness.pipeline;
    pipeline.process_request(&CaptureRequest::single(2))?;
    pipeline.register_fence(2, FenceHandle(20))?;

    pipeline.begin_flush(FlushType::All)?;
    let buffer = BufferDescriptor { handle: 5 };
    pipeline.on_fence_signal(&FenceSignal {
        node: NodeId::new(2, 0),
        port: 0,
        fence: FenceHandle(20),
        request_id: 2,
        batch_index: 0,
        buffer,
        status: FenceStatus::Error,
    })?;

    assert_eq!(harness.queue.failed(), vec![(FenceHandle(20), 2, true)]);
    let buffer_errors: Vec<ErrorRecord> = harness
        .session
        .errors()
        .into_iter()
        .filter(|(id, record)| *id == 2 && record.code == ErrorCode::Buffer)
        .map(|(_, record)| record)
        .collect();
    assert_eq!(buffer_errors.len(), 1);
    assert_eq!(buffer_errors.first().and_then(|r| r.buffer), Some(buffer));
    assert_eq!(buffer_errors.first().and_then(|r| r.stream_id), Some(0));
    Ok(())
}

#[test]
fn test_fence_leak_is_counted_on_reuse() -> TestResult {
    let harness = Harness::chain(config(false, 1), plain_nodes(1))?;
    let pipeline = &harness.pipeline;
    pipeline.process_request(&CaptureRequest::single(1))?;
    pipeline.register_fence(1, FenceHandle(5))?;

    assert_err_matches!(
        pipeline.verify_fences_drained(1),
        PipelineError::Protocol(ProtocolViolation::FenceLeak { request_id: 1, remaining: 1 })
    );

    pipeline.process_request(&CaptureRequest::single(3))?;
    assert_eq!(pipeline.snapshot().fence_leaks, 1);
    assert_eq!(pipeline.pending_fences(3)?, 0);
    Ok(())
}

#[test]
fn test_shutter_gap_is_reported_and_delivered() -> TestResult {
    let harness = Harness::chain(config(true, 4), plain_nodes(1))?;
    let pipeline = &harness.pipeline;
    for id in 1..=3 {
        pipeline.process_request(&CaptureRequest::single(id))?;
    }

    pipeline.handle_sync_message(&frame(1, 1_000))?;
    assert_err_matches!(
        pipeline.handle_sync_message(&frame(3, 3_000)),
        PipelineError::Protocol(ProtocolViolation::ShutterOrder {
            request_id: 3,
            last_shutter_request_id: 1
        })
    );

    assert_eq!(harness.session.shutter_requests(), vec![1, 3]);
    assert_eq!(harness.session.count("sof"), 2);
    assert_eq!(pipeline.shutter_violations(), 1);
    Ok(())
}

#[test]
fn test_stale_shutter_keeps_ordering_baseline() -> TestResult {
    let harness = Harness::chain(config(true, 4), plain_nodes(1))?;
    let pipeline = &harness.pipeline;
    for id in 1..=9 {
        pipeline.process_request(&CaptureRequest::single(id))?;
    }

    pipeline.send_shutter_notification(8, 8_000)?;
    assert_err_matches!(
        pipeline.send_shutter_notification(1, 1_000),
        PipelineError::Protocol(ProtocolViolation::StaleSlot {
            request_id: 1,
            slot_request_id: 9
        })
    );
    assert_eq!(pipeline.snapshot().last_shutter, 8);

    pipeline.send_shutter_notification(9, 9_000)?;
    assert_eq!(pipeline.shutter_violations(), 0);
    assert_eq!(harness.session.shutter_requests(), vec![8, 9]);
    Ok(())
}

#[test]
fn test_shutter_order_relaxed_after_flush() -> TestResult {
    let harness = Harness::chain(config(true, 4), plain_nodes(1))?;
    let pipeline = &harness.pipeline;
    for id in 1..=3 {
        pipeline.process_request(&CaptureRequest::single(id))?;
    }
    pipeline.handle_sync_message(&frame(1, 1_000))?;

    pipeline.begin_flush(FlushType::All)?;
    pipeline.end_flush(false);
    assert_eq!(pipeline.flush_info().last_flush_request_id, 3);

    pipeline.process_request(&CaptureRequest::single(6))?;
    pipeline.handle_sync_message(&frame(6, 6_000))?;
    pipeline.process_request(&CaptureRequest::single(7))?;
    pipeline.handle_sync_message(&frame(7, 7_000))?;

    assert_eq!(pipeline.shutter_violations(), 0);
    assert_eq!(harness.session.shutter_requests(), vec![1, 6, 7]);
    Ok(())
}

#[test]
fn test_shutter_dropped_without_live_requests() -> TestResult {
    let harness = Harness::chain(config(true, 4), plain_nodes(1))?;
    harness.pipeline.process_request(&CaptureRequest::single(1))?;
    harness.session.set_live_requests(0);

    harness.pipeline.handle_sync_message(&frame(1, 1_000))?;

    assert!(harness.session.shutter_requests().is_empty());
    assert_eq!(harness.session.count("sof"), 0);
    Ok(())
}

#[test]
fn test_shutter_before_metadata_publishes_on_metadata() -> TestResult {
    let harness = Harness::chain(config(true, 4), plain_nodes(2))?;
    let pipeline = &harness.pipeline;
    pipeline.process_request(&CaptureRequest::single(1))?;

    pipeline.handle_sync_message(&frame(1, 42))?;
    assert_eq!(harness.session.count_for(1, "metadata"), 0);

    harness.complete_all(1, CompletionAxis::Metadata)?;
    let metadata: Vec<ResultPayload> = harness
        .session
        .records()
        .into_iter()
        .filter(|r| r.payload.kind() == "metadata")
        .map(|r| r.payload)
        .collect();
    assert_eq!(metadata, vec![ResultPayload::Metadata { sequence_id: 1, timestamp: 42 }]);
    Ok(())
}

#[test]
fn test_hardware_errors_map_to_records() -> TestResult {
    let harness = Harness::chain(config(false, 4), plain_nodes(1))?;
    let pipeline = &harness.pipeline;
    pipeline.process_request(&CaptureRequest::single(1))?;

    pipeline.send_error_notification(1, HardwareErrorKind::Buffer)?;
    pipeline.send_error_notification(INVALID_REQUEST_ID, HardwareErrorKind::FullRecovery)?;
    assert_err_matches!(
        pipeline.send_error_notification(INVALID_REQUEST_ID, HardwareErrorKind::Request),
        PipelineError::Request(RequestError::Hardware { request_id: 0, .. })
    );

    let errors = harness.session.errors();
    assert_eq!(errors.len(), 2);
    assert!(errors.contains(&(1, ErrorRecord::new(ErrorCode::Buffer, 1))));
    assert!(errors.contains(&(
        INVALID_REQUEST_ID,
        ErrorRecord {
            full_recovery: true,
            ..ErrorRecord::new(ErrorCode::Recovery, 0)
        }
    )));
    Ok(())
}

#[test]
fn test_recovery_errors_dropped_during_flush() -> TestResult {
    let harness = Harness::chain(config(false, 4), plain_nodes(1))?;
    let pipeline = &harness.pipeline;
    pipeline.process_request(&CaptureRequest::single(1))?;
    pipeline.begin_flush(FlushType::All)?;

    pipeline.send_error_notification(1, HardwareErrorKind::SofFreeze)?;
    pipeline.send_error_notification(1, HardwareErrorKind::Device)?;

    let codes: Vec<ErrorCode> = harness.session.errors().into_iter().map(|(_, r)| r.code).collect();
    assert_eq!(codes, vec![ErrorCode::Device]);
    Ok(())
}

#[test]
fn test_error_messages_ignored_while_recovering() -> TestResult {
    let harness = Harness::chain(config(false, 4), plain_nodes(1))?;
    let pipeline = &harness.pipeline;
    pipeline.process_request(&CaptureRequest::single(1))?;
    pipeline.set_triggering_recovery(true);

    pipeline.handle_sync_message(&SyncMessage::Error(ErrorMessage {
        sync_id: 1,
        kind: HardwareErrorKind::Request,
        device: 0,
        resource: 0,
    }))?;

    assert!(harness.session.errors().is_empty());
    Ok(())
}

#[test]
fn test_watchdog_requests_recovery_after_twice_depth() -> TestResult {
    let harness = Harness::chain(config(false, 2), plain_nodes(1))?;
    let pipeline = &harness.pipeline;
    pipeline.process_request(&CaptureRequest::single(1))?;

    for _ in 0..4 {
        pipeline.handle_sync_message(&tick(99))?;
    }
    assert_eq!(recovery_errors(&harness.session), 0);
    assert_eq!(pipeline.invalid_sof_count(), 4);

    pipeline.handle_sync_message(&tick(99))?;
    assert_eq!(recovery_errors(&harness.session), 1);
    assert_eq!(pipeline.invalid_sof_count(), 0);
    Ok(())
}

#[test]
fn test_watchdog_idle_when_nothing_pending() -> TestResult {
    let harness = Harness::chain(config(false, 2), plain_nodes(1))?;
    let pipeline = &harness.pipeline;
    pipeline.process_request(&CaptureRequest::single(1))?;
    harness.complete_all(1, CompletionAxis::Output)?;

    for _ in 0..10 {
        pipeline.handle_sync_message(&tick(99))?;
    }
    assert_eq!(recovery_errors(&harness.session), 0);
    assert_eq!(pipeline.invalid_sof_count(), 0);
    Ok(())
}

#[test]
fn test_watchdog_deferred_by_slowdown() -> TestResult {
    let harness = Harness::chain(config(true, 2), plain_nodes(1))?;
    let pipeline = &harness.pipeline;
    pipeline.process_request(&CaptureRequest::single(1))?;

    // Metadata before shutter marks the request slow.
    harness.complete_all(1, CompletionAxis::Metadata)?;
    pipeline.handle_sync_message(&frame(1, 1_000))?;
    assert_eq!(harness.session.count_for(1, "metadata"), 1);

    for _ in 0..5 {
        pipeline.handle_sync_message(&tick(99))?;
    }
    assert_eq!(recovery_errors(&harness.session), 0);

    for _ in 0..5 {
        pipeline.handle_sync_message(&tick(99))?;
    }
    assert_eq!(recovery_errors(&harness.session), 1);
    Ok(())
}

#[test]
fn test_partial_metadata_delivered_once() -> TestResult {
    let nodes = vec![MockNode::new(1, "stats").with_partial_metadata(), MockNode::new(2, "ipe")];
    let harness = Harness::chain(config(false, 4), nodes)?;
    let pipeline = &harness.pipeline;
    assert_eq!(pipeline.axis_targets()?.partial_metadata, 1);

    pipeline.process_request(&CaptureRequest::single(1))?;
    pipeline.process_request(&CaptureRequest::single(2))?;
    harness.queue.mark_in_error(2);

    pipeline.notify_node_partial_metadata_done(NodeId::new(1, 0), 1)?;
    pipeline.notify_node_partial_metadata_done(NodeId::new(1, 0), 2)?;

    assert_eq!(harness.session.count_for(1, "partial-metadata"), 1);
    assert_eq!(harness.session.count_for(2, "partial-metadata"), 0);
    Ok(())
}

#[test]
fn test_flush_window_reaches_metadata_pools() -> TestResult {
    let harness = Harness::chain(config(false, 4), plain_nodes(1))?;
    let pipeline = &harness.pipeline;
    for id in 1..=4 {
        pipeline.process_request(&CaptureRequest::single(id))?;
    }
    harness.complete_all(1, CompletionAxis::Output)?;
    harness.complete_all(3, CompletionAxis::Output)?;
    harness.queue.mark_in_error(3);

    pipeline.begin_flush(FlushType::All)?;
    assert_eq!(pipeline.flush_info().last_valid_request_id, Some(2));
    pipeline.flush_metadata();
    pipeline.flush_pending_nodes()?;
    pipeline.end_flush(false);

    assert_eq!(harness.pool.flushes(), vec![(2, 3)]);
    Ok(())
}

#[test]
fn test_flush_exhausts_search_when_all_in_error() -> TestResult {
    let harness = Harness::chain(config(false, 2), plain_nodes(1))?;
    let pipeline = &harness.pipeline;
    for id in 1..=3 {
        pipeline.process_request(&CaptureRequest::single(id))?;
        harness.queue.mark_in_error(id);
    }
    harness.complete_all(3, CompletionAxis::Output)?;

    assert_err_matches!(
        pipeline.begin_flush(FlushType::All),
        PipelineError::Protocol(ProtocolViolation::LastValidSearchExhausted {
            last_completed: 3,
            depth: 2
        })
    );
    assert!(pipeline.is_flushing());
    Ok(())
}

#[test]
fn test_completion_during_flush_tracks_in_order() -> TestResult {
    let harness = Harness::chain(config(false, 4), plain_nodes(1))?;
    let pipeline = &harness.pipeline;
    for id in 1..=3 {
        pipeline.process_request(&CaptureRequest::single(id))?;
    }
    pipeline.begin_flush(FlushType::All)?;

    harness.complete_all(2, CompletionAxis::Output)?;
    assert_eq!(pipeline.snapshot().last_in_order_completed, 0);
    harness.complete_all(1, CompletionAxis::Output)?;
    assert_eq!(pipeline.snapshot().last_in_order_completed, 2);
    harness.complete_all(3, CompletionAxis::Output)?;

    assert_eq!(harness.session.done(), vec![3]);
    Ok(())
}

#[test]
fn test_fallback_format_renegotiation() -> TestResult {
    let nodes = vec![MockNode::new(1, "ife"), MockNode::new(2, "ipe").rejecting_format(Format::Ubwc)];
    let harness = Harness::chain(config(false, 4), nodes)?;

    assert!(harness.pipeline.renegotiated());
    for node in &harness.nodes {
        assert_eq!(node.count(NodeCall::ResetNegotiation), 1);
    }
    let sink = harness.pipeline.buffer_properties(NodeId::new(2, 0)).ok_or("no properties")?;
    assert_eq!(sink.format, Format::Nv12);
    Ok(())
}

#[test]
fn test_node_facing_accessors() -> TestResult {
    let config = must(
        PipelineConfig::builder()
            .name("Flow")
            .camera_id(2)
            .realtime(false)
            .request_queue_depth(4)
            .usecase_fps(60)
            .frame_delay(2)
            .extra_framework_buffers(3)
            .build(),
    );
    let harness = Harness::chain(config, plain_nodes(1))?;
    let pipeline = &harness.pipeline;

    assert_eq!(pipeline.identity(), "Flow_0_cam_2");
    assert_eq!(pipeline.max_pipeline_delay()?, 4);
    assert_eq!(pipeline.frame_delay()?, 2);
    assert_eq!(pipeline.extra_buffer_count()?, 3);
    assert_eq!(pipeline.meta_buffer_delay()?, 0);
    assert_eq!(pipeline.request_queue_depth()?, 6);
    assert!(pipeline.metadata_pool(PoolKind::Main).is_some());
    assert!(pipeline.metadata_pool(PoolKind::EarlyResult).is_none());
    assert!(pipeline.tuning_data().is_some_and(|tuning| tuning.is_loaded()));

    pipeline.process_request(&CaptureRequest::single(1))?;
    assert!(!pipeline.is_request_in_error(1));
    harness.queue.mark_in_error(1);
    assert!(pipeline.is_request_in_error(1));
    Ok(())
}

#[test]
fn test_realtime_meta_buffer_delay_follows_frame_delay() -> TestResult {
    let config = must(
        PipelineConfig::builder()
            .name("Flow")
            .realtime(true)
            .request_queue_depth(2)
            .frame_delay(5)
            .build(),
    );
    let harness = Harness::chain(config, plain_nodes(1))?;

    assert_eq!(harness.pipeline.max_pipeline_delay()?, 3);
    assert_eq!(harness.pipeline.meta_buffer_delay()?, 5);
    Ok(())
}
