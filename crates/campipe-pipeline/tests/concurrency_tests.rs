//! Concurrency tests for campipe-pipeline
//!
//! Node callbacks arrive on arbitrary threads. These tests hammer the
//! completion counters, the shutter/metadata handoff and the fence lists
//! from several threads at once.

use campipe_errors::ProtocolViolation;
use campipe_pipeline::prelude::*;
use campipe_test_helpers::assert_err_matches;
use campipe_test_helpers::prelude::*;
use std::sync::{Arc, Barrier};
use std::thread;

fn config(realtime: bool) -> PipelineConfig {
    must(
        PipelineConfig::builder()
            .name("Concurrent")
            .realtime(realtime)
            .request_queue_depth(8)
            .build(),
    )
}

#[test]
fn test_concurrent_completions_fire_once() -> TestResult {
    const NODES: u32 = 8;
    let nodes = (1..=NODES).map(|id| MockNode::new(id, &format!("node{id}"))).collect();
    let harness = Arc::new(Harness::chain(config(false), nodes)?);

    for request_id in 1..=16 {
        harness.pipeline.process_request(&CaptureRequest::single(request_id))?;
        let barrier = Arc::new(Barrier::new(NODES as usize));

        let handles: Vec<_> = harness
            .nodes
            .iter()
            .map(|node| {
                let harness = Arc::clone(&harness);
                let barrier = Arc::clone(&barrier);
                let id = node.node_id();
                thread::spawn(move || {
                    barrier.wait();
                    must(harness.pipeline.notify_node_metadata_done(id, request_id));
                    must(harness.pipeline.notify_node_request_done(id, request_id));
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().is_ok());
        }
        assert_eq!(harness.session.count_for(request_id, "metadata"), 1);
    }

    let done = harness.session.done();
    assert_eq!(done.len(), 16);
    Ok(())
}

#[test]
fn test_shutter_and_metadata_race_publishes_once() -> TestResult {
    let harness = Arc::new(Harness::chain(config(true), vec![MockNode::new(1, "ife")])?);
    let node = NodeId::new(1, 0);

    for request_id in 1..=200u64 {
        harness.pipeline.process_request(&CaptureRequest::single(request_id))?;
        let barrier = Arc::new(Barrier::new(2));

        let shutter = {
            let harness = Arc::clone(&harness);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                must(harness.pipeline.handle_sync_message(&SyncMessage::Frame(FrameMessage {
                    sync_id: request_id,
                    frame_count: request_id,
                    timestamp: request_id * 1_000,
                    notify: true,
                })));
            })
        };
        let metadata = {
            let harness = Arc::clone(&harness);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                must(harness.pipeline.notify_node_metadata_done(node, request_id));
            })
        };

        assert!(shutter.join().is_ok());
        assert!(metadata.join().is_ok());
        assert_eq!(harness.session.count_for(request_id, "metadata"), 1);
        harness.pipeline.notify_node_request_done(node, request_id)?;
    }

    assert_eq!(harness.pipeline.shutter_violations(), 0);
    assert_eq!(harness.session.count("shutter"), 200);
    Ok(())
}

/// Three nodes at depth 4 over requests 1..=10: request 1's slot is taken
/// over by request 9 and request 5 publishes metadata once while its
/// completions race the shutter.
#[test]
fn test_depth_four_scenario_with_racing_shutter() -> TestResult {
    for _ in 0..20 {
        let nodes = vec![MockNode::new(1, "sensor"), MockNode::new(2, "ife"), MockNode::new(3, "ipe")];
        let config = must(
            PipelineConfig::builder()
                .name("Scenario")
                .realtime(true)
                .request_queue_depth(4)
                .max_request_queue_depth(4)
                .build(),
        );
        let harness = Arc::new(Harness::chain(config, nodes)?);
        let pipeline = &harness.pipeline;
        assert_eq!(pipeline.snapshot().ring_capacity, 8);

        for request_id in 1..=8 {
            pipeline.process_request(&CaptureRequest::single(request_id))?;
        }
        assert!(pipeline.is_request_live(1));
        pipeline.process_request(&CaptureRequest::single(9))?;
        assert!(!pipeline.is_request_live(1));
        assert_err_matches!(
            pipeline.notify_node_request_done(NodeId::new(1, 0), 1),
            PipelineError::Protocol(ProtocolViolation::StaleSlot {
                request_id: 1,
                slot_request_id: 9
            })
        );
        pipeline.process_request(&CaptureRequest::single(10))?;

        let barrier = Arc::new(Barrier::new(2));
        let shutter = {
            let harness = Arc::clone(&harness);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                must(harness.pipeline.send_shutter_notification(5, 5_000));
            })
        };
        let completer = {
            let harness = Arc::clone(&harness);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                must(harness.complete_all(5, CompletionAxis::Metadata));
            })
        };
        assert!(shutter.join().is_ok());
        assert!(completer.join().is_ok());

        assert_eq!(harness.session.count_for(5, "metadata"), 1);
        assert_eq!(harness.session.shutter_requests(), vec![5]);
    }
    Ok(())
}

#[test]
fn test_concurrent_fence_bookkeeping() -> TestResult {
    let harness = Arc::new(Harness::chain(config(false), vec![MockNode::new(1, "ife")])?);
    harness.pipeline.process_request(&CaptureRequest::single(1))?;

    let handles: Vec<_> = (0..4u64)
        .map(|worker| {
            let harness = Arc::clone(&harness);
            thread::spawn(move || {
                for i in 0..25 {
                    must(harness.pipeline.register_fence(1, FenceHandle(worker * 100 + i)));
                }
                for i in 0..25 {
                    assert!(must(harness.pipeline.remove_fence(1, FenceHandle(worker * 100 + i))));
                }
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().is_ok());
    }
    assert_eq!(harness.pipeline.pending_fences(1)?, 0);
    harness.pipeline.verify_fences_drained(1)?;
    Ok(())
}

#[test]
fn test_flush_concurrent_with_completions() -> TestResult {
    let harness = Arc::new(Harness::chain(config(false), vec![MockNode::new(1, "ife")])?);
    for request_id in 1..=8 {
        harness.pipeline.process_request(&CaptureRequest::single(request_id))?;
    }

    let completer = {
        let harness = Arc::clone(&harness);
        thread::spawn(move || {
            for request_id in 1..=8 {
                must(harness.complete_all(request_id, CompletionAxis::Output));
            }
        })
    };
    let flusher = {
        let harness = Arc::clone(&harness);
        thread::spawn(move || {
            must(harness.pipeline.begin_flush(FlushType::All));
            harness.pipeline.end_flush(false);
        })
    };

    assert!(completer.join().is_ok());
    assert!(flusher.join().is_ok());

    let snapshot = harness.pipeline.snapshot();
    assert_eq!(snapshot.last_completed, 8);
    assert!(snapshot.is_idle());
    assert!(!snapshot.flushing);
    harness.pipeline.wait_for_all_nodes_request()?;
    Ok(())
}

#[test]
fn test_references_across_threads() -> TestResult {
    let harness = Arc::new(Harness::chain(config(false), vec![MockNode::new(1, "ife")])?);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let harness = Arc::clone(&harness);
            thread::spawn(move || {
                for _ in 0..100 {
                    harness.pipeline.add_reference();
                    harness.pipeline.release_reference();
                }
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().is_ok());
    }
    assert_eq!(harness.pipeline.references(), 1);
    Ok(())
}
