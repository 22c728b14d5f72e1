#![cfg(feature = "test-support")]

#[path = "harness_support.rs"]
mod support;

use std::sync::atomic::AtomicBool;

use support::{harness_with, sample_points};
use wavetank_harness::testing::{MemoryChannelSink, MemoryRecordSink, ScriptedEngine};
use wavetank_harness::{
    ConstantMotion, HarnessError, LifecycleState, MotionState, RunPlan, TabulatedMotion,
};

#[test]
fn full_run_completes_every_step() {
    let (mut harness, probe) = harness_with(ScriptedEngine::new());
    let motion = ConstantMotion(MotionState::at_rest());
    let points = sample_points(3);
    let mut channels = MemoryChannelSink::default();
    let mut records = MemoryRecordSink::default();

    let summary = harness
        .run(
            RunPlan::new(&motion).with_sample_points(&points),
            &mut channels,
            &mut records,
        )
        .expect("run should complete");

    assert_eq!(summary.steps_completed, 14);
    assert_eq!(summary.records_written, 3 * 14);
    assert!(!summary.stopped);

    assert_eq!(channels.rows.len(), 14);
    assert_eq!(records.rows.len(), 42);
    assert_eq!(channels.end_calls, 1);
    assert_eq!(records.end_calls, 1);

    assert_eq!(probe.snapshot().steps, 14);
    assert_eq!(probe.snapshot().end_calls, 1);
    assert_eq!(harness.state(), LifecycleState::Finalized);
}

#[test]
fn channel_rows_are_time_ordered_with_fixed_spacing() {
    let (mut harness, _probe) = harness_with(ScriptedEngine::new());
    let motion = ConstantMotion(MotionState::at_rest());
    let mut channels = MemoryChannelSink::default();
    let mut records = MemoryRecordSink::default();

    harness
        .run(RunPlan::new(&motion), &mut channels, &mut records)
        .expect("run should complete");

    assert_eq!(channels.rows[0].0, 30.0);
    let last = channels.rows.last().expect("rows present");
    assert!((last.0 - 47.875).abs() < 1e-12);
    for pair in channels.rows.windows(2) {
        assert!((pair[1].0 - pair[0].0 - 1.375).abs() < 1e-12);
    }
    for (_, row) in &channels.rows {
        assert_eq!(row.len(), 2, "one value per named channel");
    }
}

#[test]
fn step_failure_leaves_exactly_the_completed_rows() {
    let (mut harness, probe) = harness_with(ScriptedEngine::new().with_failure_at_step(5));
    let motion = ConstantMotion(MotionState::at_rest());
    let points = sample_points(3);
    let mut channels = MemoryChannelSink::default();
    let mut records = MemoryRecordSink::default();

    let err = harness
        .run(
            RunPlan::new(&motion).with_sample_points(&points),
            &mut channels,
            &mut records,
        )
        .expect_err("step 5 should abort the run");
    assert!(matches!(err, HarnessError::StepComputation { .. }));

    // Five completed steps, not six and not the planned fourteen.
    assert_eq!(channels.rows.len(), 5);
    assert_eq!(records.rows.len(), 3 * 5);

    // Partial outputs still flushed exactly once, engine still released.
    assert_eq!(channels.end_calls, 1);
    assert_eq!(records.end_calls, 1);
    assert_eq!(probe.snapshot().end_calls, 1);
    assert_eq!(harness.state(), LifecycleState::Finalized);
}

#[test]
fn query_failure_leaves_that_step_uncommitted() {
    let (mut harness, _probe) = harness_with(ScriptedEngine::new().with_query_failure_at_step(2));
    let motion = ConstantMotion(MotionState::at_rest());
    let points = sample_points(2);
    let mut channels = MemoryChannelSink::default();
    let mut records = MemoryRecordSink::default();

    let err = harness
        .run(
            RunPlan::new(&motion).with_sample_points(&points),
            &mut channels,
            &mut records,
        )
        .expect_err("query at step 2 should abort the run");
    assert!(matches!(err, HarnessError::StepComputation { .. }));

    // The engine stepped three times, but step 2's queries never finished,
    // so only two rows are committed.
    assert_eq!(channels.rows.len(), 2);
    assert_eq!(records.rows.len(), 2 * 2);
}

#[test]
fn stop_flag_ends_the_run_at_a_step_boundary() {
    let (mut harness, probe) = harness_with(ScriptedEngine::new());
    let motion = ConstantMotion(MotionState::at_rest());
    let mut channels = MemoryChannelSink::default();
    let mut records = MemoryRecordSink::default();

    let stop = AtomicBool::new(true);
    let summary = harness
        .run(
            RunPlan::new(&motion).with_stop_flag(&stop),
            &mut channels,
            &mut records,
        )
        .expect("a stopped run is not an error");

    assert!(summary.stopped);
    assert_eq!(summary.steps_completed, 0);
    assert_eq!(probe.snapshot().steps, 0);
    assert_eq!(channels.end_calls, 1, "partial outputs are still flushed");
}

#[test]
fn tabulated_motion_feeds_the_engine_per_step() {
    let mut surge = MotionState::at_rest();
    surge.position[0] = 4.0;
    let rows = vec![MotionState::at_rest(), surge];
    let motion = TabulatedMotion::new(rows);

    let (mut harness, _probe) = harness_with(ScriptedEngine::new());
    let mut channels = MemoryChannelSink::default();
    let mut records = MemoryRecordSink::default();

    harness
        .run(RunPlan::new(&motion), &mut channels, &mut records)
        .expect("run should complete");

    // Channel 0 is time + 0.25 * surge; the surge kicks in from step 1 and
    // holds for the rest of the replayed table.
    assert_eq!(channels.rows[0].1[0], 30.0);
    assert!((channels.rows[1].1[0] - (31.375 + 1.0)).abs() < 1e-12);
    assert!((channels.rows[13].1[0] - (47.875 + 1.0)).abs() < 1e-12);
}

#[test]
fn unopenable_debug_output_still_closes_the_sinks() {
    let (mut harness, probe) =
        harness_with(ScriptedEngine::new().with_debug_output("/no/such/dir/driver.dbg"));
    let motion = ConstantMotion(MotionState::at_rest());
    let mut channels = MemoryChannelSink::default();
    let mut records = MemoryRecordSink::default();

    let err = harness
        .run(RunPlan::new(&motion), &mut channels, &mut records)
        .expect_err("debug output in a missing directory should abort the run");
    assert!(matches!(err, HarnessError::Configuration(_)));

    // No step ran, but the exit still goes through the one teardown routine:
    // sinks closed, engine released.
    assert!(channels.rows.is_empty());
    assert_eq!(channels.end_calls, 1);
    assert_eq!(records.end_calls, 1);
    assert_eq!(probe.snapshot().steps, 0);
    assert_eq!(probe.snapshot().end_calls, 1);
    assert_eq!(harness.state(), LifecycleState::Finalized);
}

#[test]
fn a_finalized_harness_cannot_run_again() {
    let (mut harness, _probe) = harness_with(ScriptedEngine::new());
    let motion = ConstantMotion(MotionState::at_rest());
    let mut channels = MemoryChannelSink::default();
    let mut records = MemoryRecordSink::default();

    harness
        .run(RunPlan::new(&motion), &mut channels, &mut records)
        .expect("first run should complete");

    let mut channels_again = MemoryChannelSink::default();
    let mut records_again = MemoryRecordSink::default();
    assert!(matches!(
        harness.run(
            RunPlan::new(&motion),
            &mut channels_again,
            &mut records_again
        ),
        Err(HarnessError::LifecycleViolation { .. })
    ));
    assert!(channels_again.rows.is_empty());
}
