mod common;

use std::{
    sync::{atomic::AtomicBool, Arc},
    time::{Duration, Instant},
};

use common::*;
use ndi_viewer::{run_capture_loop, CaptureStats, LoopExit};

const TIMEOUT: Duration = Duration::from_millis(5);

fn run(script: Vec<Step>, factory: &MockSurfaceFactory) -> (LoopExit, CaptureStats, Arc<Probe>) {
    let probe = Arc::new(Probe::default());
    let exit = Arc::new(AtomicBool::new(false));
    let receiver = MockReceiver::stopping(script, Arc::clone(&probe), Arc::clone(&exit));
    let (reason, stats) = run_capture_loop(&receiver, &exit, TIMEOUT, factory);
    (reason, stats, probe)
}

#[test]
fn every_captured_frame_is_released() {
    let factory = MockSurfaceFactory::default();
    let script = vec![
        Step::None,
        Step::StatusChange,
        Step::Video(None),
        video(2, 2),
        Step::Audio,
        Step::Metadata,
    ];

    let (reason, stats, probe) = run(script, &factory);

    assert_eq!(reason, LoopExit::Requested);
    assert_eq!(
        stats,
        CaptureStats {
            polls: 7,
            empty: 2,
            status_changes: 1,
            video: 2,
            skipped_video: 1,
            presented: 1,
            audio: 1,
            metadata: 1,
            errors: 0,
        }
    );
    for kind in [Kind::Video, Kind::Audio, Kind::Metadata] {
        assert_eq!(probe.delivered(kind), probe.released(kind), "{:?}", kind);
    }
    assert_eq!(probe.delivered(Kind::Video), 2);
}

#[test]
fn surface_is_created_once_and_reused() {
    let factory = MockSurfaceFactory::default();
    let script = vec![video(4, 2), Step::Audio, video(4, 2), video(8, 6)];

    let (_, stats, _) = run(script, &factory);

    assert_eq!(stats.presented, 3);
    assert_eq!(factory.probe.created(), 1);
    assert_eq!(factory.probe.presented(), vec![(4, 2), (4, 2), (8, 6)]);
}

#[test]
fn payloadless_video_never_creates_a_surface() {
    let factory = MockSurfaceFactory::default();
    let script = vec![Step::Video(None), Step::Video(None)];

    let (_, stats, probe) = run(script, &factory);

    assert_eq!(stats.skipped_video, 2);
    assert_eq!(stats.presented, 0);
    assert_eq!(factory.probe.created(), 0);
    assert_eq!(probe.released(Kind::Video), 2);
}

#[test]
fn capture_errors_do_not_stop_the_loop() {
    let factory = MockSurfaceFactory::default();
    let script = vec![Step::Fail, video(2, 2), Step::Fail, Step::Metadata];

    let (reason, stats, _) = run(script, &factory);

    assert_eq!(reason, LoopExit::Requested);
    assert_eq!(stats.errors, 2);
    assert_eq!(stats.presented, 1);
    assert_eq!(stats.metadata, 1);
}

#[test]
fn failed_polls_wait_out_the_timeout() {
    let factory = MockSurfaceFactory::default();
    let probe = Arc::new(Probe::default());
    let exit = Arc::new(AtomicBool::new(false));
    let timeout = Duration::from_millis(30);
    let script = vec![Step::Fail, Step::Fail, Step::Fail, Step::Fail, video(2, 2)];
    let receiver = MockReceiver::stopping(script, Arc::clone(&probe), Arc::clone(&exit));

    let started = Instant::now();
    let (reason, stats) = run_capture_loop(&receiver, &exit, timeout, &factory);

    // A transport that fails immediately must not be polled in a tight loop.
    assert!(started.elapsed() >= timeout * 4);
    assert_eq!(reason, LoopExit::Requested);
    assert_eq!(stats.errors, 4);
    assert_eq!(stats.presented, 1);
}

#[test]
fn surface_creation_is_retried_on_the_next_frame() {
    let factory = MockSurfaceFactory {
        failing_creates: 2,
        ..MockSurfaceFactory::default()
    };
    let script = vec![video(2, 2), video(2, 2), video(2, 2), video(2, 2)];

    let (_, stats, probe) = run(script, &factory);

    assert_eq!(stats.errors, 2);
    assert_eq!(stats.presented, 2);
    assert_eq!(factory.probe.created(), 1);
    assert_eq!(probe.delivered(Kind::Video), probe.released(Kind::Video));
}

#[test]
fn closed_window_ends_the_loop() {
    let factory = MockSurfaceFactory {
        close_after: Some(1),
        ..MockSurfaceFactory::default()
    };
    let script = vec![video(2, 2), video(2, 2), Step::Audio, Step::Audio];

    let (reason, stats, probe) = run(script, &factory);

    assert_eq!(reason, LoopExit::SurfaceClosed);
    assert_eq!(stats.polls, 2);
    assert_eq!(stats.presented, 1);
    assert_eq!(probe.delivered(Kind::Audio), 0);
    assert_eq!(probe.released(Kind::Video), 2);
}

#[test]
fn raised_exit_flag_skips_polling() {
    let factory = MockSurfaceFactory::default();
    let probe = Arc::new(Probe::default());
    let exit = AtomicBool::new(true);
    let receiver = MockReceiver::new(vec![video(2, 2)], Arc::clone(&probe));

    let (reason, stats) = run_capture_loop(&receiver, &exit, TIMEOUT, &factory);

    assert_eq!(reason, LoopExit::Requested);
    assert_eq!(stats, CaptureStats::default());
    assert_eq!(probe.polls(), 0);
    assert_eq!(receiver.remaining(), 1);
}
