//! End-to-end playback scenarios against a device-less engine
//! (48 kHz stereo, 1024-frame buffers) and a scripted media backend.

mod helpers;

use helpers::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A 100 ms tone plays to EOF: at most one trailing silent buffer, no
/// event posted (tag 0), and the channel drains.
#[test]
fn test_play_to_natural_eof() {
    let backend = MockBackend::new();
    backend.script("A", SourcePlan::tone(4800, 16384));
    let engine = offline_engine(Arc::clone(&backend));
    let events = engine.events();

    engine
        .play(0, dummy_input(), "A", params("A"))
        .expect("play");
    assert_eq!(engine.queue_depth(0).unwrap(), 1);

    let tone = expected_output(16384);
    for _ in 0..4 {
        let out = render_frames(&engine, 1024);
        assert_eq!(out[0], tone);
        assert_eq!(out[2 * 1023 + 1], tone);
    }

    // 4800 - 4096 = 704 frames remain; the rest of this buffer is silence.
    let out = render_frames(&engine, 1024);
    assert_eq!(out[2 * 703], tone);
    assert_eq!(out[2 * 704], 0);
    assert_eq!(out[2 * 1023], 0);

    assert_eq!(engine.queue_depth(0).unwrap(), 0);
    assert!(events.try_recv().is_err(), "tag 0 must post nothing");

    let out = render_frames(&engine, 1024);
    assert!(out.iter().all(|&s| s == 0));
}

/// Tight handoff: when A hits EOF mid-buffer, B's first sample lands on
/// the very next frame at full gain (no fade-in).
#[test]
fn test_tight_transition_mid_buffer() {
    let backend = MockBackend::new();
    backend.script("A", SourcePlan::tone(1000, 16384));
    backend.script("B", SourcePlan::tone(96000, 8192));
    let engine = offline_engine(Arc::clone(&backend));

    engine
        .play(
            0,
            dummy_input(),
            "A",
            stagemix::PlayParams {
                tight: true,
                ..params("A")
            },
        )
        .expect("play A");
    engine
        .queue(0, dummy_input(), "B", params("B"))
        .expect("queue B");
    assert_eq!(engine.queue_depth(0).unwrap(), 2);

    let out = render_frames(&engine, 1024);
    assert_eq!(out[2 * 999], expected_output(16384));
    assert_eq!(out[2 * 1000], expected_output(8192), "B at full gain");
    assert_eq!(out[2 * 1023], expected_output(8192));
    assert_eq!(engine.queue_depth(0).unwrap(), 1);
    assert_eq!(engine.playing_name(0).unwrap().as_deref(), Some("B"));
}

/// Non-tight handoff with an explicit fade-in: B starts from silence.
#[test]
fn test_non_tight_transition_fades_in() {
    let backend = MockBackend::new();
    backend.script("A", SourcePlan::tone(1000, 16384));
    backend.script("B", SourcePlan::tone(96000, 16384));
    let engine = offline_engine(Arc::clone(&backend));

    engine
        .play(0, dummy_input(), "A", params("A"))
        .expect("play A");
    engine
        .queue(
            0,
            dummy_input(),
            "B",
            stagemix::PlayParams {
                fadein_ms: 480,
                ..params("B")
            },
        )
        .expect("queue B");

    let out = render_frames(&engine, 1024);
    assert_eq!(out[2 * 999], expected_output(16384));
    assert_eq!(out[2 * 1000], 0, "fade-in starts from silence");
    // 23 frames into a 23040-sample ramp is still inaudible.
    assert!(out[2 * 1023].abs() < 64);
}

/// An explicit fade-in on the queued source overrides tightness.
#[test]
fn test_fadein_overrides_tight() {
    let backend = MockBackend::new();
    backend.script("A", SourcePlan::tone(1000, 16384));
    backend.script("B", SourcePlan::tone(96000, 16384));
    let engine = offline_engine(Arc::clone(&backend));

    engine
        .play(
            0,
            dummy_input(),
            "A",
            stagemix::PlayParams {
                tight: true,
                ..params("A")
            },
        )
        .expect("play A");
    engine
        .queue(
            0,
            dummy_input(),
            "B",
            stagemix::PlayParams {
                fadein_ms: 480,
                ..params("B")
            },
        )
        .expect("queue B");

    let out = render_frames(&engine, 1024);
    assert_eq!(out[2 * 1000], 0, "fade-in wins over tight");
}

/// A channel started paused is released by `unpause_all_at_start` once the
/// decoder reports ready, and then plays from sample 0.
#[test]
fn test_unpause_all_at_start_waits_for_ready() {
    let ready = Arc::new(AtomicBool::new(false));
    let backend = MockBackend::new();
    backend.script(
        "A",
        SourcePlan {
            ready_flag: Some(Arc::clone(&ready)),
            ..SourcePlan::tone(96000, 16384)
        },
    );
    let engine = offline_engine(Arc::clone(&backend));

    engine
        .play(
            0,
            dummy_input(),
            "A",
            stagemix::PlayParams {
                paused: true,
                ..params("A")
            },
        )
        .expect("play A");

    // Paused channels render silence.
    let out = render_frames(&engine, 1024);
    assert!(out.iter().all(|&s| s == 0));

    let flag = Arc::clone(&ready);
    let releaser = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        flag.store(true, Ordering::Relaxed);
    });

    engine.unpause_all_at_start().expect("unpause");
    releaser.join().unwrap();
    assert!(ready.load(Ordering::Relaxed), "returned only after ready");

    let out = render_frames(&engine, 1024);
    assert_eq!(out[0], expected_output(16384), "audio starts at sample 0");
}

/// Position reporting includes the seek-window start offset.
#[test]
fn test_get_pos_includes_start_offset() {
    let backend = MockBackend::new();
    backend.script("A", SourcePlan::tone(96000, 16384));
    let engine = offline_engine(Arc::clone(&backend));

    engine
        .play(
            0,
            dummy_input(),
            "A",
            stagemix::PlayParams {
                start: 10.0,
                ..params("A")
            },
        )
        .expect("play A");

    assert_eq!(engine.get_pos(0).unwrap(), 10000);
    render_frames(&engine, 48000);
    assert_eq!(engine.get_pos(0).unwrap(), 11000);
}

/// fadeout(500): half gain at the ramp midpoint, source gone after the
/// ramp, end event posted exactly once.
#[test]
fn test_fadeout_ramp_and_termination() {
    let backend = MockBackend::new();
    backend.script("A", SourcePlan::tone(192000, 32767));
    let engine = offline_engine(Arc::clone(&backend));
    let events = engine.events();

    engine
        .play(0, dummy_input(), "A", params("A"))
        .expect("play A");
    engine.set_endevent(0, 42).expect("endevent");
    engine.fadeout(0, 500).expect("fadeout");

    // 500 ms at 48 kHz = 24000 samples. Last frame of the first half sits
    // at ~50% gain.
    let out = render_frames(&engine, 12000);
    let mid = out[2 * 11999];
    assert!(
        (16000..=16800).contains(&mid),
        "midpoint gain ~0.5, got {}",
        mid
    );

    // Second half ramps to zero and exhausts the stop countdown.
    let out = render_frames(&engine, 12000);
    assert!(out[2 * 11999].abs() <= 4, "ramp lands at silence");

    // The next buffer performs the termination.
    let out = render_frames(&engine, 1024);
    assert!(out.iter().all(|&s| s == 0));
    assert_eq!(engine.queue_depth(0).unwrap(), 0);

    let posted: Vec<_> = events.try_iter().collect();
    assert_eq!(posted.len(), 1, "end event exactly once");
    assert_eq!(posted[0].code, 42);
    assert_eq!(posted[0].channel, 0);
}

/// Hard pan kills the far lane; a delayed pan retargets linearly.
#[test]
fn test_pan_law_and_ramp() {
    let backend = MockBackend::new();
    backend.script("A", SourcePlan::tone(400000, 16384));
    let engine = offline_engine(Arc::clone(&backend));

    engine
        .play(0, dummy_input(), "A", params("A"))
        .expect("play A");
    engine.set_pan(0, -1.0, 0.0).expect("pan left");

    let tone = expected_output(16384);
    let out = render_frames(&engine, 1024);
    assert_eq!(out[0], tone, "left untouched at full-left");
    assert_eq!(out[1], 0, "right silent at full-left");

    // Ramp to full-right over one second.
    engine.set_pan(0, 1.0, 1.0).expect("pan ramp");
    let out = render_frames(&engine, 24000);
    let left_mid = out[2 * 23999];
    let right_mid = out[2 * 23999 + 1];
    // Near center both lanes sit near full gain.
    assert!((left_mid - tone).abs() <= 64, "left near center: {}", left_mid);
    assert!((right_mid - tone).abs() <= 64, "right near center: {}", right_mid);

    let out = render_frames(&engine, 24000);
    assert!(out[2 * 23999].abs() <= 4, "left dead at full-right");
    assert_eq!(out[2 * 23999 + 1], tone, "right full at full-right");
}
