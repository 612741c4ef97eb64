mod common;

use common::RecordingSink;
use etude_core::{CooperativeTask, ManualClock, PlaybackNotice, PlaybackOptions, RecordingPlayer, TaskPoll};
use etude_domain_arrangement::{EventKind, Recording, TypedEvent};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn event(kind: EventKind, note: u8, delta_time: f64) -> TypedEvent {
    TypedEvent {
        kind,
        channel: 1,
        note,
        velocity: if kind == EventKind::NoteOn { 90 } else { 0 },
        timestamp: delta_time,
        delta_time,
    }
}

fn recording(events: Vec<TypedEvent>) -> Recording {
    Recording {
        duration: events.iter().map(|e| e.delta_time).fold(0.0, f64::max),
        events,
        tempo: 120,
        recorded_at: None,
    }
}

fn player(clock: &Arc<ManualClock>, sink: &RecordingSink) -> RecordingPlayer {
    RecordingPlayer::new(clock.clone(), Box::new(sink.clone()))
}

#[test]
fn events_are_sent_once_in_delta_order() {
    let clock = Arc::new(ManualClock::new(10.0));
    let sink = RecordingSink::default();
    let mut player = player(&clock, &sink);
    let take = recording(vec![
        event(EventKind::NoteOff, 60, 200.0),
        event(EventKind::NoteOn, 60, 0.0),
        event(EventKind::NoteOn, 64, 100.0),
    ]);

    player.play(take, PlaybackOptions::default()).expect("clock");
    assert_eq!(player.tick().expect("clock"), 1);
    assert_eq!(player.tick().expect("clock"), 0);
    clock.advance(0.15);
    assert_eq!(player.tick().expect("clock"), 1);
    clock.advance(0.1);
    assert_eq!(player.tick().expect("clock"), 1);

    assert_eq!(
        *sink.sent.lock(),
        vec![vec![0x91, 60, 90], vec![0x91, 64, 90], vec![0x81, 60, 0]]
    );
    assert!(!player.is_playing());
}

#[test]
fn speed_scales_elapsed_time() {
    let clock = Arc::new(ManualClock::new(0.0));
    let sink = RecordingSink::default();
    let mut player = player(&clock, &sink);
    let take = recording(vec![
        event(EventKind::NoteOn, 60, 0.0),
        event(EventKind::NoteOn, 62, 400.0),
    ]);

    player
        .play(
            take,
            PlaybackOptions {
                speed: 2.0,
                looping: false,
            },
        )
        .expect("clock");
    player.tick().expect("clock");
    clock.set(0.21);
    player.tick().expect("clock");

    assert_eq!(sink.sent.lock().len(), 2);
}

#[test]
fn failed_send_is_skipped() {
    let clock = Arc::new(ManualClock::new(0.0));
    let sink = RecordingSink {
        fail_note: Some(61),
        ..RecordingSink::default()
    };
    let mut player = player(&clock, &sink);
    let take = recording(vec![
        event(EventKind::NoteOn, 60, 0.0),
        event(EventKind::NoteOn, 61, 0.0),
        event(EventKind::NoteOn, 62, 0.0),
    ]);

    player.play(take, PlaybackOptions::default()).expect("clock");
    assert_eq!(player.tick().expect("clock"), 2);

    let notes: Vec<u8> = sink.sent.lock().iter().map(|m| m[1]).collect();
    assert_eq!(notes, vec![60, 62]);
}

#[test]
fn events_without_a_channel_message_are_not_sent() {
    let clock = Arc::new(ManualClock::new(0.0));
    let sink = RecordingSink::default();
    let mut player = player(&clock, &sink);
    let take = recording(vec![
        event(EventKind::ProgramChange, 5, 0.0),
        event(EventKind::ControlChange, 64, 0.0),
    ]);

    player.play(take, PlaybackOptions::default()).expect("clock");
    player.tick().expect("clock");

    assert_eq!(*sink.sent.lock(), vec![vec![0xB1, 64, 0]]);
}

#[test]
fn looping_replays_from_the_start() {
    let clock = Arc::new(ManualClock::new(0.0));
    let sink = RecordingSink::default();
    let mut player = player(&clock, &sink);
    let take = recording(vec![
        event(EventKind::NoteOn, 60, 0.0),
        event(EventKind::NoteOff, 60, 50.0),
    ]);

    player
        .play(
            take,
            PlaybackOptions {
                speed: 1.0,
                looping: true,
            },
        )
        .expect("clock");
    for _ in 0..3 {
        assert_eq!(player.resume(), TaskPoll::Pending);
        clock.advance(0.06);
    }

    assert!(player.is_playing());
    assert_eq!(sink.sent.lock().len(), 4);
}

#[test]
fn play_while_playing_is_ignored_and_stop_notifies() {
    let clock = Arc::new(ManualClock::new(0.0));
    let sink = RecordingSink::default();
    let mut player = player(&clock, &sink);
    let notices = Arc::new(Mutex::new(Vec::new()));
    let seen = notices.clone();
    player.subscribe(move |notice: &PlaybackNotice| {
        seen.lock().push(*notice);
        Ok(())
    });

    let take = recording(vec![event(EventKind::NoteOn, 60, 500.0)]);
    player.play(take.clone(), PlaybackOptions::default()).expect("clock");
    player.play(take, PlaybackOptions::default()).expect("clock");
    player.stop();
    player.stop();

    assert_eq!(
        *notices.lock(),
        vec![PlaybackNotice::PlaybackStarted, PlaybackNotice::PlaybackStopped]
    );
    assert_eq!(player.resume(), TaskPoll::Finished);
    assert!(sink.sent.lock().is_empty());
}
