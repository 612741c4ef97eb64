mod common;

use common::raw;
use etude_core::{
    grid_ms, quantize, CaptureConfig, CaptureEvent, DebounceKey, EventDebouncer, InputCapture,
    ManualClock, RecordingOptions,
};
use etude_domain_arrangement::{EventKind, TypedEvent};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn capture(clock: Arc<ManualClock>) -> InputCapture {
    InputCapture::new(
        CaptureConfig {
            debounce_window_ms: 5.0,
            tempo_bpm: 120,
            quantize_subdivision: 16,
        },
        clock,
    )
}

fn key(note: u8) -> DebounceKey {
    DebounceKey {
        kind: 0x90,
        note,
        velocity: 100,
    }
}

#[test]
fn debouncer_suppresses_repeats_inside_the_window() {
    let mut debouncer = EventDebouncer::new(5.0);
    assert!(!debouncer.should_suppress(key(60), 0.0));
    assert!(debouncer.should_suppress(key(60), 3.0));

    let mut debouncer = EventDebouncer::new(5.0);
    assert!(!debouncer.should_suppress(key(60), 0.0));
    assert!(!debouncer.should_suppress(key(60), 6.0));
    assert!(!debouncer.should_suppress(key(60), 11.0));
}

#[test]
fn debouncer_tracks_keys_independently() {
    let mut debouncer = EventDebouncer::new(5.0);
    assert!(!debouncer.should_suppress(key(60), 10.0));
    assert!(!debouncer.should_suppress(key(62), 11.0));
    assert!(!debouncer.should_suppress(
        DebounceKey {
            kind: 0x80,
            note: 60,
            velocity: 100
        },
        12.0
    ));
    assert!(debouncer.should_suppress(key(60), 14.9));
}

#[test]
fn raw_messages_decode_by_status_nibble() {
    let clock = Arc::new(ManualClock::new(1.0));
    let mut capture = capture(clock);

    let cases = [
        (0x93, 60, 100, EventKind::NoteOn, 3),
        (0x90, 61, 0, EventKind::NoteOff, 0),
        (0x85, 62, 64, EventKind::NoteOff, 5),
        (0xB0, 64, 127, EventKind::ControlChange, 0),
        (0xC2, 5, 0, EventKind::ProgramChange, 2),
        (0xE0, 0, 64, EventKind::PitchBend, 0),
        (0xF8, 0, 0, EventKind::Unknown, 8),
    ];
    for (i, (status, data1, data2, kind, channel)) in cases.into_iter().enumerate() {
        let event = capture
            .handle_raw(raw(status, data1, data2, 100.0 + i as f64 * 10.0))
            .expect("clock is available")
            .expect("event passes the debouncer");
        assert_eq!(event.kind, kind, "status {status:#04x}");
        assert_eq!(event.channel, channel);
        assert_eq!(event.delta_time, 0.0);
    }
}

#[test]
fn empty_messages_are_dropped_silently() {
    let mut capture = capture(Arc::new(ManualClock::new(1.0)));
    assert_eq!(capture.handle_bytes(&[], 10.0).expect("no clock error"), None);

    let event = capture
        .handle_bytes(&[0x90, 60], 10.0)
        .expect("no clock error")
        .expect("short message still decodes");
    assert_eq!(event.kind, EventKind::NoteOff);
    assert_eq!(event.velocity, 0);
}

#[test]
fn missing_device_timestamp_uses_the_clock() {
    let clock = Arc::new(ManualClock::new(2.5));
    let mut capture = capture(clock);

    let event = capture
        .handle_raw(raw(0x90, 60, 100, 0.0))
        .expect("clock is available")
        .expect("event passes");

    assert_eq!(event.timestamp, 2500.0);
}

#[test]
fn recording_collects_relative_times_and_stops_once() {
    let clock = Arc::new(ManualClock::new(1.0));
    let mut capture = capture(clock.clone());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    capture.subscribe(move |event: &CaptureEvent| {
        sink.lock().push(event.clone());
        Ok(())
    });

    capture.handle_raw(raw(0x90, 59, 90, 900.0)).expect("clock");
    capture
        .start_recording(RecordingOptions::default())
        .expect("clock");
    capture.handle_raw(raw(0x90, 60, 90, 1100.0)).expect("clock");
    capture.handle_raw(raw(0x80, 60, 0, 1350.0)).expect("clock");
    clock.set(1.5);

    let recording = capture
        .stop_recording()
        .expect("clock")
        .expect("a recording was open");

    let deltas: Vec<_> = recording
        .events
        .iter()
        .map(|e| (e.kind, e.delta_time))
        .collect();
    assert_eq!(
        deltas,
        vec![(EventKind::NoteOn, 100.0), (EventKind::NoteOff, 350.0)]
    );
    assert_eq!(recording.duration, 500.0);
    assert_eq!(recording.tempo, 120);
    assert!(recording.recorded_at.is_some());

    assert_eq!(capture.stop_recording().expect("clock"), None);

    let seen = seen.lock();
    assert_eq!(seen.len(), 5);
    assert!(matches!(seen[0], CaptureEvent::MidiMessage(_)));
    assert!(matches!(seen[1], CaptureEvent::RecordingStarted(_)));
    assert!(matches!(seen[4], CaptureEvent::RecordingStopped(_)));
}

#[test]
fn quantized_recording_snaps_to_sixteenths() {
    let clock = Arc::new(ManualClock::new(0.0));
    let mut capture = capture(clock.clone());
    capture
        .start_recording(RecordingOptions {
            quantize: true,
            count_in_beats: 0,
        })
        .expect("clock");
    capture.handle_raw(raw(0x90, 60, 90, 70.0)).expect("clock");
    capture.handle_raw(raw(0x90, 62, 90, 130.0)).expect("clock");
    clock.set(1.0);

    let recording = capture.stop_recording().expect("clock").expect("open");

    let deltas: Vec<_> = recording.events.iter().map(|e| e.delta_time).collect();
    assert_eq!(deltas, vec![62.5, 125.0]);
}

#[test]
fn failing_listener_does_not_block_others() {
    let mut capture = capture(Arc::new(ManualClock::new(0.0)));
    let count = Arc::new(Mutex::new(0));
    capture.subscribe(|_: &CaptureEvent| Err("display went away".into()));
    let counter = count.clone();
    capture.subscribe(move |_: &CaptureEvent| {
        *counter.lock() += 1;
        Ok(())
    });

    capture.handle_raw(raw(0x90, 60, 90, 10.0)).expect("clock");
    capture.handle_raw(raw(0x90, 62, 90, 20.0)).expect("clock");

    assert_eq!(*count.lock(), 2);
}

#[test]
fn debounced_duplicates_are_not_recorded() {
    let mut capture = capture(Arc::new(ManualClock::new(0.0)));
    capture
        .start_recording(RecordingOptions::default())
        .expect("clock");
    assert!(capture
        .handle_raw(raw(0x90, 60, 90, 10.0))
        .expect("clock")
        .is_some());
    assert!(capture
        .handle_raw(raw(0x91, 60, 90, 12.0))
        .expect("clock")
        .is_none());

    let recording = capture.stop_recording().expect("clock").expect("open");
    assert_eq!(recording.events.len(), 1);
}

fn typed(delta_time: f64) -> TypedEvent {
    TypedEvent {
        kind: EventKind::NoteOn,
        channel: 0,
        note: 60,
        velocity: 80,
        timestamp: delta_time,
        delta_time,
    }
}

#[test]
fn quantize_is_idempotent_and_keeps_order() {
    let events: Vec<_> = [0.0, 61.0, 130.0, 130.5, 260.0, 1013.0]
        .into_iter()
        .map(typed)
        .collect();

    let once = quantize(&events, 120, 16);
    let twice = quantize(&once, 120, 16);

    assert_eq!(once, twice);
    assert_eq!(once.len(), events.len());
    assert!(once.windows(2).all(|p| p[0].delta_time <= p[1].delta_time));
    assert_eq!(once[1].timestamp, 61.0);
}

#[test]
fn grid_follows_tempo_and_subdivision() {
    assert_eq!(grid_ms(120, 16), Some(31.25));
    assert_eq!(grid_ms(60, 4), Some(250.0));
    assert_eq!(grid_ms(0, 16), None);

    let events = vec![typed(17.0)];
    assert_eq!(quantize(&events, 0, 16), events);
}
