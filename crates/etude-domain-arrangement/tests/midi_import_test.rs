use etude_domain_arrangement::{
    encode_recording, import_arrangement_bytes, Arrangement, EventKind, Recording, TypedEvent,
};
use midly::num::{u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use pretty_assertions::assert_eq;

fn build_midi(track: Vec<TrackEvent<'static>>) -> Vec<u8> {
    let smf = Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(480.into()),
        },
        tracks: vec![track],
    };
    let mut data = Vec::new();
    smf.write(&mut data).expect("midi write should succeed");
    data
}

fn note_on(delta: u32, key: u8) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(100),
            },
        },
    }
}

fn note_off(delta: u32, key: u8) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(64),
            },
        },
    }
}

fn end_of_track() -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    }
}

#[test]
fn import_pairs_notes_and_applies_tempo() {
    let track = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(midly::num::u24::new(1_000_000))),
        },
        note_on(0, 60),
        note_off(480, 60),
        note_on(0, 64),
        note_off(240, 64),
        end_of_track(),
    ];

    let arrangement = import_arrangement_bytes(&build_midi(track)).expect("import should succeed");

    let summary: Vec<_> = arrangement
        .notes
        .iter()
        .map(|n| (n.pitch, n.velocity, n.start, n.duration))
        .collect();
    assert_eq!(summary, vec![(60, 100, 0.0, 1.0), (64, 100, 1.0, 0.5)]);
}

#[test]
fn import_closes_overlapping_note_before_retrigger() {
    let track = vec![
        note_on(0, 60),
        // Second NoteOn without a NoteOff for the first note.
        note_on(480, 60),
        note_off(480, 60),
        end_of_track(),
    ];

    let arrangement = import_arrangement_bytes(&build_midi(track)).expect("import should succeed");

    assert_eq!(arrangement.notes.len(), 2);
    assert_eq!(arrangement.notes[0].start, 0.0);
    assert_eq!(arrangement.notes[0].duration, 0.5);
    assert_eq!(arrangement.notes[1].start, 0.5);
    assert_eq!(arrangement.notes[1].duration, 0.5);
}

#[test]
fn import_closes_dangling_notes_one_quarter_after_end() {
    let track = vec![note_on(0, 60), end_of_track()];

    let arrangement = import_arrangement_bytes(&build_midi(track)).expect("import should succeed");

    assert_eq!(arrangement.notes.len(), 1);
    assert_eq!(arrangement.notes[0].duration, 0.5);
}

#[test]
fn encoded_recording_is_readable_as_arrangement() {
    let event = |kind, delta_time| TypedEvent {
        kind,
        channel: 0,
        note: 67,
        velocity: 90,
        timestamp: delta_time,
        delta_time,
    };
    let recording = Recording {
        events: vec![
            event(EventKind::NoteOn, 250.0),
            event(EventKind::NoteOff, 750.0),
        ],
        duration: 1000.0,
        tempo: 120,
        recorded_at: None,
    };

    let bytes = encode_recording(&recording, 480).expect("encode should succeed");
    let arrangement = import_arrangement_bytes(&bytes).expect("import should succeed");

    assert_eq!(arrangement.notes.len(), 1);
    assert_eq!(arrangement.notes[0].pitch, 67);
    assert_eq!(arrangement.notes[0].start, 0.25);
    assert_eq!(arrangement.notes[0].duration, 0.5);
}

#[test]
fn arrangement_json_defaults_missing_fields() {
    let json = r#"{ "notes": [
        { "pitch": 60, "velocity": 80, "start": 0.0, "duration": 0.5 },
        { "pitch": 62, "start": 0.5 }
    ] }"#;

    let arrangement = Arrangement::from_json_str(json).expect("json should parse");

    assert_eq!(arrangement.notes.len(), 2);
    assert_eq!(arrangement.notes[1].velocity, 0);
    assert_eq!(arrangement.notes[1].duration, 0.0);
    assert_eq!(arrangement.end_s(), 0.5);
}
