use crate::model::{Arrangement, NoteEvent};
use crate::tempo::{TempoMap, TempoPoint, Tick};
use midly::{Fps, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

#[derive(thiserror::Error, Debug)]
pub enum ArrangementImportError {
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
}

pub fn import_arrangement_path(path: &Path) -> Result<Arrangement, ArrangementImportError> {
    let data = std::fs::read(path).map_err(|e| ArrangementImportError::Io(e.to_string()))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        let text =
            std::str::from_utf8(&data).map_err(|e| ArrangementImportError::Parse(e.to_string()))?;
        return Arrangement::from_json_str(text.trim_start_matches('\u{feff}'))
            .map_err(|e| ArrangementImportError::Parse(e.to_string()));
    }
    import_arrangement_bytes(&data)
}

/// Reads every track of a Standard MIDI File into one arrangement.
///
/// Note-ons are paired with the next note-off of the same channel and key. A
/// repeated note-on closes the sounding note first; notes still sounding at
/// the end are closed one quarter note after the last event.
pub fn import_arrangement_bytes(data: &[u8]) -> Result<Arrangement, ArrangementImportError> {
    let smf = Smf::parse(data).map_err(|e| ArrangementImportError::Parse(e.to_string()))?;
    let (ppq, tempo_override) = match smf.header.timing {
        Timing::Metrical(ticks) => (ticks.as_int(), None),
        Timing::Timecode(fps, ticks_per_frame) => {
            let (ppq, us_per_quarter) = timecode_ppq_and_tempo(fps, ticks_per_frame);
            (ppq, Some(us_per_quarter))
        }
    };

    let mut tempo_points: BTreeMap<Tick, u32> = BTreeMap::new();
    let mut spans: Vec<NoteSpan> = Vec::new();
    let mut last_tick: Tick = 0;

    for track in &smf.tracks {
        let mut tick: Tick = 0;
        let mut active: HashMap<(u8, u8), (Tick, u8)> = HashMap::new();
        for event in track {
            tick += event.delta.as_int() as Tick;
            last_tick = last_tick.max(tick);
            match &event.kind {
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            let key = key.as_int();
                            if let Some((start, velocity)) = active.remove(&(channel, key)) {
                                spans.push(NoteSpan::new(key, velocity, start, tick));
                            }
                            active.insert((channel, key), (tick, vel.as_int()));
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            let key = key.as_int();
                            if let Some((start, velocity)) = active.remove(&(channel, key)) {
                                spans.push(NoteSpan::new(key, velocity, start, tick));
                            }
                        }
                        _ => {}
                    }
                }
                TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter)) => {
                    tempo_points.insert(tick, us_per_quarter.as_int());
                }
                _ => {}
            }
        }

        for ((_, key), (start, velocity)) in active {
            spans.push(NoteSpan::new(key, velocity, start, Tick::MAX));
        }
    }

    let dangling_end = last_tick.saturating_add(ppq.max(1) as Tick);
    let tempo_map = TempoMap::new(ppq, build_tempo_points(tempo_points, tempo_override));

    let mut notes: Vec<NoteEvent> = spans
        .into_iter()
        .map(|span| {
            let end = span.end_tick.min(dangling_end);
            let start_s = tempo_map.tick_to_seconds(span.start_tick);
            NoteEvent {
                pitch: span.pitch,
                velocity: span.velocity,
                start: start_s,
                duration: tempo_map.tick_to_seconds(end) - start_s,
            }
        })
        .collect();
    notes.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.pitch.cmp(&b.pitch)));

    debug!(notes = notes.len(), ppq, "imported arrangement");
    Ok(Arrangement::new(notes))
}

struct NoteSpan {
    pitch: u8,
    velocity: u8,
    start_tick: Tick,
    end_tick: Tick,
}

impl NoteSpan {
    fn new(pitch: u8, velocity: u8, start_tick: Tick, end_tick: Tick) -> Self {
        Self {
            pitch,
            velocity,
            start_tick,
            end_tick,
        }
    }
}

fn build_tempo_points(
    tempo_points: BTreeMap<Tick, u32>,
    override_us_per_quarter: Option<u32>,
) -> Vec<TempoPoint> {
    if let Some(us_per_quarter) = override_us_per_quarter {
        return vec![TempoPoint {
            tick: 0,
            us_per_quarter,
        }];
    }

    tempo_points
        .into_iter()
        .map(|(tick, us_per_quarter)| TempoPoint {
            tick,
            us_per_quarter,
        })
        .collect()
}

fn timecode_ppq_and_tempo(fps: Fps, ticks_per_frame: u8) -> (u16, u32) {
    let ticks_per_frame = ticks_per_frame.max(1) as u16;
    match fps {
        Fps::Fps24 => (24 * ticks_per_frame, 1_000_000),
        Fps::Fps25 => (25 * ticks_per_frame, 1_000_000),
        Fps::Fps30 => (30 * ticks_per_frame, 1_000_000),
        Fps::Fps29 => (30 * ticks_per_frame, 1_001_000),
    }
}
