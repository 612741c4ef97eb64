use etude_domain_arrangement::{Recording, TypedEvent};

/// Length of one grid step in ms, `None` for a zero tempo or subdivision.
pub fn grid_ms(tempo_bpm: u32, subdivision: u32) -> Option<f64> {
    if tempo_bpm == 0 || subdivision == 0 {
        return None;
    }
    Some(60.0 / tempo_bpm as f64 / subdivision as f64 * 1000.0)
}

/// Snaps each `delta_time` to the nearest grid step. Order and every other
/// field are preserved; an unusable grid returns the events unchanged.
pub fn quantize(events: &[TypedEvent], tempo_bpm: u32, subdivision: u32) -> Vec<TypedEvent> {
    let Some(step) = grid_ms(tempo_bpm, subdivision) else {
        return events.to_vec();
    };
    events
        .iter()
        .map(|event| TypedEvent {
            delta_time: (event.delta_time / step).round() * step,
            ..*event
        })
        .collect()
}

pub fn quantize_recording(recording: &Recording, subdivision: u32) -> Recording {
    Recording {
        events: quantize(&recording.events, recording.tempo_or_default(), subdivision),
        ..recording.clone()
    }
}
