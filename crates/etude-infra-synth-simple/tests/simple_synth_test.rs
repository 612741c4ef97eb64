use etude_infra_synth_simple::SimpleSynth;
use etude_ports::synth::{SynthEvent, SynthPort};
use pretty_assertions::assert_eq;

fn peak(buf: &[f32]) -> f32 {
    buf.iter().fold(0.0, |acc, s| acc.max(s.abs()))
}

fn render(synth: &SimpleSynth, frames: usize) -> (Vec<f32>, Vec<f32>) {
    let mut left = vec![7.0; frames];
    let mut right = vec![7.0; frames];
    synth.render(frames, &mut left, &mut right);
    (left, right)
}

#[test]
fn silent_synth_overwrites_the_buffer() {
    let synth = SimpleSynth::new(8_000, 8);
    let (left, right) = render(&synth, 64);
    assert!(left.iter().chain(right.iter()).all(|s| *s == 0.0));
}

#[test]
fn note_level_follows_velocity_and_decays() {
    let synth = SimpleSynth::new(8_000, 8);
    synth.handle_event(SynthEvent::NoteOn { note: 69, velocity: 127 }, 0);

    let (first, right) = render(&synth, 400);
    assert_eq!(first, right);
    let first_peak = peak(&first);
    assert!(first_peak > 0.3);
    assert!(first_peak <= 0.6 * 0.9 + 1e-6);

    let (later, _) = render(&synth, 400);
    assert!(peak(&later) < first_peak);
}

#[test]
fn released_note_fades_out_and_frees_its_voice() {
    let synth = SimpleSynth::new(8_000, 8);
    synth.handle_event(SynthEvent::NoteOn { note: 60, velocity: 90 }, 0);
    render(&synth, 80);
    assert_eq!(synth.active_voices(), 1);

    synth.handle_event(SynthEvent::NoteOff { note: 60 }, 80);
    render(&synth, 800);

    assert_eq!(synth.active_voices(), 0);
    let (left, _) = render(&synth, 32);
    assert_eq!(peak(&left), 0.0);
}

#[test]
fn oldest_voice_is_stolen_at_the_limit() {
    let synth = SimpleSynth::new(8_000, 2);
    for note in [60, 64, 67] {
        synth.handle_event(SynthEvent::NoteOn { note, velocity: 80 }, 0);
    }
    assert_eq!(synth.active_voices(), 2);
}

#[test]
fn held_note_dies_away_on_its_own() {
    let synth = SimpleSynth::with_decay(8_000, 4, 0.1);
    synth.handle_event(SynthEvent::NoteOn { note: 72, velocity: 100 }, 0);
    render(&synth, 1_000);
    assert_eq!(synth.active_voices(), 0);
}
