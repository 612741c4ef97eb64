use etude_ports::synth::{SynthEvent, SynthPort};
use etude_ports::types::SampleTime;
use parking_lot::Mutex;
use std::f32::consts::TAU;

const MASTER_GAIN: f32 = 0.9;
const VOICE_GAIN: f32 = 0.6;
/// Level a decaying voice ramps down to; below it the voice is dropped.
const FLOOR: f32 = 0.0001;
const RELEASE_S: f32 = 0.05;

/// Sine-voice synth. Held notes decay exponentially over `decay_s`; a note-off
/// ramps the voice out over a short release.
pub struct SimpleSynth {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    sample_rate_hz: f32,
    max_voices: usize,
    decay_s: f32,
    voices: Vec<Voice>,
    note_counter: u64,
}

#[derive(Clone, Debug)]
struct Voice {
    note: u8,
    freq: f32,
    phase: f32,
    gain: f32,
    decay: f32,
    released: bool,
    age: u64,
}

impl SimpleSynth {
    pub fn new(sample_rate_hz: u32, max_voices: usize) -> Self {
        Self::with_decay(sample_rate_hz, max_voices, 0.8)
    }

    pub fn with_decay(sample_rate_hz: u32, max_voices: usize, decay_s: f32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sample_rate_hz: sample_rate_hz.max(1) as f32,
                max_voices: max_voices.max(1),
                decay_s: decay_s.max(0.001),
                voices: Vec::new(),
                note_counter: 0,
            }),
        }
    }

    /// Voices still sounding, including ones in release.
    pub fn active_voices(&self) -> usize {
        self.inner.lock().voices.len()
    }
}

impl Default for SimpleSynth {
    fn default() -> Self {
        Self::new(48_000, 32)
    }
}

/// Per-sample multiplier that takes a level of 1.0 down to [`FLOOR`] in `seconds`.
fn decay_per_sample(seconds: f32, sample_rate_hz: f32) -> f32 {
    (FLOOR.ln() / (seconds * sample_rate_hz).max(1.0)).exp()
}

impl Inner {
    fn note_on(&mut self, note: u8, velocity: u8) {
        self.note_counter = self.note_counter.wrapping_add(1);

        if self.voices.len() >= self.max_voices {
            if let Some((idx, _)) = self
                .voices
                .iter()
                .enumerate()
                .min_by_key(|(_, voice)| voice.age)
            {
                self.voices.swap_remove(idx);
            }
        }

        self.voices.push(Voice {
            note,
            freq: 440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0),
            phase: 0.0,
            gain: velocity.min(127) as f32 / 127.0 * VOICE_GAIN,
            decay: decay_per_sample(self.decay_s, self.sample_rate_hz),
            released: false,
            age: self.note_counter,
        });
    }

    fn note_off(&mut self, note: u8) {
        let release = decay_per_sample(RELEASE_S, self.sample_rate_hz);
        if let Some(voice) = self
            .voices
            .iter_mut()
            .filter(|voice| voice.note == note && !voice.released)
            .min_by_key(|voice| voice.age)
        {
            voice.released = true;
            voice.decay = voice.decay.min(release);
        }
    }

    fn render(&mut self, frames: usize, out_l: &mut [f32], out_r: &mut [f32]) {
        let frames = frames.min(out_l.len()).min(out_r.len());
        out_l[..frames].fill(0.0);
        out_r[..frames].fill(0.0);

        for voice in &mut self.voices {
            let phase_step = TAU * voice.freq / self.sample_rate_hz;
            for i in 0..frames {
                if voice.gain < FLOOR {
                    break;
                }
                let sample = voice.phase.sin() * voice.gain * MASTER_GAIN;
                out_l[i] += sample;
                out_r[i] += sample;
                voice.gain *= voice.decay;
                voice.phase += phase_step;
                if voice.phase >= TAU {
                    voice.phase -= TAU;
                }
            }
        }

        self.voices.retain(|voice| voice.gain >= FLOOR);
    }
}

impl SynthPort for SimpleSynth {
    fn set_sample_rate(&self, sample_rate_hz: u32) {
        self.inner.lock().sample_rate_hz = sample_rate_hz.max(1) as f32;
    }

    fn handle_event(&self, event: SynthEvent, _at: SampleTime) {
        let mut inner = self.inner.lock();
        match event {
            SynthEvent::NoteOn { note, velocity } => inner.note_on(note, velocity),
            SynthEvent::NoteOff { note } => inner.note_off(note),
        }
    }

    fn render(&self, frames: usize, out_l: &mut [f32], out_r: &mut [f32]) {
        self.inner.lock().render(frames, out_l, out_r);
    }
}
