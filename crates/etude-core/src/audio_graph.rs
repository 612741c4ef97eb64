use crate::clock::AudioClock;
use etude_ports::audio::AudioRenderCallback;
use etude_ports::clock::ClockSource;
use etude_ports::sound::{NoteRequest, SoundOutputPort};
use etude_ports::synth::{SynthEvent, SynthPort};
use etude_ports::types::{SampleTime, Volume01};
use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::Arc;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledNote {
    pub sample_time: SampleTime,
    pub event: SynthEvent,
}

/// Creates the sound output and the render callback joined by one ring.
pub fn audio_pipeline(
    synth: Arc<dyn SynthPort>,
    clock: Arc<AudioClock>,
    master: Volume01,
    capacity: usize,
) -> (GraphSoundOutput, AudioGraph) {
    let (producer, consumer) = RingBuffer::new(capacity.max(2));
    let output = GraphSoundOutput {
        producer: Mutex::new(producer),
        clock: clock.clone(),
    };
    let graph = AudioGraph::new(synth, consumer, clock, master, capacity);
    (output, graph)
}

/// [`SoundOutputPort`] that turns note requests into sample-stamped synth
/// events for the audio thread.
pub struct GraphSoundOutput {
    producer: Mutex<Producer<ScheduledNote>>,
    clock: Arc<AudioClock>,
}

impl GraphSoundOutput {
    fn push(&self, note: NoteRequest, at_sample: SampleTime, sample_rate_hz: u32) {
        let length = (note.duration_s.max(0.0) * sample_rate_hz as f64).round() as u64;
        let mut producer = self.producer.lock();
        if producer.slots() < 2 {
            warn!(note = note.midi, "audio queue full; dropping note");
            return;
        }
        let on = ScheduledNote {
            sample_time: at_sample,
            event: SynthEvent::NoteOn {
                note: note.midi,
                velocity: note.velocity,
            },
        };
        let off = ScheduledNote {
            sample_time: at_sample.saturating_add(length.max(1)),
            event: SynthEvent::NoteOff { note: note.midi },
        };
        let _ = producer.push(on);
        let _ = producer.push(off);
    }
}

impl SoundOutputPort for GraphSoundOutput {
    fn play_note_at(&self, note: NoteRequest, at_s: f64) {
        let Some(rate) = self.clock.sample_rate_hz() else {
            warn!(note = note.midi, "no audio stream; note dropped");
            return;
        };
        let at_sample = (at_s.max(0.0) * rate as f64).round() as SampleTime;
        self.push(note, at_sample.max(self.clock.get()), rate);
    }

    fn play_note(&self, note: NoteRequest) {
        match self.clock.now() {
            Ok(now) => self.play_note_at(note, now),
            Err(err) => warn!(%err, note = note.midi, "note dropped"),
        }
    }
}

/// Render callback: applies due note events at their sample offsets, mixes
/// the synth and runs a soft limiter. Publishes its position to the clock.
pub struct AudioGraph {
    synth: Arc<dyn SynthPort>,
    clock: Arc<AudioClock>,
    consumer: Consumer<ScheduledNote>,
    master: Volume01,
    pending: Vec<ScheduledNote>,
    due: Vec<ScheduledNote>,
    limiter_gain: f32,
}

impl AudioGraph {
    fn new(
        synth: Arc<dyn SynthPort>,
        consumer: Consumer<ScheduledNote>,
        clock: Arc<AudioClock>,
        master: Volume01,
        capacity: usize,
    ) -> Self {
        Self {
            synth,
            clock,
            consumer,
            master,
            pending: Vec::with_capacity(capacity),
            due: Vec::with_capacity(capacity),
            limiter_gain: 1.0,
        }
    }

    // The ring is in dispatch order, not sample order: each NoteOff is queued
    // right behind its NoteOn.
    fn collect_events(&mut self, sample_time_end: SampleTime) {
        self.due.clear();
        while let Ok(event) = self.consumer.pop() {
            self.pending.push(event);
        }

        let mut idx = 0;
        while idx < self.pending.len() {
            if self.pending[idx].sample_time < sample_time_end {
                self.due.push(self.pending.swap_remove(idx));
            } else {
                idx += 1;
            }
        }

        self.due.sort_by(|a, b| {
            a.sample_time
                .cmp(&b.sample_time)
                .then_with(|| event_rank(&a.event).cmp(&event_rank(&b.event)))
        });
    }

    fn render_segment(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        let frames = out_l.len().min(out_r.len());
        self.synth.render(frames, out_l, out_r);

        let master = self.master.get();
        let limit = 0.98_f32;
        let mut peak = 0.0_f32;
        for i in 0..frames {
            out_l[i] *= master;
            out_r[i] *= master;
            peak = peak.max(out_l[i].abs()).max(out_r[i].abs());
        }

        let target_gain = if peak > limit { limit / peak } else { 1.0 };
        let current_gain = self.limiter_gain;
        let coeff = if target_gain < current_gain { 0.25 } else { 0.01 };
        let new_gain = (current_gain + coeff * (target_gain - current_gain)).clamp(0.0, 1.0);
        self.limiter_gain = new_gain;

        if new_gain < 0.999 {
            for i in 0..frames {
                out_l[i] *= new_gain;
                out_r[i] *= new_gain;
            }
        }
    }
}

fn event_rank(event: &SynthEvent) -> u8 {
    match event {
        SynthEvent::NoteOff { .. } => 0,
        SynthEvent::NoteOn { .. } => 1,
    }
}

impl AudioRenderCallback for AudioGraph {
    fn render(&mut self, sample_time_start: SampleTime, out_l: &mut [f32], out_r: &mut [f32]) {
        let frames = out_l.len().min(out_r.len());
        let sample_time_end = sample_time_start.saturating_add(frames as u64);
        self.collect_events(sample_time_end);

        let mut cursor_sample = sample_time_start;
        let mut cursor_frame = 0usize;
        for idx in 0..self.due.len() {
            let event = self.due[idx];
            let event_sample = event.sample_time.max(cursor_sample);
            let offset = (event_sample - cursor_sample) as usize;
            if offset > 0 {
                let end = cursor_frame + offset;
                self.render_segment(&mut out_l[cursor_frame..end], &mut out_r[cursor_frame..end]);
                cursor_frame = end;
                cursor_sample = event_sample;
            }
            self.synth.handle_event(event.event, event_sample);
        }

        if cursor_frame < frames {
            self.render_segment(&mut out_l[cursor_frame..frames], &mut out_r[cursor_frame..frames]);
        }

        self.clock.set(sample_time_end);
    }
}
