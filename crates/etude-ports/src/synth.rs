use crate::types::SampleTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SynthEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
}

/// Thread model:
/// - set_sample_rate is called from the core thread (can lock internally)
/// - handle_event/render are called from the audio thread (must be realtime-safe)
pub trait SynthPort: Send + Sync {
    fn set_sample_rate(&self, sample_rate_hz: u32);

    fn handle_event(&self, event: SynthEvent, at: SampleTime);

    fn render(&self, frames: usize, out_l: &mut [f32], out_r: &mut [f32]);
}
