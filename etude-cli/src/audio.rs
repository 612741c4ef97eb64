use etude_core::{audio_pipeline, AudioClock, EngineConfig, GraphSoundOutput};
use etude_infra_audio_cpal::CpalAudioOutputPort;
use etude_infra_synth_simple::SimpleSynth;
use etude_ports::audio::{AudioOutputPort, AudioStreamHandle};
use etude_ports::synth::SynthPort;
use etude_ports::types::{AudioConfig, Volume01};
use std::sync::Arc;
use tracing::info;

const MAX_VOICES: usize = 32;

/// The default audio output driving the built-in synth. The clock reads the
/// stream's rendered position.
pub struct AudioOut {
    pub clock: Arc<AudioClock>,
    pub sound: Arc<GraphSoundOutput>,
    stream: Box<dyn AudioStreamHandle>,
}

pub fn open(config: &EngineConfig) -> anyhow::Result<AudioOut> {
    let rate = config.sample_rate_hz;
    let clock = Arc::new(AudioClock::new());
    let synth = Arc::new(SimpleSynth::new(rate, MAX_VOICES));
    let (sound, graph) = audio_pipeline(
        synth.clone(),
        clock.clone(),
        Volume01::new(1.0),
        config.ring_capacity,
    );

    synth.set_sample_rate(rate);
    clock.attach(rate);
    let opened = CpalAudioOutputPort::new().open_output(
        None,
        AudioConfig {
            sample_rate_hz: rate,
            ..AudioConfig::default()
        },
        Box::new(graph),
    );
    let stream = match opened {
        Ok(stream) => stream,
        Err(err) => {
            clock.detach();
            return Err(err.into());
        }
    };
    info!(sample_rate_hz = rate, "audio output open");

    Ok(AudioOut {
        clock,
        sound: Arc::new(sound),
        stream,
    })
}

impl AudioOut {
    pub fn close(self) {
        self.clock.detach();
        self.stream.close();
    }
}
