use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, FromSample, Sample, SampleFormat, SampleRate, SizedSample, StreamConfig,
    SupportedStreamConfigRange,
};
use etude_ports::audio::{AudioError, AudioOutputPort, AudioRenderCallback, AudioStreamHandle};
use etude_ports::types::{AudioConfig, AudioOutputDevice, DeviceId};
use std::sync::mpsc;
use std::thread;
use tracing::{debug, warn};

/// Output through the host's cpal backend. Each open stream lives on its own
/// thread because cpal streams are not `Send` on every platform.
pub struct CpalAudioOutputPort {
    host: cpal::Host,
}

struct SelectedStreamConfig {
    config: StreamConfig,
    sample_format: SampleFormat,
}

impl CpalAudioOutputPort {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    pub fn with_host(host: cpal::Host) -> Self {
        Self { host }
    }

    fn list_devices_from_host(
        host: &cpal::Host,
    ) -> Result<Vec<(DeviceId, cpal::Device)>, AudioError> {
        let host_id = format!("{:?}", host.id());
        let devices = host
            .output_devices()
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        Ok(devices
            .enumerate()
            .map(|(index, device)| {
                let name = device
                    .name()
                    .unwrap_or_else(|_| "Unknown Output".to_string());
                (DeviceId(format!("cpal:{}:{}:{}", host_id, index, name)), device)
            })
            .collect())
    }

    /// `None` is the host default.
    fn find_device(
        host: &cpal::Host,
        device_id: Option<&DeviceId>,
    ) -> Result<cpal::Device, AudioError> {
        let Some(device_id) = device_id else {
            return host
                .default_output_device()
                .ok_or_else(|| AudioError::DeviceUnavailable("no default output".to_string()));
        };
        Self::list_devices_from_host(host)?
            .into_iter()
            .find(|(id, _)| id == device_id)
            .map(|(_, device)| device)
            .ok_or_else(|| AudioError::DeviceNotFound(device_id.to_string()))
    }

    fn select_stream_config(
        device: &cpal::Device,
        desired: AudioConfig,
    ) -> Result<SelectedStreamConfig, AudioError> {
        let mut supported = device
            .supported_output_configs()
            .map_err(|e| AudioError::Backend(e.to_string()))?;

        let chosen = select_supported_config(&mut supported, desired)?;
        let sample_format = chosen.sample_format();
        let mut config = chosen.config();
        config.buffer_size = match desired.buffer_size_frames {
            Some(frames) => BufferSize::Fixed(frames),
            None => BufferSize::Default,
        };

        Ok(SelectedStreamConfig {
            config,
            sample_format,
        })
    }
}

impl Default for CpalAudioOutputPort {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CpalAudioStreamHandle {
    stop_tx: mpsc::Sender<()>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl AudioStreamHandle for CpalAudioStreamHandle {
    fn close(mut self: Box<Self>) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

impl AudioOutputPort for CpalAudioOutputPort {
    fn list_outputs(&self) -> Result<Vec<AudioOutputDevice>, AudioError> {
        let devices = Self::list_devices_from_host(&self.host)?;
        let mut results = Vec::new();

        for (id, device) in devices {
            let name = device
                .name()
                .unwrap_or_else(|_| "Unknown Output".to_string());
            let Ok(default_config) = device.default_output_config() else {
                continue;
            };

            results.push(AudioOutputDevice {
                id,
                name,
                default_config: AudioConfig {
                    sample_rate_hz: default_config.sample_rate().0,
                    channels: default_config.channels(),
                    buffer_size_frames: None,
                },
            });
        }

        Ok(results)
    }

    fn open_output(
        &self,
        device_id: Option<&DeviceId>,
        config: AudioConfig,
        cb: Box<dyn AudioRenderCallback>,
    ) -> Result<Box<dyn AudioStreamHandle>, AudioError> {
        let device_id = device_id.cloned();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (stop_tx, stop_rx) = mpsc::channel();

        let join_handle = thread::spawn(move || {
            let host = cpal::default_host();
            let started = Self::find_device(&host, device_id.as_ref()).and_then(|device| {
                let selected = Self::select_stream_config(&device, config)?;
                let stream = match selected.sample_format {
                    SampleFormat::F32 => build_stream::<f32>(&device, &selected.config, cb),
                    SampleFormat::I16 => build_stream::<i16>(&device, &selected.config, cb),
                    SampleFormat::U16 => build_stream::<u16>(&device, &selected.config, cb),
                    other => {
                        return Err(AudioError::UnsupportedConfig(format!(
                            "sample format {other:?}"
                        )))
                    }
                }
                .map_err(|e| AudioError::Backend(e.to_string()))?;
                stream
                    .play()
                    .map_err(|e| AudioError::Backend(e.to_string()))?;
                debug!(
                    sample_rate_hz = selected.config.sample_rate.0,
                    channels = selected.config.channels,
                    "audio stream started"
                );
                Ok(stream)
            });

            match started {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    let _ = stop_rx.recv();
                    drop(stream);
                    debug!("audio stream closed");
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            }
        });

        ready_rx
            .recv()
            .map_err(|e| AudioError::Backend(e.to_string()))??;
        Ok(Box::new(CpalAudioStreamHandle {
            stop_tx,
            join_handle: Some(join_handle),
        }))
    }
}

/// Builds a stream that renders planar stereo through `cb` and interleaves it
/// into the device's sample type.
fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut cb: Box<dyn AudioRenderCallback>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let initial_frames = match config.buffer_size {
        BufferSize::Fixed(frames) => frames as usize,
        BufferSize::Default => 8192,
    };
    let mut left = vec![0.0_f32; initial_frames];
    let mut right = vec![0.0_f32; initial_frames];
    let mut sample_time: u64 = 0;

    device.build_output_stream(
        config,
        move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels.max(1);
            if frames > left.len() {
                left.resize(frames, 0.0);
                right.resize(frames, 0.0);
            }
            cb.render(sample_time, &mut left[..frames], &mut right[..frames]);
            write_interleaved(data, channels, &left[..frames], &right[..frames]);
            sample_time = sample_time.saturating_add(frames as u64);
        },
        |err| warn!(%err, "cpal stream error"),
        None,
    )
}

fn select_supported_config(
    supported: &mut dyn Iterator<Item = SupportedStreamConfigRange>,
    desired: AudioConfig,
) -> Result<cpal::SupportedStreamConfig, AudioError> {
    let mut best: Option<(i32, cpal::SupportedStreamConfig)> = None;

    for range in supported {
        if range.channels() != desired.channels {
            continue;
        }
        if desired.sample_rate_hz < range.min_sample_rate().0
            || desired.sample_rate_hz > range.max_sample_rate().0
        {
            continue;
        }

        let score = match range.sample_format() {
            SampleFormat::F32 => 3,
            SampleFormat::I16 => 2,
            SampleFormat::U16 => 1,
            _ => continue,
        };
        if best.as_ref().map_or(true, |(best_score, _)| score > *best_score) {
            best = Some((score, range.with_sample_rate(SampleRate(desired.sample_rate_hz))));
        }
    }

    best.map(|(_, config)| config).ok_or_else(|| {
        AudioError::UnsupportedConfig(format!(
            "no {} channel output at {} Hz",
            desired.channels, desired.sample_rate_hz
        ))
    })
}

/// Mono devices get the average of both sides; channels past the second are silent.
fn write_interleaved<T>(data: &mut [T], channels: usize, left: &[f32], right: &[f32])
where
    T: Sample + FromSample<f32>,
{
    if channels == 0 {
        return;
    }
    for (frame, out) in data.chunks_exact_mut(channels).enumerate() {
        let l = left.get(frame).copied().unwrap_or(0.0).clamp(-1.0, 1.0);
        let r = right.get(frame).copied().unwrap_or(0.0).clamp(-1.0, 1.0);
        if channels == 1 {
            out[0] = T::from_sample((l + r) * 0.5);
            continue;
        }
        out[0] = T::from_sample(l);
        out[1] = T::from_sample(r);
        for sample in &mut out[2..] {
            *sample = T::EQUILIBRIUM;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_frames_are_interleaved_and_extra_channels_silenced() {
        let mut data = [9.0_f32; 8];
        write_interleaved(&mut data, 4, &[0.25, -0.5], &[0.75, 1.0]);
        assert_eq!(data, [0.25, 0.75, 0.0, 0.0, -0.5, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn mono_output_mixes_both_sides() {
        let mut data = [1.0_f32; 2];
        write_interleaved(&mut data, 1, &[1.0, 0.0], &[0.5, -1.0]);
        assert_eq!(data, [0.75, -0.5]);
    }

    #[test]
    fn integer_samples_are_clamped_and_centred() {
        let mut data = [0_u16; 3];
        write_interleaved(&mut data, 3, &[4.0], &[-4.0]);
        assert_eq!(data[0], u16::from_sample(1.0_f32));
        assert_eq!(data[1], u16::from_sample(-1.0_f32));
        assert_eq!(data[2], u16::EQUILIBRIUM);
    }
}
