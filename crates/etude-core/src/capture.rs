use crate::debounce::{DebounceKey, EventDebouncer};
use crate::observer::{ListenerError, ListenerId, Notifier};
use crate::quantize::quantize;
use etude_domain_arrangement::{EventKind, Recording, TypedEvent};
use etude_ports::clock::{ClockError, ClockSource};
use etude_ports::midi::RawInputEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, trace};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingOptions {
    pub quantize: bool,
    /// Beats of count-in; recorded for the host, not played here.
    pub count_in_beats: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CaptureEvent {
    MidiMessage(TypedEvent),
    RecordingStarted(RecordingOptions),
    RecordingStopped(Recording),
}

#[derive(Clone, Copy, Debug)]
pub struct CaptureConfig {
    pub debounce_window_ms: f64,
    pub tempo_bpm: u32,
    pub quantize_subdivision: u32,
}

struct ActiveRecording {
    start_ms: f64,
    options: RecordingOptions,
    events: Vec<TypedEvent>,
}

/// Decodes raw device messages, drops jittered duplicates and, while a
/// recording is open, collects events relative to its start.
pub struct InputCapture {
    cfg: CaptureConfig,
    clock: Arc<dyn ClockSource>,
    debouncer: EventDebouncer,
    recording: Option<ActiveRecording>,
    notifier: Notifier<CaptureEvent>,
}

/// Status byte, data bytes and timestamp to a typed event with no recording offset.
pub fn decode_raw(raw: &RawInputEvent, timestamp_ms: f64) -> TypedEvent {
    TypedEvent {
        kind: EventKind::from_status(raw.status, raw.data2),
        channel: raw.status & 0x0F,
        note: raw.data1 & 0x7F,
        velocity: raw.data2 & 0x7F,
        timestamp: timestamp_ms,
        delta_time: 0.0,
    }
}

impl InputCapture {
    pub fn new(cfg: CaptureConfig, clock: Arc<dyn ClockSource>) -> Self {
        Self {
            debouncer: EventDebouncer::new(cfg.debounce_window_ms),
            cfg,
            clock,
            recording: None,
            notifier: Notifier::new(),
        }
    }

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&CaptureEvent) -> Result<(), ListenerError> + Send + 'static,
    {
        self.notifier.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.notifier.unsubscribe(id)
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn tempo_bpm(&self) -> u32 {
        self.cfg.tempo_bpm
    }

    pub fn set_tempo_bpm(&mut self, tempo_bpm: u32) {
        self.cfg.tempo_bpm = tempo_bpm.max(1);
    }

    /// Decodes bytes from a device. Empty messages are dropped.
    pub fn handle_bytes(
        &mut self,
        message: &[u8],
        device_timestamp_ms: f64,
    ) -> Result<Option<TypedEvent>, ClockError> {
        match RawInputEvent::from_bytes(message, device_timestamp_ms) {
            Ok(raw) => self.handle_raw(raw),
            Err(err) => {
                trace!(%err, "dropping malformed input");
                Ok(None)
            }
        }
    }

    /// Runs one raw event through the debouncer and the decoder.
    ///
    /// Returns `None` for a suppressed duplicate. Every event that passes is
    /// announced as [`CaptureEvent::MidiMessage`], recording or not.
    pub fn handle_raw(&mut self, raw: RawInputEvent) -> Result<Option<TypedEvent>, ClockError> {
        let timestamp = if raw.device_timestamp_ms > 0.0 {
            raw.device_timestamp_ms
        } else {
            self.clock.now_ms()?
        };

        if self
            .debouncer
            .should_suppress(DebounceKey::from_raw(&raw), timestamp)
        {
            trace!(status = raw.status, note = raw.data1, "debounced");
            return Ok(None);
        }

        let mut event = decode_raw(&raw, timestamp);
        if let Some(active) = self.recording.as_mut() {
            event.delta_time = (timestamp - active.start_ms).max(0.0);
            active.events.push(event);
        }

        self.notifier.notify(&CaptureEvent::MidiMessage(event));
        Ok(Some(event))
    }

    /// Opens a new recording. An open recording is discarded and restarted.
    pub fn start_recording(&mut self, options: RecordingOptions) -> Result<(), ClockError> {
        let start_ms = self.clock.now_ms()?;
        if self.recording.is_some() {
            debug!("restarting open recording");
        }
        self.recording = Some(ActiveRecording {
            start_ms,
            options,
            events: Vec::new(),
        });
        info!(quantize = options.quantize, "recording started");
        self.notifier.notify(&CaptureEvent::RecordingStarted(options));
        Ok(())
    }

    /// Closes the open recording; `None` when nothing is being recorded.
    pub fn stop_recording(&mut self) -> Result<Option<Recording>, ClockError> {
        let Some(active) = self.recording.as_ref() else {
            return Ok(None);
        };
        let duration = (self.clock.now_ms()? - active.start_ms).max(0.0);
        let Some(active) = self.recording.take() else {
            return Ok(None);
        };

        let mut events = active.events;
        if active.options.quantize {
            events = quantize(&events, self.cfg.tempo_bpm, self.cfg.quantize_subdivision);
        }
        events.sort_by(|a, b| a.delta_time.total_cmp(&b.delta_time));

        let recording = Recording {
            events,
            duration,
            tempo: self.cfg.tempo_bpm,
            recorded_at: unix_millis(),
        };
        info!(
            events = recording.events.len(),
            duration_ms = recording.duration,
            "recording stopped"
        );
        self.notifier
            .notify(&CaptureEvent::RecordingStopped(recording.clone()));
        Ok(Some(recording))
    }
}

fn unix_millis() -> Option<u64> {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    u64::try_from(elapsed.as_millis()).ok()
}
