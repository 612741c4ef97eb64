#![allow(dead_code)]

use etude_ports::midi::{
    MidiError, MidiInputPort, MidiInputStream, MidiOutputPort, MidiOutputSink, RawEventCallback,
    RawInputEvent,
};
use etude_ports::sound::{NoteRequest, SoundOutputPort};
use etude_ports::types::{DeviceId, MidiInputDevice, MidiOutputDevice};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
pub struct RecordingSound {
    pub played: Mutex<Vec<(NoteRequest, f64)>>,
}

impl RecordingSound {
    pub fn times(&self) -> Vec<f64> {
        self.played.lock().iter().map(|(_, at)| *at).collect()
    }

    pub fn pitches(&self) -> Vec<u8> {
        self.played.lock().iter().map(|(note, _)| note.midi).collect()
    }
}

impl SoundOutputPort for RecordingSound {
    fn play_note_at(&self, note: NoteRequest, at_s: f64) {
        self.played.lock().push((note, at_s));
    }

    fn play_note(&self, note: NoteRequest) {
        self.played.lock().push((note, 0.0));
    }
}

/// Output sink that records messages; sending `fail_note` fails.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub sent: Arc<Mutex<Vec<Vec<u8>>>>,
    pub fail_note: Option<u8>,
}

impl MidiOutputSink for RecordingSink {
    fn send(&mut self, message: &[u8]) -> Result<(), MidiError> {
        if self.fail_note == message.get(1).copied() {
            return Err(MidiError::SendFailed("port closed".to_string()));
        }
        self.sent.lock().push(message.to_vec());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeMidiOutput {
    pub sink: RecordingSink,
}

impl MidiOutputPort for FakeMidiOutput {
    fn list_outputs(&self) -> Result<Vec<MidiOutputDevice>, MidiError> {
        Ok(vec![MidiOutputDevice {
            id: DeviceId("fake:out".to_string()),
            name: "Fake Out".to_string(),
        }])
    }

    fn open_output(&self, _device_id: Option<&DeviceId>) -> Result<Box<dyn MidiOutputSink>, MidiError> {
        Ok(Box::new(self.sink.clone()))
    }
}

struct FakeStream;

impl MidiInputStream for FakeStream {
    fn close(self: Box<Self>) {}
}

/// Input port whose device list can be changed; `unavailable` makes every
/// call fail with `DeviceUnavailable`.
#[derive(Default)]
pub struct FakeMidiInput {
    pub devices: Mutex<Vec<MidiInputDevice>>,
    pub unavailable: bool,
    pub callback: Mutex<Option<RawEventCallback>>,
}

impl FakeMidiInput {
    pub fn with_device(name: &str) -> Self {
        Self {
            devices: Mutex::new(vec![device(name)]),
            ..Self::default()
        }
    }

    pub fn emit(&self, raw: RawInputEvent) {
        if let Some(cb) = self.callback.lock().as_ref() {
            cb(raw);
        }
    }
}

pub fn device(name: &str) -> MidiInputDevice {
    MidiInputDevice {
        id: DeviceId(format!("fake:{name}")),
        name: name.to_string(),
        is_available: true,
    }
}

impl MidiInputPort for FakeMidiInput {
    fn list_inputs(&self) -> Result<Vec<MidiInputDevice>, MidiError> {
        if self.unavailable {
            return Err(MidiError::DeviceUnavailable("no midi backend".to_string()));
        }
        Ok(self.devices.lock().clone())
    }

    fn open_input(
        &self,
        _device_id: &DeviceId,
        cb: RawEventCallback,
    ) -> Result<Box<dyn MidiInputStream>, MidiError> {
        if self.unavailable {
            return Err(MidiError::DeviceUnavailable("no midi backend".to_string()));
        }
        *self.callback.lock() = Some(cb);
        Ok(Box::new(FakeStream))
    }
}

pub fn raw(status: u8, data1: u8, data2: u8, ts_ms: f64) -> RawInputEvent {
    RawInputEvent {
        status,
        data1,
        data2,
        device_timestamp_ms: ts_ms,
    }
}
