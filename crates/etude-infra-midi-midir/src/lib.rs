use etude_ports::clock::ClockSource;
use etude_ports::midi::{
    MidiError, MidiInputPort, MidiInputStream, MidiOutputPort, MidiOutputSink, RawEventCallback,
    RawInputEvent,
};
use etude_ports::types::{DeviceId, MidiInputDevice, MidiOutputDevice};
use midir::{Ignore, MidiInput, MidiOutput, MidiOutputConnection};
use std::sync::Arc;
use tracing::{debug, trace};

/// Device input through midir. Messages are stamped on the injected clock so
/// their timestamps line up with the recorder and the scheduler.
pub struct MidirMidiInputPort {
    client_name: String,
    clock: Arc<dyn ClockSource>,
}

impl MidirMidiInputPort {
    pub fn new(client_name: impl Into<String>, clock: Arc<dyn ClockSource>) -> Self {
        Self {
            client_name: client_name.into(),
            clock,
        }
    }

    fn create_midi_in(&self) -> Result<MidiInput, MidiError> {
        MidiInput::new(&self.client_name).map_err(|e| MidiError::DeviceUnavailable(e.to_string()))
    }
}

fn input_device_id(index: usize, name: &str) -> DeviceId {
    DeviceId(format!("midir:{}:{}", index, name))
}

fn output_device_id(index: usize, name: &str) -> DeviceId {
    DeviceId(format!("midir-out:{}:{}", index, name))
}

/// Empty messages are dropped; short ones read missing data bytes as zero.
fn to_raw(message: &[u8], timestamp_ms: f64) -> Option<RawInputEvent> {
    match RawInputEvent::from_bytes(message, timestamp_ms) {
        Ok(raw) => Some(raw),
        Err(err) => {
            trace!(%err, "ignoring midi message");
            None
        }
    }
}

pub struct MidirMidiInputStream {
    connection: Option<midir::MidiInputConnection<RawEventCallback>>,
}

impl MidiInputStream for MidirMidiInputStream {
    fn close(mut self: Box<Self>) {
        if let Some(connection) = self.connection.take() {
            let _ = connection.close();
        }
    }
}

impl MidiInputPort for MidirMidiInputPort {
    fn list_inputs(&self) -> Result<Vec<MidiInputDevice>, MidiError> {
        let midi_in = self.create_midi_in()?;
        let devices = midi_in
            .ports()
            .iter()
            .enumerate()
            .map(|(index, port)| {
                let name = midi_in
                    .port_name(port)
                    .unwrap_or_else(|_| "Unknown Input".to_string());
                MidiInputDevice {
                    id: input_device_id(index, &name),
                    name,
                    is_available: true,
                }
            })
            .collect();
        Ok(devices)
    }

    fn open_input(
        &self,
        device_id: &DeviceId,
        cb: RawEventCallback,
    ) -> Result<Box<dyn MidiInputStream>, MidiError> {
        let mut midi_in = self.create_midi_in()?;
        midi_in.ignore(Ignore::None);

        let port = midi_in
            .ports()
            .into_iter()
            .enumerate()
            .find(|(index, port)| {
                let name = midi_in
                    .port_name(port)
                    .unwrap_or_else(|_| "Unknown Input".to_string());
                &input_device_id(*index, &name) == device_id
            })
            .map(|(_, port)| port)
            .ok_or_else(|| MidiError::DeviceNotFound(device_id.to_string()))?;

        let clock = self.clock.clone();
        let connection = midi_in
            .connect(
                &port,
                "etude-midi-input",
                move |_stamp, message, callback: &mut RawEventCallback| {
                    let timestamp_ms = clock.now_ms().unwrap_or(0.0);
                    if let Some(raw) = to_raw(message, timestamp_ms) {
                        (callback)(raw);
                    }
                },
                cb,
            )
            .map_err(|e| MidiError::Backend(e.to_string()))?;
        debug!(%device_id, "midir input connected");

        Ok(Box::new(MidirMidiInputStream {
            connection: Some(connection),
        }))
    }
}

/// Device output through midir, used for recording playback.
pub struct MidirMidiOutputPort {
    client_name: String,
}

impl MidirMidiOutputPort {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }

    fn create_midi_out(&self) -> Result<MidiOutput, MidiError> {
        MidiOutput::new(&self.client_name).map_err(|e| MidiError::DeviceUnavailable(e.to_string()))
    }
}

impl Default for MidirMidiOutputPort {
    fn default() -> Self {
        Self::new("Etude")
    }
}

pub struct MidirOutputSink {
    connection: MidiOutputConnection,
}

impl MidiOutputSink for MidirOutputSink {
    fn send(&mut self, message: &[u8]) -> Result<(), MidiError> {
        self.connection
            .send(message)
            .map_err(|e| MidiError::SendFailed(e.to_string()))
    }
}

impl MidiOutputPort for MidirMidiOutputPort {
    fn list_outputs(&self) -> Result<Vec<MidiOutputDevice>, MidiError> {
        let midi_out = self.create_midi_out()?;
        let devices = midi_out
            .ports()
            .iter()
            .enumerate()
            .map(|(index, port)| {
                let name = midi_out
                    .port_name(port)
                    .unwrap_or_else(|_| "Unknown Output".to_string());
                MidiOutputDevice {
                    id: output_device_id(index, &name),
                    name,
                }
            })
            .collect();
        Ok(devices)
    }

    fn open_output(&self, device_id: Option<&DeviceId>) -> Result<Box<dyn MidiOutputSink>, MidiError> {
        let midi_out = self.create_midi_out()?;
        let ports = midi_out.ports();
        let port = match device_id {
            Some(wanted) => ports
                .iter()
                .enumerate()
                .find(|(index, port)| {
                    let name = midi_out
                        .port_name(port)
                        .unwrap_or_else(|_| "Unknown Output".to_string());
                    &output_device_id(*index, &name) == wanted
                })
                .map(|(_, port)| port.clone())
                .ok_or_else(|| MidiError::DeviceNotFound(wanted.to_string()))?,
            None => ports
                .first()
                .cloned()
                .ok_or_else(|| MidiError::DeviceUnavailable("no midi outputs".to_string()))?,
        };

        let connection = midi_out
            .connect(&port, "etude-midi-output")
            .map_err(|e| MidiError::Backend(e.to_string()))?;
        debug!("midir output connected");
        Ok(Box::new(MidirOutputSink { connection }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_ids_carry_index_and_name() {
        assert_eq!(input_device_id(2, "Piano"), DeviceId("midir:2:Piano".to_string()));
        assert_eq!(
            output_device_id(0, "Synth"),
            DeviceId("midir-out:0:Synth".to_string())
        );
    }

    #[test]
    fn messages_keep_raw_bytes_and_stamp() {
        let raw = to_raw(&[0x92, 60, 0], 12.5).expect("three bytes decode");
        assert_eq!((raw.status, raw.data1, raw.data2), (0x92, 60, 0));
        assert_eq!(raw.device_timestamp_ms, 12.5);

        let short = to_raw(&[0xC0, 7], 1.0).expect("two bytes decode");
        assert_eq!(short.data2, 0);

        assert!(to_raw(&[], 1.0).is_none());
    }
}
