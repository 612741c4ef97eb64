use crate::types::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One message as delivered by an input device, before decoding.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawInputEvent {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
    /// Milliseconds on the capture clock; `<= 0` means the device gave none.
    pub device_timestamp_ms: f64,
}

impl RawInputEvent {
    /// Missing data bytes read as zero; an empty message is malformed.
    pub fn from_bytes(message: &[u8], device_timestamp_ms: f64) -> Result<Self, MidiError> {
        let Some(&status) = message.first() else {
            return Err(MidiError::MalformedEvent(message.len()));
        };
        Ok(Self {
            status,
            data1: message.get(1).copied().unwrap_or(0),
            data2: message.get(2).copied().unwrap_or(0),
            device_timestamp_ms,
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum MidiError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("malformed event ({0} bytes)")]
    MalformedEvent(usize),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// MIDI input stream handle: drop closes it.
pub trait MidiInputStream: Send {
    fn close(self: Box<Self>);
}

pub type RawEventCallback = Arc<dyn Fn(RawInputEvent) + Send + Sync + 'static>;

pub trait MidiInputPort: Send + Sync {
    fn list_inputs(&self) -> Result<Vec<MidiInputDevice>, MidiError>;

    /// Open input stream: implementation should invoke cb from a background thread/callback.
    fn open_input(
        &self,
        device_id: &DeviceId,
        cb: RawEventCallback,
    ) -> Result<Box<dyn MidiInputStream>, MidiError>;
}

/// An open output connection.
pub trait MidiOutputSink: Send {
    fn send(&mut self, message: &[u8]) -> Result<(), MidiError>;
}

pub trait MidiOutputPort: Send + Sync {
    fn list_outputs(&self) -> Result<Vec<MidiOutputDevice>, MidiError>;

    /// `None` picks the first available output.
    fn open_output(&self, device_id: Option<&DeviceId>) -> Result<Box<dyn MidiOutputSink>, MidiError>;
}
