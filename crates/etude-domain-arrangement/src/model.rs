use serde::{Deserialize, Serialize};

pub const DEFAULT_TEMPO_BPM: u32 = 120;

/// One note of an arrangement. Times are seconds from the start of the piece.
///
/// A zero `velocity` or non-positive `duration` means "not given"; the
/// scheduler substitutes its configured defaults.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub pitch: u8,
    #[serde(default)]
    pub velocity: u8,
    pub start: f64,
    #[serde(default)]
    pub duration: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Arrangement {
    pub notes: Vec<NoteEvent>,
}

impl Arrangement {
    pub fn new(notes: Vec<NoteEvent>) -> Self {
        Self { notes }
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Latest note end in seconds, `0` for an empty arrangement.
    pub fn end_s(&self) -> f64 {
        self.notes
            .iter()
            .map(|note| note.start + note.duration.max(0.0))
            .fold(0.0, f64::max)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    NoteOn,
    NoteOff,
    ControlChange,
    ProgramChange,
    PitchBend,
    Unknown,
}

impl EventKind {
    /// Decodes the high nibble of a status byte. NoteOn with velocity 0 is a NoteOff.
    pub fn from_status(status: u8, velocity: u8) -> Self {
        match status & 0xF0 {
            0x90 if velocity > 0 => EventKind::NoteOn,
            0x90 | 0x80 => EventKind::NoteOff,
            0xB0 => EventKind::ControlChange,
            0xC0 => EventKind::ProgramChange,
            0xE0 => EventKind::PitchBend,
            _ => EventKind::Unknown,
        }
    }
}

/// A decoded input message. For control changes `note` carries the controller
/// number and `velocity` the value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedEvent {
    pub kind: EventKind,
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
    /// Milliseconds on the capture clock.
    pub timestamp: f64,
    /// Milliseconds since the recording started, `0` outside a recording.
    pub delta_time: f64,
}

impl TypedEvent {
    /// The three-byte channel message for NoteOn, NoteOff and ControlChange.
    pub fn channel_message(&self) -> Option<[u8; 3]> {
        let status = match self.kind {
            EventKind::NoteOn => 0x90,
            EventKind::NoteOff => 0x80,
            EventKind::ControlChange => 0xB0,
            _ => return None,
        };
        Some([
            status | (self.channel & 0x0F),
            self.note & 0x7F,
            self.velocity & 0x7F,
        ])
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    /// Ordered by non-decreasing `delta_time`.
    pub events: Vec<TypedEvent>,
    pub duration: f64,
    pub tempo: u32,
    /// Unix milliseconds; absent for recordings decoded from a file.
    pub recorded_at: Option<u64>,
}

impl Recording {
    pub fn tempo_or_default(&self) -> u32 {
        if self.tempo == 0 {
            DEFAULT_TEMPO_BPM
        } else {
            self.tempo
        }
    }
}
