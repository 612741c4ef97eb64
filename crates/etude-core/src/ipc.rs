use crate::capture::RecordingOptions;
use crate::playback::PlaybackOptions;
use etude_domain_arrangement::{Arrangement, Recording, TypedEvent};
use etude_domain_eval::{AnalysisResult, PracticeSession, Recommendation, ScoreEvent};
use etude_ports::types::{DeviceId, MidiInputDevice, MidiOutputDevice};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ArrangementSource {
    MidiFile(String),
    JsonFile(String),
    Inline(Arrangement),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Command {
    ListMidiInputs,
    SelectMidiInput { device_id: DeviceId },
    ListMidiOutputs,
    SelectMidiOutput { device_id: Option<DeviceId> },
    LoadArrangement { source: ArrangementSource },
    StartPractice,
    StopPractice,
    SetSpeed { speed: f64 },
    SetLoop { enabled: bool },
    StartRecording { options: RecordingOptions },
    StopRecording,
    PlayRecording { recording: Option<Recording>, options: PlaybackOptions },
    StopPlayback,
    ExportRecording { path: String },
    AnalyzeTake { session: PracticeSession },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PracticeState {
    Idle,
    Ready,
    Running,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    MidiInputsUpdated { devices: Vec<MidiInputDevice> },
    MidiOutputsUpdated { devices: Vec<MidiOutputDevice> },
    /// Device input is unavailable; only `push_raw` input is processed.
    ManualInputOnly { reason: String },
    ArrangementLoaded { notes: usize, end_s: f64 },
    PracticeStateUpdated { state: PracticeState, speed: f64, looping: bool },
    MidiMessage { event: TypedEvent },
    RecordingStarted { options: RecordingOptions },
    RecordingStopped { recording: Recording },
    PlaybackStarted,
    PlaybackStopped,
    PracticeFeedback { event: ScoreEvent },
    AnalysisReady {
        result: AnalysisResult,
        recommendations: Vec<Recommendation>,
    },
    RecordingExported { path: String, bytes: usize },
}
