use crate::capture::{CaptureEvent, InputCapture};
use crate::config::EngineConfig;
use crate::devices::DeviceWatcher;
use crate::ipc::{ArrangementSource, Command, Event, PracticeState};
use crate::playback::{PlaybackNotice, PlaybackOptions, RecordingPlayer};
use crate::scheduler::{Scheduler, SchedulerError};
use crate::task::{CooperativeTask, TaskPoll};
use etude_domain_arrangement::{
    encode_recording, import_arrangement_path, Arrangement, ArrangementImportError, EventKind,
    InterchangeError, Recording, TypedEvent,
};
use etude_domain_eval::{
    AdaptiveDifficulty, PerformanceAnalyzer, PlayerNoteOn, PracticeScorer, PracticeSession,
    ScoreEvent, ScorerConfig,
};
use etude_ports::clock::{ClockError, ClockSource};
use etude_ports::midi::{MidiError, MidiInputPort, MidiInputStream, MidiOutputPort, RawInputEvent};
use etude_ports::sound::SoundOutputPort;
use etude_ports::types::DeviceId;
use parking_lot::Mutex;
use rtrb::{Consumer, RingBuffer};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEVICE_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(thiserror::Error, Debug)]
pub enum TrainerError {
    #[error("midi error: {0}")]
    Midi(#[from] MidiError),
    #[error("clock error: {0}")]
    Clock(#[from] ClockError),
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("arrangement load failed: {0}")]
    Import(#[from] ArrangementImportError),
    #[error("interchange error: {0}")]
    Interchange(#[from] InterchangeError),
    #[error("no recording available")]
    NoRecording,
}

/// Collaborators the trainer is wired to.
pub struct TrainerPorts {
    pub clock: Arc<dyn ClockSource>,
    pub midi_in: Arc<dyn MidiInputPort>,
    pub midi_out: Arc<dyn MidiOutputPort>,
    pub sound: Arc<dyn SoundOutputPort>,
}

pub struct TrainerCore {
    config: EngineConfig,
    clock: Arc<dyn ClockSource>,
    midi_in: Arc<dyn MidiInputPort>,
    midi_out: Arc<dyn MidiOutputPort>,
    capture: InputCapture,
    capture_rx: Arc<Mutex<VecDeque<CaptureEvent>>>,
    scheduler: Scheduler,
    player: Option<RecordingPlayer>,
    player_rx: Arc<Mutex<VecDeque<PlaybackNotice>>>,
    selected_output: Option<DeviceId>,
    watcher: DeviceWatcher,
    scorer: Option<PracticeScorer>,
    analyzer: PerformanceAnalyzer,
    difficulty: AdaptiveDifficulty,
    practice_state: PracticeState,
    last_recording: Option<Recording>,
    midi_stream: Option<Box<dyn MidiInputStream>>,
    midi_queue_rx: Option<Consumer<RawInputEvent>>,
    manual_input: bool,
    events: VecDeque<Event>,
    last_device_poll: Option<Instant>,
}

impl TrainerCore {
    pub fn new(config: EngineConfig, ports: TrainerPorts) -> Self {
        let mut capture = InputCapture::new(config.capture_config(), ports.clock.clone());
        let capture_rx = Arc::new(Mutex::new(VecDeque::new()));
        let queue = capture_rx.clone();
        capture.subscribe(move |event: &CaptureEvent| {
            queue.lock().push_back(event.clone());
            Ok(())
        });

        let scheduler = Scheduler::new(config.scheduler_config(), ports.clock.clone(), ports.sound);
        let watcher = DeviceWatcher::new(ports.midi_in.clone()).with_outputs(ports.midi_out.clone());

        Self {
            config,
            clock: ports.clock,
            midi_in: ports.midi_in,
            midi_out: ports.midi_out,
            capture,
            capture_rx,
            scheduler,
            player: None,
            player_rx: Arc::new(Mutex::new(VecDeque::new())),
            selected_output: None,
            watcher,
            scorer: None,
            analyzer: PerformanceAnalyzer::new(),
            difficulty: AdaptiveDifficulty,
            practice_state: PracticeState::Idle,
            last_recording: None,
            midi_stream: None,
            midi_queue_rx: None,
            manual_input: false,
            events: VecDeque::new(),
            last_device_poll: None,
        }
    }

    /// Swaps the analyzer, e.g. for one with a different improvement detector.
    pub fn set_analyzer(&mut self, analyzer: PerformanceAnalyzer) {
        self.analyzer = analyzer;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_manual_input(&self) -> bool {
        self.manual_input
    }

    pub fn last_recording(&self) -> Option<&Recording> {
        self.last_recording.as_ref()
    }

    pub fn is_practicing(&self) -> bool {
        self.practice_state == PracticeState::Running
    }

    pub fn is_playing_recording(&self) -> bool {
        self.player.as_ref().is_some_and(RecordingPlayer::is_playing)
    }

    pub fn handle_command(&mut self, cmd: Command) -> Result<(), TrainerError> {
        match cmd {
            Command::ListMidiInputs => match self.midi_in.list_inputs() {
                Ok(devices) => self.events.push_back(Event::MidiInputsUpdated { devices }),
                Err(MidiError::DeviceUnavailable(reason)) => self.fall_back_to_manual(reason),
                Err(err) => return Err(err.into()),
            },
            Command::SelectMidiInput { device_id } => {
                self.open_midi_input(device_id)?;
            }
            Command::ListMidiOutputs => {
                let devices = self.midi_out.list_outputs()?;
                self.events.push_back(Event::MidiOutputsUpdated { devices });
            }
            Command::SelectMidiOutput { device_id } => {
                self.selected_output = device_id;
            }
            Command::LoadArrangement { source } => {
                let arrangement = match source {
                    ArrangementSource::MidiFile(path) | ArrangementSource::JsonFile(path) => {
                        import_arrangement_path(Path::new(&path))?
                    }
                    ArrangementSource::Inline(arrangement) => arrangement,
                };
                self.load_arrangement(arrangement);
            }
            Command::StartPractice => {
                self.start_practice()?;
            }
            Command::StopPractice => {
                self.stop_practice()?;
            }
            Command::SetSpeed { speed } => {
                self.scheduler.set_speed(speed)?;
                self.emit_practice_state();
            }
            Command::SetLoop { enabled } => {
                self.scheduler.set_looping(enabled)?;
                if let Some(scorer) = self.scorer.as_mut() {
                    scorer.set_final_pass(self.scheduler.final_pass());
                }
                self.emit_practice_state();
            }
            Command::StartRecording { options } => {
                self.capture.start_recording(options)?;
            }
            Command::StopRecording => {
                if let Some(recording) = self.capture.stop_recording()? {
                    self.last_recording = Some(recording);
                }
            }
            Command::PlayRecording { recording, options } => {
                let recording = recording
                    .or_else(|| self.last_recording.clone())
                    .ok_or(TrainerError::NoRecording)?;
                self.play_recording(recording, options)?;
            }
            Command::StopPlayback => {
                if let Some(player) = self.player.as_mut() {
                    player.stop();
                }
            }
            Command::ExportRecording { path } => {
                let recording = self.last_recording.as_ref().ok_or(TrainerError::NoRecording)?;
                let data = encode_recording(recording, self.config.ppq)?;
                std::fs::write(&path, &data).map_err(|e| InterchangeError::Io(e.to_string()))?;
                info!(%path, bytes = data.len(), "recording exported");
                self.events.push_back(Event::RecordingExported {
                    path,
                    bytes: data.len(),
                });
            }
            Command::AnalyzeTake { session } => {
                self.emit_analysis(&session);
            }
        }
        self.drain_notifications();
        Ok(())
    }

    /// Feeds one raw message from outside the device stream (on-screen
    /// keyboard, tests, or the fallback when no device is available).
    pub fn push_raw(&mut self, raw: RawInputEvent) {
        self.process_raw(raw);
        self.drain_notifications();
    }

    pub fn tick(&mut self) {
        self.process_midi_inputs();
        self.advance_practice();
        if let Some(player) = self.player.as_mut() {
            player.resume();
        }
        self.poll_devices();
        self.drain_notifications();
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    fn load_arrangement(&mut self, arrangement: Arrangement) {
        self.scorer = None;
        let notes = arrangement.notes.len();
        let end_s = arrangement.end_s();
        self.scheduler.load(arrangement);
        info!(notes, end_s, "arrangement loaded");
        self.practice_state = PracticeState::Ready;
        self.events
            .push_back(Event::ArrangementLoaded { notes, end_s });
        self.emit_practice_state();
    }

    fn start_practice(&mut self) -> Result<(), TrainerError> {
        if self.scheduler.is_playing() {
            return Ok(());
        }
        self.scheduler.start()?;
        if let Some(arrangement) = self.scheduler.arrangement() {
            let cfg = ScorerConfig {
                hit_window_ms: self.config.hit_window_ms,
            };
            let mut scorer =
                PracticeScorer::new(cfg, arrangement).with_loop_span(self.scheduler.loop_span());
            scorer.set_final_pass(self.scheduler.final_pass());
            self.scorer = Some(scorer);
        }
        self.practice_state = PracticeState::Running;
        self.emit_practice_state();
        Ok(())
    }

    fn stop_practice(&mut self) -> Result<(), TrainerError> {
        self.scheduler.stop();
        if let Some(scorer) = self.scorer.take() {
            let position = self.scheduler.position_at(self.clock.now()?);
            let session = scorer.finish(position.max(0.0));
            self.emit_analysis(&session);
        }
        if self.practice_state == PracticeState::Running {
            self.practice_state = PracticeState::Ready;
            self.emit_practice_state();
        }
        Ok(())
    }

    fn advance_practice(&mut self) {
        if self.scheduler.is_playing() && self.scheduler.resume() == TaskPoll::Finished {
            if let Err(err) = self.stop_practice() {
                warn!(%err, "failed to close finished practice");
            }
            return;
        }
        let Some(scorer) = self.scorer.as_mut() else {
            return;
        };
        let now = match self.clock.now() {
            Ok(now) => now,
            Err(err) => {
                warn!(%err, "clock unavailable; practice scoring paused");
                return;
            }
        };
        let feedback = scorer.advance_to(self.scheduler.position_at(now));
        self.push_feedback(feedback);
    }

    fn play_recording(
        &mut self,
        recording: Recording,
        options: PlaybackOptions,
    ) -> Result<(), TrainerError> {
        if self.is_playing_recording() {
            debug!("recording playback already running");
            return Ok(());
        }
        let sink = self.midi_out.open_output(self.selected_output.as_ref())?;
        let mut player = RecordingPlayer::new(self.clock.clone(), sink);
        let queue = self.player_rx.clone();
        player.subscribe(move |notice: &PlaybackNotice| {
            queue.lock().push_back(*notice);
            Ok(())
        });
        player.play(recording, options)?;
        self.player = Some(player);
        Ok(())
    }

    fn open_midi_input(&mut self, device_id: DeviceId) -> Result<(), TrainerError> {
        if let Some(stream) = self.midi_stream.take() {
            stream.close();
        }

        let (producer, consumer) = RingBuffer::new(self.config.ring_capacity.max(1));
        let producer = Arc::new(Mutex::new(producer));
        let cb = Arc::new(move |event: RawInputEvent| {
            if let Some(mut guard) = producer.try_lock() {
                let _ = guard.push(event);
            }
        });

        match self.midi_in.open_input(&device_id, cb) {
            Ok(stream) => {
                info!(%device_id, "midi input opened");
                self.midi_stream = Some(stream);
                self.midi_queue_rx = Some(consumer);
                self.manual_input = false;
                Ok(())
            }
            Err(MidiError::DeviceUnavailable(reason)) => {
                self.fall_back_to_manual(reason);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn fall_back_to_manual(&mut self, reason: String) {
        if !self.manual_input {
            warn!(%reason, "midi input unavailable; continuing with manual input");
            self.manual_input = true;
            self.events.push_back(Event::ManualInputOnly { reason });
        }
    }

    fn process_midi_inputs(&mut self) {
        let Some(mut consumer) = self.midi_queue_rx.take() else {
            return;
        };
        while let Ok(raw) = consumer.pop() {
            self.process_raw(raw);
        }
        self.midi_queue_rx = Some(consumer);
    }

    fn process_raw(&mut self, raw: RawInputEvent) {
        match self.capture.handle_raw(raw) {
            Ok(Some(event)) => self.score_input(&event),
            Ok(None) => {}
            Err(err) => warn!(%err, "input dropped"),
        }
    }

    fn score_input(&mut self, event: &TypedEvent) {
        if event.kind != EventKind::NoteOn {
            return;
        }
        let time_s = self.scheduler.position_at(event.timestamp / 1000.0);
        let Some(scorer) = self.scorer.as_mut() else {
            return;
        };
        let feedback = scorer.on_note_on(PlayerNoteOn {
            time_s,
            pitch: event.note,
            velocity: event.velocity,
        });
        self.push_feedback(feedback);
    }

    fn push_feedback(&mut self, feedback: Vec<ScoreEvent>) {
        for event in feedback {
            self.events.push_back(Event::PracticeFeedback { event });
        }
    }

    fn emit_analysis(&mut self, session: &PracticeSession) {
        let result = self.analyzer.analyze(session);
        let recommendations = self.difficulty.recommendations(&result);
        info!(
            accuracy = result.metrics.accuracy,
            consistency = result.metrics.timing.consistency,
            "take analyzed"
        );
        self.events.push_back(Event::AnalysisReady {
            result,
            recommendations,
        });
    }

    fn poll_devices(&mut self) {
        if self
            .last_device_poll
            .is_some_and(|last| last.elapsed() < DEVICE_POLL_INTERVAL)
        {
            return;
        }
        self.last_device_poll = Some(Instant::now());
        match self.watcher.poll() {
            Ok(Some(change)) => {
                self.events.push_back(Event::MidiInputsUpdated {
                    devices: change.inputs,
                });
                if let Some(devices) = change.outputs {
                    self.events.push_back(Event::MidiOutputsUpdated { devices });
                }
            }
            Ok(None) => {}
            Err(MidiError::DeviceUnavailable(reason)) => self.fall_back_to_manual(reason),
            Err(err) => debug!(%err, "device poll failed"),
        }
    }

    fn drain_notifications(&mut self) {
        let captured: Vec<CaptureEvent> = self.capture_rx.lock().drain(..).collect();
        for event in captured {
            self.events.push_back(match event {
                CaptureEvent::MidiMessage(event) => Event::MidiMessage { event },
                CaptureEvent::RecordingStarted(options) => Event::RecordingStarted { options },
                CaptureEvent::RecordingStopped(recording) => Event::RecordingStopped { recording },
            });
        }

        let notices: Vec<PlaybackNotice> = self.player_rx.lock().drain(..).collect();
        for notice in notices {
            self.events.push_back(match notice {
                PlaybackNotice::PlaybackStarted => Event::PlaybackStarted,
                PlaybackNotice::PlaybackStopped => Event::PlaybackStopped,
            });
        }
    }

    fn emit_practice_state(&mut self) {
        self.events.push_back(Event::PracticeStateUpdated {
            state: self.practice_state,
            speed: self.scheduler.speed(),
            looping: self.scheduler.is_looping(),
        });
    }
}
