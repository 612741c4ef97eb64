use crate::audio;
use anyhow::{anyhow, bail, Context};
use etude_core::{
    drive, ArrangementSource, CancelToken, Command, EngineConfig, Event, PlaybackOptions,
    RecordingOptions, RecordingPlayer, Scheduler, SystemClock, TrainerCore, TrainerPorts,
};
use etude_domain_arrangement::{import_arrangement_path, import_recording_path, Recording};
use etude_domain_eval::{
    AdaptiveDifficulty, AnalysisResult, BaselineComparison, PerformanceAnalyzer, PracticeSession,
    Recommendation, ScoreEvent,
};
use etude_infra_audio_cpal::CpalAudioOutputPort;
use etude_infra_midi_midir::{MidirMidiInputPort, MidirMidiOutputPort};
use etude_ports::audio::AudioOutputPort;
use etude_ports::clock::ClockSource;
use etude_ports::midi::{MidiInputPort, MidiOutputPort};
use etude_ports::sound::{NoteRequest, SoundOutputPort};
use etude_ports::types::DeviceId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const CLIENT_NAME: &str = "etude";

/// Analysis as printed by `analyze` and `practice`; also read back as a baseline.
#[derive(Serialize)]
struct AnalysisReport<'a> {
    result: &'a AnalysisResult,
    recommendations: &'a [Recommendation],
}

#[derive(Deserialize)]
struct StoredReport {
    result: AnalysisResult,
}

/// Sound output for hosts that only listen.
struct MutedSound;

impl SoundOutputPort for MutedSound {
    fn play_note_at(&self, note: NoteRequest, _at_s: f64) {
        debug!(note = note.midi, "muted");
    }

    fn play_note(&self, note: NoteRequest) {
        debug!(note = note.midi, "muted");
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn seconds_to_duration(seconds: f64) -> Duration {
    Duration::from_secs_f64(seconds.clamp(0.0, 86_400.0))
}

/// Cancels `token` after `seconds`, if given.
fn cancel_after(token: &CancelToken, seconds: Option<f64>) {
    if let Some(seconds) = seconds {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(seconds_to_duration(seconds));
            token.cancel();
        });
    }
}

fn load_recording(path: &Path, fallback_tempo_bpm: u32) -> anyhow::Result<Recording> {
    if has_extension(path, "json") {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        return Ok(serde_json::from_str(&text)?);
    }
    Ok(import_recording_path(path, fallback_tempo_bpm)?)
}

fn print_analysis(result: &AnalysisResult, recommendations: &[Recommendation]) -> anyhow::Result<()> {
    let report = AnalysisReport {
        result,
        recommendations,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub fn devices() -> anyhow::Result<()> {
    let clock: Arc<dyn ClockSource> = Arc::new(SystemClock::new());

    match MidirMidiInputPort::new(CLIENT_NAME, clock).list_inputs() {
        Ok(inputs) => {
            for device in inputs {
                println!("midi-in   {}", device.id);
            }
        }
        Err(err) => warn!(%err, "midi inputs unavailable"),
    }
    match MidirMidiOutputPort::new(CLIENT_NAME).list_outputs() {
        Ok(outputs) => {
            for device in outputs {
                println!("midi-out  {}", device.id);
            }
        }
        Err(err) => warn!(%err, "midi outputs unavailable"),
    }
    match CpalAudioOutputPort::new().list_outputs() {
        Ok(outputs) => {
            for device in outputs {
                println!(
                    "audio-out {}  ({} Hz, {} ch)",
                    device.id, device.default_config.sample_rate_hz, device.default_config.channels
                );
            }
        }
        Err(err) => warn!(%err, "audio outputs unavailable"),
    }
    Ok(())
}

pub fn play(
    config: &EngineConfig,
    path: &Path,
    speed: f64,
    looping: bool,
    seconds: Option<f64>,
) -> anyhow::Result<()> {
    let arrangement = import_arrangement_path(path)?;
    if arrangement.is_empty() {
        warn!(path = %path.display(), "arrangement has no notes");
        return Ok(());
    }
    if looping && seconds.is_none() {
        info!("looping until interrupted");
    }

    let audio = audio::open(config)?;
    let mut scheduler = Scheduler::new(
        config.scheduler_config(),
        audio.clock.clone(),
        audio.sound.clone(),
    );
    scheduler.load(arrangement);
    scheduler.set_speed(speed)?;
    scheduler.set_looping(looping)?;
    scheduler.start()?;

    let cancel = scheduler.cancel_token();
    cancel_after(&cancel, seconds);
    let resumes = drive(&mut scheduler, config.tick_interval(), &cancel);
    scheduler.stop();
    debug!(resumes, "scheduler done");

    // Let the last release ring out before closing the stream.
    thread::sleep(Duration::from_millis(300));
    audio.close();
    Ok(())
}

pub fn record(
    config: &EngineConfig,
    input: String,
    seconds: f64,
    out: &Path,
    quantize: bool,
) -> anyhow::Result<()> {
    let clock: Arc<dyn ClockSource> = Arc::new(SystemClock::new());
    let mut core = TrainerCore::new(
        config.clone(),
        TrainerPorts {
            clock: clock.clone(),
            midi_in: Arc::new(MidirMidiInputPort::new(CLIENT_NAME, clock)),
            midi_out: Arc::new(MidirMidiOutputPort::new(CLIENT_NAME)),
            sound: Arc::new(MutedSound),
        },
    );

    core.handle_command(Command::SelectMidiInput {
        device_id: DeviceId(input.clone()),
    })?;
    if core.is_manual_input() {
        bail!("midi input {input} is unavailable");
    }
    core.handle_command(Command::StartRecording {
        options: RecordingOptions {
            quantize,
            count_in_beats: 0,
        },
    })?;
    info!(seconds, "recording");

    let deadline = Instant::now() + seconds_to_duration(seconds);
    while Instant::now() < deadline {
        core.tick();
        for event in core.drain_events() {
            if let Event::MidiMessage { event } = event {
                debug!(kind = ?event.kind, note = event.note, velocity = event.velocity, "input");
            }
        }
        thread::sleep(config.tick_interval());
    }
    core.tick();
    core.handle_command(Command::StopRecording)?;

    let recording = core
        .last_recording()
        .cloned()
        .ok_or_else(|| anyhow!("no recording was captured"))?;
    if has_extension(out, "json") {
        std::fs::write(out, serde_json::to_vec_pretty(&recording)?)
            .with_context(|| format!("writing {}", out.display()))?;
    } else {
        core.handle_command(Command::ExportRecording {
            path: out.to_string_lossy().into_owned(),
        })?;
    }
    println!(
        "recorded {} events ({:.0} ms) to {}",
        recording.events.len(),
        recording.duration,
        out.display()
    );
    Ok(())
}

pub fn replay(
    config: &EngineConfig,
    path: &Path,
    output: Option<String>,
    speed: f64,
    looping: bool,
    seconds: Option<f64>,
) -> anyhow::Result<()> {
    let recording = load_recording(path, config.tempo_bpm)?;
    let port = MidirMidiOutputPort::new(CLIENT_NAME);
    let output = output.map(DeviceId);
    let sink = port.open_output(output.as_ref())?;

    let clock: Arc<dyn ClockSource> = Arc::new(SystemClock::new());
    let mut player = RecordingPlayer::new(clock, sink);
    player.play(recording, PlaybackOptions { speed, looping })?;

    let cancel = player.cancel_token();
    cancel_after(&cancel, seconds);
    drive(&mut player, config.frame_interval(), &cancel);
    player.stop();
    Ok(())
}

pub fn practice(
    config: &EngineConfig,
    path: &Path,
    input: String,
    speed: f64,
) -> anyhow::Result<()> {
    let audio = audio::open(config)?;
    let clock: Arc<dyn ClockSource> = audio.clock.clone();
    let mut core = TrainerCore::new(
        config.clone(),
        TrainerPorts {
            clock: clock.clone(),
            midi_in: Arc::new(MidirMidiInputPort::new(CLIENT_NAME, clock)),
            midi_out: Arc::new(MidirMidiOutputPort::new(CLIENT_NAME)),
            sound: audio.sound.clone(),
        },
    );

    core.handle_command(Command::SelectMidiInput {
        device_id: DeviceId(input),
    })?;
    let location = path.to_string_lossy().into_owned();
    let source = if has_extension(path, "json") {
        ArrangementSource::JsonFile(location)
    } else {
        ArrangementSource::MidiFile(location)
    };
    core.handle_command(Command::LoadArrangement { source })?;
    core.handle_command(Command::SetSpeed { speed })?;
    core.handle_command(Command::StartPractice)?;

    loop {
        core.tick();
        for event in core.drain_events() {
            report(&event)?;
        }
        if !core.is_practicing() {
            break;
        }
        thread::sleep(config.tick_interval());
    }

    audio.close();
    Ok(())
}

fn report(event: &Event) -> anyhow::Result<()> {
    match event {
        Event::ManualInputOnly { reason } => {
            warn!(%reason, "no midi input; the take will only contain misses")
        }
        Event::ArrangementLoaded { notes, end_s } => info!(notes, end_s, "arrangement loaded"),
        Event::PracticeFeedback { event } => match event {
            ScoreEvent::Hit { pitch, delta_ms, .. } => info!(pitch, delta_ms, "hit"),
            ScoreEvent::WrongNote { pitch, .. } => info!(pitch, "wrong note"),
            ScoreEvent::Missed { pitch, .. } => info!(pitch, "missed"),
            ScoreEvent::Stats { hit, miss, wrong } => debug!(hit, miss, wrong, "stats"),
        },
        Event::AnalysisReady {
            result,
            recommendations,
        } => print_analysis(result, recommendations)?,
        other => debug!(?other, "event"),
    }
    Ok(())
}

pub fn analyze(session: &Path, baseline: Option<&Path>) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(session)
        .with_context(|| format!("reading {}", session.display()))?;
    let session: PracticeSession = serde_json::from_str(&text)?;

    let analyzer = match baseline {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let stored: StoredReport = serde_json::from_str(&text)?;
            PerformanceAnalyzer::with_detector(Box::new(BaselineComparison::new(
                stored.result.metrics,
            )))
        }
        None => PerformanceAnalyzer::new(),
    };

    let result = analyzer.analyze(&session);
    let recommendations = AdaptiveDifficulty.recommendations(&result);
    print_analysis(&result, &recommendations)
}
