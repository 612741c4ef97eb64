use crate::observer::{ListenerError, ListenerId, Notifier};
use crate::task::{CancelToken, CooperativeTask, TaskPoll};
use etude_domain_arrangement::Recording;
use etude_ports::clock::{ClockError, ClockSource};
use etude_ports::midi::MidiOutputSink;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, trace, warn};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackOptions {
    pub speed: f64,
    #[serde(rename = "loop")]
    pub looping: bool,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            looping: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackNotice {
    PlaybackStarted,
    PlaybackStopped,
}

struct Cue {
    event_index: usize,
    played: bool,
}

/// Replays a captured recording to a MIDI output.
///
/// Every resume fires the events whose `delta_time`, scaled by speed, has
/// elapsed since the anchor. Each event carries a played flag so it is sent
/// once per pass.
pub struct RecordingPlayer {
    clock: Arc<dyn ClockSource>,
    sink: Box<dyn MidiOutputSink>,
    recording: Option<Recording>,
    cues: Vec<Cue>,
    options: PlaybackOptions,
    start_ms: f64,
    playing: bool,
    cancel: CancelToken,
    notifier: Notifier<PlaybackNotice>,
}

impl RecordingPlayer {
    pub fn new(clock: Arc<dyn ClockSource>, sink: Box<dyn MidiOutputSink>) -> Self {
        Self {
            clock,
            sink,
            recording: None,
            cues: Vec::new(),
            options: PlaybackOptions::default(),
            start_ms: 0.0,
            playing: false,
            cancel: CancelToken::new(),
            notifier: Notifier::new(),
        }
    }

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&PlaybackNotice) -> Result<(), ListenerError> + Send + 'static,
    {
        self.notifier.subscribe(listener)
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Starts replaying `recording`. Ignored while already playing.
    pub fn play(&mut self, recording: Recording, options: PlaybackOptions) -> Result<(), ClockError> {
        if self.playing {
            return Ok(());
        }
        let start_ms = self.clock.now_ms()?;

        let mut order: Vec<usize> = (0..recording.events.len()).collect();
        order.sort_by(|a, b| {
            recording.events[*a]
                .delta_time
                .total_cmp(&recording.events[*b].delta_time)
        });
        self.cues = order
            .into_iter()
            .map(|event_index| Cue {
                event_index,
                played: false,
            })
            .collect();
        self.recording = Some(recording);
        self.options = PlaybackOptions {
            speed: if options.speed > 0.0 { options.speed } else { 1.0 },
            ..options
        };
        self.start_ms = start_ms;
        self.cancel = CancelToken::new();
        self.playing = true;
        info!(
            events = self.cues.len(),
            speed = self.options.speed,
            looping = self.options.looping,
            "recording playback started"
        );
        self.notifier.notify(&PlaybackNotice::PlaybackStarted);
        Ok(())
    }

    /// Ends playback. Safe to call in any state.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if !self.playing {
            return;
        }
        self.playing = false;
        info!("recording playback stopped");
        self.notifier.notify(&PlaybackNotice::PlaybackStopped);
    }

    /// Sends every due event. Returns how many were sent.
    pub fn tick(&mut self) -> Result<usize, ClockError> {
        if !self.playing || self.cancel.is_cancelled() {
            return Ok(0);
        }
        let Some(recording) = self.recording.as_ref() else {
            return Ok(0);
        };

        let now_ms = self.clock.now_ms()?;
        let elapsed = (now_ms - self.start_ms) * self.options.speed;
        let mut sent = 0;
        for cue in self.cues.iter_mut() {
            if cue.played {
                continue;
            }
            let event = &recording.events[cue.event_index];
            if event.delta_time > elapsed {
                break;
            }
            if self.cancel.is_cancelled() {
                return Ok(sent);
            }
            cue.played = true;
            let Some(message) = event.channel_message() else {
                trace!(kind = ?event.kind, "not sent to output");
                continue;
            };
            match self.sink.send(&message) {
                Ok(()) => sent += 1,
                Err(err) => warn!(%err, note = event.note, "midi send failed; skipping event"),
            }
        }

        if self.cues.iter().all(|cue| cue.played) {
            if self.options.looping {
                for cue in self.cues.iter_mut() {
                    cue.played = false;
                }
                self.start_ms = now_ms;
            } else {
                self.stop();
            }
        }
        Ok(sent)
    }
}

impl CooperativeTask for RecordingPlayer {
    fn resume(&mut self) -> TaskPoll {
        if let Err(err) = self.tick() {
            warn!(%err, "playback tick failed; stopping");
            self.stop();
        }
        if self.playing {
            TaskPoll::Pending
        } else {
            TaskPoll::Finished
        }
    }
}
