use crate::task::{CancelToken, CooperativeTask, TaskPoll};
use etude_domain_arrangement::{Arrangement, NoteEvent};
use etude_ports::clock::{ClockError, ClockSource};
use etude_ports::sound::{NoteRequest, SoundOutputPort};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

pub const MIN_SPEED: f64 = 0.1;

#[derive(thiserror::Error, Debug)]
pub enum SchedulerError {
    #[error("no arrangement loaded")]
    NoArrangementLoaded,
    #[error(transparent)]
    Clock(#[from] ClockError),
}

#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    pub lookahead_s: f64,
    pub lead_in_s: f64,
    pub default_velocity: u8,
    pub default_duration_s: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lookahead_s: 0.6,
            lead_in_s: 0.05,
            default_velocity: 90,
            default_duration_s: 0.6,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Playing,
}

struct Due {
    index: usize,
    at: f64,
}

/// A superseded speed, in force for clock times before `until_s`.
#[derive(Clone, Copy, Debug)]
struct Segment {
    until_s: f64,
    start_time: f64,
    speed: f64,
}

/// Look-ahead scheduler for an arrangement.
///
/// Each tick hands every note starting inside `[pos, pos + lookahead)` to the
/// sound output together with its absolute start time on the scheduler's
/// clock. A per-note iteration counter guarantees a note is dispatched at
/// most once per pass, however many tick windows overlap it.
pub struct Scheduler {
    config: SchedulerConfig,
    clock: Arc<dyn ClockSource>,
    sound: Arc<dyn SoundOutputPort>,
    arrangement: Option<Arrangement>,
    state: SchedulerState,
    start_time: f64,
    speed: f64,
    earlier: Vec<Segment>,
    /// Position up to which notes have been handed to the sound output.
    horizon: f64,
    looping: bool,
    /// `None` while looping, otherwise the last pass that may still sound.
    last_pass: Option<u64>,
    next_pass: Vec<u64>,
    cancel: CancelToken,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        clock: Arc<dyn ClockSource>,
        sound: Arc<dyn SoundOutputPort>,
    ) -> Self {
        Self {
            config,
            clock,
            sound,
            arrangement: None,
            state: SchedulerState::Idle,
            start_time: 0.0,
            speed: 1.0,
            earlier: Vec::new(),
            horizon: f64::NEG_INFINITY,
            looping: false,
            last_pass: Some(0),
            next_pass: Vec::new(),
            cancel: CancelToken::new(),
        }
    }

    /// Replaces the arrangement. A running playback is stopped first.
    pub fn load(&mut self, arrangement: Arrangement) {
        self.stop();
        self.next_pass = vec![0; arrangement.notes.len()];
        self.arrangement = Some(arrangement);
    }

    pub fn arrangement(&self) -> Option<&Arrangement> {
        self.arrangement.as_ref()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == SchedulerState::Playing
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Token cancelled by the next `stop()`.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Anchors playback `lead_in_s` after now. Starting while playing does nothing.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self.state == SchedulerState::Playing {
            return Ok(());
        }
        let notes = self
            .arrangement
            .as_ref()
            .map(|a| a.notes.len())
            .ok_or(SchedulerError::NoArrangementLoaded)?;

        let now = self.clock.now()?;
        self.start_time = now + self.config.lead_in_s;
        self.earlier.clear();
        self.horizon = f64::NEG_INFINITY;
        self.next_pass = vec![0; notes];
        self.last_pass = if self.looping { None } else { Some(0) };
        self.cancel = CancelToken::new();
        self.state = SchedulerState::Playing;
        info!(notes, speed = self.speed, looping = self.looping, "playback started");
        Ok(())
    }

    /// Halts playback. Safe to call in any state.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if self.state == SchedulerState::Playing {
            self.state = SchedulerState::Idle;
            info!("playback stopped");
        }
    }

    /// Sets the playback rate (floored at [`MIN_SPEED`]).
    ///
    /// While playing, the new rate applies from the end of the window already
    /// handed to the sound output (or from now, if that is later). Queued
    /// notes keep their times and the position stays continuous.
    pub fn set_speed(&mut self, speed: f64) -> Result<(), SchedulerError> {
        let speed = if speed.is_finite() {
            speed.max(MIN_SPEED)
        } else {
            1.0
        };
        if self.state == SchedulerState::Playing && speed != self.speed {
            let now = self.clock.now()?;
            let pivot = self.position_at(now).max(self.horizon);
            let pivot_s = self.clock_at(pivot);
            self.earlier.push(Segment {
                until_s: pivot_s,
                start_time: self.start_time,
                speed: self.speed,
            });
            self.start_time = pivot_s - pivot / speed;
            debug!(speed, pivot, pivot_s, "speed change scheduled");
        }
        self.speed = speed;
        Ok(())
    }

    pub fn set_looping(&mut self, looping: bool) -> Result<(), SchedulerError> {
        if self.looping == looping {
            return Ok(());
        }
        self.looping = looping;
        if self.state != SchedulerState::Playing {
            return Ok(());
        }
        self.last_pass = if looping {
            None
        } else {
            let span = self.loop_span();
            let pos = self.position_at(self.clock.now()?);
            let current = if span > 0.0 { (pos / span).floor().max(0.0) } else { 0.0 };
            // A pass already queued on the sound output still plays out.
            let queued = self
                .next_pass
                .iter()
                .max()
                .map_or(0, |next| next.saturating_sub(1));
            Some((current as u64).max(queued))
        };
        Ok(())
    }

    /// Arrangement position in seconds for a time on the scheduler's clock.
    pub fn position_at(&self, clock_s: f64) -> f64 {
        for seg in &self.earlier {
            if clock_s < seg.until_s {
                return (clock_s - seg.start_time) * seg.speed;
            }
        }
        (clock_s - self.start_time) * self.speed
    }

    /// Inverse of [`Scheduler::position_at`].
    pub fn clock_at(&self, position: f64) -> f64 {
        for seg in &self.earlier {
            if position < (seg.until_s - seg.start_time) * seg.speed {
                return seg.start_time + position / seg.speed;
            }
        }
        self.start_time + position / self.speed
    }

    /// Last loop pass that will sound, `None` while looping.
    pub fn final_pass(&self) -> Option<u64> {
        self.last_pass
    }

    /// Clock time of position zero under the current speed.
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Loop length: the latest note end, counting default durations.
    pub fn loop_span(&self) -> f64 {
        self.arrangement.as_ref().map_or(0.0, |arrangement| {
            arrangement
                .notes
                .iter()
                .map(|note| note.start + self.effective_duration(note))
                .fold(0.0, f64::max)
        })
    }

    /// One scheduling pass. Returns the number of notes dispatched.
    pub fn tick(&mut self) -> Result<usize, SchedulerError> {
        if self.state != SchedulerState::Playing || self.cancel.is_cancelled() {
            return Ok(0);
        }
        let Some(arrangement) = self.arrangement.as_ref() else {
            return Err(SchedulerError::NoArrangementLoaded);
        };

        let now = self.clock.now()?;
        let pos = self.position_at(now);
        let window_end = self.position_at(now + self.config.lookahead_s);
        let span = self.loop_span();

        let mut due = Vec::new();
        for (index, note) in arrangement.notes.iter().enumerate() {
            let mut pass = self.next_pass[index];
            loop {
                if self.last_pass.is_some_and(|last| pass > last) {
                    break;
                }
                let at = pass as f64 * span + note.start;
                if at < pos {
                    trace!(pitch = note.pitch, at, pos, "note window already passed");
                    if span <= 0.0 {
                        pass += 1;
                        break;
                    }
                    let caught_up = ((pos - note.start) / span).ceil().max(0.0) as u64;
                    pass = caught_up.max(pass + 1);
                    continue;
                }
                if at >= window_end {
                    break;
                }
                due.push(Due { index, at });
                pass += 1;
                if span <= 0.0 {
                    break;
                }
            }
            self.next_pass[index] = pass;
        }
        self.horizon = self.horizon.max(window_end);
        due.sort_by(|a, b| {
            a.at.total_cmp(&b.at)
                .then(arrangement.notes[a.index].pitch.cmp(&arrangement.notes[b.index].pitch))
        });

        let mut dispatched = 0;
        for item in &due {
            if self.cancel.is_cancelled() {
                debug!(remaining = due.len() - dispatched, "tick cancelled mid-dispatch");
                return Ok(dispatched);
            }
            let note = &arrangement.notes[item.index];
            let request = self.note_request(note);
            let at_s = self.clock_at(item.at);
            trace!(pitch = request.midi, at_s, "dispatch");
            self.sound.play_note_at(request, at_s);
            dispatched += 1;
        }

        if let Some(last) = self.last_pass {
            if pos > (last + 1) as f64 * span {
                self.state = SchedulerState::Idle;
                self.cancel.cancel();
                info!("playback finished");
            }
        }
        Ok(dispatched)
    }

    fn note_request(&self, note: &NoteEvent) -> NoteRequest {
        NoteRequest {
            midi: note.pitch.min(127),
            velocity: if note.velocity == 0 {
                self.config.default_velocity
            } else {
                note.velocity.min(127)
            },
            duration_s: self.effective_duration(note) / self.speed,
        }
    }

    fn effective_duration(&self, note: &NoteEvent) -> f64 {
        if note.duration > 0.0 {
            note.duration
        } else {
            self.config.default_duration_s
        }
    }
}

impl CooperativeTask for Scheduler {
    fn resume(&mut self) -> TaskPoll {
        match self.tick() {
            Ok(_) if self.is_playing() => TaskPoll::Pending,
            Ok(_) => TaskPoll::Finished,
            Err(err) => {
                warn!(%err, "scheduler tick failed; stopping");
                self.stop();
                TaskPoll::Finished
            }
        }
    }
}
