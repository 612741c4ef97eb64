use crate::analyzer::{NoteMismatch, PlayedNote, PracticeSession};
use etude_domain_arrangement::Arrangement;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, Copy, Debug)]
pub struct ScorerConfig {
    /// Half-width of the window around an expected onset, in ms.
    pub hit_window_ms: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            hit_window_ms: 150.0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PlayerNoteOn {
    /// Seconds since practice start.
    pub time_s: f64,
    pub pitch: u8,
    pub velocity: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScoreEvent {
    Hit {
        index: usize,
        pitch: u8,
        delta_ms: f64,
    },
    WrongNote {
        pitch: u8,
        at_ms: f64,
    },
    Missed {
        index: usize,
        pitch: u8,
    },
    Stats {
        hit: u32,
        miss: u32,
        wrong: u32,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TargetState {
    Pending,
    Hit,
    Missed,
}

#[derive(Clone, Copy, Debug)]
struct Target {
    /// Position of the note within one pass of the arrangement.
    index: usize,
    pass: u64,
    pitch: u8,
    start_ms: f64,
    state: TargetState,
}

#[derive(Default, Debug)]
struct StatsState {
    hit: u32,
    miss: u32,
    wrong: u32,
}

/// Matches live note-ons against an arrangement and builds the take that the
/// analyzer consumes.
///
/// Times are positions in the arrangement. While looping, every pass of
/// length `loop_span` gets its own targets, created as the position comes
/// within one hit window of the pass.
pub struct PracticeScorer {
    cfg: ScorerConfig,
    notes: Vec<(u8, f64)>,
    span_ms: f64,
    /// `None` while looping.
    last_pass: Option<u64>,
    next_pass: u64,
    targets: Vec<Target>,
    played: Vec<PlayedNote>,
    timing: Vec<f64>,
    errors: Vec<NoteMismatch>,
    stats: StatsState,
}

impl PracticeScorer {
    pub fn new(cfg: ScorerConfig, arrangement: &Arrangement) -> Self {
        let mut notes: Vec<(u8, f64)> = arrangement
            .notes
            .iter()
            .map(|note| (note.pitch, note.start * 1000.0))
            .collect();
        notes.sort_by(|a, b| a.1.total_cmp(&b.1));
        let mut scorer = Self {
            cfg,
            notes,
            span_ms: arrangement.end_s() * 1000.0,
            last_pass: Some(0),
            next_pass: 0,
            targets: Vec::new(),
            played: Vec::new(),
            timing: Vec::new(),
            errors: Vec::new(),
            stats: StatsState::default(),
        };
        scorer.open_pass();
        scorer
    }

    /// Overrides the loop length, e.g. with the scheduler's.
    pub fn with_loop_span(mut self, span_s: f64) -> Self {
        self.span_ms = span_s.max(0.0) * 1000.0;
        self
    }

    /// Last pass to score, as reported by the scheduler. `None` repeats the
    /// arrangement indefinitely.
    pub fn set_final_pass(&mut self, last_pass: Option<u64>) {
        self.last_pass = last_pass;
        if let Some(last) = last_pass {
            self.targets
                .retain(|t| t.pass <= last || t.state != TargetState::Pending);
        }
    }

    pub fn on_note_on(&mut self, e: PlayerNoteOn) -> Vec<ScoreEvent> {
        let at_ms = e.time_s * 1000.0;
        let mut events = self.advance_to(e.time_s);
        self.played.push(PlayedNote {
            pitch: e.pitch,
            velocity: Some(e.velocity),
        });
        self.timing.push(at_ms);

        let window = self.cfg.hit_window_ms;
        let nearest = self
            .targets
            .iter()
            .enumerate()
            .filter(|(_, t)| t.state == TargetState::Pending && t.pitch == e.pitch)
            .map(|(slot, t)| (slot, at_ms - t.start_ms))
            .filter(|(_, delta)| delta.abs() <= window)
            .min_by(|a, b| a.1.abs().total_cmp(&b.1.abs()));

        match nearest {
            Some((slot, delta_ms)) => {
                let target = &mut self.targets[slot];
                target.state = TargetState::Hit;
                self.stats.hit += 1;
                events.push(ScoreEvent::Hit {
                    index: target.index,
                    pitch: e.pitch,
                    delta_ms,
                });
            }
            None => {
                debug!(pitch = e.pitch, at_ms, "wrong note");
                self.stats.wrong += 1;
                self.errors.push(NoteMismatch::WrongNote {
                    pitch: e.pitch,
                    at_ms,
                });
                events.push(ScoreEvent::WrongNote {
                    pitch: e.pitch,
                    at_ms,
                });
            }
        }
        events.push(self.stats_event());
        events
    }

    /// Marks every pending note whose window closed before `now_s` as missed.
    pub fn advance_to(&mut self, now_s: f64) -> Vec<ScoreEvent> {
        let now_ms = now_s * 1000.0;
        let window = self.cfg.hit_window_ms;
        self.open_passes_until(now_ms + window);

        let mut events = Vec::new();
        for target in self.targets.iter_mut() {
            if target.start_ms + window >= now_ms {
                break;
            }
            if target.state != TargetState::Pending {
                continue;
            }
            target.state = TargetState::Missed;
            self.stats.miss += 1;
            self.errors.push(NoteMismatch::Missed {
                pitch: target.pitch,
                expected_ms: target.start_ms,
            });
            events.push(ScoreEvent::Missed {
                index: target.index,
                pitch: target.pitch,
            });
        }
        if !events.is_empty() {
            events.push(self.stats_event());
        }
        self.targets.retain(|t| t.state == TargetState::Pending || t.start_ms + window >= now_ms);
        events
    }

    pub fn is_complete(&self) -> bool {
        self.last_pass.is_some_and(|last| self.next_pass > last)
            && self.targets.iter().all(|t| t.state != TargetState::Pending)
    }

    /// Closes the take at position `duration_s`. Without looping, notes that
    /// were never reached count as missed; while looping only notes due
    /// before the end do.
    pub fn finish(mut self, duration_s: f64) -> PracticeSession {
        match self.last_pass {
            Some(_) => self.advance_to(f64::INFINITY),
            None => self.advance_to(duration_s + self.cfg.hit_window_ms / 1000.0),
        };
        PracticeSession {
            notes: self.played,
            timing: self.timing,
            duration: duration_s * 1000.0,
            errors: self.errors,
        }
    }

    fn open_passes_until(&mut self, limit_ms: f64) {
        if self.span_ms <= 0.0 {
            return;
        }
        loop {
            if self.last_pass.is_some_and(|last| self.next_pass > last) {
                return;
            }
            if self.last_pass.is_none() && !limit_ms.is_finite() {
                return;
            }
            if self.next_pass as f64 * self.span_ms > limit_ms {
                return;
            }
            self.open_pass();
        }
    }

    fn open_pass(&mut self) {
        let pass = self.next_pass;
        let offset = pass as f64 * self.span_ms;
        self.targets
            .extend(self.notes.iter().enumerate().map(|(index, &(pitch, start_ms))| Target {
                index,
                pass,
                pitch,
                start_ms: offset + start_ms,
                state: TargetState::Pending,
            }));
        self.next_pass += 1;
    }

    fn stats_event(&self) -> ScoreEvent {
        ScoreEvent::Stats {
            hit: self.stats.hit,
            miss: self.stats.miss,
            wrong: self.stats.wrong,
        }
    }
}
