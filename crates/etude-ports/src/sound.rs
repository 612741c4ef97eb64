use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteRequest {
    pub midi: u8,
    pub velocity: u8,
    pub duration_s: f64,
}

/// Sound-producing collaborator. Calls are fire-and-forget: no completion is reported.
pub trait SoundOutputPort: Send + Sync {
    /// `at_s` is an absolute time on the same clock the caller schedules against.
    fn play_note_at(&self, note: NoteRequest, at_s: f64);

    fn play_note(&self, note: NoteRequest);
}
