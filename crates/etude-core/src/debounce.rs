use etude_ports::midi::RawInputEvent;
use std::collections::HashMap;

/// Identity of a raw message for duplicate detection: message kind (status
/// high nibble), note and velocity. The channel is deliberately not part of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DebounceKey {
    pub kind: u8,
    pub note: u8,
    pub velocity: u8,
}

impl DebounceKey {
    pub fn from_raw(event: &RawInputEvent) -> Self {
        Self {
            kind: event.status & 0xF0,
            note: event.data1,
            velocity: event.data2,
        }
    }
}

/// Suppresses repeats of the same key inside a short window.
#[derive(Debug)]
pub struct EventDebouncer {
    window_ms: f64,
    last_seen: HashMap<DebounceKey, f64>,
}

impl EventDebouncer {
    pub fn new(window_ms: f64) -> Self {
        Self {
            window_ms,
            last_seen: HashMap::new(),
        }
    }

    pub fn window_ms(&self) -> f64 {
        self.window_ms
    }

    /// Returns true when `key` was let through less than one window before
    /// `now_ms`. A passing event becomes the new reference time for its key.
    pub fn should_suppress(&mut self, key: DebounceKey, now_ms: f64) -> bool {
        if let Some(last) = self.last_seen.get(&key) {
            if now_ms - last < self.window_ms {
                return true;
            }
        }
        self.last_seen.insert(key, now_ms);
        false
    }

    pub fn clear(&mut self) {
        self.last_seen.clear();
    }
}
