use etude_ports::clock::{ClockError, ClockSource};
use etude_ports::types::SampleTime;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// High-resolution wall clock; the origin is the first `now()` call.
#[derive(Debug, Default)]
pub struct SystemClock {
    origin: OnceLock<Instant>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClockSource for SystemClock {
    fn now(&self) -> Result<f64, ClockError> {
        let origin = self.origin.get_or_init(Instant::now);
        Ok(origin.elapsed().as_secs_f64())
    }
}

/// Clock driven by the audio render thread: rendered samples over sample rate.
///
/// The render callback publishes its position with [`AudioClock::set`]. Until
/// a stream is attached the clock reports [`ClockError::Unavailable`].
pub struct AudioClock {
    sample_time: AtomicU64,
    sample_rate_hz: AtomicU32,
}

impl AudioClock {
    pub fn new() -> Self {
        Self {
            sample_time: AtomicU64::new(0),
            sample_rate_hz: AtomicU32::new(0),
        }
    }

    pub fn attach(&self, sample_rate_hz: u32) {
        self.sample_time.store(0, Ordering::Relaxed);
        self.sample_rate_hz.store(sample_rate_hz, Ordering::Release);
    }

    pub fn detach(&self) {
        self.sample_rate_hz.store(0, Ordering::Release);
    }

    pub fn sample_rate_hz(&self) -> Option<u32> {
        match self.sample_rate_hz.load(Ordering::Acquire) {
            0 => None,
            rate => Some(rate),
        }
    }

    pub fn set(&self, sample_time: SampleTime) {
        self.sample_time.store(sample_time, Ordering::Relaxed);
    }

    pub fn get(&self) -> SampleTime {
        self.sample_time.load(Ordering::Relaxed)
    }
}

impl Default for AudioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for AudioClock {
    fn now(&self) -> Result<f64, ClockError> {
        let rate = self
            .sample_rate_hz()
            .ok_or_else(|| ClockError::Unavailable("no audio stream attached".to_string()))?;
        Ok(self.get() as f64 / rate as f64)
    }
}

/// Clock that only moves when told to. Used by hosts that drive time
/// themselves and by tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_s: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start_s: f64) -> Self {
        Self {
            now_s: Mutex::new(start_s),
        }
    }

    pub fn set(&self, now_s: f64) {
        let mut guard = self.now_s.lock();
        *guard = guard.max(now_s);
    }

    pub fn advance(&self, delta_s: f64) {
        *self.now_s.lock() += delta_s.max(0.0);
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> Result<f64, ClockError> {
        Ok(*self.now_s.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_clock_is_unavailable_until_attached() {
        let clock = AudioClock::new();
        assert!(clock.now().is_err());

        clock.attach(48_000);
        clock.set(24_000);
        assert_eq!(clock.now(), Ok(0.5));

        clock.detach();
        assert!(matches!(clock.now(), Err(ClockError::Unavailable(_))));
    }

    #[test]
    fn manual_clock_never_goes_backwards() {
        let clock = ManualClock::new(1.0);
        clock.set(0.5);
        assert_eq!(clock.now(), Ok(1.0));
        clock.advance(0.25);
        assert_eq!(clock.now_ms(), Ok(1250.0));
    }
}
