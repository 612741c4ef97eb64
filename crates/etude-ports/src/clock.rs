#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    #[error("clock unavailable: {0}")]
    Unavailable(String),
}

/// Monotonic time source shared by the scheduler, the recorder and the player.
///
/// Implementations initialize lazily on the first call; a clock that cannot be
/// created reports [`ClockError::Unavailable`] from every call instead of
/// falling back to another time base.
pub trait ClockSource: Send + Sync {
    /// Seconds since the clock's origin. Never decreases.
    fn now(&self) -> Result<f64, ClockError>;

    fn now_ms(&self) -> Result<f64, ClockError> {
        Ok(self.now()? * 1000.0)
    }
}
