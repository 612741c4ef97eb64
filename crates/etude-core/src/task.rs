use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared stop flag. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskPoll {
    Pending,
    Finished,
}

/// A loop body that the host resumes on its own cadence.
pub trait CooperativeTask {
    fn resume(&mut self) -> TaskPoll;
}

/// Resumes `task` every `interval` until it finishes or `cancel` fires.
/// Returns the number of resumes.
pub fn drive(task: &mut dyn CooperativeTask, interval: Duration, cancel: &CancelToken) -> u64 {
    let mut resumes = 0;
    while !cancel.is_cancelled() {
        resumes += 1;
        if task.resume() == TaskPoll::Finished {
            break;
        }
        std::thread::sleep(interval);
    }
    resumes
}
