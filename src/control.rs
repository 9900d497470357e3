use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Receives row-level progress from the fuzzy pass.
pub trait Progress: Sync {
    fn advance(&self, done: usize, total: usize);
}

/// Cooperative cancellation, polled between rows.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::default(),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Hooks the shell hands to a run.
#[derive(Default)]
pub struct RunControl<'a> {
    pub cancel: CancelToken,
    pub progress: Option<&'a dyn Progress>,
}

impl<'a> RunControl<'a> {
    pub fn with_progress(mut self, progress: &'a dyn Progress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub(crate) fn report(&self, done: usize, total: usize) {
        if let Some(p) = self.progress {
            p.advance(done, total);
        }
    }
}
