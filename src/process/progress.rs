use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};

use super::job::JobError;

/// The result of a processing phase that may stop early when its
/// [`CancellationToken`] is triggered.
#[derive(Debug, Clone, PartialEq)]
pub enum Step<T> {
    Done(T),
    Cancelled,
}

impl<T> Step<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn done(self) -> Option<T> {
        match self {
            Self::Done(value) => Some(value),
            Self::Cancelled => None,
        }
    }
}

/// Return `Ok(Step::Cancelled)` from the enclosing function if the token was triggered
macro_rules! bail_if_cancelled {
    ($token:expr) => {
        if $token.is_cancelled() {
            return Ok($crate::process::Step::Cancelled);
        }
    };
}

/// Unwrap a [`Step::Done`] or propagate a cancellation to the caller
macro_rules! proceed {
    ($step:expr) => {
        match $step {
            $crate::process::Step::Done(value) => value,
            $crate::process::Step::Cancelled => return Ok($crate::process::Step::Cancelled),
        }
    };
}

/// A shared flag a running job polls to learn it should stop.
///
/// Clones share the same flag, so the host keeps one clone and hands another to the job.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/**
The outward channel a job reports its status through.

All methods are one-way notifications, a job never waits on the sink.
*/
pub trait ProgressSink {
    /// Set the number of [`ProgressSink::advance`] calls the current stage will make,
    /// `None` when it is not known in advance
    fn set_maximum(&mut self, maximum: Option<usize>);

    fn advance(&mut self, label: &str);

    fn set_stage_label(&mut self, label: &str);

    /// Record a non-fatal anomaly
    fn report_notice(&mut self, notice: &str);

    fn signal_completion(&mut self, success: bool);

    fn signal_fatal_error(&mut self, error: &JobError);
}

/// A [`ProgressSink`] that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn set_maximum(&mut self, _maximum: Option<usize>) {}

    fn advance(&mut self, _label: &str) {}

    fn set_stage_label(&mut self, _label: &str) {}

    fn report_notice(&mut self, _notice: &str) {}

    fn signal_completion(&mut self, _success: bool) {}

    fn signal_fatal_error(&mut self, _error: &JobError) {}
}

/// A [`ProgressSink`] that writes to the [`log`] facade
#[derive(Debug, Default, Clone)]
pub struct LoggingProgress {
    stage: String,
    maximum: Option<usize>,
    current: usize,
    last_percent: Option<usize>,
}

impl LoggingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// The share of the current stage completed, if its size is known
    pub fn percent_complete(&self) -> Option<usize> {
        self.maximum
            .map(|maximum| (self.current * 100 / maximum.max(1)).min(100))
    }
}

impl ProgressSink for LoggingProgress {
    fn set_maximum(&mut self, maximum: Option<usize>) {
        self.maximum = maximum;
        self.current = 0;
        self.last_percent = None;
    }

    fn advance(&mut self, label: &str) {
        self.current += 1;
        match self.percent_complete() {
            Some(percent) => {
                // One line per whole percent
                if self.last_percent != Some(percent) {
                    self.last_percent = Some(percent);
                    debug!("{}: {label} ({percent}%)", self.stage);
                }
            }
            None => debug!("{}: {label}", self.stage),
        }
    }

    fn set_stage_label(&mut self, label: &str) {
        self.stage = label.to_string();
        info!("{label}");
    }

    fn report_notice(&mut self, notice: &str) {
        warn!("{notice}");
    }

    fn signal_completion(&mut self, success: bool) {
        if success {
            info!("Finished")
        } else {
            info!("Stopped before completion")
        }
    }

    fn signal_fatal_error(&mut self, error: &JobError) {
        error!("{error}");
    }
}

/// Paces progress updates over a pass through the scan ids `1..=total`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoints {
    interval: u32,
    total: u32,
}

impl Checkpoints {
    pub fn new(total: u32) -> Self {
        Self {
            interval: (total / 1000).max(1),
            total,
        }
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// The number of checkpoints in the pass
    pub fn count(&self) -> usize {
        (self.total / self.interval) as usize
    }

    #[inline]
    pub fn is_checkpoint(&self, id: u32) -> bool {
        id % self.interval == 0
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// Cancels `token` on the `after`-th call to `advance`
    pub(crate) struct CancelOnAdvance {
        pub token: CancellationToken,
        pub after: usize,
        pub advances: usize,
    }

    impl CancelOnAdvance {
        pub fn new(token: &CancellationToken, after: usize) -> Self {
            Self {
                token: token.clone(),
                after,
                advances: 0,
            }
        }
    }

    impl ProgressSink for CancelOnAdvance {
        fn set_maximum(&mut self, _maximum: Option<usize>) {}

        fn advance(&mut self, _label: &str) {
            self.advances += 1;
            if self.advances == self.after {
                self.token.cancel();
            }
        }

        fn set_stage_label(&mut self, _label: &str) {}

        fn report_notice(&mut self, _notice: &str) {}

        fn signal_completion(&mut self, _success: bool) {}

        fn signal_fatal_error(&mut self, _error: &JobError) {}
    }

    #[test]
    fn test_token_shared() {
        let token = CancellationToken::new();
        let handle = token.clone();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_checkpoints() {
        let small = Checkpoints::new(250);
        assert_eq!(small.interval(), 1);
        assert_eq!(small.count(), 250);

        let large = Checkpoints::new(25_000);
        assert_eq!(large.interval(), 25);
        assert_eq!(large.count(), 1000);
        assert!(large.is_checkpoint(50));
        assert!(!large.is_checkpoint(51));

        assert_eq!(Checkpoints::new(0).count(), 0);
    }

    #[test]
    fn test_logging_progress() {
        let mut progress = LoggingProgress::new();
        progress.set_stage_label("Task 1 of 2");
        progress.set_maximum(Some(4));
        assert_eq!(progress.percent_complete(), Some(0));
        progress.advance("scan 1");
        progress.advance("scan 2");
        assert_eq!(progress.percent_complete(), Some(50));
        for _ in 0..10 {
            progress.advance("overrun");
        }
        assert_eq!(progress.percent_complete(), Some(100));
        progress.set_maximum(None);
        assert_eq!(progress.percent_complete(), None);
    }
}
