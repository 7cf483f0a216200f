//! Execution controls shared by every long-running command: worker pool
//! size, cooperative cancellation, a deadline for lookups against reference
//! trees, and progress reporting.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A `(current, total)` pair emitted after each completed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

/// Cooperative cancellation signal. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-invocation execution settings. Passed explicitly into each command.
#[derive(Clone)]
pub struct RunContext {
    pub concurrency: usize,
    pub timeout: Option<Duration>,
    pub cancel: CancelFlag,
    pub progress: Option<ProgressFn>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            timeout: None,
            cancel: CancelFlag::new(),
            progress: None,
        }
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("concurrency", &self.concurrency)
            .field("timeout", &self.timeout)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl RunContext {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Starts the timeout clock. The deadline is absent when no timeout is set.
    pub fn deadline(&self) -> Deadline {
        Deadline(self.timeout.map(|t| Instant::now() + t))
    }

    pub(crate) fn report(&self, current: usize, total: usize) {
        if let Some(progress) = &self.progress {
            progress(Progress { current, total });
        }
    }

    /// Maps `f` over `items` on a pool bounded by `concurrency`.
    ///
    /// Results come back in input order. Cancellation is checked before each
    /// item; once observed, the remaining items are skipped and
    /// [`Error::Cancelled`] is returned.
    pub fn map_files<T, R, F>(&self, items: &[T], f: F) -> Result<Vec<R>, Error>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        let total = items.len();
        let done = AtomicUsize::new(0);
        let run = || {
            items
                .par_iter()
                .map(|item| {
                    if self.is_cancelled() {
                        return None;
                    }
                    let out = f(item);
                    let current = done.fetch_add(1, Ordering::SeqCst) + 1;
                    self.report(current, total);
                    Some(out)
                })
                .collect::<Vec<Option<R>>>()
        };

        let results = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency.max(1))
            .build()
        {
            Ok(pool) => pool.install(run),
            Err(e) => {
                tracing::debug!("falling back to global pool: {e}");
                run()
            }
        };

        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(results.into_iter().flatten().collect())
    }
}

/// An optional point in time after which lookups give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Deadline(None)
    }

    pub fn expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_map_files_preserves_order() {
        let ctx = RunContext::default().with_concurrency(4);
        let items: Vec<usize> = (0..50).collect();
        let out = ctx.map_files(&items, |n| n * 2).unwrap();
        assert_eq!(out, (0..50).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_progress_reaches_total() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let ctx = RunContext::default()
            .with_concurrency(2)
            .with_progress(move |p| sink.lock().unwrap().push(p));
        let items = vec![1, 2, 3, 4, 5];
        ctx.map_files(&items, |n| *n).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 5);
        assert!(seen.iter().all(|p| p.total == 5));
        assert_eq!(seen.iter().map(|p| p.current).max(), Some(5));
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let ctx = RunContext::default().with_cancel(cancel);
        let result = ctx.map_files(&[1, 2, 3], |n| *n);
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_deadline_without_timeout_never_expires() {
        assert!(!RunContext::default().deadline().expired());
        assert!(!Deadline::none().expired());
    }

    #[test]
    fn test_zero_timeout_expires() {
        let ctx = RunContext::default().with_timeout(Duration::ZERO);
        assert!(ctx.deadline().expired());
    }
}
