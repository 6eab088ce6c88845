//! Batch Scheduler
//!
//! By default a notified effect re-runs synchronously, once per write. A
//! [`BatchQueue`] defers and coalesces instead: its
//! [`scheduler`](BatchQueue::scheduler) enqueues triggered jobs into an
//! ordered, deduplicating set and asks a [`Deferral`] to flush later.
//!
//! # Algorithm
//!
//! 1. `enqueue(job)` inserts the job unless its effect is already queued.
//! 2. The first enqueue after a flush marks the queue pending and hands it to
//!    the deferral, which arranges for [`BatchQueue::flush`] to run after the
//!    current synchronous burst of writes.
//! 3. `flush` drains the set in first-enqueued order and runs each job once.
//!    Jobs enqueued while flushing are drained by the same flush in a
//!    further pass. Jobs whose effect was stopped in the meantime are
//!    skipped.
//! 4. When the flush ends the pending mark is cleared. Jobs left over by a
//!    failed flush wait for the next flush; nothing reschedules them.
//!
//! Several writes to the same field in one burst therefore produce a single
//! run that sees only the final value.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::runtime::RuntimeFlavor;
use tracing::{debug, error, warn};

use crate::error::{ReactiveError, Result};
use crate::reactive::{EffectId, Job, Scheduler};

/// Passes a single flush may take before giving up.
pub const MAX_FLUSH_PASSES: usize = 100;

/// Backing primitive that schedules a queue's flush.
pub trait Deferral: Send + Sync {
    /// Arrange for `queue.flush()` to be called later.
    fn defer(&self, queue: BatchQueue);
}

/// Leaves flushing to the caller. Useful in tests and for hosts that flush
/// at a fixed point of their own loop.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualDeferral;

impl Deferral for ManualDeferral {
    fn defer(&self, _queue: BatchQueue) {}
}

/// Flushes on a spawned tokio task, i.e. once the writing task yields.
///
/// Only current-thread runtimes are accepted. On a multi-thread runtime the
/// spawned flush could start on another worker in the middle of a burst of
/// writes and split it into several flushes.
#[derive(Debug, Clone)]
pub struct TokioDeferral {
    handle: tokio::runtime::Handle,
}

impl TokioDeferral {
    /// Fails with [`ReactiveError::UnsupportedAsyncRuntime`] unless `handle`
    /// belongs to a current-thread runtime.
    pub fn new(handle: tokio::runtime::Handle) -> Result<Self> {
        match handle.runtime_flavor() {
            RuntimeFlavor::CurrentThread => Ok(Self { handle }),
            flavor => Err(ReactiveError::UnsupportedAsyncRuntime {
                flavor: format!("{flavor:?}"),
            }),
        }
    }

    /// Use the tokio runtime the caller is running on.
    pub fn current() -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| ReactiveError::NoAsyncRuntime)?;
        Self::new(handle)
    }
}

impl Deferral for TokioDeferral {
    fn defer(&self, queue: BatchQueue) {
        self.handle.spawn(async move {
            match queue.flush() {
                Ok(ran) => debug!(ran, "deferred flush complete"),
                Err(err) => error!(error = %err, "deferred flush failed"),
            }
        });
    }
}

struct QueueState {
    jobs: IndexMap<EffectId, Job>,
    pending: bool,
}

struct QueueInner {
    state: Mutex<QueueState>,
    deferral: Box<dyn Deferral>,
}

/// A deferred, deduplicating job queue.
///
/// Cloning produces another handle to the same queue.
#[derive(Clone)]
pub struct BatchQueue {
    inner: Arc<QueueInner>,
}

impl BatchQueue {
    pub fn new(deferral: impl Deferral + 'static) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    jobs: IndexMap::new(),
                    pending: false,
                }),
                deferral: Box::new(deferral),
            }),
        }
    }

    /// A queue flushed only by explicit [`flush`](Self::flush) calls.
    pub fn manual() -> Self {
        Self::new(ManualDeferral)
    }

    /// A scheduler that enqueues into this queue.
    pub fn scheduler(&self) -> Scheduler {
        let queue = self.clone();
        Arc::new(move |job| {
            queue.enqueue(job);
            Ok(())
        })
    }

    /// Queue a job, scheduling a flush if none is pending.
    pub fn enqueue(&self, job: Job) {
        let schedule = {
            let mut state = self.inner.state.lock();
            state.jobs.entry(job.id()).or_insert(job);
            !std::mem::replace(&mut state.pending, true)
        };
        if schedule {
            self.inner.deferral.defer(self.clone());
        }
    }

    /// Run every queued job once. Returns how many jobs ran.
    ///
    /// A job's error aborts the flush and is returned. Jobs still queued at
    /// that point stay queued but are not rescheduled: they run on the next
    /// explicit flush, or on the flush scheduled by the next enqueue.
    pub fn flush(&self) -> Result<usize> {
        let _settle = Settle { queue: self };
        let mut ran = 0;

        for _ in 0..MAX_FLUSH_PASSES {
            let batch: Vec<Job> = {
                let mut state = self.inner.state.lock();
                if state.jobs.is_empty() {
                    debug!(ran, "flush settled");
                    return Ok(ran);
                }
                state.jobs.drain(..).map(|(_, job)| job).collect()
            };

            for job in batch {
                if job.is_stale() {
                    continue;
                }
                job.run()?;
                ran += 1;
            }
        }

        Err(ReactiveError::FlushLimitExceeded {
            passes: MAX_FLUSH_PASSES,
        })
    }

    /// Number of queued jobs.
    pub fn len(&self) -> usize {
        self.inner.state.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().jobs.is_empty()
    }

    /// Whether a flush has been scheduled and not yet finished.
    pub fn is_pending(&self) -> bool {
        self.inner.state.lock().pending
    }
}

impl fmt::Debug for BatchQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("BatchQueue")
            .field("queued", &state.jobs.len())
            .field("pending", &state.pending)
            .finish()
    }
}

/// Clears the pending mark when a flush ends, however it ends. Leftover
/// jobs (after an error or a panicking job) are not rescheduled, so a
/// runaway flush cannot keep re-arming itself.
struct Settle<'a> {
    queue: &'a BatchQueue,
}

impl Drop for Settle<'_> {
    fn drop(&mut self) {
        let mut state = self.queue.inner.state.lock();
        state.pending = false;
        if !state.jobs.is_empty() {
            warn!(left = state.jobs.len(), "flush ended with jobs still queued");
        }
    }
}
