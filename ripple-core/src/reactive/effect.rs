//! Effect Implementation
//!
//! An Effect is a computation that re-runs whenever the observed fields it
//! read during its last run change.
//!
//! # How Effects Work
//!
//! 1. When registered, the effect runs its body immediately (unless it is
//!    lazy) to establish its initial dependencies.
//!
//! 2. Every run starts with cleanup: the effect is removed from every
//!    dependency entry it joined last time. The body then re-subscribes to
//!    exactly what it reads now, so a branch that stops reading a field also
//!    stops reacting to it.
//!
//! 3. When a dependency changes, the effect either re-runs synchronously or,
//!    if it was registered with a [`Scheduler`], is handed to the scheduler
//!    as a [`Job`].
//!
//! # Lifetime
//!
//! [`Effect`] handles are cheap clones of one shared effect. The effect is
//! disposed by [`Effect::stop`] or when the last handle is dropped; either
//! way it leaves every dependency entry it belongs to.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, warn};

use super::context::Frame;
use super::ids::{DepKey, EffectId};
use super::runtime::{Reactive, Runtime};
use crate::error::{ReactiveError, Result};

/// Dispatch policy for a triggered effect.
///
/// Called with a [`Job`] for the effect instead of re-running it.
pub type Scheduler = Arc<dyn Fn(Job) -> Result<()> + Send + Sync>;

/// Custom work attached to a job, run in place of the effect body.
pub type JobAction = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// A pending execution of a triggered effect.
///
/// Jobs do not keep their effect alive. Running a job whose effect has been
/// stopped or dropped does nothing.
#[derive(Clone)]
pub struct Job {
    id: EffectId,
    effect: Weak<dyn Reactive>,
    action: Option<JobAction>,
}

impl Job {
    pub(crate) fn new(id: EffectId, effect: Weak<dyn Reactive>) -> Self {
        Self {
            id,
            effect,
            action: None,
        }
    }

    /// The effect this job belongs to.
    pub fn id(&self) -> EffectId {
        self.id
    }

    /// Replace the plain re-run with `action`.
    pub fn with_action(mut self, action: JobAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Whether the effect has been stopped or dropped since the job was made.
    pub fn is_stale(&self) -> bool {
        self.effect.upgrade().map_or(true, |effect| !effect.is_active())
    }

    /// Execute the job.
    pub fn run(&self) -> Result<()> {
        let Some(effect) = self.effect.upgrade() else {
            return Ok(());
        };
        if !effect.is_active() {
            return Ok(());
        }
        match &self.action {
            Some(action) => action(),
            None => effect.execute(),
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("stale", &self.is_stale())
            .field("custom_action", &self.action.is_some())
            .finish()
    }
}

/// Options for [`Runtime::effect_with`].
#[derive(Default)]
pub struct EffectOptions {
    scheduler: Option<Scheduler>,
    lazy: bool,
    on_stop: Option<Box<dyn FnOnce() + Send>>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route notifications through `scheduler` instead of re-running.
    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Do not run at registration; wait for an explicit [`Effect::run`].
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Called once when the effect is stopped or dropped.
    pub fn on_stop(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_stop = Some(Box::new(hook));
        self
    }
}

struct EffectInner<T> {
    id: EffectId,
    runtime: Runtime,
    body: Box<dyn Fn() -> T + Send + Sync>,
    scheduler: Option<Scheduler>,
    /// Entries joined during the last run.
    deps: Mutex<SmallVec<[DepKey; 4]>>,
    active: AtomicBool,
    runs: AtomicUsize,
    on_stop: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    this: Weak<EffectInner<T>>,
}

impl<T: 'static> EffectInner<T> {
    fn run(&self) -> Result<T> {
        if !self.is_active() {
            return Err(ReactiveError::EffectStopped(self.id));
        }
        let Some(this) = self.this.upgrade() else {
            return Err(ReactiveError::EffectStopped(self.id));
        };

        let runtime = &self.runtime;
        let _section = runtime.section();

        let limit = runtime.config().max_effect_depth;
        if runtime.depth() >= limit {
            warn!(effect = %self.id, limit, "effect nesting limit reached");
            return Err(ReactiveError::DepthExceeded { limit });
        }

        self.cleanup();
        let value = {
            let _scope = runtime.enter(Frame::Effect(this));
            (self.body)()
        };

        // Stopped from inside its own body: drop what this run subscribed.
        if !self.is_active() {
            self.cleanup();
        }
        self.runs.fetch_add(1, Ordering::Relaxed);
        Ok(value)
    }

    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.lock());
        if !deps.is_empty() {
            self.runtime.cleanup(self.id, deps);
        }
    }

    fn stop(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        self.cleanup();
        debug!(effect = %self.id, runs = self.runs.load(Ordering::Relaxed), "effect stopped");

        let hook = self.on_stop.lock().take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl<T: 'static> Reactive for EffectInner<T> {
    fn effect_id(&self) -> EffectId {
        self.id
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn trigger(&self) -> Result<()> {
        match &self.scheduler {
            Some(scheduler) => {
                let effect: Weak<dyn Reactive> = self.this.clone();
                scheduler(Job::new(self.id, effect))
            }
            None => self.run().map(drop),
        }
    }

    fn execute(&self) -> Result<()> {
        self.run().map(drop)
    }

    fn record_dependency(&self, key: DepKey) {
        self.deps.lock().push(key);
    }
}

impl<T> Drop for EffectInner<T> {
    fn drop(&mut self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let deps = std::mem::take(self.deps.get_mut());
        if !deps.is_empty() {
            self.runtime.cleanup(self.id, deps);
        }
        if let Some(hook) = self.on_stop.get_mut().take() {
            hook();
        }
    }
}

/// Handle to a registered effect.
///
/// # Example
///
/// ```rust,ignore
/// let runtime = Runtime::new();
/// let state = runtime.observable(Record::new().with("count", 0));
///
/// let effect = runtime.effect({
///     let state = state.clone();
///     move || println!("count is {:?}", state.get("count"))
/// })?;
///
/// state.set("count", 5)?;  // prints: count is 5
/// effect.stop();
/// ```
pub struct Effect<T> {
    inner: Arc<EffectInner<T>>,
}

impl<T: 'static> Effect<T> {
    /// Create an effect without running it.
    pub(crate) fn new<F>(runtime: &Runtime, body: F, options: EffectOptions) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|this| EffectInner {
            id: EffectId::new(),
            runtime: runtime.clone(),
            body: Box::new(body),
            scheduler: options.scheduler,
            deps: Mutex::new(SmallVec::new()),
            active: AtomicBool::new(true),
            runs: AtomicUsize::new(0),
            on_stop: Mutex::new(options.on_stop),
            this: this.clone(),
        });
        Self { inner }
    }

    /// Run the body now, re-collecting dependencies.
    ///
    /// Fails with [`ReactiveError::EffectStopped`] once the effect has been
    /// stopped.
    pub fn run(&self) -> Result<T> {
        self.inner.run()
    }

    /// Leave every dependency entry and never run again.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    /// Number of completed runs.
    pub fn run_count(&self) -> usize {
        self.inner.runs.load(Ordering::Relaxed)
    }

    /// Number of dependency entries joined during the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.lock().len()
    }

    /// A job that re-runs this effect.
    pub fn job(&self) -> Job {
        let effect: Weak<dyn Reactive> = self.inner.this.clone();
        Job::new(self.inner.id, effect)
    }

    pub fn downgrade(&self) -> WeakEffect<T> {
        WeakEffect {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl<T> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("runs", &self.inner.runs.load(Ordering::Relaxed))
            .field("dependencies", &self.inner.deps.lock().len())
            .field("active", &self.inner.active.load(Ordering::SeqCst))
            .finish()
    }
}

/// Non-owning handle to an effect.
pub struct WeakEffect<T> {
    inner: Weak<EffectInner<T>>,
}

impl<T> WeakEffect<T> {
    pub fn upgrade(&self) -> Option<Effect<T>> {
        self.inner.upgrade().map(|inner| Effect { inner })
    }
}

impl<T> Clone for WeakEffect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl Runtime {
    /// Register an effect and run it once.
    pub fn effect<T, F>(&self, body: F) -> Result<Effect<T>>
    where
        T: 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.effect_with(body, EffectOptions::default())
    }

    /// Register an effect with a scheduler, laziness or a stop hook.
    pub fn effect_with<T, F>(&self, body: F, options: EffectOptions) -> Result<Effect<T>>
    where
        T: 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let lazy = options.lazy;
        let effect = Effect::new(self, body, options);
        if !lazy {
            effect.run()?;
        }
        Ok(effect)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
