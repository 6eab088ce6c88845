//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when one of
//! the fields it read has changed since its last evaluation.
//!
//! # How Computed Values Work
//!
//! 1. The getter runs inside a lazy effect. Nothing is evaluated until the
//!    first [`Computed::get`].
//!
//! 2. The effect's scheduler does not recompute. When a source changes it
//!    only sets the dirty flag and notifies whoever read this computed.
//!
//! 3. [`Computed::get`] recomputes if dirty, otherwise returns the cache.
//!    The read itself is tracked under the computed's own target, which is
//!    how an outer effect reading a computed gets re-run: the inner effect
//!    shadows the outer one while the getter runs, so the link has to be
//!    made by hand.
//!
//! The getter therefore runs at most once per dependency change, no matter
//! how often the value is read in between.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::effect::{Effect, EffectOptions, Scheduler};
use super::ids::{FieldKey, TargetId};
use super::runtime::Runtime;
use crate::error::{ReactiveError, Result};

struct ComputedInner<T> {
    /// Identity readers subscribe to, under the `value` field.
    target: TargetId,
    runtime: Runtime,
    cached: Mutex<Option<T>>,
    dirty: AtomicBool,
    effect: Effect<T>,
}

impl<T> ComputedInner<T> {
    /// Scheduler body: mark stale and pass the notification on.
    fn invalidate(&self) -> Result<()> {
        self.dirty.store(true, Ordering::SeqCst);
        trace!(target = %self.target, "computed invalidated");
        self.runtime.notify(self.target, &[FieldKey::value()])
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.runtime.forget_target(self.target);
    }
}

/// A lazily evaluated, memoized derived value.
///
/// Cloning a `Computed` creates a new handle to the **same** node.
///
/// # Example
///
/// ```rust,ignore
/// let state = runtime.observable(Record::new().with("count", 2));
/// let doubled = runtime.computed({
///     let state = state.clone();
///     move || state.get("count").as_i64().unwrap_or(0) * 2
/// });
///
/// assert_eq!(doubled.get()?, 4);
/// state.set("count", 5)?;
/// assert_eq!(doubled.get()?, 10);
/// ```
pub struct Computed<T> {
    inner: Arc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + Send + 'static,
{
    /// The current value, recomputing if a source changed.
    ///
    /// Fails with [`ReactiveError::EffectStopped`] if the computed was
    /// stopped and a refresh is needed.
    pub fn get(&self) -> Result<T> {
        let inner = &self.inner;
        let _section = inner.runtime.section();

        if inner.dirty.load(Ordering::SeqCst) {
            let fresh = inner.effect.run()?;
            *inner.cached.lock() = Some(fresh);
            inner.dirty.store(false, Ordering::SeqCst);
        }

        inner.runtime.track(inner.target, FieldKey::value());
        let cached = inner.cached.lock().clone();
        cached.ok_or(ReactiveError::EffectStopped(inner.effect.id()))
    }

    /// Whether the next [`get`](Self::get) will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    /// Stop reacting to sources. The cached value stays readable.
    pub fn stop(&self) {
        self.inner.effect.stop();
    }

    pub fn is_active(&self) -> bool {
        self.inner.effect.is_active()
    }

    /// The identity readers subscribe to.
    pub fn target(&self) -> TargetId {
        self.inner.target
    }

    /// How many times the getter has run.
    pub fn evaluations(&self) -> usize {
        self.inner.effect.run_count()
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("target", &self.inner.target)
            .field("cached", &*self.inner.cached.lock())
            .field("dirty", &self.inner.dirty.load(Ordering::SeqCst))
            .finish()
    }
}

impl Runtime {
    /// Create a memoized derived value.
    pub fn computed<T, F>(&self, getter: F) -> Computed<T>
    where
        T: Clone + Send + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|node: &Weak<ComputedInner<T>>| {
            let node = node.clone();
            let scheduler: Scheduler = Arc::new(move |_job| match node.upgrade() {
                Some(node) => node.invalidate(),
                None => Ok(()),
            });

            ComputedInner {
                target: TargetId::new(),
                runtime: self.clone(),
                cached: Mutex::new(None),
                dirty: AtomicBool::new(true),
                effect: Effect::new(self, getter, EffectOptions::new().lazy().scheduler(scheduler)),
            }
        });
        Computed { inner }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
