//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects observables,
//! effects, computed values and watchers. It owns all shared state of the
//! reactive system: the effect stack, the dependency store and the side
//! table of wrapped records. Nothing lives in a global; two runtimes are
//! fully independent.
//!
//! # How It Works
//!
//! 1. Running an effect pushes it onto the effect stack.
//!
//! 2. An observable read calls [`Runtime::track`], which subscribes the effect
//!    on top of the stack to the (target, field) entry and records the entry
//!    in the effect's own dependency list.
//!
//! 3. An observable write calls [`Runtime::notify`], which snapshots the
//!    entry's subscribers and dispatches every one of them except the effect
//!    that is currently running. Dispatch goes through the effect's
//!    scheduler if it has one, otherwise the effect re-runs synchronously.
//!
//! # Thread Safety
//!
//! The runtime is `Send + Sync`. Every track, notify and run happens inside
//! a reentrant exclusive section, so effects triggered from different OS
//! threads (for example a flush on a tokio worker) are serialized. The inner
//! locks are only held for bookkeeping, never while user code runs.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use tracing::{debug, trace};

use super::context::{EffectStack, Frame, StackScope};
use super::ids::{DepKey, EffectId, FieldKey, TargetId};
use super::observable::ObservableInner;
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::graph::DependencyStore;

/// A unit of reactive computation as the runtime sees it.
///
/// Implemented by the effect type; computed values and watchers are effects
/// with a particular scheduler, so they need nothing extra.
pub(crate) trait Reactive: Send + Sync {
    /// Get the identity of this effect.
    fn effect_id(&self) -> EffectId;

    /// Whether the effect can still run (not stopped).
    fn is_active(&self) -> bool;

    /// React to a notification: hand off to the scheduler, or run.
    fn trigger(&self) -> Result<()>;

    /// Run the body now, discarding its value.
    fn execute(&self) -> Result<()>;

    /// Append an entry to the effect's own dependency list.
    fn record_dependency(&self, key: DepKey);
}

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    /// Serializes track/notify/run across threads.
    section: ReentrantMutex<()>,
    stack: Mutex<EffectStack>,
    store: Mutex<DependencyStore>,
    /// Record identity to its live observable handle.
    wrapped: Mutex<HashMap<TargetId, Weak<ObservableInner>>>,
}

/// Handle to a reactive runtime.
///
/// Cloning produces another handle to the same runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with the given configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                section: ReentrantMutex::new(()),
                stack: Mutex::new(EffectStack::default()),
                store: Mutex::new(DependencyStore::default()),
                wrapped: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Whether two handles refer to the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Enter the exclusive section. Reentrant on the owning thread.
    pub(crate) fn section(&self) -> ReentrantMutexGuard<'_, ()> {
        self.inner.section.lock()
    }

    /// Push a frame; the returned guard pops it.
    pub(crate) fn enter(&self, frame: Frame) -> StackScope<'_> {
        StackScope::enter(&self.inner.stack, frame)
    }

    /// Record that the running effect depends on `field` of `target`.
    ///
    /// No-op outside an effect or inside [`Runtime::untracked`].
    pub(crate) fn track(&self, target: TargetId, field: impl Into<FieldKey>) {
        let _section = self.section();
        let Some(effect) = self.inner.stack.lock().tracking() else {
            return;
        };

        let key = DepKey::new(target, field);
        let inserted = self.inner.store.lock().subscribe(&key, &effect);
        if inserted {
            trace!(effect = %effect.effect_id(), key = %key, "track");
            effect.record_dependency(key);
        }
    }

    /// Dispatch every effect subscribed to any of `fields` of `target`.
    ///
    /// The running effect is skipped so that an effect writing a field it
    /// reads does not re-enter itself. The first error returned by a
    /// dispatched effect stops dispatch and is returned.
    pub(crate) fn notify(&self, target: TargetId, fields: &[FieldKey]) -> Result<()> {
        let _section = self.section();
        let subscribers = self.inner.store.lock().snapshot(target, fields);
        if subscribers.is_empty() {
            return Ok(());
        }

        let running = self.inner.stack.lock().running();
        for effect in subscribers {
            let id = effect.effect_id();
            if Some(id) == running || !effect.is_active() {
                continue;
            }
            trace!(effect = %id, target = %target, "notify");
            effect.trigger()?;
        }
        Ok(())
    }

    /// Remove `effect` from each of `deps`.
    pub(crate) fn cleanup(&self, effect: EffectId, deps: impl IntoIterator<Item = DepKey>) {
        let _section = self.section();
        let mut store = self.inner.store.lock();
        for key in deps {
            store.unsubscribe(&key, effect);
        }
    }

    /// Drop every store entry of `target`.
    pub(crate) fn forget_target(&self, target: TargetId) {
        let _section = self.section();
        let removed = self.inner.store.lock().forget_target(target);
        if removed > 0 {
            debug!(target = %target, fields = removed, "released target");
        }
    }

    /// Look up the live observable handle of a record, or register a new one
    /// built by `create`.
    pub(crate) fn wrapped_or_insert(
        &self,
        target: TargetId,
        create: impl FnOnce() -> Arc<ObservableInner>,
    ) -> Arc<ObservableInner> {
        let _section = self.section();
        let mut wrapped = self.inner.wrapped.lock();
        if let Some(existing) = wrapped.get(&target).and_then(Weak::upgrade) {
            return existing;
        }
        let inner = create();
        wrapped.insert(target, Arc::downgrade(&inner));
        inner
    }

    /// Forget the side-table slot of a record whose handle died.
    pub(crate) fn unwrap_target(&self, target: TargetId) {
        let mut wrapped = self.inner.wrapped.lock();
        if wrapped.get(&target).is_some_and(|weak| weak.strong_count() == 0) {
            wrapped.remove(&target);
        }
    }

    /// Run `f` without tracking any reads it makes.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _section = self.section();
        let _scope = self.enter(Frame::Untracked);
        f()
    }

    /// The innermost effect currently running, if any.
    pub fn active_effect(&self) -> Option<EffectId> {
        self.inner.stack.lock().running()
    }

    /// Number of frames on the effect stack.
    pub fn depth(&self) -> usize {
        self.inner.stack.lock().depth()
    }

    /// Number of effects subscribed to `field` of `target`.
    pub fn subscriber_count(&self, target: TargetId, field: impl Into<FieldKey>) -> usize {
        let key = DepKey::new(target, field);
        self.inner.store.lock().subscriber_count(&key)
    }

    /// Number of (target, field) entries in the dependency store.
    pub fn entry_count(&self) -> usize {
        self.inner.store.lock().entry_count()
    }

    /// Number of records that currently have a live observable handle.
    pub fn wrapped_count(&self) -> usize {
        self.inner
            .wrapped
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("depth", &self.depth())
            .field("entries", &self.entry_count())
            .finish()
    }
}
