//! Watchers
//!
//! A watcher observes a source and calls back with `(new, old)` whenever the
//! source changes. It is an effect whose body reads the source and whose
//! scheduler, instead of re-running blindly, re-runs to obtain the new value
//! and hands both values to the callback.
//!
//! # Sources
//!
//! - A getter closure is tracked as-is; its return value is what the
//!   callback receives.
//! - A record (or observable handle) is traversed recursively, reading
//!   every field of every nested record so that any change anywhere below
//!   it fires the watcher. Traversal remembers visited records, so cyclic
//!   object graphs terminate.
//!
//! Without `immediate`, registration only records the initial value; the
//! callback first fires on the first change. With `immediate`, the callback
//! fires once during registration with no old value.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::effect::{Effect, EffectOptions, Job, JobAction, Scheduler};
use super::ids::{EffectId, TargetId};
use super::observable::Observable;
use super::runtime::Runtime;
use super::value::{Record, Value};
use crate::error::{ReactiveError, Result};
use crate::graph::BatchQueue;

/// Getter form of a watch source.
pub type Getter = Arc<dyn Fn() -> Value + Send + Sync>;

/// Callback receiving `(new, old)`. `old` is `None` on an immediate first
/// firing.
pub type WatchCallback = Box<dyn Fn(&Value, Option<&Value>) + Send + Sync>;

/// What a watcher observes.
#[derive(Clone)]
pub enum WatchSource {
    /// A tracked getter.
    Getter(Getter),
    /// An observable, traversed deeply.
    Object(Observable),
    /// A plain record, wrapped in the watching runtime and traversed deeply.
    Record(Record),
}

impl WatchSource {
    pub fn getter(getter: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self::Getter(Arc::new(getter))
    }
}

impl From<Observable> for WatchSource {
    fn from(observable: Observable) -> Self {
        Self::Object(observable)
    }
}

impl From<&Observable> for WatchSource {
    fn from(observable: &Observable) -> Self {
        Self::Object(observable.clone())
    }
}

impl From<Record> for WatchSource {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

/// Only record values can be watched; scalars have nothing to observe.
impl TryFrom<Value> for WatchSource {
    type Error = ReactiveError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Record(record) => Ok(Self::Record(record)),
            other => Err(ReactiveError::InvalidWatchSource {
                found: other.kind().to_string(),
            }),
        }
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Getter(_) => f.write_str("Getter(..)"),
            Self::Object(observable) => write!(f, "Object({})", observable.id()),
            Self::Record(record) => write!(f, "Record({})", record.id()),
        }
    }
}

/// Options for [`Runtime::watch`].
#[derive(Clone, Default, Debug)]
pub struct WatchOptions {
    /// Fire once during registration.
    pub immediate: bool,
    /// Also traverse whatever a getter returns.
    pub deep: bool,
    /// Deliver firings through a batch queue instead of synchronously.
    pub queue: Option<BatchQueue>,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub fn queue(mut self, queue: BatchQueue) -> Self {
        self.queue = Some(queue);
        self
    }
}

struct WatchState {
    old: Mutex<Option<Value>>,
    callback: WatchCallback,
    effect: Effect<Value>,
}

impl WatchState {
    /// Re-run the getter and deliver `(new, old)`.
    fn fire(&self) -> Result<()> {
        let new = self.effect.run()?;
        let old = self.old.lock().replace(new.clone());
        (self.callback)(&new, old.as_ref());
        Ok(())
    }
}

/// Handle to a running watcher. Dropping it stops the watcher.
pub struct Watcher {
    state: Arc<WatchState>,
}

impl Watcher {
    pub fn stop(&self) {
        self.state.effect.stop();
    }

    pub fn is_active(&self) -> bool {
        self.state.effect.is_active()
    }

    pub fn id(&self) -> EffectId {
        self.state.effect.id()
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("effect", &self.state.effect)
            .finish()
    }
}

/// Read every field reachable from `value`, once per record.
fn traverse(runtime: &Runtime, value: &Value, seen: &mut HashSet<TargetId>) {
    match value {
        Value::Record(record) => {
            if !seen.insert(record.id()) {
                return;
            }
            let observed = runtime.observable(record);
            for key in observed.keys() {
                traverse(runtime, &observed.get(&key), seen);
            }
        }
        Value::List(items) => {
            for item in items {
                traverse(runtime, item, seen);
            }
        }
        _ => {}
    }
}

fn deep_getter(runtime: &Runtime, inner: Getter) -> Getter {
    let runtime = runtime.clone();
    Arc::new(move || {
        let value = inner();
        traverse(&runtime, &value, &mut HashSet::new());
        value
    })
}

fn object_getter(runtime: &Runtime, record: Record) -> Getter {
    let runtime = runtime.clone();
    Arc::new(move || {
        let root = Value::Record(record.clone());
        traverse(&runtime, &root, &mut HashSet::new());
        root
    })
}

impl Runtime {
    /// Watch `source` and call `callback(new, old)` on every change.
    ///
    /// Fails with [`ReactiveError::InvalidWatchSource`] if `source` is an
    /// observable of a different runtime.
    pub fn watch<C>(
        &self,
        source: impl Into<WatchSource>,
        callback: C,
        options: WatchOptions,
    ) -> Result<Watcher>
    where
        C: Fn(&Value, Option<&Value>) + Send + Sync + 'static,
    {
        let getter = match source.into() {
            WatchSource::Getter(getter) if options.deep => deep_getter(self, getter),
            WatchSource::Getter(getter) => getter,
            WatchSource::Object(observable) => {
                if !observable.runtime().ptr_eq(self) {
                    return Err(ReactiveError::InvalidWatchSource {
                        found: "observable of another runtime".to_string(),
                    });
                }
                object_getter(self, observable.record().clone())
            }
            WatchSource::Record(record) => object_getter(self, record),
        };

        // The effect reaches its state weakly; the watcher owns both.
        let state = Arc::new_cyclic(|this: &Weak<WatchState>| {
            let scheduler: Scheduler = match options.queue {
                None => {
                    let this = this.clone();
                    Arc::new(move |_job: Job| match this.upgrade() {
                        Some(state) => state.fire(),
                        None => Ok(()),
                    })
                }
                Some(queue) => {
                    let this = this.clone();
                    let action: JobAction = Arc::new(move || match this.upgrade() {
                        Some(state) => state.fire(),
                        None => Ok(()),
                    });
                    Arc::new(move |job: Job| {
                        queue.enqueue(job.with_action(action.clone()));
                        Ok(())
                    })
                }
            };

            WatchState {
                old: Mutex::new(None),
                callback: Box::new(callback),
                effect: Effect::new(
                    self,
                    move || getter(),
                    EffectOptions::new().lazy().scheduler(scheduler),
                ),
            }
        });

        if options.immediate {
            state.fire()?;
        } else {
            let initial = state.effect.run()?;
            *state.old.lock() = Some(initial);
        }

        Ok(Watcher { state })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
