//! Reactive Primitives
//!
//! This module implements the core reactive system: observables, effects,
//! computed values and watchers, all tied to one [`Runtime`].
//!
//! # Concepts
//!
//! ## Observables
//!
//! An [`Observable`] wraps a plain [`Record`]. Reading a field through it
//! while an effect is running subscribes that effect to the (record, field)
//! pair. Writing a field, adding one or deleting one notifies the subscribers
//! of exactly the affected pairs.
//!
//! ## Effects
//!
//! An [`Effect`] is a computation that re-runs whenever a field it read on
//! its last run changes. Its dependencies are re-collected on every run, so
//! conditional reads are handled without any bookkeeping by the caller.
//!
//! ## Computed values
//!
//! A [`Computed`] is a lazily evaluated, cached value derived from other
//! reactive state. It is itself observable: effects that read it re-run when
//! it becomes stale.
//!
//! ## Watchers
//!
//! A [`Watcher`] calls back with the new and previous value of a source
//! whenever the source changes.
//!
//! # Implementation Notes
//!
//! Tracking state lives in the runtime rather than in thread-locals: the
//! effect stack records what is running, and the dependency store records
//! who read what. Effect bodies may re-enter the runtime (reading, writing,
//! running nested effects) freely; a reentrant section serializes whole
//! operations across threads.

mod computed;
mod context;
mod effect;
mod ids;
mod observable;
pub(crate) mod runtime;
mod value;
mod watch;

pub use computed::Computed;
pub use effect::{Effect, EffectOptions, Job, JobAction, Scheduler, WeakEffect};
pub use ids::{DepKey, EffectId, FieldKey, TargetId};
pub use observable::{FieldAccess, Observable, Observe, ReadOnly};
pub use runtime::Runtime;
pub use value::{Record, Value};
pub use watch::{Getter, WatchCallback, WatchOptions, WatchSource, Watcher};
