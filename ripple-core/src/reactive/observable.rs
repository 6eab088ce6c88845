//! Observable Implementation
//!
//! An [`Observable`] wraps a plain [`Record`] and routes every field access
//! through the runtime:
//!
//! - Reading a field while an effect runs subscribes that effect to the
//!   field.
//! - Writing a field performs the write, then notifies the field's
//!   subscribers.
//! - Outside any effect, reads and writes are plain field accesses.
//!
//! # Key-set Tracking
//!
//! Enumerating fields ([`Observable::keys`], [`Observable::len`]) subscribes
//! to the record's key set rather than to any one field. Adding a new field
//! or deleting an existing one notifies key-set subscribers as well as the
//! field's own subscribers; overwriting an existing field does not touch
//! the key set.
//!
//! # Identity
//!
//! Wrapping is idempotent. The runtime keeps a side table from record
//! identity to the live handle, so wrapping the same record twice returns
//! the same handle, and nested records reached through
//! [`Observable::child`] are wrapped through the same table.

use std::fmt;
use std::sync::Arc;

use super::ids::{FieldKey, TargetId};
use super::runtime::Runtime;
use super::value::{Record, Value};
use crate::error::{ReactiveError, Result};

/// Field-level read/write capability.
///
/// This is the only surface renderers and other collaborators need; it is
/// implemented by [`Observable`] and by its [`ReadOnly`] view.
pub trait FieldAccess {
    /// Read a field, tracking it if an effect is running.
    fn read(&self, field: &str) -> Value;

    /// Write a field and notify its subscribers.
    fn write(&self, field: &str, value: Value) -> Result<()>;
}

/// Anything that can be turned into an [`Observable`] of a given runtime.
pub trait Observe {
    fn observe_in(self, runtime: &Runtime) -> Observable;
}

pub(crate) struct ObservableInner {
    record: Record,
    runtime: Runtime,
}

impl Drop for ObservableInner {
    fn drop(&mut self) {
        self.runtime.unwrap_target(self.record.id());
    }
}

/// A tracked handle to a record.
///
/// Cloning produces another handle to the same wrapper.
#[derive(Clone)]
pub struct Observable {
    inner: Arc<ObservableInner>,
}

impl Observable {
    /// The identity this record is tracked under.
    pub fn id(&self) -> TargetId {
        self.inner.record.id()
    }

    /// The wrapped plain record. Accesses through it are not tracked.
    pub fn record(&self) -> &Record {
        &self.inner.record
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Whether two handles are the same wrapper.
    pub fn ptr_eq(&self, other: &Observable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read a field. Missing fields read as [`Value::Null`].
    pub fn get(&self, field: &str) -> Value {
        self.inner.runtime.track(self.id(), field);
        self.inner.record.get(field).unwrap_or_default()
    }

    /// Read a field without subscribing the running effect.
    pub fn get_untracked(&self, field: &str) -> Value {
        self.inner.record.get(field).unwrap_or_default()
    }

    /// Write a field, then notify.
    ///
    /// Errors returned by effects that the write re-runs propagate here.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let runtime = &self.inner.runtime;
        let _section = runtime.section();

        if runtime.config().skip_unchanged_writes
            && self.inner.record.get(field).as_ref() == Some(&value)
        {
            self.inner.record.insert(field, value);
            return Ok(());
        }

        let added = self.inner.record.insert(field, value).is_none();
        if added {
            runtime.notify(self.id(), &[FieldKey::from(field), FieldKey::Iterate])
        } else {
            runtime.notify(self.id(), &[FieldKey::from(field)])
        }
    }

    /// Delete a field. Returns `false` if it was not present.
    pub fn delete(&self, field: &str) -> Result<bool> {
        let runtime = &self.inner.runtime;
        let _section = runtime.section();

        if self.inner.record.remove(field).is_none() {
            return Ok(false);
        }
        runtime.notify(self.id(), &[FieldKey::from(field), FieldKey::Iterate])?;
        Ok(true)
    }

    /// Whether a field is present. Tracks the field.
    pub fn has(&self, field: &str) -> bool {
        self.inner.runtime.track(self.id(), field);
        self.inner.record.contains(field)
    }

    /// Field names in insertion order. Tracks the key set.
    pub fn keys(&self) -> Vec<Arc<str>> {
        self.inner.runtime.track(self.id(), FieldKey::Iterate);
        self.inner.record.keys()
    }

    /// Number of fields. Tracks the key set.
    pub fn len(&self) -> usize {
        self.inner.runtime.track(self.id(), FieldKey::Iterate);
        self.inner.record.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The nested record in `field`, wrapped. Tracks the field.
    pub fn child(&self, field: &str) -> Option<Observable> {
        match self.get(field) {
            Value::Record(record) => Some(self.inner.runtime.observable(&record)),
            _ => None,
        }
    }

    /// A view that reads like this handle but rejects writes.
    pub fn readonly(&self) -> ReadOnly {
        ReadOnly {
            source: self.clone(),
        }
    }
}

impl FieldAccess for Observable {
    fn read(&self, field: &str) -> Value {
        self.get(field)
    }

    fn write(&self, field: &str, value: Value) -> Result<()> {
        self.set(field, value)
    }
}

impl fmt::Debug for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("id", &self.id())
            .field("record", &self.inner.record)
            .finish()
    }
}

/// Read-only view of an [`Observable`].
///
/// Reads are tracked exactly like reads through the source handle, so
/// effects reading the view still react to writes made through the source.
#[derive(Clone, Debug)]
pub struct ReadOnly {
    source: Observable,
}

impl ReadOnly {
    pub fn id(&self) -> TargetId {
        self.source.id()
    }

    pub fn get(&self, field: &str) -> Value {
        self.source.get(field)
    }

    pub fn has(&self, field: &str) -> bool {
        self.source.has(field)
    }

    pub fn keys(&self) -> Vec<Arc<str>> {
        self.source.keys()
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Nested records stay read-only.
    pub fn child(&self, field: &str) -> Option<ReadOnly> {
        self.source.child(field).map(|child| child.readonly())
    }
}

impl FieldAccess for ReadOnly {
    fn read(&self, field: &str) -> Value {
        self.get(field)
    }

    fn write(&self, field: &str, _value: Value) -> Result<()> {
        Err(ReactiveError::ReadOnly {
            field: field.to_string(),
        })
    }
}

impl Observe for &Record {
    fn observe_in(self, runtime: &Runtime) -> Observable {
        let inner = runtime.wrapped_or_insert(self.id(), || {
            Arc::new(ObservableInner {
                record: self.clone(),
                runtime: runtime.clone(),
            })
        });
        Observable { inner }
    }
}

impl Observe for Record {
    fn observe_in(self, runtime: &Runtime) -> Observable {
        (&self).observe_in(runtime)
    }
}

impl Observe for &Observable {
    fn observe_in(self, runtime: &Runtime) -> Observable {
        if self.inner.runtime.ptr_eq(runtime) {
            return self.clone();
        }
        self.record().observe_in(runtime)
    }
}

impl Observe for Observable {
    fn observe_in(self, runtime: &Runtime) -> Observable {
        (&self).observe_in(runtime)
    }
}

impl Observe for serde_json::Value {
    fn observe_in(self, runtime: &Runtime) -> Observable {
        Record::from_json(self).observe_in(runtime)
    }
}

impl Runtime {
    /// Wrap a record (or re-wrap a handle) for tracking.
    pub fn observable(&self, target: impl Observe) -> Observable {
        target.observe_in(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counter() -> (Arc<AtomicI32>, Arc<AtomicI32>) {
        let count = Arc::new(AtomicI32::new(0));
        (count.clone(), count)
    }

    #[test]
    fn reads_and_writes_without_effects() {
        let runtime = Runtime::new();
        let state = runtime.observable(Record::new().with("count", 1));

        assert_eq!(state.get("count"), Value::Int(1));
        state.set("count", 2).unwrap();
        assert_eq!(state.get("count"), Value::Int(2));
        assert!(state.get("missing").is_null());
        assert_eq!(runtime.entry_count(), 0);
    }

    #[test]
    fn wrapping_is_idempotent() {
        let runtime = Runtime::new();
        let record = Record::new();

        let first = runtime.observable(&record);
        let second = runtime.observable(&record);
        let third = runtime.observable(&first);

        assert!(first.ptr_eq(&second));
        assert!(first.ptr_eq(&third));
    }

    #[test]
    fn rewrap_after_drop_targets_same_record() {
        let runtime = Runtime::new();
        let record = Record::new().with("x", 1);

        let id = runtime.observable(&record).id();
        let again = runtime.observable(&record);
        assert_eq!(again.id(), id);
    }

    #[test]
    fn dropping_last_handle_keeps_subscriptions() {
        let runtime = Runtime::new();
        let record = Record::new().with("x", 1);
        let (seen, runs) = counter();

        // Every run reads through a wrapper that dies at the end of the run.
        let _effect = runtime
            .effect({
                let runtime = runtime.clone();
                let record = record.clone();
                move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    runtime.observable(&record).get("x");
                }
            })
            .unwrap();

        assert_eq!(runtime.wrapped_count(), 0);
        assert_eq!(runtime.subscriber_count(record.id(), "x"), 1);

        let writer = runtime.observable(&record);
        assert_eq!(runtime.wrapped_count(), 1);
        writer.set("x", 2).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        drop(writer);
        assert_eq!(runtime.wrapped_count(), 0);
        assert_eq!(runtime.subscriber_count(record.id(), "x"), 1);
    }

    #[test]
    fn foreign_handle_is_rewrapped() {
        let first = Runtime::new();
        let second = Runtime::new();

        let a = first.observable(Record::new());
        let b = second.observable(&a);

        assert!(!a.ptr_eq(&b));
        assert!(a.record().ptr_eq(b.record()));
        assert!(b.runtime().ptr_eq(&second));
    }

    #[test]
    fn json_values_become_observables() {
        let runtime = Runtime::new();
        let state = runtime.observable(json!({ "user": { "name": "ada" } }));

        let user = state.child("user").unwrap();
        assert_eq!(user.get("name").as_str(), Some("ada"));
        assert!(state.child("missing").is_none());
    }

    #[test]
    fn adding_a_field_notifies_key_readers() {
        let runtime = Runtime::new();
        let state = runtime.observable(Record::new().with("a", 1));
        let (seen, runs) = counter();

        let _effect = runtime
            .effect({
                let state = state.clone();
                move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    state.keys().len()
                }
            })
            .unwrap();

        state.set("a", 5).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        state.set("b", 1).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        assert!(state.delete("b").unwrap());
        assert_eq!(seen.load(Ordering::SeqCst), 3);

        assert!(!state.delete("b").unwrap());
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn has_tracks_the_field() {
        let runtime = Runtime::new();
        let state = runtime.observable(Record::new());
        let (seen, runs) = counter();

        let _effect = runtime
            .effect({
                let state = state.clone();
                move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    state.has("flag")
                }
            })
            .unwrap();

        state.set("other", true).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        state.set("flag", true).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn effect_reading_field_and_keys_runs_once_per_add() {
        let runtime = Runtime::new();
        let state = runtime.observable(Record::new());
        let (seen, runs) = counter();

        let _effect = runtime
            .effect({
                let state = state.clone();
                move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    state.get("x");
                    state.len()
                }
            })
            .unwrap();

        state.set("x", 1).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unchanged_writes_notify_by_default() {
        let runtime = Runtime::new();
        let state = runtime.observable(Record::new().with("x", 1));
        let (seen, runs) = counter();

        let _effect = runtime
            .effect({
                let state = state.clone();
                move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    state.get("x");
                }
            })
            .unwrap();

        state.set("x", 1).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unchanged_writes_can_be_skipped() {
        let runtime = Runtime::with_config(RuntimeConfig {
            skip_unchanged_writes: true,
            ..RuntimeConfig::default()
        });
        let state = runtime.observable(Record::new().with("x", 1).with("nan", f64::NAN));
        let (seen, runs) = counter();

        let _effect = runtime
            .effect({
                let state = state.clone();
                move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    state.get("x");
                    state.get("nan");
                }
            })
            .unwrap();

        state.set("x", 1).unwrap();
        state.set("nan", f64::NAN).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        state.set("x", 2).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn readonly_rejects_writes_but_tracks_reads() {
        let runtime = Runtime::new();
        let state = runtime.observable(Record::new().with("x", 1));
        let view = state.readonly();
        let (seen, runs) = counter();

        let _effect = runtime
            .effect({
                let view = view.clone();
                move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    view.get("x");
                }
            })
            .unwrap();

        match view.write("x", Value::Int(9)) {
            Err(ReactiveError::ReadOnly { field }) => assert_eq!(field, "x"),
            other => panic!("expected ReadOnly, got {other:?}"),
        }
        assert_eq!(view.get("x"), Value::Int(1));

        state.set("x", 2).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn field_access_is_object_safe() {
        let runtime = Runtime::new();
        let state = runtime.observable(Record::new());
        let handles: Vec<Box<dyn FieldAccess>> =
            vec![Box::new(state.clone()), Box::new(state.readonly())];

        handles[0].write("x", Value::from("hi")).unwrap();
        assert_eq!(handles[1].read("x").as_str(), Some("hi"));
        assert!(handles[1].write("x", Value::Null).is_err());
    }
}
