//! Identity types for the reactive system.
//!
//! Observed targets and effects are keyed by identity, never by value. Both
//! identifiers come from process-wide atomic counters so that two runtimes
//! never hand out the same id.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for an effect.
///
/// Every effect, including the internal effects of computed values and
/// watchers, gets one when it is created. Dependency entries store these
/// ids, and the self-trigger check compares them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl EffectId {
    /// Generate a new unique effect ID.
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Unique identifier for something that can be tracked: a record or a
/// computed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// The key half of a dependency entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKey {
    /// A single named field.
    Named(Arc<str>),
    /// The key set of a target. Read by enumeration, written by adding or
    /// deleting a field.
    Iterate,
}

impl FieldKey {
    /// Key used by computed values for their cached result.
    pub fn value() -> Self {
        Self::Named(Arc::from("value"))
    }
}

impl From<&str> for FieldKey {
    fn from(name: &str) -> Self {
        Self::Named(Arc::from(name))
    }
}

impl From<Arc<str>> for FieldKey {
    fn from(name: Arc<str>) -> Self {
        Self::Named(name)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Iterate => f.write_str("<keys>"),
        }
    }
}

/// A dependency entry: one field of one target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DepKey {
    pub target: TargetId,
    pub field: FieldKey,
}

impl DepKey {
    pub fn new(target: TargetId, field: impl Into<FieldKey>) -> Self {
        Self {
            target,
            field: field.into(),
        }
    }
}

impl fmt::Display for DepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.target, self.field)
    }
}
