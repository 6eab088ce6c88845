//! Plain Records and Values
//!
//! A [`Record`] is the plain, unobserved object that an
//! [`Observable`](super::Observable) wraps. It is a shared, ordered map of
//! named fields. Cloning a `Record` produces another handle to the **same**
//! record; identity (its [`TargetId`]) is what the dependency store keys on.
//!
//! Field values are dynamic [`Value`]s. Nested records are stored as
//! `Value::Record`, which is how object graphs (including cyclic ones) are
//! expressed.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::ids::TargetId;

/// A dynamically typed field value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(Vec<Value>),
    Record(Record),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view; integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Record(_) => "record",
        }
    }

    /// Convert a JSON value. Objects become fresh records.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(Arc::from(s)),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(_) => Value::Record(Record::from_json(json)),
        }
    }
}

/// Scalars compare structurally, records by identity. `NaN` equals `NaN`
/// so that rewriting a NaN field counts as unchanged.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => f.debug_list().entries(items).finish(),
            // Records may be cyclic; print identity only.
            Value::Record(record) => write!(f, "Record({})", record.id()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Record(record)
    }
}

impl From<&Record> for Value {
    fn from(record: &Record) -> Self {
        Value::Record(record.clone())
    }
}

struct RecordInner {
    id: TargetId,
    fields: RwLock<IndexMap<Arc<str>, Value>>,
}

/// A plain, shared record of named fields.
///
/// Reads and writes on a `Record` are never tracked. Wrap it with
/// [`Runtime::observable`](crate::Runtime::observable) to observe it.
#[derive(Clone)]
pub struct Record {
    inner: Arc<RecordInner>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RecordInner {
                id: TargetId::new(),
                fields: RwLock::new(IndexMap::new()),
            }),
        }
    }

    /// Builder-style insert.
    pub fn with(self, field: &str, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Build a record from a JSON object. Nested objects become nested
    /// records; a non-object document yields an empty record.
    pub fn from_json(json: serde_json::Value) -> Self {
        let record = Record::new();
        if let serde_json::Value::Object(map) = json {
            let mut fields = record.inner.fields.write();
            for (key, value) in map {
                fields.insert(Arc::from(key), Value::from_json(value));
            }
        }
        record
    }

    /// The identity this record is tracked under.
    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    /// Whether two handles refer to the same record.
    pub fn ptr_eq(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read a field; `None` if absent.
    pub fn get(&self, field: &str) -> Option<Value> {
        self.inner.fields.read().get(field).cloned()
    }

    /// Write a field, returning the previous value if there was one.
    pub fn insert(&self, field: &str, value: impl Into<Value>) -> Option<Value> {
        self.inner.fields.write().insert(Arc::from(field), value.into())
    }

    /// Remove a field, preserving the order of the remaining ones.
    pub fn remove(&self, field: &str) -> Option<Value> {
        self.inner.fields.write().shift_remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.inner.fields.read().contains_key(field)
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> Vec<Arc<str>> {
        self.inner.fields.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.fields.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.fields.read().is_empty()
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self.inner.fields.read();
        f.debug_map()
            .entries(fields.iter().map(|(k, v)| (k.as_ref(), v)))
            .finish()
    }
}
