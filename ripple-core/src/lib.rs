//! Ripple Core
//!
//! This crate provides the runtime for the Ripple fine-grained reactive
//! dataflow engine. It implements:
//!
//! - Observable records with per-field dependency tracking
//! - Effects that re-run when the fields they read change
//! - Lazily evaluated, memoized computed values
//! - Watchers delivering `(new, old)` pairs
//! - An optional batching queue that coalesces re-runs
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: The runtime, observables, effects, computed values, watchers
//! - `graph`: The dependency store and the batch queue
//! - `config`: Runtime tunables
//! - `error`: The crate-wide error type
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::{Record, Runtime};
//!
//! let runtime = Runtime::new();
//! let state = runtime.observable(Record::new().with("count", 0));
//!
//! // Create a derived value
//! let doubled = runtime.computed({
//!     let state = state.clone();
//!     move || state.get("count").as_i64().unwrap_or(0) * 2
//! });
//!
//! // Create an effect
//! let _effect = runtime.effect({
//!     let state = state.clone();
//!     let doubled = doubled.clone();
//!     move || {
//!         println!("Count: {:?}, Doubled: {:?}", state.get("count"), doubled.get());
//!     }
//! })?;
//!
//! // Update the record
//! state.set("count", 5)?;
//! // Effect automatically runs, prints: "Count: Int(5), Doubled: Ok(10)"
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::{ReactiveError, Result};
pub use graph::{BatchQueue, Deferral, ManualDeferral, TokioDeferral};
pub use reactive::{
    Computed, Effect, EffectOptions, FieldAccess, Observable, ReadOnly, Record, Runtime, Value,
    WatchOptions, WatchSource, Watcher,
};
