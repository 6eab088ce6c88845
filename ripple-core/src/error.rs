//! Error types for the reactive runtime.
//!
//! Most of the runtime is infallible by construction: writing an unobserved
//! field and an effect writing a field it also reads are both silent no-ops
//! beyond the mutation itself. The variants below cover the cases that a
//! caller must hear about.

use thiserror::Error;

use crate::reactive::EffectId;

/// Errors produced by the reactive runtime.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// `run()` was called on an effect after `stop()`.
    #[error("effect {0} has been stopped and cannot run again")]
    EffectStopped(EffectId),

    /// `watch` was given something that is neither a getter nor a record.
    #[error("invalid watch source: expected a getter or an observable record, found {found}")]
    InvalidWatchSource { found: String },

    /// A write went through a read-only view.
    #[error("cannot write field `{field}` through a read-only view")]
    ReadOnly { field: String },

    /// Nested effect runs exceeded the configured depth.
    #[error("effect nesting exceeded the limit of {limit} frames")]
    DepthExceeded { limit: usize },

    /// A batch flush kept producing new jobs.
    #[error("batch flush did not settle after {passes} passes")]
    FlushLimitExceeded { passes: usize },

    /// A tokio-backed deferral was requested outside a tokio runtime.
    #[error("no tokio runtime is available to defer flushes onto")]
    NoAsyncRuntime,

    /// A tokio-backed deferral was given a runtime that may run the flush
    /// on another thread.
    #[error("deferred flushes need a current-thread tokio runtime, found {flavor}")]
    UnsupportedAsyncRuntime { flavor: String },

    /// The runtime configuration could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;
