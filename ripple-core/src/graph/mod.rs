//! Dependency Graph
//!
//! This module holds the two halves of change propagation: who depends on
//! what, and when the dependents run.
//!
//! # Overview
//!
//! The dependency store is a two-level map:
//!
//! - Target identity -> field key -> ordered set of subscribed effects
//!
//! An entry is a (target, field) pair. Effects join entries while they run
//! and leave all of them at the start of their next run, so the store always
//! reflects the most recent run of every effect.
//!
//! The batch queue is an optional dispatch policy on top: instead of re-running
//! an effect once per write, triggered effects are collected and flushed once.
//!
//! # Design Decisions
//!
//! 1. The store never owns effects. It holds weak references, so an effect
//!    nobody holds is gone even if it never got to unsubscribe.
//!
//! 2. Subscribers of an entry are kept in subscription order, which is also
//!    the order they are triggered in.
//!
//! 3. Empty entries are pruned when their last subscriber leaves.

mod scheduler;
mod store;

pub use scheduler::{BatchQueue, Deferral, ManualDeferral, TokioDeferral, MAX_FLUSH_PASSES};
pub(crate) use store::DependencyStore;
