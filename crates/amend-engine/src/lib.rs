//! The generic amendment engine.
//!
//! Given an [`EntityStore`](amend_store::EntityStore), a validated
//! [`SchemaRegistry`](amend_spec::SchemaRegistry) and an
//! [`AmendmentSpec`](amend_spec::AmendmentSpec), the engine provides two
//! primitives:
//!
//! - [`AmendmentEngine::copy`] -- creates an independent copy of an entity
//!   and its included subtree, returning the correspondence
//!   [`LedgerEntry`](amend_ledger::LedgerEntry) that baselines it
//! - [`AmendmentEngine::merge`] -- reconciles the copy back into the
//!   original with a three-way merge, applying everything or nothing
//!
//! Both run inside a single store transaction. The engine keeps no state of
//! its own beyond the ledger entry it hands back.
//!
//! # Conflicts
//!
//! The engine never resolves a conflict. A merge that finds any divergence
//! fails with a [`ConflictReport`] listing every conflicting field,
//! reference, or child together with its baseline, original and incoming
//! values.

pub mod config;
pub mod conflict;
pub mod copier;
pub mod engine;
pub mod error;
pub mod merge;
mod traversal;
mod txn;

#[cfg(test)]
mod fixtures;

pub use config::EngineConfig;
pub use conflict::{Conflict, ConflictKind, ConflictReport, ConflictValue};
pub use copier::{CopyOptions, CopyOutcome};
pub use engine::AmendmentEngine;
pub use error::{CopyError, CopyFailure, EngineError, EngineResult, MergeError, Side};
pub use merge::{MergeOptions, MergeOutcome};
