//! Entity persistence boundary for the amendment engine.
//!
//! The engine never owns data. It reads and writes [`EntityRecord`]s through
//! the [`EntityStore`] trait, which a host application implements over its
//! own database.
//!
//! # Storage Backends
//!
//! - [`InMemoryEntityStore`] -- `HashMap`-based store for tests, the CLI, and embedding
//!
//! # Design Rules
//!
//! 1. Every record has a unique [`EntityId`](amend_types::EntityId); inserting a duplicate id fails.
//! 2. Children are found by back-reference, the way a relational store finds
//!    rows by foreign key.
//! 3. At most one transaction is open at a time per store handle. Rollback
//!    restores every record touched since `begin`.
//! 4. All backend errors are propagated, never silently ignored.

pub mod error;
pub mod memory;
pub mod record;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryEntityStore, StoreSnapshot};
pub use record::EntityRecord;
pub use traits::EntityStore;
