//! Foundation types for the amendment engine.
//!
//! This crate provides the identity and value types shared by every other
//! `amend-*` crate. It knows nothing about storage, relation specs, or merge
//! rules.
//!
//! # Key Types
//!
//! - [`EntityId`] -- UUID v7 identity of a stored entity
//! - [`EntityType`] -- Name of a registered entity type
//! - [`LedgerId`] / [`AmendmentId`] -- Identities of ledgers and amendment records
//! - [`Value`] -- A typed scalar field value
//! - [`FieldKind`] -- The declared kind of a scalar field
//! - [`CanonicalValue`] -- Round-trippable baseline form of a [`Value`]

pub mod canonical;
pub mod error;
pub mod identity;
pub mod value;

pub use canonical::CanonicalValue;
pub use error::TypeError;
pub use identity::{AmendmentId, EntityId, EntityType, LedgerId};
pub use value::{FieldKind, Value};
