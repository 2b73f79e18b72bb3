//! Entity layer modules.
//!
//! This module groups the canonical record type and its sub-records.

pub mod entity;

pub use entity::{Entity, EntityId, EntityMetadata, EntityStatus, EntityType, Identifiers, Profile};
