//! `batchworks-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the inventory,
//! recipe and manufacturing crates (no storage, no clock, no IO).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::AggregateId;
pub use value_object::ValueObject;
