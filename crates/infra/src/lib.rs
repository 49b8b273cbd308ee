//! Infrastructure layer: entity store, configuration and the production
//! orchestration service that ties the domain crates to them.

pub mod config;
pub mod service;
pub mod store;

pub use config::Settings;
pub use service::{ProductionService, ServiceError};
pub use store::{
    BatchClaim, EntityKey, EntityKind, EntityRecord, EntityStore, InMemoryEntityStore, StoreError,
    StoredRecord, UnitOfWork,
};
