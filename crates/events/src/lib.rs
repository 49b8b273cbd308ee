//! Domain events and their distribution.
//!
//! Inventory and manufacturing aggregates emit typed events; once the entity
//! store has committed the resulting state, the orchestration layer wraps them
//! in [`EventEnvelope`]s and publishes them on an [`EventBus`] for the
//! presentation and export collaborators.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
