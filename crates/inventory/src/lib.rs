//! Inventory domain module.
//!
//! Stock items with a base unit, a unit price and a low-stock threshold,
//! implemented as deterministic command/event logic (no IO, no storage).

pub mod item;

pub use item::{
    AdjustStock, ChangeUnitPrice, ConsumeStock, CreateItem, InventoryCommand, InventoryEvent,
    InventoryItem, InventoryItemId, ItemCreated, StockAdjusted, StockConsumed, UnitPriceChanged,
};
