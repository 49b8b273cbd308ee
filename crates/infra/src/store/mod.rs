//! Entity store contract.
//!
//! Recipes, inventory items, runs, run reports, custom units and batch number
//! claims are stored as JSON snapshots keyed by `(kind, id)`. Every write goes through a
//! [`UnitOfWork`], which the store applies atomically: either every write in
//! it lands or none does. Aggregate writes carry an [`ExpectedVersion`] so a
//! stale snapshot is rejected instead of overwriting newer state.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use batchworks_core::{AggregateRoot, ExpectedVersion};
use batchworks_inventory::{InventoryItem, InventoryItemId};
use batchworks_manufacturing::{ManufacturingRun, RunAccounting, RunId};
use batchworks_recipes::{Recipe, RecipeId};
use batchworks_units::CustomUnit;

pub mod in_memory;

pub use in_memory::InMemoryEntityStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Recipe,
    InventoryItem,
    Run,
    RunReport,
    CustomUnit,
    BatchNumber,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Recipe => "recipe",
            EntityKind::InventoryItem => "inventory_item",
            EntityKind::Run => "run",
            EntityKind::RunReport => "run_report",
            EntityKind::CustomUnit => "custom_unit",
            EntityKind::BatchNumber => "batch_number",
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of one stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityKey {
    pub fn new(kind: EntityKind, id: impl core::fmt::Display) -> Self {
        Self {
            kind,
            id: id.to_string(),
        }
    }

    pub fn recipe(id: RecipeId) -> Self {
        Self::new(EntityKind::Recipe, id)
    }

    pub fn inventory_item(id: InventoryItemId) -> Self {
        Self::new(EntityKind::InventoryItem, id)
    }

    pub fn run(id: RunId) -> Self {
        Self::new(EntityKind::Run, id)
    }

    /// Reports share their run's id.
    pub fn run_report(id: RunId) -> Self {
        Self::new(EntityKind::RunReport, id)
    }

    pub fn custom_unit(symbol: &str) -> Self {
        Self::new(EntityKind::CustomUnit, symbol)
    }

    pub fn batch_number(number: &str) -> Self {
        Self::new(EntityKind::BatchNumber, number)
    }
}

impl core::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Ownership of a batch number.
///
/// Written with `ExpectedVersion::Absent` in the same unit as the run, so two
/// callers that computed the same number from the same run list cannot both
/// commit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchClaim {
    pub batch_number: String,
    pub run_id: RunId,
}

impl BatchClaim {
    pub fn for_run(run: &ManufacturingRun) -> Self {
        Self {
            batch_number: run.batch_number().to_string(),
            run_id: run.id_typed(),
        }
    }
}

/// A typed record to be written.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityRecord {
    Recipe(Recipe),
    InventoryItem(InventoryItem),
    Run(ManufacturingRun),
    RunReport(RunAccounting),
    CustomUnit(CustomUnit),
    BatchClaim(BatchClaim),
}

impl EntityRecord {
    pub fn key(&self) -> EntityKey {
        match self {
            EntityRecord::Recipe(r) => EntityKey::recipe(r.id_typed()),
            EntityRecord::InventoryItem(i) => EntityKey::inventory_item(i.id_typed()),
            EntityRecord::Run(r) => EntityKey::run(r.id_typed()),
            EntityRecord::RunReport(r) => EntityKey::run_report(r.run_id),
            EntityRecord::CustomUnit(u) => EntityKey::custom_unit(u.symbol()),
            EntityRecord::BatchClaim(c) => EntityKey::batch_number(&c.batch_number),
        }
    }

    /// Version carried by the record itself (aggregates only). Plain entities
    /// get the store's own write counter instead.
    pub fn aggregate_version(&self) -> Option<u64> {
        match self {
            EntityRecord::InventoryItem(i) => Some(i.version()),
            EntityRecord::Run(r) => Some(r.version()),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<JsonValue, StoreError> {
        let value = match self {
            EntityRecord::Recipe(r) => serde_json::to_value(r),
            EntityRecord::InventoryItem(i) => serde_json::to_value(i),
            EntityRecord::Run(r) => serde_json::to_value(r),
            EntityRecord::RunReport(r) => serde_json::to_value(r),
            EntityRecord::CustomUnit(u) => serde_json::to_value(u),
            EntityRecord::BatchClaim(c) => serde_json::to_value(c),
        };
        value.map_err(|e| StoreError::Serialization(format!("{}: {e}", self.key())))
    }
}

impl From<Recipe> for EntityRecord {
    fn from(value: Recipe) -> Self {
        EntityRecord::Recipe(value)
    }
}

impl From<InventoryItem> for EntityRecord {
    fn from(value: InventoryItem) -> Self {
        EntityRecord::InventoryItem(value)
    }
}

impl From<ManufacturingRun> for EntityRecord {
    fn from(value: ManufacturingRun) -> Self {
        EntityRecord::Run(value)
    }
}

impl From<RunAccounting> for EntityRecord {
    fn from(value: RunAccounting) -> Self {
        EntityRecord::RunReport(value)
    }
}

impl From<CustomUnit> for EntityRecord {
    fn from(value: CustomUnit) -> Self {
        EntityRecord::CustomUnit(value)
    }
}

impl From<BatchClaim> for EntityRecord {
    fn from(value: BatchClaim) -> Self {
        EntityRecord::BatchClaim(value)
    }
}

/// A record as it sits in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: EntityKey,
    pub version: u64,
    pub payload: JsonValue,
}

impl StoredRecord {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", self.key)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Put {
        record: EntityRecord,
        expected: ExpectedVersion,
    },
    Delete {
        key: EntityKey,
        expected: ExpectedVersion,
    },
}

impl Write {
    pub fn key(&self) -> EntityKey {
        match self {
            Write::Put { record, .. } => record.key(),
            Write::Delete { key, .. } => key.clone(),
        }
    }

    pub fn expected(&self) -> ExpectedVersion {
        match self {
            Write::Put { expected, .. } | Write::Delete { expected, .. } => *expected,
        }
    }
}

/// Writes that must land together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitOfWork {
    writes: Vec<Write>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(mut self, record: impl Into<EntityRecord>, expected: ExpectedVersion) -> Self {
        self.writes.push(Write::Put {
            record: record.into(),
            expected,
        });
        self
    }

    pub fn delete(mut self, key: EntityKey, expected: ExpectedVersion) -> Self {
        self.writes.push(Write::Delete { key, expected });
        self
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Entity store operation error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Synchronous entity store.
///
/// Implementations provide raw record access plus an atomic `commit`; the
/// typed fetch helpers decode on top of that. Nothing is cached here: every
/// fetch goes to the backend.
pub trait EntityStore: Send + Sync {
    fn load(&self, key: &EntityKey) -> Result<Option<StoredRecord>, StoreError>;

    /// All records of one kind, ordered by id.
    fn load_all(&self, kind: EntityKind) -> Result<Vec<StoredRecord>, StoreError>;

    /// Apply every write of `unit` or none of them.
    fn commit(&self, unit: UnitOfWork) -> Result<(), StoreError>;

    fn fetch_recipe(&self, id: RecipeId) -> Result<Option<Recipe>, StoreError> {
        self.load(&EntityKey::recipe(id))?
            .map(|r| r.decode())
            .transpose()
    }

    fn fetch_inventory_item(&self, id: InventoryItemId) -> Result<Option<InventoryItem>, StoreError> {
        self.load(&EntityKey::inventory_item(id))?
            .map(|r| r.decode())
            .transpose()
    }

    fn fetch_all_inventory_items(&self) -> Result<Vec<InventoryItem>, StoreError> {
        decode_all(self.load_all(EntityKind::InventoryItem)?)
    }

    fn fetch_run(&self, id: RunId) -> Result<Option<ManufacturingRun>, StoreError> {
        self.load(&EntityKey::run(id))?.map(|r| r.decode()).transpose()
    }

    fn fetch_all_runs(&self) -> Result<Vec<ManufacturingRun>, StoreError> {
        decode_all(self.load_all(EntityKind::Run)?)
    }

    fn fetch_run_report(&self, id: RunId) -> Result<Option<RunAccounting>, StoreError> {
        self.load(&EntityKey::run_report(id))?
            .map(|r| r.decode())
            .transpose()
    }

    fn fetch_custom_unit(&self, symbol: &str) -> Result<Option<CustomUnit>, StoreError> {
        self.load(&EntityKey::custom_unit(symbol))?
            .map(|r| r.decode())
            .transpose()
    }

    fn fetch_custom_units(&self) -> Result<Vec<CustomUnit>, StoreError> {
        decode_all(self.load_all(EntityKind::CustomUnit)?)
    }

    fn fetch_batch_claim(&self, number: &str) -> Result<Option<BatchClaim>, StoreError> {
        self.load(&EntityKey::batch_number(number))?
            .map(|r| r.decode())
            .transpose()
    }

    /// Unconditional single-record write.
    fn save(&self, record: EntityRecord) -> Result<(), StoreError> {
        self.commit(UnitOfWork::new().put(record, ExpectedVersion::Any))
    }

    /// Unconditional single-record delete. Deleting a missing key is a no-op.
    fn delete(&self, key: EntityKey) -> Result<(), StoreError> {
        self.commit(UnitOfWork::new().delete(key, ExpectedVersion::Any))
    }
}

fn decode_all<T: DeserializeOwned>(records: Vec<StoredRecord>) -> Result<Vec<T>, StoreError> {
    records.iter().map(StoredRecord::decode).collect()
}

impl<S> EntityStore for Arc<S>
where
    S: EntityStore + ?Sized,
{
    fn load(&self, key: &EntityKey) -> Result<Option<StoredRecord>, StoreError> {
        (**self).load(key)
    }

    fn load_all(&self, kind: EntityKind) -> Result<Vec<StoredRecord>, StoreError> {
        (**self).load_all(kind)
    }

    fn commit(&self, unit: UnitOfWork) -> Result<(), StoreError> {
        (**self).commit(unit)
    }
}
