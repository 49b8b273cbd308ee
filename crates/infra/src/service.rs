//! Production orchestration.
//!
//! `ProductionService` is the one place where the pure domain crates meet the
//! entity store and the event bus. Each operation follows the same pipeline:
//!
//! ```text
//! load snapshots -> handle command (pure) -> build unit of work -> commit -> publish
//! ```
//!
//! The aggregate is mutated only in a local copy, so a rejected command or a
//! failed commit leaves the stored state untouched and the call can simply be
//! repeated. A run's completion, the stock it consumes and its accounting
//! report are written in a single unit of work.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, warn};

use batchworks_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ExpectedVersion};
use batchworks_events::{Event, EventBus, EventEnvelope};
use batchworks_inventory::{
    AdjustStock, ChangeUnitPrice, CreateItem, InventoryCommand, InventoryEvent, InventoryItem,
    InventoryItemId,
};
use batchworks_manufacturing::{
    CancelRun, CompleteStep, ManufacturingRun, ProductionSummary, RunAccounting, RunCommand,
    RunEvent, RunId, RunStatus, deduct_for_completed_run, next_batch_number,
};
use batchworks_recipes::{Recipe, RecipeCosting, RecipeId};
use batchworks_units::{CustomUnit, UnitSymbol};

use crate::config::Settings;
use crate::store::{BatchClaim, EntityKey, EntityStore, StoreError, UnitOfWork};

pub const RUN_AGGREGATE_TYPE: &str = "manufacturing.run";
pub const ITEM_AGGREGATE_TYPE: &str = "inventory.item";

#[derive(Debug, Error)]
pub enum ServiceError {
    /// A referenced recipe, item, run or unit does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The run (or item) is not in a state that accepts the command.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Stale snapshot or duplicate identifier; reload and retry.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// Reading or writing the entity store failed. Nothing was written.
    #[error("storage failure: {0}")]
    Store(StoreError),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound { .. })
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::NotFound { kind, id } => ServiceError::NotFound { kind, id },
            DomainError::InvalidTransition(msg) => ServiceError::InvalidTransition(msg),
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                ServiceError::Validation(msg)
            }
            DomainError::InvariantViolation(msg) => ServiceError::InvariantViolation(msg),
            DomainError::Conflict(msg) => ServiceError::Concurrency(msg),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => ServiceError::Concurrency(msg),
            other => ServiceError::Store(other),
        }
    }
}

/// Writes and notifications produced by a run reaching `completed`.
struct Settlement {
    unit: UnitOfWork,
    envelopes: Vec<EventEnvelope<JsonValue>>,
    report: RunAccounting,
}

#[derive(Debug)]
pub struct ProductionService<S, B> {
    store: S,
    bus: B,
    settings: Settings,
}

impl<S, B> ProductionService<S, B> {
    pub fn new(store: S, bus: B, settings: Settings) -> Self {
        Self {
            store,
            bus,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> ProductionService<S, B>
where
    S: EntityStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    // ---- units ----

    pub fn register_custom_unit(&self, unit: CustomUnit) -> Result<(), ServiceError> {
        if self.store.fetch_custom_unit(unit.symbol())?.is_some() {
            return Err(DomainError::conflict(format!(
                "custom unit '{}' already exists",
                unit.symbol()
            ))
            .into());
        }
        let symbol = unit.symbol().to_string();
        self.store
            .commit(UnitOfWork::new().put(unit, ExpectedVersion::Absent))?;
        info!(symbol = %symbol, "custom unit registered");
        Ok(())
    }

    // ---- inventory ----

    pub fn create_item(&self, cmd: CreateItem) -> Result<InventoryItem, ServiceError> {
        self.ensure_unit_known(&cmd.unit)?;

        let mut item = InventoryItem::empty(cmd.item_id);
        let events = item.execute(&InventoryCommand::CreateItem(cmd))?;
        let envelopes = wrap_events(item.id_typed().as_aggregate_id(), ITEM_AGGREGATE_TYPE, 0, &events)?;

        self.store
            .commit(UnitOfWork::new().put(item.clone(), ExpectedVersion::Absent))?;
        self.publish(envelopes);

        info!(item_id = %item.id_typed(), name = item.name(), unit = %item.unit(), "inventory item created");
        Ok(item)
    }

    /// Manual restock or stock-take correction (`delta` may be negative but
    /// may not take stock below zero).
    pub fn restock(
        &self,
        item_id: InventoryItemId,
        delta: f64,
        now: DateTime<Utc>,
    ) -> Result<InventoryItem, ServiceError> {
        self.execute_item(
            item_id,
            InventoryCommand::AdjustStock(AdjustStock {
                item_id,
                delta,
                reason: None,
                occurred_at: now,
            }),
        )
    }

    pub fn change_unit_price(
        &self,
        item_id: InventoryItemId,
        unit_price: f64,
        now: DateTime<Utc>,
    ) -> Result<InventoryItem, ServiceError> {
        self.execute_item(
            item_id,
            InventoryCommand::ChangeUnitPrice(ChangeUnitPrice {
                item_id,
                unit_price,
                occurred_at: now,
            }),
        )
    }

    pub fn low_stock_items(&self) -> Result<Vec<InventoryItem>, ServiceError> {
        Ok(self
            .store
            .fetch_all_inventory_items()?
            .into_iter()
            .filter(InventoryItem::is_low_stock)
            .collect())
    }

    // ---- recipes ----

    /// Store a recipe after checking that every ingredient resolves to an
    /// inventory item and every custom unit is registered.
    pub fn save_recipe(&self, recipe: Recipe) -> Result<(), ServiceError> {
        self.item_catalog(&recipe)?;
        for ingredient in recipe.ingredients() {
            self.ensure_unit_known(&ingredient.unit)?;
        }

        let recipe_id = recipe.id_typed();
        self.store.save(recipe.into())?;
        debug!(recipe_id = %recipe_id, "recipe saved");
        Ok(())
    }

    pub fn recipe_costing(&self, recipe_id: RecipeId) -> Result<RecipeCosting, ServiceError> {
        let recipe = self.load_recipe(recipe_id)?;
        let catalog = self.item_catalog(&recipe)?;
        let costing = RecipeCosting::compute(&recipe, &catalog)?;
        log_unit_warnings(&costing);
        Ok(costing)
    }

    // ---- runs ----

    /// Start a run of `quantity` batches.
    ///
    /// Insufficient stock is reported in the log but does not block the run;
    /// confirming a short run is the caller's decision.
    pub fn create_run(
        &self,
        recipe_id: RecipeId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<ManufacturingRun, ServiceError> {
        let recipe = self.load_recipe(recipe_id)?;
        let catalog = self.item_catalog(&recipe)?;
        let costing = RecipeCosting::compute(&recipe, &catalog)?;

        let existing = self.store.fetch_all_runs()?;
        let batch_number = next_batch_number(&existing, self.settings.local_date(now));

        let (run, events) =
            ManufacturingRun::start(RunId::generate(), batch_number, &recipe, quantity, now)?;

        let short = costing.insufficient_for(quantity);
        if !short.is_empty() {
            warn!(
                batch_number = run.batch_number(),
                insufficient = short.len(),
                "starting run with insufficient stock"
            );
        }

        let mut envelopes = wrap_events(run.id_typed().as_aggregate_id(), RUN_AGGREGATE_TYPE, 0, &events)?;
        // The claim fails the commit if another caller took the same number
        // from the same run list.
        let mut unit = UnitOfWork::new()
            .put(run.clone(), ExpectedVersion::Absent)
            .put(BatchClaim::for_run(&run), ExpectedVersion::Absent);

        if events.iter().any(RunEvent::is_completion) {
            let settlement = self.settle_completed_run(&run, &recipe, unit)?;
            unit = settlement.unit;
            envelopes.extend(settlement.envelopes);
        }

        self.store.commit(unit)?;
        self.publish(envelopes);

        info!(
            run_id = %run.id_typed(),
            batch_number = run.batch_number(),
            recipe_id = %recipe_id,
            quantity,
            status = %run.status(),
            "run created"
        );
        Ok(run)
    }

    /// Complete the run's current step. The last step completes the run and
    /// deducts its ingredients from stock in the same commit.
    pub fn complete_current_step(
        &self,
        run_id: RunId,
        note: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<ManufacturingRun, ServiceError> {
        let mut run = self.load_run(run_id)?;
        let loaded_version = run.version();

        let events = run.execute(&RunCommand::CompleteStep(CompleteStep {
            run_id,
            note: note.into(),
            occurred_at: now,
        }))?;

        let mut envelopes = wrap_events(
            run_id.as_aggregate_id(),
            RUN_AGGREGATE_TYPE,
            loaded_version,
            &events,
        )?;
        let mut unit = UnitOfWork::new().put(run.clone(), ExpectedVersion::Exact(loaded_version));

        let completed = events.iter().any(RunEvent::is_completion);
        if completed {
            let recipe = self.load_recipe(run.recipe_id())?;
            let settlement = self.settle_completed_run(&run, &recipe, unit)?;
            unit = settlement.unit;
            envelopes.extend(settlement.envelopes);
            debug!(
                run_id = %run_id,
                total_cost = settlement.report.total_cost,
                total_units = settlement.report.total_units,
                "run settled"
            );
        }

        self.store.commit(unit)?;
        self.publish(envelopes);

        if completed {
            info!(run_id = %run_id, batch_number = run.batch_number(), "run completed");
        } else {
            info!(
                run_id = %run_id,
                batch_number = run.batch_number(),
                step = run.current_step_index(),
                total_steps = run.total_steps(),
                "step completed"
            );
        }
        Ok(run)
    }

    /// Cancel an in-progress run. Completed steps are kept; no stock moves.
    pub fn cancel_run(&self, run_id: RunId, now: DateTime<Utc>) -> Result<ManufacturingRun, ServiceError> {
        let mut run = self.load_run(run_id)?;
        let loaded_version = run.version();

        let events = run.execute(&RunCommand::CancelRun(CancelRun {
            run_id,
            occurred_at: now,
        }))?;
        let envelopes = wrap_events(
            run_id.as_aggregate_id(),
            RUN_AGGREGATE_TYPE,
            loaded_version,
            &events,
        )?;

        self.store
            .commit(UnitOfWork::new().put(run.clone(), ExpectedVersion::Exact(loaded_version)))?;
        self.publish(envelopes);

        info!(
            run_id = %run_id,
            batch_number = run.batch_number(),
            completed_steps = run.current_step_index(),
            "run cancelled"
        );
        Ok(run)
    }

    /// Accounting for one run: the snapshot stored at completion, or a live
    /// computation for runs that have not completed.
    pub fn run_accounting(&self, run_id: RunId) -> Result<RunAccounting, ServiceError> {
        let run = self.load_run(run_id)?;

        if run.status() == RunStatus::Completed {
            if let Some(report) = self.store.fetch_run_report(run_id)? {
                return Ok(report);
            }
            warn!(run_id = %run_id, "completed run has no stored report; computing live figures");
        }

        let recipe = self.load_recipe(run.recipe_id())?;
        let catalog = self.item_catalog(&recipe)?;
        let costing = RecipeCosting::compute(&recipe, &catalog)?;
        Ok(RunAccounting::build(&run, &recipe, &costing, self.settings.currency.clone())?)
    }

    pub fn runs(&self) -> Result<Vec<ManufacturingRun>, ServiceError> {
        Ok(self.store.fetch_all_runs()?)
    }

    pub fn production_summary(&self) -> Result<ProductionSummary, ServiceError> {
        let mut summary = ProductionSummary::default();
        for run in self.store.fetch_all_runs()? {
            let report = match run.status() {
                RunStatus::Completed => self.store.fetch_run_report(run.id_typed())?,
                _ => None,
            };
            summary.record(&run, report.as_ref());
        }
        Ok(summary)
    }

    /// Remove a run together with its report and batch number claim. Stock
    /// already deducted stays deducted, and the number may be handed out again.
    pub fn delete_run(&self, run_id: RunId) -> Result<(), ServiceError> {
        let run = self.load_run(run_id)?;

        self.store.commit(
            UnitOfWork::new()
                .delete(EntityKey::run(run_id), ExpectedVersion::Exact(run.version()))
                .delete(EntityKey::run_report(run_id), ExpectedVersion::Any)
                .delete(EntityKey::batch_number(run.batch_number()), ExpectedVersion::Any),
        )?;

        info!(run_id = %run_id, batch_number = run.batch_number(), "run deleted");
        Ok(())
    }

    // ---- internals ----

    fn load_recipe(&self, id: RecipeId) -> Result<Recipe, ServiceError> {
        self.store
            .fetch_recipe(id)?
            .ok_or_else(|| DomainError::not_found("recipe", id).into())
    }

    fn load_item(&self, id: InventoryItemId) -> Result<InventoryItem, ServiceError> {
        self.store
            .fetch_inventory_item(id)?
            .ok_or_else(|| DomainError::not_found("inventory item", id).into())
    }

    fn load_run(&self, id: RunId) -> Result<ManufacturingRun, ServiceError> {
        self.store
            .fetch_run(id)?
            .ok_or_else(|| DomainError::not_found("manufacturing run", id).into())
    }

    /// Every inventory item the recipe references, fetched fresh.
    fn item_catalog(
        &self,
        recipe: &Recipe,
    ) -> Result<HashMap<InventoryItemId, InventoryItem>, ServiceError> {
        let mut catalog = HashMap::new();
        for ingredient in recipe.ingredients() {
            let id = ingredient.inventory_item_id;
            if !catalog.contains_key(&id) {
                catalog.insert(id, self.load_item(id)?);
            }
        }
        Ok(catalog)
    }

    fn ensure_unit_known(&self, unit: &UnitSymbol) -> Result<(), ServiceError> {
        if let UnitSymbol::Custom(symbol) = unit {
            if self.store.fetch_custom_unit(symbol)?.is_none() {
                return Err(DomainError::not_found("unit", symbol).into());
            }
        }
        Ok(())
    }

    fn execute_item(
        &self,
        item_id: InventoryItemId,
        command: InventoryCommand,
    ) -> Result<InventoryItem, ServiceError> {
        let mut item = self.load_item(item_id)?;
        let loaded_version = item.version();

        let events = item.execute(&command)?;
        if events.is_empty() {
            return Ok(item);
        }
        let envelopes = wrap_events(
            item_id.as_aggregate_id(),
            ITEM_AGGREGATE_TYPE,
            loaded_version,
            &events,
        )?;

        self.store
            .commit(UnitOfWork::new().put(item.clone(), ExpectedVersion::Exact(loaded_version)))?;
        self.publish(envelopes);

        info!(
            item_id = %item_id,
            stock = item.stock(),
            unit_price = item.unit_price(),
            low_stock = item.is_low_stock(),
            "inventory item updated"
        );
        Ok(item)
    }

    /// Stock deductions and the accounting report for a run that just
    /// completed, appended to `unit`.
    fn settle_completed_run(
        &self,
        run: &ManufacturingRun,
        recipe: &Recipe,
        unit: UnitOfWork,
    ) -> Result<Settlement, ServiceError> {
        let mut items = self.item_catalog(recipe)?;
        let loaded_versions: HashMap<InventoryItemId, u64> =
            items.iter().map(|(id, item)| (*id, item.version())).collect();

        // Priced before deduction: the report shows the stock the run drew on.
        let costing = RecipeCosting::compute(recipe, &items)?;
        log_unit_warnings(&costing);
        let report = RunAccounting::build(run, recipe, &costing, self.settings.currency.clone())?;

        let events = deduct_for_completed_run(run, recipe, &mut items)?;

        let mut unit = unit;
        let mut envelopes_out = Vec::with_capacity(events.len());
        let mut next_version = loaded_versions.clone();
        let mut touched: Vec<InventoryItemId> = Vec::new();
        let mut seen = HashSet::new();

        for event in &events {
            let item_id = inventory_event_item_id(event);
            let version = next_version.entry(item_id).or_insert(0);
            envelopes_out.extend(wrap_events(
                item_id.as_aggregate_id(),
                ITEM_AGGREGATE_TYPE,
                *version,
                std::slice::from_ref(event),
            )?);
            *version += 1;
            if seen.insert(item_id) {
                touched.push(item_id);
            }
        }

        for item_id in touched {
            let item = items
                .remove(&item_id)
                .ok_or_else(|| DomainError::not_found("inventory item", item_id))?;
            let expected = loaded_versions
                .get(&item_id)
                .copied()
                .map(ExpectedVersion::Exact)
                .unwrap_or(ExpectedVersion::Absent);
            info!(
                run_id = %run.id_typed(),
                item_id = %item_id,
                stock = item.stock(),
                "stock deducted"
            );
            unit = unit.put(item, expected);
        }

        unit = unit.put(report.clone(), ExpectedVersion::Any);

        Ok(Settlement {
            unit,
            envelopes: envelopes_out,
            report,
        })
    }

    /// Publish after a successful commit. The state change is already
    /// durable, so a failed publish is logged and not returned.
    fn publish(&self, envelopes: Vec<EventEnvelope<JsonValue>>) {
        for envelope in envelopes {
            let event_type = envelope.event_type().to_string();
            if let Err(err) = self.bus.publish(envelope) {
                warn!(event_type = %event_type, error = ?err, "event publication failed after commit");
            }
        }
    }
}

/// Wrap events as JSON envelopes; `version_before` is the aggregate version
/// the first event applies to.
fn wrap_events<E>(
    aggregate_id: AggregateId,
    aggregate_type: &str,
    version_before: u64,
    events: &[E],
) -> Result<Vec<EventEnvelope<JsonValue>>, ServiceError>
where
    E: Event + Serialize,
{
    events
        .iter()
        .enumerate()
        .map(|(i, event)| {
            EventEnvelope::from_typed(aggregate_id, aggregate_type, version_before + i as u64 + 1, event)
                .map_err(|e| StoreError::Serialization(e.to_string()).into())
        })
        .collect()
}

fn inventory_event_item_id(event: &InventoryEvent) -> InventoryItemId {
    match event {
        InventoryEvent::ItemCreated(e) => e.item_id,
        InventoryEvent::StockAdjusted(e) => e.item_id,
        InventoryEvent::UnitPriceChanged(e) => e.item_id,
        InventoryEvent::StockConsumed(e) => e.item_id,
    }
}

fn log_unit_warnings(costing: &RecipeCosting) {
    for mismatch in costing.warnings() {
        warn!(
            recipe_id = %costing.recipe_id,
            from = %mismatch.from,
            to = %mismatch.to,
            "unit mismatch; quantity used unconverted"
        );
    }
}
