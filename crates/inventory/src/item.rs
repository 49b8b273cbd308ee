use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use batchworks_core::{Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult};
use batchworks_events::Event;
use batchworks_units::UnitSymbol;

batchworks_core::typed_id!(
    /// Inventory item identifier.
    InventoryItemId
);

/// Aggregate root: InventoryItem.
///
/// `stock` and `unit_price` are both expressed per one `unit`, the item's base
/// unit. Stock only goes below zero through [`ConsumeStock`], which the
/// manufacturing ledger issues for a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    id: InventoryItemId,
    name: String,
    category: Option<String>,
    unit: UnitSymbol,
    unit_price: f64,
    stock: f64,
    min_stock: f64,
    version: u64,
    created: bool,
}

impl InventoryItem {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: InventoryItemId) -> Self {
        Self {
            id,
            name: String::new(),
            category: None,
            unit: UnitSymbol::default(),
            unit_price: 0.0,
            stock: 0.0,
            min_stock: 0.0,
            version: 0,
            created: false,
        }
    }

    /// Run `CreateItem` against an empty instance and return the created item.
    pub fn create(cmd: CreateItem) -> DomainResult<Self> {
        let mut item = Self::empty(cmd.item_id);
        item.execute(&InventoryCommand::CreateItem(cmd))?;
        Ok(item)
    }

    pub fn id_typed(&self) -> InventoryItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn unit(&self) -> &UnitSymbol {
        &self.unit
    }

    pub fn unit_price(&self) -> f64 {
        self.unit_price
    }

    pub fn stock(&self) -> f64 {
        self.stock
    }

    pub fn min_stock(&self) -> f64 {
        self.min_stock
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Below the alert threshold. An item without a threshold is never low.
    pub fn is_low_stock(&self) -> bool {
        self.min_stock > 0.0 && self.stock < self.min_stock
    }

    /// Fill level relative to the threshold, clamped to `0.0..=1.0`.
    pub fn stock_level(&self) -> f64 {
        if self.min_stock > 0.0 {
            (self.stock / self.min_stock).clamp(0.0, 1.0)
        } else {
            1.0
        }
    }

    /// Value of the stock on hand (negative stock counts as zero).
    pub fn stock_value(&self) -> f64 {
        self.stock.max(0.0) * self.unit_price
    }
}

impl AggregateRoot for InventoryItem {
    type Id = InventoryItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateItem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateItem {
    pub item_id: InventoryItemId,
    pub name: String,
    pub category: Option<String>,
    pub unit: UnitSymbol,
    pub unit_price: f64,
    pub initial_stock: f64,
    pub min_stock: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock (manual restock or stock-take correction).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub item_id: InventoryItemId,
    pub delta: f64,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeUnitPrice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeUnitPrice {
    pub item_id: InventoryItemId,
    pub unit_price: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConsumeStock (deduction for a completed manufacturing run).
///
/// `quantity` is already expressed in the item's unit and scaled by the
/// number of batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumeStock {
    pub item_id: InventoryItemId,
    pub quantity: f64,
    pub run_id: AggregateId,
    pub batch_number: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InventoryCommand {
    CreateItem(CreateItem),
    AdjustStock(AdjustStock),
    ChangeUnitPrice(ChangeUnitPrice),
    ConsumeStock(ConsumeStock),
}

/// Event: ItemCreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCreated {
    pub item_id: InventoryItemId,
    pub name: String,
    pub category: Option<String>,
    pub unit: UnitSymbol,
    pub unit_price: f64,
    pub initial_stock: f64,
    pub min_stock: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAdjusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub item_id: InventoryItemId,
    pub delta: f64,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: UnitPriceChanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitPriceChanged {
    pub item_id: InventoryItemId,
    pub unit_price: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockConsumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockConsumed {
    pub item_id: InventoryItemId,
    pub quantity: f64,
    pub run_id: AggregateId,
    pub batch_number: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InventoryEvent {
    ItemCreated(ItemCreated),
    StockAdjusted(StockAdjusted),
    UnitPriceChanged(UnitPriceChanged),
    StockConsumed(StockConsumed),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::ItemCreated(_) => "inventory.item.created",
            InventoryEvent::StockAdjusted(_) => "inventory.item.stock_adjusted",
            InventoryEvent::UnitPriceChanged(_) => "inventory.item.unit_price_changed",
            InventoryEvent::StockConsumed(_) => "inventory.item.stock_consumed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::ItemCreated(e) => e.occurred_at,
            InventoryEvent::StockAdjusted(e) => e.occurred_at,
            InventoryEvent::UnitPriceChanged(e) => e.occurred_at,
            InventoryEvent::StockConsumed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryItem {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::ItemCreated(e) => {
                self.id = e.item_id;
                self.name = e.name.clone();
                self.category = e.category.clone();
                self.unit = e.unit.clone();
                self.unit_price = e.unit_price;
                self.stock = e.initial_stock;
                self.min_stock = e.min_stock;
                self.created = true;
            }
            InventoryEvent::StockAdjusted(e) => {
                self.stock += e.delta;
            }
            InventoryEvent::UnitPriceChanged(e) => {
                self.unit_price = e.unit_price;
            }
            InventoryEvent::StockConsumed(e) => {
                self.stock -= e.quantity;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::CreateItem(cmd) => self.handle_create(cmd),
            InventoryCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
            InventoryCommand::ChangeUnitPrice(cmd) => self.handle_change_price(cmd),
            InventoryCommand::ConsumeStock(cmd) => self.handle_consume(cmd),
        }
    }
}

fn ensure_non_negative(value: f64, field: &str) -> Result<(), DomainError> {
    if !value.is_finite() || value < 0.0 {
        return Err(DomainError::validation(format!(
            "{field} must be a finite, non-negative number"
        )));
    }
    Ok(())
}

impl InventoryItem {
    fn ensure_existing(&self, item_id: InventoryItemId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("inventory item", item_id));
        }
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateItem) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("item already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        ensure_non_negative(cmd.unit_price, "unit_price")?;
        ensure_non_negative(cmd.initial_stock, "initial_stock")?;
        ensure_non_negative(cmd.min_stock, "min_stock")?;

        Ok(vec![InventoryEvent::ItemCreated(ItemCreated {
            item_id: cmd.item_id,
            name: cmd.name.trim().to_string(),
            category: cmd
                .category
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            unit: cmd.unit.clone(),
            unit_price: cmd.unit_price,
            initial_stock: cmd.initial_stock,
            min_stock: cmd.min_stock,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_existing(cmd.item_id)?;

        if !cmd.delta.is_finite() || cmd.delta == 0.0 {
            return Err(DomainError::validation("delta must be a finite, non-zero number"));
        }

        // Manual corrections may not push stock below zero; only run
        // deductions are allowed to. Restocking an item already in deficit
        // is fine even when it does not cover the whole deficit.
        if cmd.delta < 0.0 && self.stock + cmd.delta < 0.0 {
            return Err(DomainError::invariant("stock cannot go negative"));
        }

        Ok(vec![InventoryEvent::StockAdjusted(StockAdjusted {
            item_id: cmd.item_id,
            delta: cmd.delta,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_price(
        &self,
        cmd: &ChangeUnitPrice,
    ) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_existing(cmd.item_id)?;
        ensure_non_negative(cmd.unit_price, "unit_price")?;

        if cmd.unit_price == self.unit_price {
            return Ok(vec![]);
        }

        Ok(vec![InventoryEvent::UnitPriceChanged(UnitPriceChanged {
            item_id: cmd.item_id,
            unit_price: cmd.unit_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_consume(&self, cmd: &ConsumeStock) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_existing(cmd.item_id)?;
        ensure_non_negative(cmd.quantity, "quantity")?;

        // No sufficiency check: the run is already completed and the
        // shortage warning was the caller's to show before starting it.
        Ok(vec![InventoryEvent::StockConsumed(StockConsumed {
            item_id: cmd.item_id,
            quantity: cmd.quantity,
            run_id: cmd.run_id,
            batch_number: cmd.batch_number.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchworks_units::BuiltinUnit;

    fn test_item_id() -> InventoryItemId {
        InventoryItemId::generate()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn create_cmd(item_id: InventoryItemId, stock: f64, min_stock: f64) -> CreateItem {
        CreateItem {
            item_id,
            name: "Flour".to_string(),
            category: Some("Dry goods".to_string()),
            unit: BuiltinUnit::Kilogram.into(),
            unit_price: 1.2,
            initial_stock: stock,
            min_stock,
            occurred_at: test_time(),
        }
    }

    #[test]
    fn create_item_emits_item_created_event() {
        let item_id = test_item_id();
        let item = InventoryItem::empty(item_id);

        let events = item
            .handle(&InventoryCommand::CreateItem(create_cmd(item_id, 10.0, 2.0)))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            InventoryEvent::ItemCreated(e) => {
                assert_eq!(e.item_id, item_id);
                assert_eq!(e.name, "Flour");
                assert_eq!(e.unit, UnitSymbol::Builtin(BuiltinUnit::Kilogram));
                assert_eq!(e.initial_stock, 10.0);
            }
            _ => panic!("Expected ItemCreated event"),
        }
    }

    #[test]
    fn create_rejects_blank_name_and_negative_values() {
        let item_id = test_item_id();
        let item = InventoryItem::empty(item_id);

        let mut cmd = create_cmd(item_id, 1.0, 0.0);
        cmd.name = "  ".to_string();
        assert!(matches!(
            item.handle(&InventoryCommand::CreateItem(cmd)).unwrap_err(),
            DomainError::Validation(_)
        ));

        let mut cmd = create_cmd(item_id, 1.0, 0.0);
        cmd.unit_price = -0.5;
        assert!(matches!(
            item.handle(&InventoryCommand::CreateItem(cmd)).unwrap_err(),
            DomainError::Validation(msg) if msg.contains("unit_price")
        ));

        let mut cmd = create_cmd(item_id, 1.0, 0.0);
        cmd.min_stock = f64::NAN;
        assert!(item.handle(&InventoryCommand::CreateItem(cmd)).is_err());
    }

    #[test]
    fn cannot_create_twice() {
        let item_id = test_item_id();
        let item = InventoryItem::create(create_cmd(item_id, 1.0, 0.0)).unwrap();
        let err = item
            .handle(&InventoryCommand::CreateItem(create_cmd(item_id, 1.0, 0.0)))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn adjust_on_missing_item_is_not_found() {
        let item_id = test_item_id();
        let item = InventoryItem::empty(item_id);
        let err = item
            .handle(&InventoryCommand::AdjustStock(AdjustStock {
                item_id,
                delta: 1.0,
                reason: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn manual_adjustment_cannot_go_negative() {
        let item_id = test_item_id();
        let item = InventoryItem::create(create_cmd(item_id, 3.0, 0.0)).unwrap();

        let err = item
            .handle(&InventoryCommand::AdjustStock(AdjustStock {
                item_id,
                delta: -3.5,
                reason: Some("spoiled".to_string()),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("stock cannot go negative") => {}
            _ => panic!("Expected InvariantViolation for negative stock"),
        }
    }

    #[test]
    fn consumption_may_drive_stock_negative() {
        let item_id = test_item_id();
        let mut item = InventoryItem::create(create_cmd(item_id, 2.0, 0.0)).unwrap();

        item.execute(&InventoryCommand::ConsumeStock(ConsumeStock {
            item_id,
            quantity: 5.0,
            run_id: AggregateId::new(),
            batch_number: "250201-001".to_string(),
            occurred_at: test_time(),
        }))
        .unwrap();

        assert_eq!(item.stock(), -3.0);
        assert_eq!(item.version(), 2);
    }

    #[test]
    fn partial_restock_of_deficit_is_accepted() {
        let item_id = test_item_id();
        let mut item = InventoryItem::create(create_cmd(item_id, 1.0, 0.0)).unwrap();

        item.execute(&InventoryCommand::ConsumeStock(ConsumeStock {
            item_id,
            quantity: 3.0,
            run_id: AggregateId::new(),
            batch_number: "250201-001".to_string(),
            occurred_at: test_time(),
        }))
        .unwrap();
        assert_eq!(item.stock(), -2.0);

        item.execute(&InventoryCommand::AdjustStock(AdjustStock {
            item_id,
            delta: 1.0,
            reason: Some("partial delivery".to_string()),
            occurred_at: test_time(),
        }))
        .unwrap();
        assert_eq!(item.stock(), -1.0);

        // Taking more away while in deficit is still rejected.
        let err = item
            .handle(&InventoryCommand::AdjustStock(AdjustStock {
                item_id,
                delta: -0.5,
                reason: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn consumption_rejects_negative_quantity() {
        let item_id = test_item_id();
        let item = InventoryItem::create(create_cmd(item_id, 2.0, 0.0)).unwrap();
        let err = item
            .handle(&InventoryCommand::ConsumeStock(ConsumeStock {
                item_id,
                quantity: -1.0,
                run_id: AggregateId::new(),
                batch_number: "250201-001".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn unchanged_price_emits_nothing() {
        let item_id = test_item_id();
        let item = InventoryItem::create(create_cmd(item_id, 2.0, 0.0)).unwrap();
        let events = item
            .handle(&InventoryCommand::ChangeUnitPrice(ChangeUnitPrice {
                item_id,
                unit_price: 1.2,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn low_stock_and_level() {
        let item = InventoryItem::create(create_cmd(test_item_id(), 1.0, 4.0)).unwrap();
        assert!(item.is_low_stock());
        assert_eq!(item.stock_level(), 0.25);

        let full = InventoryItem::create(create_cmd(test_item_id(), 9.0, 4.0)).unwrap();
        assert!(!full.is_low_stock());
        assert_eq!(full.stock_level(), 1.0);

        let untracked = InventoryItem::create(create_cmd(test_item_id(), 0.0, 0.0)).unwrap();
        assert!(!untracked.is_low_stock());
        assert_eq!(untracked.stock_level(), 1.0);
    }

    #[test]
    fn negative_stock_clamps_level_and_value() {
        let item_id = test_item_id();
        let mut item = InventoryItem::create(create_cmd(item_id, 1.0, 2.0)).unwrap();
        item.execute(&InventoryCommand::ConsumeStock(ConsumeStock {
            item_id,
            quantity: 4.0,
            run_id: AggregateId::new(),
            batch_number: "250201-002".to_string(),
            occurred_at: test_time(),
        }))
        .unwrap();

        assert_eq!(item.stock_level(), 0.0);
        assert_eq!(item.stock_value(), 0.0);
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let item = InventoryItem::create(create_cmd(test_item_id(), 7.5, 1.0)).unwrap();
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["unit"], serde_json::json!("kg"));
        let back: InventoryItem = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: handle never mutates state.
            #[test]
            fn handle_does_not_mutate_state(delta in -50.0f64..50.0) {
                let item_id = test_item_id();
                let item = InventoryItem::create(create_cmd(item_id, 20.0, 5.0)).unwrap();
                let before = item.clone();

                let _ = item.handle(&InventoryCommand::AdjustStock(AdjustStock {
                    item_id,
                    delta,
                    reason: None,
                    occurred_at: test_time(),
                }));

                prop_assert_eq!(before, item);
            }

            /// Property: stock equals initial stock minus everything consumed.
            #[test]
            fn consumption_is_additive(quantities in prop::collection::vec(0.0f64..100.0, 0..20)) {
                let item_id = test_item_id();
                let mut item = InventoryItem::create(create_cmd(item_id, 50.0, 0.0)).unwrap();

                for quantity in &quantities {
                    item.execute(&InventoryCommand::ConsumeStock(ConsumeStock {
                        item_id,
                        quantity: *quantity,
                        run_id: AggregateId::new(),
                        batch_number: "250201-001".to_string(),
                        occurred_at: test_time(),
                    }))
                    .unwrap();
                }

                let expected = 50.0 - quantities.iter().sum::<f64>();
                prop_assert!((item.stock() - expected).abs() < 1e-6);
                prop_assert_eq!(item.version(), 1 + quantities.len() as u64);
            }
        }
    }
}
