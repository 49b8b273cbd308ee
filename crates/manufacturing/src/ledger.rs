//! Stock deduction for completed runs.
//!
//! Every ingredient of the recipe is converted into its item's base unit,
//! multiplied by the run quantity and subtracted from stock. No sufficiency
//! check happens here: shortages are an advisory concern of the cost model,
//! and a completed run always consumes what it used.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use batchworks_core::{Aggregate, DomainError, DomainResult};
use batchworks_inventory::{
    ConsumeStock, InventoryCommand, InventoryEvent, InventoryItem, InventoryItemId,
};
use batchworks_recipes::{ItemCatalog, Recipe, quantity_in_base_unit};
use batchworks_units::{UnitMismatch, UnitSymbol};

use crate::run::{ManufacturingRun, RunStatus};

/// Total amount to take from one inventory item for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockDeduction {
    pub inventory_item_id: InventoryItemId,
    /// In the item's base unit, already multiplied by the run quantity.
    pub quantity: f64,
    pub unit: UnitSymbol,
    pub mismatches: Vec<UnitMismatch>,
}

/// Work out what a completed run consumes, one entry per inventory item.
///
/// Ingredients sharing an item are summed; entries keep the recipe's
/// ingredient order.
pub fn plan_deductions<C>(
    run: &ManufacturingRun,
    recipe: &Recipe,
    catalog: &C,
) -> DomainResult<Vec<StockDeduction>>
where
    C: ItemCatalog + ?Sized,
{
    if run.status() != RunStatus::Completed {
        return Err(DomainError::invalid_transition(format!(
            "stock is only deducted for completed runs (run {} is {})",
            run.batch_number(),
            run.status()
        )));
    }
    if run.recipe_id() != recipe.id_typed() {
        return Err(DomainError::invariant("run does not belong to this recipe"));
    }

    let batches = f64::from(run.quantity());
    let mut deductions: Vec<StockDeduction> = Vec::new();
    let mut index_by_item: HashMap<InventoryItemId, usize> = HashMap::new();

    for ingredient in recipe.ingredients() {
        let item = catalog
            .inventory_item(ingredient.inventory_item_id)
            .ok_or_else(|| DomainError::not_found("inventory item", ingredient.inventory_item_id))?;
        let converted = quantity_in_base_unit(ingredient, item);
        let quantity = converted.value * batches;

        match index_by_item.get(&ingredient.inventory_item_id).copied() {
            Some(idx) => {
                let entry = &mut deductions[idx];
                entry.quantity += quantity;
                entry.mismatches.extend(converted.mismatch);
            }
            None => {
                index_by_item.insert(ingredient.inventory_item_id, deductions.len());
                deductions.push(StockDeduction {
                    inventory_item_id: ingredient.inventory_item_id,
                    quantity,
                    unit: item.unit().clone(),
                    mismatches: converted.mismatch.into_iter().collect(),
                });
            }
        }
    }

    Ok(deductions)
}

/// Deduct a completed run's ingredients from `items`.
///
/// Every `ConsumeStock` command is decided before any item is changed, so on
/// error `items` is left exactly as it was. Returns the applied events; the
/// caller persists the touched items together with the completed run.
pub fn deduct_for_completed_run(
    run: &ManufacturingRun,
    recipe: &Recipe,
    items: &mut HashMap<InventoryItemId, InventoryItem>,
) -> DomainResult<Vec<InventoryEvent>> {
    let deductions = plan_deductions(run, recipe, &*items)?;
    let occurred_at = run
        .completed_at()
        .ok_or_else(|| DomainError::invariant("completed run without completed_at"))?;

    let mut decided = Vec::with_capacity(deductions.len());
    for deduction in &deductions {
        let item = items
            .get(&deduction.inventory_item_id)
            .ok_or_else(|| DomainError::not_found("inventory item", deduction.inventory_item_id))?;
        let events = item.handle(&InventoryCommand::ConsumeStock(ConsumeStock {
            item_id: deduction.inventory_item_id,
            quantity: deduction.quantity,
            run_id: run.id_typed().as_aggregate_id(),
            batch_number: run.batch_number().to_string(),
            occurred_at,
        }))?;
        decided.push((deduction.inventory_item_id, events));
    }

    let mut applied = Vec::new();
    for (item_id, events) in decided {
        if let Some(item) = items.get_mut(&item_id) {
            for event in &events {
                item.apply(event);
            }
        }
        applied.extend(events);
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchworks_core::AggregateRoot;
    use batchworks_inventory::CreateItem;
    use batchworks_recipes::{RecipeDraft, RecipeId, RecipeIngredient, RecipeStep};
    use batchworks_units::BuiltinUnit;
    use chrono::{DateTime, Duration, Utc};

    use crate::run::{CompleteStep, RunCommand, RunId};

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-02-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn item(name: &str, unit: BuiltinUnit, stock: f64) -> InventoryItem {
        InventoryItem::create(CreateItem {
            item_id: InventoryItemId::generate(),
            name: name.to_string(),
            category: None,
            unit: unit.into(),
            unit_price: 1.0,
            initial_stock: stock,
            min_stock: 0.0,
            occurred_at: t0(),
        })
        .unwrap()
    }

    fn ingredient(item: &InventoryItem, quantity: f64, unit: UnitSymbol) -> RecipeIngredient {
        RecipeIngredient {
            inventory_item_id: item.id_typed(),
            quantity,
            unit,
            note: None,
        }
    }

    fn recipe(ingredients: Vec<RecipeIngredient>) -> Recipe {
        Recipe::new(RecipeDraft {
            recipe_id: RecipeId::generate(),
            name: "Granola".to_string(),
            category: None,
            is_favorite: false,
            batch_size: 8,
            batch_unit: "jars".to_string(),
            steps: vec![RecipeStep {
                title: "Bake".to_string(),
                note: String::new(),
                estimated_minutes: 30,
                order: 1,
            }],
            ingredients,
        })
        .unwrap()
    }

    fn completed_run(recipe: &Recipe, quantity: u32) -> ManufacturingRun {
        let (mut run, _) =
            ManufacturingRun::start(RunId::generate(), "250201-001", recipe, quantity, t0())
                .unwrap();
        run.execute(&RunCommand::CompleteStep(CompleteStep {
            run_id: run.id_typed(),
            note: String::new(),
            occurred_at: t0() + Duration::minutes(30),
        }))
        .unwrap();
        run
    }

    fn by_id(items: Vec<InventoryItem>) -> HashMap<InventoryItemId, InventoryItem> {
        items.into_iter().map(|i| (i.id_typed(), i)).collect()
    }

    #[test]
    fn deducts_converted_quantity_times_run_quantity() {
        let oats = item("Oats", BuiltinUnit::Kilogram, 10.0);
        let honey = item("Honey", BuiltinUnit::Liter, 2.0);
        let r = recipe(vec![
            ingredient(&oats, 750.0, BuiltinUnit::Gram.into()),
            ingredient(&honey, 200.0, BuiltinUnit::Milliliter.into()),
        ]);
        let run = completed_run(&r, 3);
        let (oats_id, honey_id) = (oats.id_typed(), honey.id_typed());
        let mut items = by_id(vec![oats, honey]);

        let events = deduct_for_completed_run(&run, &r, &mut items).unwrap();

        assert_eq!(events.len(), 2);
        assert!((items[&oats_id].stock() - 7.75).abs() < 1e-9);
        assert!((items[&honey_id].stock() - 1.4).abs() < 1e-9);
        assert_eq!(items[&oats_id].version(), 2);
    }

    #[test]
    fn stock_may_go_negative() {
        let wax = item("Wax", BuiltinUnit::Gram, 100.0);
        let r = recipe(vec![ingredient(&wax, 80.0, BuiltinUnit::Gram.into())]);
        let run = completed_run(&r, 2);
        let wax_id = wax.id_typed();
        let mut items = by_id(vec![wax]);

        deduct_for_completed_run(&run, &r, &mut items).unwrap();
        assert_eq!(items[&wax_id].stock(), -60.0);
    }

    #[test]
    fn repeated_item_is_summed_into_one_deduction() {
        let sugar = item("Sugar", BuiltinUnit::Kilogram, 5.0);
        let r = recipe(vec![
            ingredient(&sugar, 500.0, BuiltinUnit::Gram.into()),
            ingredient(&sugar, 0.25, BuiltinUnit::Kilogram.into()),
        ]);
        let run = completed_run(&r, 2);
        let items = by_id(vec![sugar]);

        let plan = plan_deductions(&run, &r, &items).unwrap();
        assert_eq!(plan.len(), 1);
        assert!((plan[0].quantity - 1.5).abs() < 1e-12);
        assert!(plan[0].mismatches.is_empty());
    }

    #[test]
    fn mismatched_unit_is_deducted_unconverted_and_reported() {
        let eggs = item("Eggs", BuiltinUnit::Piece, 12.0);
        let r = recipe(vec![ingredient(&eggs, 2.0, BuiltinUnit::Gram.into())]);
        let run = completed_run(&r, 1);
        let items = by_id(vec![eggs]);

        let plan = plan_deductions(&run, &r, &items).unwrap();
        assert_eq!(plan[0].quantity, 2.0);
        assert_eq!(plan[0].mismatches.len(), 1);
    }

    #[test]
    fn refuses_runs_that_are_not_completed() {
        let oats = item("Oats", BuiltinUnit::Kilogram, 10.0);
        let r = recipe(vec![ingredient(&oats, 1.0, BuiltinUnit::Kilogram.into())]);
        let (run, _) =
            ManufacturingRun::start(RunId::generate(), "250201-001", &r, 1, t0()).unwrap();
        let mut items = by_id(vec![oats]);

        let err = deduct_for_completed_run(&run, &r, &mut items).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));
    }

    #[test]
    fn missing_item_leaves_every_item_untouched() {
        let oats = item("Oats", BuiltinUnit::Kilogram, 10.0);
        let ghost = item("Ghost", BuiltinUnit::Gram, 1.0);
        let r = recipe(vec![
            ingredient(&oats, 1.0, BuiltinUnit::Kilogram.into()),
            ingredient(&ghost, 1.0, BuiltinUnit::Gram.into()),
        ]);
        let run = completed_run(&r, 1);
        let mut items = by_id(vec![oats]);
        let before = items.clone();

        let err = deduct_for_completed_run(&run, &r, &mut items).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(items, before);
    }
}
