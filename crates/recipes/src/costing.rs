//! Recipe cost model.
//!
//! All figures are per **one batch** unless a method says otherwise. Ingredient
//! quantities are converted into the linked item's base unit before being
//! priced or compared with stock; an unconvertible unit is used as-is and the
//! line carries a [`UnitMismatch`] warning.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use batchworks_core::{DomainError, DomainResult};
use batchworks_inventory::{InventoryItem, InventoryItemId};
use batchworks_units::{Converted, UnitMismatch, UnitSymbol, convert_or_pass_through};

use crate::recipe::{Recipe, RecipeId, RecipeIngredient};

/// Read access to inventory items by id.
pub trait ItemCatalog {
    fn inventory_item(&self, id: InventoryItemId) -> Option<&InventoryItem>;
}

impl ItemCatalog for HashMap<InventoryItemId, InventoryItem> {
    fn inventory_item(&self, id: InventoryItemId) -> Option<&InventoryItem> {
        self.get(&id)
    }
}

impl ItemCatalog for [InventoryItem] {
    fn inventory_item(&self, id: InventoryItemId) -> Option<&InventoryItem> {
        self.iter().find(|item| item.id_typed() == id)
    }
}

impl ItemCatalog for Vec<InventoryItem> {
    fn inventory_item(&self, id: InventoryItemId) -> Option<&InventoryItem> {
        self.as_slice().inventory_item(id)
    }
}

/// Ingredient quantity expressed in the item's base unit.
pub fn quantity_in_base_unit(ingredient: &RecipeIngredient, item: &InventoryItem) -> Converted {
    convert_or_pass_through(ingredient.quantity, &ingredient.unit, item.unit())
}

/// Cost of one batch's worth of this ingredient.
pub fn ingredient_cost(ingredient: &RecipeIngredient, item: &InventoryItem) -> f64 {
    quantity_in_base_unit(ingredient, item).value * item.unit_price()
}

/// One priced ingredient of a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientLine {
    pub inventory_item_id: InventoryItemId,
    pub item_name: String,
    /// Quantity as written in the recipe.
    pub quantity: f64,
    pub unit: UnitSymbol,
    /// Quantity in the item's base unit.
    pub base_quantity: f64,
    pub base_unit: UnitSymbol,
    pub unit_price: f64,
    pub cost: f64,
    /// Stock on hand when the line was computed.
    pub stock: f64,
    pub mismatch: Option<UnitMismatch>,
}

impl IngredientLine {
    pub fn new(ingredient: &RecipeIngredient, item: &InventoryItem) -> Self {
        let converted = quantity_in_base_unit(ingredient, item);
        Self {
            inventory_item_id: ingredient.inventory_item_id,
            item_name: item.name().to_string(),
            quantity: ingredient.quantity,
            unit: ingredient.unit.clone(),
            base_quantity: converted.value,
            base_unit: item.unit().clone(),
            unit_price: item.unit_price(),
            cost: converted.value * item.unit_price(),
            stock: item.stock(),
            mismatch: converted.mismatch,
        }
    }

    pub fn has_enough_stock(&self) -> bool {
        self.has_enough_stock_for(1)
    }

    pub fn shortage(&self) -> f64 {
        self.shortage_for(1)
    }

    pub fn has_enough_stock_for(&self, batches: u32) -> bool {
        self.stock >= self.base_quantity * f64::from(batches)
    }

    pub fn shortage_for(&self, batches: u32) -> f64 {
        (self.base_quantity * f64::from(batches) - self.stock).max(0.0)
    }

    /// The same line for `batches` batches (quantities and cost multiplied).
    pub fn scaled(&self, batches: u32) -> Self {
        let factor = f64::from(batches);
        Self {
            quantity: self.quantity * factor,
            base_quantity: self.base_quantity * factor,
            cost: self.cost * factor,
            ..self.clone()
        }
    }
}

/// Cost, time and sufficiency figures for one batch of a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeCosting {
    pub recipe_id: RecipeId,
    pub batch_size: u32,
    pub batch_unit: String,
    pub lines: Vec<IngredientLine>,
    pub total_cost: f64,
    pub cost_per_unit: f64,
    pub total_time_minutes: u64,
}

impl RecipeCosting {
    /// Price every ingredient against `catalog`.
    ///
    /// Fails with `NotFound` when an ingredient references an item the catalog
    /// does not know, rather than silently leaving it out of the total.
    pub fn compute<C>(recipe: &Recipe, catalog: &C) -> DomainResult<Self>
    where
        C: ItemCatalog + ?Sized,
    {
        let lines = recipe
            .ingredients()
            .iter()
            .map(|ingredient| {
                catalog
                    .inventory_item(ingredient.inventory_item_id)
                    .map(|item| IngredientLine::new(ingredient, item))
                    .ok_or_else(|| {
                        DomainError::not_found("inventory item", ingredient.inventory_item_id)
                    })
            })
            .collect::<DomainResult<Vec<_>>>()?;

        let total_cost: f64 = lines.iter().map(|l| l.cost).sum();

        Ok(Self {
            recipe_id: recipe.id_typed(),
            batch_size: recipe.batch_size(),
            batch_unit: recipe.batch_unit().to_string(),
            cost_per_unit: total_cost / f64::from(recipe.batch_size()),
            total_cost,
            total_time_minutes: recipe.total_time_minutes(),
            lines,
        })
    }

    pub fn has_enough_inventory(&self) -> bool {
        self.has_enough_inventory_for(1)
    }

    pub fn insufficient_ingredients(&self) -> Vec<&IngredientLine> {
        self.insufficient_for(1)
    }

    pub fn insufficient_count(&self) -> usize {
        self.insufficient_ingredients().len()
    }

    /// Sufficiency for a multi-batch run.
    pub fn has_enough_inventory_for(&self, batches: u32) -> bool {
        self.insufficient_for(batches).is_empty()
    }

    /// Lines whose item cannot cover `batches` batches.
    ///
    /// Demand is summed per inventory item, the same way the run's stock
    /// deduction sums it, so two lines drawing on one item are both reported
    /// when together they need more than its stock.
    pub fn insufficient_for(&self, batches: u32) -> Vec<&IngredientLine> {
        let mut demand: HashMap<InventoryItemId, f64> = HashMap::new();
        for line in &self.lines {
            *demand.entry(line.inventory_item_id).or_insert(0.0) += line.base_quantity;
        }

        let factor = f64::from(batches);
        self.lines
            .iter()
            .filter(|l| {
                let needed = demand.get(&l.inventory_item_id).copied().unwrap_or(l.base_quantity);
                l.stock < needed * factor
            })
            .collect()
    }

    /// Lines whose unit could not be converted into the item's unit.
    pub fn warnings(&self) -> Vec<&UnitMismatch> {
        self.lines.iter().filter_map(|l| l.mismatch.as_ref()).collect()
    }
}
