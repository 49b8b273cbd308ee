//! Recipes and the recipe cost model.
//!
//! A [`Recipe`] names the inventory items it consumes per batch and the ordered
//! steps that make one batch. [`RecipeCosting`] resolves those ingredients
//! against current inventory to produce cost, time and stock-sufficiency
//! figures.

pub mod costing;
pub mod recipe;

pub use costing::{
    IngredientLine, ItemCatalog, RecipeCosting, ingredient_cost, quantity_in_base_unit,
};
pub use recipe::{Recipe, RecipeDraft, RecipeId, RecipeIngredient, RecipeStep, DEFAULT_BATCH_UNIT};
