use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use batchworks_core::{DomainError, DomainResult, Entity, ValueObject};
use batchworks_inventory::InventoryItemId;
use batchworks_units::UnitSymbol;

batchworks_core::typed_id!(
    /// Recipe identifier.
    RecipeId
);

/// Label used when a recipe does not name its batch unit.
pub const DEFAULT_BATCH_UNIT: &str = "pcs";

/// One step of a recipe. `order` positions it among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeStep {
    pub title: String,
    #[serde(default)]
    pub note: String,
    pub estimated_minutes: u32,
    pub order: u32,
}

impl ValueObject for RecipeStep {}

/// Amount of one inventory item used per batch, in `unit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeIngredient {
    pub inventory_item_id: InventoryItemId,
    pub quantity: f64,
    pub unit: UnitSymbol,
    #[serde(default)]
    pub note: Option<String>,
}

impl ValueObject for RecipeIngredient {}

/// Unvalidated recipe shape: what a form produces and what the store keeps.
///
/// Turn it into a [`Recipe`] with [`Recipe::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeDraft {
    pub recipe_id: RecipeId,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
    pub batch_size: u32,
    #[serde(default)]
    pub batch_unit: String,
    #[serde(default)]
    pub steps: Vec<RecipeStep>,
    #[serde(default)]
    pub ingredients: Vec<RecipeIngredient>,
}

/// A validated recipe.
///
/// Invariants: non-empty name, `batch_size >= 1`, steps sorted by a strictly
/// increasing `order`, every ingredient quantity finite and `>= 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecipeDraft", into = "RecipeDraft")]
pub struct Recipe {
    id: RecipeId,
    name: String,
    category: Option<String>,
    is_favorite: bool,
    batch_size: u32,
    batch_unit: String,
    steps: Vec<RecipeStep>,
    ingredients: Vec<RecipeIngredient>,
}

impl Recipe {
    pub fn new(draft: RecipeDraft) -> DomainResult<Self> {
        let name = draft.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("recipe name cannot be empty"));
        }
        if draft.batch_size < 1 {
            return Err(DomainError::validation("batch_size must be at least 1"));
        }

        let mut seen = HashSet::with_capacity(draft.steps.len());
        for step in &draft.steps {
            if !seen.insert(step.order) {
                return Err(DomainError::validation(format!(
                    "duplicate step order {}",
                    step.order
                )));
            }
        }

        for ingredient in &draft.ingredients {
            if !ingredient.quantity.is_finite() || ingredient.quantity < 0.0 {
                return Err(DomainError::validation(format!(
                    "ingredient quantity for item {} must be a finite, non-negative number",
                    ingredient.inventory_item_id
                )));
            }
        }

        let mut steps = draft.steps;
        steps.sort_by_key(|s| s.order);

        let batch_unit = match draft.batch_unit.trim() {
            "" => DEFAULT_BATCH_UNIT.to_string(),
            unit => unit.to_string(),
        };

        Ok(Self {
            id: draft.recipe_id,
            name,
            category: draft
                .category
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            is_favorite: draft.is_favorite,
            batch_size: draft.batch_size,
            batch_unit,
            steps,
            ingredients: draft.ingredients,
        })
    }

    pub fn id_typed(&self) -> RecipeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn is_favorite(&self) -> bool {
        self.is_favorite
    }

    /// Units produced by one batch (always `>= 1`).
    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn batch_unit(&self) -> &str {
        &self.batch_unit
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[RecipeStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&RecipeStep> {
        self.steps.get(index)
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn ingredients(&self) -> &[RecipeIngredient] {
        &self.ingredients
    }

    /// Sum of the steps' estimated minutes.
    pub fn total_time_minutes(&self) -> u64 {
        self.steps.iter().map(|s| u64::from(s.estimated_minutes)).sum()
    }

    /// Back to the editable shape.
    pub fn to_draft(&self) -> RecipeDraft {
        self.clone().into()
    }
}

impl Entity for Recipe {
    type Id = RecipeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl TryFrom<RecipeDraft> for Recipe {
    type Error = DomainError;

    fn try_from(value: RecipeDraft) -> Result<Self, Self::Error> {
        Recipe::new(value)
    }
}

impl From<Recipe> for RecipeDraft {
    fn from(value: Recipe) -> Self {
        RecipeDraft {
            recipe_id: value.id,
            name: value.name,
            category: value.category,
            is_favorite: value.is_favorite,
            batch_size: value.batch_size,
            batch_unit: value.batch_unit,
            steps: value.steps,
            ingredients: value.ingredients,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchworks_units::BuiltinUnit;

    fn step(title: &str, minutes: u32, order: u32) -> RecipeStep {
        RecipeStep {
            title: title.to_string(),
            note: String::new(),
            estimated_minutes: minutes,
            order,
        }
    }

    fn draft() -> RecipeDraft {
        RecipeDraft {
            recipe_id: RecipeId::generate(),
            name: " Sourdough ".to_string(),
            category: Some("Bread".to_string()),
            is_favorite: false,
            batch_size: 4,
            batch_unit: String::new(),
            steps: vec![step("Bake", 45, 3), step("Mix", 15, 1), step("Proof", 240, 2)],
            ingredients: vec![RecipeIngredient {
                inventory_item_id: InventoryItemId::generate(),
                quantity: 500.0,
                unit: BuiltinUnit::Gram.into(),
                note: None,
            }],
        }
    }

    #[test]
    fn steps_are_sorted_by_order() {
        let recipe = Recipe::new(draft()).unwrap();
        let titles: Vec<_> = recipe.steps().iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Mix", "Proof", "Bake"]);
        assert_eq!(recipe.total_steps(), 3);
        assert_eq!(recipe.step(1).map(|s| s.title.as_str()), Some("Proof"));
        assert_eq!(recipe.step(3), None);
    }

    #[test]
    fn total_time_sums_step_estimates() {
        let recipe = Recipe::new(draft()).unwrap();
        assert_eq!(recipe.total_time_minutes(), 300);
    }

    #[test]
    fn defaults_and_trimming() {
        let recipe = Recipe::new(draft()).unwrap();
        assert_eq!(recipe.name(), "Sourdough");
        assert_eq!(recipe.batch_unit(), DEFAULT_BATCH_UNIT);
    }

    #[test]
    fn rejects_zero_batch_size() {
        let mut d = draft();
        d.batch_size = 0;
        assert!(matches!(
            Recipe::new(d).unwrap_err(),
            DomainError::Validation(msg) if msg.contains("batch_size")
        ));
    }

    #[test]
    fn rejects_duplicate_step_order() {
        let mut d = draft();
        d.steps.push(step("Cool", 30, 2));
        assert!(matches!(
            Recipe::new(d).unwrap_err(),
            DomainError::Validation(msg) if msg.contains("duplicate step order 2")
        ));
    }

    #[test]
    fn rejects_negative_ingredient_quantity() {
        let mut d = draft();
        d.ingredients[0].quantity = -1.0;
        assert!(Recipe::new(d).is_err());
    }

    #[test]
    fn deserialization_validates() {
        let recipe = Recipe::new(draft()).unwrap();
        let mut json = serde_json::to_value(&recipe).unwrap();
        let back: Recipe = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(back, recipe);

        json["batch_size"] = serde_json::json!(0);
        assert!(serde_json::from_value::<Recipe>(json).is_err());
    }
}
