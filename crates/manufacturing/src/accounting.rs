//! Run accounting read-model.
//!
//! Run-level cost is the recipe's per-batch cost times the number of batches.
//! `cost_per_unit` stays the recipe's per-unit cost: it is a property of the
//! recipe and does not change with the number of batches.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use batchworks_core::{DomainError, DomainResult};
use batchworks_recipes::{IngredientLine, Recipe, RecipeCosting, RecipeId};
use batchworks_units::UnitMismatch;

use crate::run::{ManufacturingRun, RunId, RunStatus};

/// Timing of one finished step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTiming {
    pub index: usize,
    pub title: String,
    pub note: String,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: i64,
}

impl StepTiming {
    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration_seconds)
    }
}

/// Cost and duration figures of one run.
///
/// For a completed run this is computed once, at completion, and persisted
/// next to the run so later price or recipe edits do not rewrite history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunAccounting {
    pub run_id: RunId,
    pub batch_number: String,
    pub recipe_id: RecipeId,
    pub recipe_name: String,
    pub status: RunStatus,
    pub quantity: u32,
    pub batch_size: u32,
    pub batch_unit: String,
    pub currency: String,
    pub total_units: u64,
    pub total_cost: f64,
    pub cost_per_unit: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_duration_seconds: i64,
    pub progress: f64,
    pub steps: Vec<StepTiming>,
    /// Ingredient lines scaled to the whole run.
    pub ingredients: Vec<IngredientLine>,
    pub warnings: Vec<UnitMismatch>,
}

impl RunAccounting {
    pub fn build(
        run: &ManufacturingRun,
        recipe: &Recipe,
        costing: &RecipeCosting,
        currency: impl Into<String>,
    ) -> DomainResult<Self> {
        if run.recipe_id() != recipe.id_typed() || costing.recipe_id != recipe.id_typed() {
            return Err(DomainError::invariant(
                "run, recipe and costing refer to different recipes",
            ));
        }

        let steps = run
            .step_completion_times()
            .iter()
            .enumerate()
            .map(|(index, completed_at)| StepTiming {
                index,
                title: recipe
                    .step(index)
                    .map(|s| s.title.clone())
                    .unwrap_or_else(|| format!("Step {}", index + 1)),
                note: run.step_notes().get(index).cloned().unwrap_or_default(),
                completed_at: *completed_at,
                duration_seconds: run
                    .step_duration(index)
                    .map(|d| d.num_seconds())
                    .unwrap_or(0),
            })
            .collect();

        let batches = run.quantity();

        Ok(Self {
            run_id: run.id_typed(),
            batch_number: run.batch_number().to_string(),
            recipe_id: recipe.id_typed(),
            recipe_name: recipe.name().to_string(),
            status: run.status(),
            quantity: batches,
            batch_size: costing.batch_size,
            batch_unit: costing.batch_unit.clone(),
            currency: currency.into(),
            total_units: u64::from(costing.batch_size) * u64::from(batches),
            total_cost: costing.total_cost * f64::from(batches),
            cost_per_unit: costing.cost_per_unit,
            started_at: run.started_at(),
            completed_at: run.completed_at(),
            total_duration_seconds: run.total_duration().num_seconds(),
            progress: run.progress(),
            steps,
            ingredients: costing.lines.iter().map(|l| l.scaled(batches)).collect(),
            warnings: costing.warnings().into_iter().cloned().collect(),
        })
    }

    pub fn total_duration(&self) -> Duration {
        Duration::seconds(self.total_duration_seconds)
    }

    /// Figures no longer change once the run is completed.
    pub fn is_final(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Totals over a set of runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductionSummary {
    pub total_runs: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub cancelled: usize,
    /// Units produced by completed runs with a stored report.
    pub units_produced: u64,
    pub completed_cost: f64,
}

impl ProductionSummary {
    pub fn record(&mut self, run: &ManufacturingRun, report: Option<&RunAccounting>) {
        self.total_runs += 1;
        match run.status() {
            RunStatus::Pending => self.pending += 1,
            RunStatus::InProgress => self.in_progress += 1,
            RunStatus::Cancelled => self.cancelled += 1,
            RunStatus::Completed => {
                self.completed += 1;
                if let Some(report) = report {
                    self.units_produced += report.total_units;
                    self.completed_cost += report.total_cost;
                }
            }
        }
    }

    pub fn from_runs<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a ManufacturingRun, Option<&'a RunAccounting>)>,
    {
        let mut summary = Self::default();
        for (run, report) in entries {
            summary.record(run, report);
        }
        summary
    }
}
