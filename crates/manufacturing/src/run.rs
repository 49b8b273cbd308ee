use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use batchworks_core::{Aggregate, AggregateRoot, DomainError, DomainResult};
use batchworks_events::Event;
use batchworks_recipes::{Recipe, RecipeId, RecipeStep};

batchworks_core::typed_id!(
    /// Manufacturing run identifier.
    RunId
);

/// Run status lifecycle.
///
/// Runs start directly in `InProgress`; `Pending` is reserved for a future
/// pre-start workflow and is never produced by [`StartRun`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::InProgress => "inProgress",
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate root: ManufacturingRun.
///
/// `step_completion_times` and `step_notes` always have exactly
/// `current_step_index` entries. The step count is captured from the recipe
/// when the run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturingRun {
    id: RunId,
    batch_number: String,
    recipe_id: RecipeId,
    quantity: u32,
    status: RunStatus,
    total_steps: usize,
    current_step_index: usize,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    step_completion_times: Vec<DateTime<Utc>>,
    step_notes: Vec<String>,
    version: u64,
    created: bool,
}

impl ManufacturingRun {
    /// Create an empty, not-yet-started aggregate instance.
    pub fn empty(id: RunId) -> Self {
        Self {
            id,
            batch_number: String::new(),
            recipe_id: RecipeId::new(Default::default()),
            quantity: 0,
            status: RunStatus::Pending,
            total_steps: 0,
            current_step_index: 0,
            started_at: DateTime::<Utc>::default(),
            completed_at: None,
            cancelled_at: None,
            step_completion_times: Vec::new(),
            step_notes: Vec::new(),
            version: 0,
            created: false,
        }
    }

    /// Start a run of `quantity` batches of `recipe`.
    pub fn start(
        run_id: RunId,
        batch_number: impl Into<String>,
        recipe: &Recipe,
        quantity: u32,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<(Self, Vec<RunEvent>)> {
        let mut run = Self::empty(run_id);
        let events = run.execute(&RunCommand::StartRun(StartRun::for_recipe(
            run_id,
            batch_number,
            recipe,
            quantity,
            occurred_at,
        )))?;
        Ok((run, events))
    }

    pub fn id_typed(&self) -> RunId {
        self.id
    }

    pub fn batch_number(&self) -> &str {
        &self.batch_number
    }

    pub fn recipe_id(&self) -> RecipeId {
        self.recipe_id
    }

    /// Number of batches being produced.
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn step_completion_times(&self) -> &[DateTime<Utc>] {
        &self.step_completion_times
    }

    pub fn step_notes(&self) -> &[String] {
        &self.step_notes
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fraction of steps done; `1.0` for a recipe without steps.
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            1.0
        } else {
            self.current_step_index as f64 / self.total_steps as f64
        }
    }

    /// The step to work on next, if any.
    pub fn current_step<'r>(&self, recipe: &'r Recipe) -> Option<&'r RecipeStep> {
        recipe.step(self.current_step_index)
    }

    /// Time spent on step `index`, measured from the previous completion (or
    /// the start for the first step). `None` if the step is not done yet.
    pub fn step_duration(&self, index: usize) -> Option<Duration> {
        let finished = *self.step_completion_times.get(index)?;
        let began = match index {
            0 => self.started_at,
            i => self.step_completion_times[i - 1],
        };
        Some(finished - began)
    }

    /// Start to completion; zero while the run is not completed.
    pub fn total_duration(&self) -> Duration {
        self.completed_at
            .map(|done| done - self.started_at)
            .unwrap_or_else(Duration::zero)
    }

    /// Verify the structural invariants of a started run.
    pub fn check_invariants(&self) -> DomainResult<()> {
        if self.step_completion_times.len() != self.current_step_index
            || self.step_notes.len() != self.current_step_index
        {
            return Err(DomainError::invariant(
                "step completion arrays out of sync with current_step_index",
            ));
        }
        if self.current_step_index > self.total_steps {
            return Err(DomainError::invariant("current_step_index beyond step count"));
        }

        let completed = self.status == RunStatus::Completed;
        let at_end = self.current_step_index == self.total_steps;
        if completed != self.completed_at.is_some() {
            return Err(DomainError::invariant("completed_at does not match status"));
        }
        if completed && !at_end {
            return Err(DomainError::invariant("completed run has unfinished steps"));
        }
        if self.status == RunStatus::InProgress && at_end {
            return Err(DomainError::invariant("in-progress run has no steps left"));
        }
        Ok(())
    }
}

impl AggregateRoot for ManufacturingRun {
    type Id = RunId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: StartRun.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRun {
    pub run_id: RunId,
    pub batch_number: String,
    pub recipe_id: RecipeId,
    pub quantity: u32,
    pub total_steps: usize,
    pub occurred_at: DateTime<Utc>,
}

impl StartRun {
    pub fn for_recipe(
        run_id: RunId,
        batch_number: impl Into<String>,
        recipe: &Recipe,
        quantity: u32,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id,
            batch_number: batch_number.into(),
            recipe_id: recipe.id_typed(),
            quantity,
            total_steps: recipe.total_steps(),
            occurred_at,
        }
    }
}

/// Command: CompleteStep (completes the current step).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteStep {
    pub run_id: RunId,
    pub note: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelRun.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRun {
    pub run_id: RunId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunCommand {
    StartRun(StartRun),
    CompleteStep(CompleteStep),
    CancelRun(CancelRun),
}

/// Event: RunStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStarted {
    pub run_id: RunId,
    pub batch_number: String,
    pub recipe_id: RecipeId,
    pub quantity: u32,
    pub total_steps: usize,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StepCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCompleted {
    pub run_id: RunId,
    pub step_index: usize,
    pub note: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RunCompleted. Whoever persists this event must deduct stock for
/// the run in the same unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCompleted {
    pub run_id: RunId,
    pub recipe_id: RecipeId,
    pub batch_number: String,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RunCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCancelled {
    pub run_id: RunId,
    pub completed_steps: usize,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunEvent {
    RunStarted(RunStarted),
    StepCompleted(StepCompleted),
    RunCompleted(RunCompleted),
    RunCancelled(RunCancelled),
}

impl RunEvent {
    pub fn is_completion(&self) -> bool {
        matches!(self, RunEvent::RunCompleted(_))
    }
}

impl Event for RunEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RunEvent::RunStarted(_) => "manufacturing.run.started",
            RunEvent::StepCompleted(_) => "manufacturing.run.step_completed",
            RunEvent::RunCompleted(_) => "manufacturing.run.completed",
            RunEvent::RunCancelled(_) => "manufacturing.run.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RunEvent::RunStarted(e) => e.occurred_at,
            RunEvent::StepCompleted(e) => e.occurred_at,
            RunEvent::RunCompleted(e) => e.occurred_at,
            RunEvent::RunCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ManufacturingRun {
    type Command = RunCommand;
    type Event = RunEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RunEvent::RunStarted(e) => {
                self.id = e.run_id;
                self.batch_number = e.batch_number.clone();
                self.recipe_id = e.recipe_id;
                self.quantity = e.quantity;
                self.total_steps = e.total_steps;
                self.status = RunStatus::InProgress;
                self.current_step_index = 0;
                self.started_at = e.occurred_at;
                self.completed_at = None;
                self.cancelled_at = None;
                self.step_completion_times.clear();
                self.step_notes.clear();
                self.created = true;
            }
            RunEvent::StepCompleted(e) => {
                self.step_completion_times.push(e.occurred_at);
                self.step_notes.push(e.note.clone());
                self.current_step_index += 1;
            }
            RunEvent::RunCompleted(e) => {
                self.status = RunStatus::Completed;
                self.completed_at = Some(e.occurred_at);
            }
            RunEvent::RunCancelled(e) => {
                self.status = RunStatus::Cancelled;
                self.cancelled_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RunCommand::StartRun(cmd) => self.handle_start(cmd),
            RunCommand::CompleteStep(cmd) => self.handle_complete_step(cmd),
            RunCommand::CancelRun(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl ManufacturingRun {
    fn ensure_in_progress(&self, run_id: RunId, action: &str) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("manufacturing run", run_id));
        }
        if self.id != run_id {
            return Err(DomainError::invariant("run_id mismatch"));
        }
        if self.status != RunStatus::InProgress {
            return Err(DomainError::invalid_transition(format!(
                "cannot {action} run {} in status {}",
                self.batch_number, self.status
            )));
        }
        Ok(())
    }

    fn completion_event(&self, occurred_at: DateTime<Utc>) -> RunEvent {
        RunEvent::RunCompleted(RunCompleted {
            run_id: self.id,
            recipe_id: self.recipe_id,
            batch_number: self.batch_number.clone(),
            quantity: self.quantity,
            occurred_at,
        })
    }

    fn handle_start(&self, cmd: &StartRun) -> Result<Vec<RunEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("run already started"));
        }
        if cmd.quantity < 1 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        if cmd.batch_number.trim().is_empty() {
            return Err(DomainError::validation("batch_number cannot be empty"));
        }

        let mut events = vec![RunEvent::RunStarted(RunStarted {
            run_id: cmd.run_id,
            batch_number: cmd.batch_number.trim().to_string(),
            recipe_id: cmd.recipe_id,
            quantity: cmd.quantity,
            total_steps: cmd.total_steps,
            occurred_at: cmd.occurred_at,
        })];

        // Nothing to step through: the run is complete the moment it starts.
        if cmd.total_steps == 0 {
            events.push(RunEvent::RunCompleted(RunCompleted {
                run_id: cmd.run_id,
                recipe_id: cmd.recipe_id,
                batch_number: cmd.batch_number.trim().to_string(),
                quantity: cmd.quantity,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_complete_step(&self, cmd: &CompleteStep) -> Result<Vec<RunEvent>, DomainError> {
        self.ensure_in_progress(cmd.run_id, "complete a step of")?;

        if self.current_step_index >= self.total_steps {
            return Err(DomainError::invariant("in-progress run has no steps left"));
        }

        let previous = self
            .step_completion_times
            .last()
            .copied()
            .unwrap_or(self.started_at);
        if cmd.occurred_at < previous {
            return Err(DomainError::validation(
                "step completion time precedes the previous step",
            ));
        }

        let mut events = vec![RunEvent::StepCompleted(StepCompleted {
            run_id: cmd.run_id,
            step_index: self.current_step_index,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        })];

        if self.current_step_index + 1 == self.total_steps {
            events.push(self.completion_event(cmd.occurred_at));
        }

        Ok(events)
    }

    fn handle_cancel(&self, cmd: &CancelRun) -> Result<Vec<RunEvent>, DomainError> {
        self.ensure_in_progress(cmd.run_id, "cancel")?;

        Ok(vec![RunEvent::RunCancelled(RunCancelled {
            run_id: cmd.run_id,
            completed_steps: self.current_step_index,
            occurred_at: cmd.occurred_at,
        })])
    }
}
