//! Manufacturing runs.
//!
//! - [`batch_number`]: `YYMMDD-XXX` identifiers derived from existing runs.
//! - [`run`]: the run state machine (in progress → completed | cancelled).
//! - [`ledger`]: stock deduction for a completed run, all items or none.
//! - [`accounting`]: cost/duration read-model for display and export.
//!
//! The run signals completion through its `RunCompleted` event but never
//! touches inventory itself; the caller must commit the completed run and the
//! ledger's deductions as one unit of work.

pub mod accounting;
pub mod batch_number;
pub mod ledger;
pub mod run;

pub use accounting::{ProductionSummary, RunAccounting, StepTiming};
pub use batch_number::{batch_prefix, generate_batch_number, next_batch_number};
pub use ledger::{StockDeduction, deduct_for_completed_run, plan_deductions};
pub use run::{
    CancelRun, CompleteStep, ManufacturingRun, RunCancelled, RunCommand, RunCompleted, RunEvent,
    RunId, RunStarted, RunStatus, StartRun, StepCompleted,
};
