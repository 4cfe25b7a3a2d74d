use grid_control::ConstructionError;
use grid_engine::{EngineError, TimeStep};

use crate::config::ConfigError;
use crate::export::ExportError;
use crate::results::ResultsError;
use crate::simulation::RunState;

/// Errors that stop a simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("controller construction failed: {0}")]
    Construction(#[from] ConstructionError),

    /// The engine could not advance, re-solve, read or write.
    #[error("engine failure: {0}")]
    Engine(#[from] EngineError),

    #[error("results error: {0}")]
    Results(#[from] ResultsError),

    #[error("export failed: {0}")]
    Export(#[from] ExportError),

    #[error("expected step {expected}, got {got}")]
    StepOutOfOrder { expected: TimeStep, got: TimeStep },

    #[error("step {step} is outside the horizon of {total_steps} steps")]
    StepOutOfRange { step: TimeStep, total_steps: u64 },

    /// The engine landed on a different step than the scheduler asked for.
    #[error("engine advanced to {actual:?}, expected {expected}")]
    TimeMismatch {
        expected: TimeStep,
        actual: Option<TimeStep>,
    },

    #[error("finalized after {steps_run} of {total_steps} steps")]
    Incomplete { steps_run: u64, total_steps: u64 },

    #[error("simulation is {0} and cannot step")]
    InvalidState(RunState),
}
