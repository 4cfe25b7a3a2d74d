//! # grid_sim
//!
//! Time-stepping scheduler for grid simulations with feedback controllers.
//!
//! This crate provides:
//!
//! - [`SimulationOptions`] — validated run configuration.
//! - [`ConvergenceLoop`] — bounded per-tier fixed-point iteration.
//! - [`Simulation`] — the step scheduler and its [`RunState`] lifecycle.
//! - [`ResultsCollector`] — append-only step snapshots, exported through a
//!   [`ResultsExporter`] when the run finalizes.
//! - [`StepObserver`] — hooks run after every step, with
//!   [`ConvergenceStats`] built in.
//! - [`Scenario`] — a JSON document describing a complete run.

pub mod config;
pub mod convergence;
pub mod edits;
pub mod error;
pub mod export;
pub mod observer;
pub mod results;
pub mod scenario;
pub mod simulation;

#[cfg(test)]
mod test_support;

pub use config::{ConfigError, ErrorAggregation, SimulationOptions};
pub use convergence::{Convergence, ConvergenceLoop, TierReport};
pub use edits::{EditSchedule, StepEdits};
pub use error::SimError;
pub use export::{
    ExportArtifact, ExportError, ExportFormat, ExportLayout, FileExporter, MemoryExporter,
    ResultsExporter,
};
pub use observer::{ConvergenceStats, StepObserver, StepReport};
pub use results::{ExportSpec, ResultsCollector, ResultsError, Snapshot};
pub use scenario::Scenario;
pub use simulation::{RunState, RunSummary, Simulation};
