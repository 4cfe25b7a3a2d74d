//! The step scheduler.
//!
//! A [`Simulation`] owns the engine, the controller set and the results
//! collector, and drives them through the horizon one step at a time:
//!
//! 1. Apply scheduled and caller-supplied edits to the engine.
//! 2. Advance the engine by exactly one step.
//! 3. Run the convergence loop for each tier, lowest priority index first.
//! 4. Notify step observers.
//! 5. Commit a snapshot when `log_results` is set.
//! 6. Hand the snapshot back when `return_results` is set.
//!
//! Steps run strictly in order from 0 to `total_steps - 1`. Any propagated
//! error marks the run [`RunState::Crashed`].

use std::fmt;
use std::time::{Duration, Instant};

use grid_control::{AnyController, Controller, ControllerSet};
use grid_engine::{Engine, TimeStep};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::{ConfigError, SimulationOptions};
use crate::convergence::ConvergenceLoop;
use crate::edits::{EditSchedule, StepEdits};
use crate::error::SimError;
use crate::export::{ExportArtifact, ResultsExporter};
use crate::observer::{ConvergenceStats, StepObserver, StepReport};
use crate::results::{ExportSelection, ExportSpec, ResultsCollector, Snapshot};

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Crashed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Crashed => "crashed",
        })
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub state: RunState,
    pub steps_run: u64,
    pub stats: ConvergenceStats,
    pub artifact: Option<ExportArtifact>,
    pub elapsed: Duration,
}

/// A single-timeline simulation run.
pub struct Simulation<E, C = AnyController> {
    run_id: Uuid,
    options: SimulationOptions,
    total_steps: u64,
    convergence: ConvergenceLoop,
    engine: E,
    controllers: ControllerSet<C>,
    exports: ExportSelection,
    results: ResultsCollector,
    edits: EditSchedule,
    observers: Vec<Box<dyn StepObserver>>,
    stats: ConvergenceStats,
    next_step: TimeStep,
    state: RunState,
    started: Option<Instant>,
}

impl<E: Engine, C: Controller> Simulation<E, C> {
    /// Validate `options` and assemble a run.
    ///
    /// # Errors
    ///
    /// [`SimError::Config`] for invalid options, a zero-step horizon, or a
    /// controller set whose tier count differs from the options.
    pub fn new(
        options: SimulationOptions,
        engine: E,
        controllers: ControllerSet<C>,
    ) -> Result<Self, SimError> {
        let total_steps = options.total_steps()?;
        if controllers.tier_count() != options.tier_count {
            return Err(ConfigError::TierMismatch {
                expected: options.tier_count,
                found: controllers.tier_count(),
            }
            .into());
        }

        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            total_steps,
            tiers = options.tier_count,
            controllers = controllers.len(),
            "simulation created"
        );

        Ok(Self {
            run_id,
            convergence: ConvergenceLoop::from_options(&options),
            options,
            total_steps,
            engine,
            controllers,
            exports: ExportSelection::default(),
            results: ResultsCollector::new(),
            edits: EditSchedule::new(),
            observers: Vec::new(),
            stats: ConvergenceStats::default(),
            next_step: TimeStep(0),
            state: RunState::Idle,
            started: None,
        })
    }

    /// Send results to `exporter` when the run finalizes.
    #[must_use]
    pub fn with_exporter(mut self, exporter: Box<dyn ResultsExporter>) -> Self {
        self.results.set_exporter(exporter);
        self
    }

    /// Record these element properties in every snapshot.
    ///
    /// # Errors
    ///
    /// [`SimError::Engine`] if an element or property does not exist.
    pub fn with_exports(mut self, specs: &[ExportSpec]) -> Result<Self, SimError> {
        self.exports = ExportSelection::resolve(specs, &self.engine)?;
        Ok(self)
    }

    /// Edits applied automatically before their step advances.
    ///
    /// # Errors
    ///
    /// [`SimError::StepOutOfRange`] for a step beyond the horizon,
    /// [`SimError::Engine`] for an unknown element or property.
    pub fn with_edit_schedule(mut self, schedule: EditSchedule) -> Result<Self, SimError> {
        for (step, edits) in &schedule {
            if step.index() >= self.total_steps {
                return Err(SimError::StepOutOfRange {
                    step: *step,
                    total_steps: self.total_steps,
                });
            }
            edits.validate(&self.engine)?;
        }
        self.edits = schedule;
        Ok(self)
    }

    #[must_use]
    pub fn with_observer(mut self, observer: impl StepObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    #[must_use]
    pub fn options(&self) -> &SimulationOptions {
        &self.options
    }

    #[must_use]
    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// The step the next `run_step` call must ask for.
    #[must_use]
    pub fn next_step(&self) -> TimeStep {
        self.next_step
    }

    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    #[must_use]
    pub fn controllers(&self) -> &ControllerSet<C> {
        &self.controllers
    }

    #[must_use]
    pub fn results(&self) -> &ResultsCollector {
        &self.results
    }

    #[must_use]
    pub fn stats(&self) -> &ConvergenceStats {
        &self.stats
    }

    fn ensure_steppable(&self) -> Result<(), SimError> {
        match self.state {
            RunState::Idle | RunState::Running => Ok(()),
            state => Err(SimError::InvalidState(state)),
        }
    }

    fn crash(&mut self, err: &SimError) {
        self.state = RunState::Crashed;
        error!(
            run_id = %self.run_id,
            step = self.next_step.index(),
            error = %err,
            "simulation crashed"
        );
    }

    /// Run one step.
    ///
    /// `edits` are applied after any scheduled edits for the same step.
    /// Returns the step's snapshot when `return_results` is set.
    ///
    /// # Errors
    ///
    /// [`SimError::InvalidState`] once the run has completed or crashed.
    /// [`SimError::StepOutOfOrder`] / [`SimError::StepOutOfRange`] if `step`
    /// is not the next step of the horizon, [`SimError::Engine`] if `edits`
    /// name an unknown element or property; these leave the run untouched.
    /// Anything else marks the run crashed.
    pub fn run_step(
        &mut self,
        step: TimeStep,
        edits: Option<&StepEdits>,
    ) -> Result<Option<Snapshot>, SimError> {
        self.ensure_steppable()?;
        if step.index() >= self.total_steps {
            return Err(SimError::StepOutOfRange {
                step,
                total_steps: self.total_steps,
            });
        }
        if step != self.next_step {
            return Err(SimError::StepOutOfOrder {
                expected: self.next_step,
                got: step,
            });
        }
        if let Some(edits) = edits {
            edits.validate(&self.engine)?;
        }

        if self.state == RunState::Idle {
            self.state = RunState::Running;
            self.started = Some(Instant::now());
            info!(
                run_id = %self.run_id,
                total_steps = self.total_steps,
                "simulation started"
            );
        }

        match self.execute_step(step, edits) {
            Ok(snapshot) => {
                self.next_step = step.next();
                Ok(snapshot)
            }
            Err(err) => {
                self.crash(&err);
                Err(err)
            }
        }
    }

    fn execute_step(
        &mut self,
        step: TimeStep,
        edits: Option<&StepEdits>,
    ) -> Result<Option<Snapshot>, SimError> {
        if let Some(scheduled) = self.edits.remove(&step) {
            scheduled.apply(&mut self.engine)?;
        }
        if let Some(edits) = edits {
            edits.apply(&mut self.engine)?;
        }

        let actual = self.engine.advance_one_step()?;
        if actual != step {
            return Err(SimError::TimeMismatch {
                expected: step,
                actual: Some(actual),
            });
        }

        let mut tiers = Vec::with_capacity(self.controllers.tier_count());
        for tier in self.controllers.priorities() {
            let report = self.convergence.run(
                &mut self.engine,
                self.controllers.tier_mut(tier),
                tier,
                step,
            )?;
            tiers.push(report);
        }

        let report = StepReport { step, tiers };
        self.stats.record(&report);
        for observer in &mut self.observers {
            observer.on_step(&report, &self.engine);
        }
        debug!(
            step = step.index(),
            converged = report.converged(),
            "step complete"
        );

        if !(self.options.log_results || self.options.return_results) {
            return Ok(None);
        }
        let snapshot = Snapshot {
            step,
            elements: self.exports.capture(&self.engine)?,
            controllers: self
                .controllers
                .iter()
                .map(|c| (c.label(), c.state()))
                .collect(),
            tiers: report.tiers,
        };
        if !self.options.return_results {
            self.results.commit(snapshot)?;
            return Ok(None);
        }
        if self.options.log_results {
            self.results.commit(snapshot.clone())?;
        }
        Ok(Some(snapshot))
    }

    /// Run every remaining step, then finalize.
    ///
    /// # Errors
    ///
    /// The first error from any step or from the export. The run is marked
    /// crashed.
    pub fn run_simulation(&mut self) -> Result<RunSummary, SimError> {
        self.ensure_steppable()?;
        while self.next_step.index() < self.total_steps {
            self.run_step(self.next_step, None)?;
        }
        self.finalize()
    }

    /// Export collected results and mark the run completed.
    ///
    /// Only a run that has stepped through its whole horizon can complete.
    /// Calling it again exports nothing new.
    ///
    /// # Errors
    ///
    /// [`SimError::InvalidState`] on a crashed run, [`SimError::Incomplete`]
    /// while steps remain (the run keeps its state), [`SimError::Export`] if
    /// the export fails (the run is then marked crashed).
    pub fn finalize(&mut self) -> Result<RunSummary, SimError> {
        if self.state == RunState::Crashed {
            return Err(SimError::InvalidState(self.state));
        }
        if self.next_step.index() < self.total_steps {
            return Err(SimError::Incomplete {
                steps_run: self.next_step.index(),
                total_steps: self.total_steps,
            });
        }
        let artifact = match self.results.finalize() {
            Ok(artifact) => artifact,
            Err(err) => {
                let err = SimError::from(err);
                self.crash(&err);
                return Err(err);
            }
        };
        self.state = RunState::Completed;

        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        info!(
            run_id = %self.run_id,
            steps = self.next_step.index(),
            exhausted = self.stats.exhausted,
            elapsed_s = elapsed.as_secs_f64(),
            "simulation complete"
        );

        Ok(RunSummary {
            run_id: self.run_id,
            state: self.state,
            steps_run: self.next_step.index(),
            stats: self.stats.clone(),
            artifact,
            elapsed,
        })
    }
}
