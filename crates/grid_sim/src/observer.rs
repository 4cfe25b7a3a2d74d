//! Step-local post-processing hooks.

use grid_engine::{Engine, TimeStep};
use serde::{Deserialize, Serialize};

use crate::convergence::{Convergence, TierReport};

/// What happened during one step's tier loops.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub step: TimeStep,
    pub tiers: Vec<TierReport>,
}

impl StepReport {
    /// Whether every tier converged.
    #[must_use]
    pub fn converged(&self) -> bool {
        self.tiers.iter().all(TierReport::converged)
    }
}

/// Called after every tier of a step has finished, before the snapshot is
/// committed. Observers only read engine state.
pub trait StepObserver {
    fn on_step(&mut self, report: &StepReport, engine: &dyn Engine);
}

/// Running convergence statistics for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceStats {
    pub steps: u64,
    pub converged: u64,
    pub exhausted: u64,
    pub total_resolves: u64,
    /// Largest residual of any exhausted tier loop.
    pub worst_residual: f64,
    pub worst_step: Option<TimeStep>,
}

impl ConvergenceStats {
    pub fn record(&mut self, report: &StepReport) {
        self.steps += 1;
        for tier in &report.tiers {
            self.total_resolves += u64::from(tier.resolves);
            match tier.outcome {
                Convergence::Converged => self.converged += 1,
                Convergence::Exhausted => {
                    self.exhausted += 1;
                    if self.worst_step.is_none() || tier.residual > self.worst_residual {
                        self.worst_residual = tier.residual;
                        self.worst_step = Some(report.step);
                    }
                }
            }
        }
    }
}

impl StepObserver for ConvergenceStats {
    fn on_step(&mut self, report: &StepReport, _engine: &dyn Engine) {
        self.record(report);
    }
}
