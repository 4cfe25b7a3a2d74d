//! The per-tier convergence loop.
//!
//! For one tier at one step, every controller is evaluated, the errors are
//! aggregated, and the engine is re-solved so the new settings take effect.
//! This repeats until the aggregate drops below tolerance or the iteration
//! budget runs out:
//!
//! ```text
//! iteration = 0
//! loop:
//!     error = aggregate(|c.update(tier, step)| for c in tier)
//!     if error < tolerance:               CONVERGED
//!     if iteration == max_iterations - 1: EXHAUSTED (warn, keep going)
//!     engine.resolve_at_current_time()
//!     iteration += 1
//! ```
//!
//! No re-solve follows the last evaluation: the tier's final read is the one
//! the next tier builds on.

use grid_control::{Controller, Priority};
use grid_engine::{Engine, EngineError, TimeStep};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ErrorAggregation, SimulationOptions};

/// How a tier loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Convergence {
    Converged,
    /// The iteration budget ran out. Soft failure: the step continues.
    Exhausted,
}

/// Result of one tier loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierReport {
    pub tier: Priority,
    pub outcome: Convergence,
    /// Error evaluations performed (passes over the tier's controllers).
    pub evaluations: u32,
    /// Forced re-solves issued between evaluations.
    pub resolves: u32,
    /// Aggregate error of the last evaluation.
    pub residual: f64,
}

impl TierReport {
    #[must_use]
    pub fn converged(&self) -> bool {
        self.outcome == Convergence::Converged
    }
}

/// Bounded fixed-point iteration over one tier.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceLoop {
    max_iterations: u32,
    tolerance: f64,
    aggregation: ErrorAggregation,
}

impl ConvergenceLoop {
    #[must_use]
    pub fn new(max_iterations: u32, tolerance: f64, aggregation: ErrorAggregation) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
            tolerance,
            aggregation,
        }
    }

    #[must_use]
    pub fn from_options(options: &SimulationOptions) -> Self {
        Self::new(
            options.max_control_iterations,
            options.error_tolerance,
            options.error_aggregation,
        )
    }

    /// One pass over the tier: update every controller and aggregate.
    fn evaluate<C: Controller>(
        &self,
        engine: &mut dyn Engine,
        controllers: &mut [C],
        tier: Priority,
        time: TimeStep,
    ) -> Result<f64, EngineError> {
        let mut aggregate = 0.0;
        for controller in controllers.iter_mut() {
            let error = controller.update(engine, tier, time, false)?;
            // NaN never counts as converged.
            let error = if error.is_nan() {
                f64::INFINITY
            } else {
                error.abs()
            };
            aggregate = self.aggregation.combine(aggregate, error);
        }
        Ok(aggregate)
    }

    /// Drive one tier to convergence at `time`.
    ///
    /// # Errors
    ///
    /// Only engine failures propagate. Exhaustion is reported in the
    /// returned [`TierReport`], not as an error.
    pub fn run<C: Controller>(
        &self,
        engine: &mut dyn Engine,
        controllers: &mut [C],
        tier: Priority,
        time: TimeStep,
    ) -> Result<TierReport, EngineError> {
        let mut iteration = 0u32;
        loop {
            let error = self.evaluate(engine, controllers, tier, time)?;
            debug!(
                %tier,
                step = time.index(),
                iteration,
                error,
                "control loop convergence error"
            );

            if error < self.tolerance {
                return Ok(TierReport {
                    tier,
                    outcome: Convergence::Converged,
                    evaluations: iteration + 1,
                    resolves: iteration,
                    residual: error,
                });
            }

            if iteration + 1 >= self.max_iterations {
                warn!(
                    %tier,
                    step = time.index(),
                    residual = error,
                    iterations = self.max_iterations,
                    "control loop did not converge"
                );
                return Ok(TierReport {
                    tier,
                    outcome: Convergence::Exhausted,
                    evaluations: iteration + 1,
                    resolves: iteration,
                    residual: error,
                });
            }

            engine.resolve_at_current_time()?;
            iteration += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::test_support::{CallLog, Scripted, TestEngine, Tracking, halving_meter};

    fn tier0() -> Priority {
        Priority(0)
    }

    #[test]
    fn test_immediate_convergence_issues_no_resolve() {
        let log = CallLog::default();
        let mut engine = TestEngine::new();
        let mut controllers = vec![Scripted::new("a", 0, &[0.1], &log)];
        let report = ConvergenceLoop::new(10, 1.0, ErrorAggregation::Sum)
            .run(&mut engine, &mut controllers, tier0(), TimeStep(0))
            .unwrap();

        assert!(report.converged());
        assert_eq!(report.evaluations, 1);
        assert_eq!(report.resolves, 0);
        assert_eq!(engine.resolves, 0);
    }

    #[traced_test]
    #[test]
    fn test_exhaustion_does_not_resolve_after_last_evaluation() {
        let log = CallLog::default();
        let mut engine = TestEngine::new();
        let mut controllers = vec![Scripted::new("a", 0, &[5.0], &log)];
        let report = ConvergenceLoop::new(4, 1.0, ErrorAggregation::Sum)
            .run(&mut engine, &mut controllers, tier0(), TimeStep(0))
            .unwrap();

        assert_eq!(report.outcome, Convergence::Exhausted);
        assert_eq!(report.evaluations, 4);
        assert_eq!(report.resolves, 3);
        assert_eq!(engine.resolves, 3);
        assert_eq!(log.borrow().len(), 4);
        assert_eq!(report.residual, 5.0);
        assert!(logs_contain("control loop did not converge"));
        assert!(logs_contain("iterations=4"));
    }

    #[test]
    fn test_geometric_error_converges_after_seven_resolves() {
        let mut engine = halving_meter();
        let mut controllers = vec![Tracking::new("Meter.m", 0, &engine)];
        let report = ConvergenceLoop::new(20, 0.01, ErrorAggregation::Sum)
            .run(&mut engine, &mut controllers, tier0(), TimeStep(0))
            .unwrap();

        assert!(report.converged());
        assert_eq!(report.evaluations, 8);
        assert_eq!(report.resolves, 7);
        assert!(report.residual < 0.01);
    }

    #[test]
    fn test_sum_and_max_aggregation_differ() {
        let log = CallLog::default();
        let errors = [0.6, 0.6];
        let build = || -> Vec<Scripted> {
            errors
                .iter()
                .enumerate()
                .map(|(i, e)| Scripted::new(&format!("c{i}"), 0, &[*e], &log))
                .collect()
        };

        let mut engine = TestEngine::new();
        let sum = ConvergenceLoop::new(1, 1.0, ErrorAggregation::Sum)
            .run(&mut engine, &mut build(), tier0(), TimeStep(0))
            .unwrap();
        assert_eq!(sum.outcome, Convergence::Exhausted);
        assert!((sum.residual - 1.2).abs() < 1e-12);

        let max = ConvergenceLoop::new(1, 1.0, ErrorAggregation::Max)
            .run(&mut engine, &mut build(), tier0(), TimeStep(0))
            .unwrap();
        assert!(max.converged());
        assert!((max.residual - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_nan_error_never_converges() {
        let log = CallLog::default();
        let mut engine = TestEngine::new();
        let mut controllers = vec![Scripted::new("a", 0, &[f64::NAN], &log)];
        let report = ConvergenceLoop::new(2, 1.0, ErrorAggregation::Sum)
            .run(&mut engine, &mut controllers, tier0(), TimeStep(0))
            .unwrap();

        assert_eq!(report.outcome, Convergence::Exhausted);
        assert!(report.residual.is_infinite());
    }

    #[test]
    fn test_empty_tier_converges_immediately() {
        let mut engine = TestEngine::new();
        let mut controllers: Vec<Scripted> = Vec::new();
        let report = ConvergenceLoop::new(10, 1.0, ErrorAggregation::Sum)
            .run(&mut engine, &mut controllers, tier0(), TimeStep(0))
            .unwrap();

        assert!(report.converged());
        assert_eq!(report.resolves, 0);
    }

    #[test]
    fn test_resolve_failure_propagates() {
        let log = CallLog::default();
        let mut engine = TestEngine::new().fail_on_resolve(2);
        let mut controllers = vec![Scripted::new("a", 0, &[5.0], &log)];
        let err = ConvergenceLoop::new(10, 1.0, ErrorAggregation::Sum)
            .run(&mut engine, &mut controllers, tier0(), TimeStep(0))
            .unwrap_err();

        assert!(matches!(err, EngineError::SolveFailed { .. }));
        assert_eq!(engine.resolves, 1);
    }
}
